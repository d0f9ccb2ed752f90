use machinery::framework::UnitError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("pool_size must be at least 1")]
    InvalidPoolSize,
    #[error("database pool is closed")]
    Closed,
}

impl From<DbError> for UnitError {
    fn from(err: DbError) -> Self {
        UnitError::Other(Box::new(err))
    }
}
