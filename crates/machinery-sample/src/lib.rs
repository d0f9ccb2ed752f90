//! # Machinery Sample Library
//!
//! Two units hosted together: a database pool and an API that depends on it.
//! Exposed as a library for integration testing.

pub mod api;
pub mod db;
