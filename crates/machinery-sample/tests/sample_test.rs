use machinery::framework::mock::RecordingSink;
use machinery::framework::{MachineryError, UnitError};
use machinery::lifecycle::{LifecycleState, Orchestrator, Signal};
use machinery::runtime::{Configuration, LogLevel};
use machinery_sample::api::ApiUnit;
use machinery_sample::db::{DbHandle, DbUnit};
use std::future::pending;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

const CONFIG: &str = r#"
db:
  host: pg.internal
  port: 6432
  pool_size: 2
api:
  port: 8080
  heartbeat_ms: 10
"#;

fn config(yaml: &str) -> Arc<Configuration> {
    Arc::new(Configuration::from_yaml_str(yaml).unwrap())
}

/// The api unit finds the db pool through the orchestrator and beats against it.
#[tokio::test]
async fn test_api_uses_db_pool_until_shutdown() {
    let api = ApiUnit::new();
    let beats = api.beat_counter();
    let sink = Arc::new(RecordingSink::new());
    let orch = Arc::new(
        Orchestrator::new(config(CONFIG), sink.clone())
            .with(DbUnit::new())
            .with(api),
    );

    let runner = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.start_until(pending::<Signal>()).await })
    };
    timeout(WAIT, orch.wait_for_state(LifecycleState::Running))
        .await
        .unwrap();

    let db = orch.provided::<DbHandle>(DbUnit::NAME).unwrap();
    assert_eq!(db.url(), "db://pg.internal:6432");
    assert_eq!(db.pool_size(), 2);

    timeout(WAIT, async {
        while beats.load(Ordering::Relaxed) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("heartbeat never ran");

    let report = orch.shutdown().await;
    assert_eq!(report.stopped, vec!["db".to_string(), "api".to_string()]);
    assert!(db.is_closed());
    timeout(WAIT, runner).await.unwrap().unwrap().unwrap();

    assert!(sink.contains(LogLevel::Info, "api listening on port 8080"));
    assert!(sink.contains(LogLevel::Info, "api went down"));
}

#[tokio::test]
async fn test_api_without_db_fails_to_start() {
    let orch = Orchestrator::new(config("api:\n  port: 8080\n"), Arc::new(RecordingSink::new()))
        .with(ApiUnit::new());

    let err = orch.start_until(pending::<Signal>()).await.unwrap_err();

    assert!(matches!(
        err,
        MachineryError::Start { ref unit, source: UnitError::MissingDependency(ref dep) }
            if unit == "api" && dep == "db"
    ));
}

#[tokio::test]
async fn test_zero_pool_size_is_rejected() {
    let orch = Orchestrator::new(
        config("db:\n  pool_size: 0\napi:\n  port: 1\n"),
        Arc::new(RecordingSink::new()),
    )
    .with(DbUnit::new())
    .with(ApiUnit::new());

    let err = orch.start_until(pending::<Signal>()).await.unwrap_err();

    assert!(matches!(err, MachineryError::Configure { ref unit, .. } if unit == "db"));
    assert!(orch.provided::<DbHandle>(DbUnit::NAME).is_none());
}

#[test]
fn test_bundled_config_parses() {
    let text = include_str!("../config/config.yaml");
    let config = Configuration::from_yaml_str(text).unwrap();

    let service = config.service().unwrap().unwrap();
    assert_eq!(service.name, "machinery-sample");
    let log = config.log_settings().unwrap();
    assert_eq!(log.file.unwrap().max_files, Some(7));
    assert!(config.section::<machinery_sample::db::DbSettings>("db").unwrap().is_some());
    assert!(config.section::<machinery_sample::api::ApiSettings>("api").unwrap().is_some());
}
