//! Integration tests for daemon bootstrap and shutdown

use arcturus_core::supervisor::{MockWorkerAdapter, MockWorkerScript};
use arcturus_core::SupervisorState;
use hostd::HostdError;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[tokio::test]
async fn test_bootstrap_without_config_starts_nothing() {
    let adapter = Arc::new(MockWorkerAdapter::new());
    let handle = hostd::bootstrap(None, adapter).await.expect("bootstrap");
    assert_eq!(handle.worker_count(), 0);
    assert!(handle.workers.is_empty());
    handle.shutdown().await;
}

#[tokio::test]
async fn test_bootstrap_starts_all_configured_workers() {
    let config = write_config(
        r#"
        [[workers]]
        modulePath = "/srv/workbench/worker/main.js"
        workerLabel = "ext-host"

        [[workers]]
        modulePath = "/srv/workbench/search/main.js"
        workerLabel = "search"
        "#,
    );

    let adapter = Arc::new(MockWorkerAdapter::new());
    adapter.add_script(MockWorkerScript {
        hold_open: Duration::from_secs(10),
        ..Default::default()
    });
    adapter.add_script(MockWorkerScript {
        hold_open: Duration::from_secs(10),
        ..Default::default()
    });

    let handle = hostd::bootstrap(Some(config.path().to_path_buf()), adapter.clone())
        .await
        .expect("bootstrap");
    assert_eq!(handle.worker_count(), 2);

    let ext_host = handle.supervisor("ext-host").expect("ext-host supervisor");
    assert_eq!(ext_host.state(), SupervisorState::Running);
    let search = handle.supervisor("search").expect("search supervisor");
    assert_eq!(search.state(), SupervisorState::Running);
    assert!(handle.supervisor("unknown").is_none());

    let ext_host = ext_host.clone();
    handle.shutdown().await;
    assert_eq!(ext_host.state(), SupervisorState::Disposed);

    // Both live workers receive their termination request
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while adapter.kill_count() < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(adapter.kill_count(), 2);
}

#[tokio::test]
async fn test_bootstrap_survives_one_worker_failing_to_spawn() {
    let config = write_config(
        r#"
        [[workers]]
        modulePath = "/srv/workbench/broken/main.js"
        workerLabel = "broken"

        [[workers]]
        modulePath = "/srv/workbench/worker/main.js"
        workerLabel = "healthy"
        "#,
    );

    let adapter = Arc::new(MockWorkerAdapter::new());
    adapter.add_script(MockWorkerScript {
        fail_spawn: true,
        ..Default::default()
    });
    adapter.add_script(MockWorkerScript {
        hold_open: Duration::from_secs(10),
        ..Default::default()
    });

    let handle = hostd::bootstrap(Some(config.path().to_path_buf()), adapter)
        .await
        .expect("bootstrap");

    let broken = handle.supervisor("broken").expect("broken supervisor");
    assert_eq!(broken.state(), SupervisorState::ExitedCrashed);
    let healthy = handle.supervisor("healthy").expect("healthy supervisor");
    assert_eq!(healthy.state(), SupervisorState::Running);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_bootstrap_rejects_invalid_config() {
    let config = write_config(
        r#"
        [[workers]]
        modulePath = ""
        workerLabel = "w"
        "#,
    );

    let adapter = Arc::new(MockWorkerAdapter::new());
    let result = hostd::bootstrap(Some(config.path().to_path_buf()), adapter).await;
    match result {
        Err(HostdError::ConfigurationError(msg)) => {
            assert!(msg.contains("modulePath"));
        }
        other => panic!(
            "Expected ConfigurationError, got {:?}",
            other.map(|h| h.worker_count())
        ),
    }
}

#[tokio::test]
async fn test_bootstrap_rejects_missing_config_file() {
    let adapter = Arc::new(MockWorkerAdapter::new());
    let result = hostd::bootstrap(Some("/nonexistent/workers.toml".into()), adapter).await;
    assert!(matches!(result, Err(HostdError::ConfigurationError(_))));
}
