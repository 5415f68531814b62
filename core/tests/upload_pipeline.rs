//! Upload pipeline behavior against a mock collector: delivery marking,
//! bounded retries, backlog ordering, and cooperative shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use chrono::DateTime;
use chrono::Utc;
use crewlog_core::SessionStore;
use crewlog_core::UploadError;
use crewlog_core::UploadHandle;
use crewlog_core::Uploader;
use crewlog_core::config::UploadConfig;
use crewlog_protocol::SessionRecord;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use uuid::Uuid;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::body_string_contains;
use wiremock::matchers::method;
use wiremock::matchers::path;

fn upload_config(server: &MockServer) -> UploadConfig {
    UploadConfig {
        collector_url: format!("{}/api/sessions", server.uri()),
        request_timeout_secs: 5,
        max_attempts: 3,
        retry_delay_ms: 0,
        upload_delay_ms: 0,
        backlog_delay_ms: 0,
        backlog_limit: 50,
    }
}

fn store_in(dir: &TempDir) -> SessionStore {
    SessionStore::new(dir.path().to_path_buf())
}

fn record_at(ts: &str) -> SessionRecord {
    let started_at: DateTime<Utc> = ts.parse().expect("timestamp");
    SessionRecord::new(Uuid::new_v4(), started_at)
}

fn write_record(store: &SessionStore, ts: &str) -> (SessionRecord, PathBuf) {
    let record = record_at(ts);
    let path = store.write(&record).expect("write record");
    (record, path)
}

async fn wait_for_requests(server: &MockServer, count: usize) {
    for _ in 0..200 {
        let received = server.received_requests().await.expect("request recording");
        if received.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("collector never saw {count} request(s)");
}

async fn wait_until_nothing_pending(store: &SessionStore) {
    for _ in 0..200 {
        if store.pending().expect("pending scan").is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("records never finished uploading");
}

#[tokio::test]
async fn successful_upload_marks_the_record_delivered() {
    let server = MockServer::start().await;
    let install_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/api/sessions"))
        .and(body_string_contains(install_id.to_string()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    let (record, path) = write_record(&store, "2025-03-01T10:00:00Z");
    let uploader =
        Uploader::new(upload_config(&server), store.clone(), install_id).expect("uploader");

    uploader.deliver(&path).await.expect("deliver");

    assert!(!path.exists());
    assert!(store.pending().expect("pending").is_empty());
    let entries = store.entries().expect("entries");
    assert_eq!(entries.len(), 1);
    assert!(entries[0].1, "record must be marked delivered");

    let received = server.received_requests().await.expect("request recording");
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).expect("json body");
    assert_eq!(
        body["userId"],
        serde_json::Value::String(install_id.to_string())
    );
    assert_eq!(
        body["sessionId"],
        serde_json::Value::String(record.session_id.to_string())
    );
    server.verify().await;
}

#[tokio::test]
async fn failing_collector_gets_a_bounded_number_of_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    let (_, path) = write_record(&store, "2025-03-01T10:00:00Z");
    let uploader =
        Uploader::new(upload_config(&server), store.clone(), Uuid::new_v4()).expect("uploader");

    let err = uploader.deliver(&path).await.expect_err("all attempts fail");
    assert!(matches!(err, UploadError::Status(500)));

    // The record survives for a later backlog pass.
    assert_eq!(store.pending().expect("pending"), vec![path]);
    server.verify().await;
}

#[tokio::test]
async fn delivered_records_are_never_resent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    let (_, path) = write_record(&store, "2025-03-01T10:00:00Z");
    store.mark_delivered(&path).expect("mark delivered");

    let uploader =
        Uploader::new(upload_config(&server), store.clone(), Uuid::new_v4()).expect("uploader");
    uploader.deliver(&path).await.expect("no-op deliver");
    server.verify().await;
}

#[tokio::test]
async fn backlog_pass_uploads_oldest_first_up_to_the_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    let (first, _) = write_record(&store, "2025-03-01T10:00:00Z");
    let (second, _) = write_record(&store, "2025-03-01T11:00:00Z");
    let (_, newest_path) = write_record(&store, "2025-03-01T12:00:00Z");

    let mut config = upload_config(&server);
    config.backlog_limit = 2;
    let uploader = Uploader::new(config, store.clone(), Uuid::new_v4()).expect("uploader");

    let delivered = uploader.backlog_pass().await.expect("backlog pass");
    assert_eq!(delivered, 2);
    assert_eq!(store.pending().expect("pending"), vec![newest_path]);

    let received = server.received_requests().await.expect("request recording");
    let ids: Vec<String> = received
        .iter()
        .map(|request| {
            let body: serde_json::Value =
                serde_json::from_slice(&request.body).expect("json body");
            body["sessionId"].as_str().expect("session id").to_string()
        })
        .collect();
    assert_eq!(
        ids,
        vec![first.session_id.to_string(), second.session_id.to_string()]
    );
    server.verify().await;
}

#[tokio::test]
async fn scheduled_backlog_runs_after_the_startup_delay() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    write_record(&store, "2025-03-01T10:00:00Z");

    let mut config = upload_config(&server);
    config.backlog_delay_ms = 50;
    let uploader = Uploader::new(config, store.clone(), Uuid::new_v4()).expect("uploader");
    let handle = UploadHandle::new(Arc::clone(&uploader), tokio::runtime::Handle::current());

    handle.start_backlog();
    // The guard makes the second call a no-op rather than a second pass.
    handle.start_backlog();

    wait_until_nothing_pending(&store).await;
    handle.shutdown().await;
    server.verify().await;
}

#[tokio::test]
async fn shutdown_cancels_the_backlog_during_its_startup_delay() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    let (_, path) = write_record(&store, "2025-03-01T10:00:00Z");

    let mut config = upload_config(&server);
    config.backlog_delay_ms = 60_000;
    let uploader = Uploader::new(config, store.clone(), Uuid::new_v4()).expect("uploader");
    let handle = UploadHandle::new(Arc::clone(&uploader), tokio::runtime::Handle::current());

    handle.start_backlog();
    handle.shutdown().await;

    assert_eq!(store.pending().expect("pending"), vec![path]);
    server.verify().await;
}

#[tokio::test]
async fn shutdown_interrupts_retry_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    let (_, path) = write_record(&store, "2025-03-01T10:00:00Z");

    let mut config = upload_config(&server);
    config.retry_delay_ms = 60_000;
    let uploader = Uploader::new(config, store.clone(), Uuid::new_v4()).expect("uploader");
    let handle = UploadHandle::new(Arc::clone(&uploader), tokio::runtime::Handle::current());

    handle.submit(path.clone());
    wait_for_requests(&server, 1).await;
    handle.shutdown().await;

    assert_eq!(store.pending().expect("pending"), vec![path]);
    server.verify().await;
}

#[tokio::test]
async fn politeness_pause_spaces_consecutive_uploads() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    write_record(&store, "2025-03-01T10:00:00Z");
    write_record(&store, "2025-03-01T11:00:00Z");

    let mut config = upload_config(&server);
    config.upload_delay_ms = 150;
    let uploader = Uploader::new(config, store.clone(), Uuid::new_v4()).expect("uploader");

    let started = Instant::now();
    let delivered = uploader.backlog_pass().await.expect("backlog pass");
    assert_eq!(delivered, 2);
    assert!(
        started.elapsed() >= Duration::from_millis(300),
        "each successful upload must be followed by the politeness pause"
    );
    server.verify().await;
}
