//! End-to-end runs of `CvatClient` + `BackupOrchestrator` against an
//! in-process HTTP server speaking the CVAT v1 endpoints the backup uses.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde_json::{Value, json};

use cvat_backup_core::{
    BackupConfig, BackupError, BackupOrchestrator, ClientConfig, CvatClient, RemoteSession,
    RetryPolicy, WatermarkStore,
};

const TOKEN: &str = "tok123";

#[derive(Default)]
struct Service {
    base: String,
    /// Task id → number of 202 answers left before the archive is ready.
    not_ready: HashMap<u64, u32>,
    /// Task id → updated_date reported by the listing.
    updated: HashMap<u64, String>,
    downloads: Vec<u64>,
    /// Page 2 links back to page 1 instead of ending the listing.
    cyclic: bool,
    pages_served: u32,
}

type Shared = Arc<Mutex<Service>>;

async fn login(Json(body): Json<Value>) -> Response {
    if body["username"] == "alice" && body["password"] == "secret" {
        Json(json!({ "key": TOKEN })).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({ "non_field_errors": ["bad credentials"] })))
            .into_response()
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Token {TOKEN}"))
}

async fn tasks(
    State(svc): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut svc = svc.lock().unwrap();
    svc.pages_served += 1;
    let svc = &*svc;
    let task = |id: u64| {
        json!({
            "id": id,
            "name": "A",
            "updated_date": svc.updated[&id],
            "mode": "annotation",
        })
    };

    let body = match query.get("page").map(String::as_str) {
        Some("2") => {
            let next = svc.cyclic.then(|| format!("{}/api/v1/tasks", svc.base));
            json!({ "count": 2, "next": next, "results": [task(2)] })
        }
        _ => json!({
            "count": 2,
            "next": format!("{}/api/v1/tasks?page=2", svc.base),
            "results": [task(1)],
        }),
    };
    Json(body).into_response()
}

async fn annotations(
    State(svc): State<Shared>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    assert_eq!(query.get("format").map(String::as_str), Some("CVAT for images 1.1"));
    assert_eq!(query.get("action").map(String::as_str), Some("download"));

    let mut svc = svc.lock().unwrap();
    svc.downloads.push(id);
    if let Some(left) = svc.not_ready.get_mut(&id) {
        if *left > 0 {
            *left -= 1;
            return StatusCode::ACCEPTED.into_response();
        }
    }
    (StatusCode::OK, zip_with(&format!("<annotations task=\"{id}\"/>"))).into_response()
}

fn zip_with(xml: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    writer.start_file("annotations.xml", options).unwrap();
    writer.write_all(xml.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

async fn spawn_service(configure: impl FnOnce(&mut Service)) -> (Shared, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let mut svc = Service {
        base: base.clone(),
        ..Service::default()
    };
    svc.updated.insert(1, "2024-01-01T00:00:00.000000Z".into());
    svc.updated.insert(2, "2024-01-02T00:00:00.000000Z".into());
    configure(&mut svc);
    let shared: Shared = Arc::new(Mutex::new(svc));

    let app = Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/tasks", get(tasks))
        .route("/api/v1/tasks/{id}/annotations", get(annotations))
        .with_state(Arc::clone(&shared));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (shared, format!("{base}/api/v1"))
}

fn client_config(base_url: &str, password: &str) -> ClientConfig {
    let mut cfg = ClientConfig::new(base_url, "alice", password);
    cfg.request_timeout = Duration::from_secs(10);
    cfg
}

fn backup_config(dir: &tempfile::TempDir) -> BackupConfig {
    let out = dir.path().join("backup");
    std::fs::create_dir_all(&out).unwrap();
    let mut cfg = BackupConfig::new(out, dir.path().join("cvat_task_timestamp.csv"));
    cfg.retry = RetryPolicy {
        max_attempts: 3,
        backoff: Duration::from_millis(10),
    };
    cfg
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
}

fn listing(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn paginated_listing_returns_every_task() {
    let (_svc, base_url) = spawn_service(|_| {}).await;
    let client = CvatClient::login(&client_config(&base_url, "secret")).await.unwrap();

    let tasks = client.list_tasks().await.unwrap();
    let ids: Vec<u64> = tasks.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(tasks[0].updated_date, "2024-01-01T00:00:00.000000Z");
}

#[tokio::test]
async fn cyclic_pagination_terminates() {
    let (svc, base_url) = spawn_service(|s| s.cyclic = true).await;
    let client = CvatClient::login(&client_config(&base_url, "secret")).await.unwrap();

    let tasks = tokio::time::timeout(Duration::from_secs(10), client.list_tasks())
        .await
        .expect("listing did not terminate")
        .unwrap();
    let ids: Vec<u64> = tasks.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(svc.lock().unwrap().pages_served, 2);
}

#[tokio::test]
async fn full_backup_then_idle_rerun() {
    let (svc, base_url) = spawn_service(|s| {
        s.not_ready.insert(2, 1);
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let cfg = backup_config(&dir);

    let client = CvatClient::login(&client_config(&base_url, "secret")).await.unwrap();
    let summary = BackupOrchestrator::new(client, cfg.clone())
        .unwrap()
        .run_on(day())
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 2);
    assert_eq!(
        listing(&cfg.output_dir),
        ["A_20240229.xml", "A_20240229_00.xml"]
    );
    assert_eq!(
        std::fs::read_to_string(cfg.output_dir.join("A_20240229_00.xml")).unwrap(),
        "<annotations task=\"2\"/>"
    );
    assert_eq!(svc.lock().unwrap().downloads, vec![1, 2, 2]);

    let store = WatermarkStore::load(&cfg.state_file).unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(
        store.get(2).unwrap().last_update_time,
        "2024-01-02T00:00:00.000000Z"
    );

    // Nothing changed server-side: the second run downloads nothing.
    let client = CvatClient::login(&client_config(&base_url, "secret")).await.unwrap();
    let summary = BackupOrchestrator::new(client, cfg.clone())
        .unwrap()
        .run_on(day())
        .await
        .unwrap();
    assert_eq!(summary.unchanged, 2);
    assert_eq!(summary.downloaded, 0);
    assert_eq!(svc.lock().unwrap().downloads.len(), 3);

    // Touch task 1 and run again.
    svc.lock()
        .unwrap()
        .updated
        .insert(1, "2024-01-03T00:00:00.000000Z".into());
    let client = CvatClient::login(&client_config(&base_url, "secret")).await.unwrap();
    let summary = BackupOrchestrator::new(client, cfg.clone())
        .unwrap()
        .run_on(day())
        .await
        .unwrap();
    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.files, vec![cfg.output_dir.join("A_20240229_01.xml")]);
}

#[tokio::test]
async fn export_that_never_gets_ready_aborts_the_run() {
    let (svc, base_url) = spawn_service(|s| {
        s.not_ready.insert(1, u32::MAX);
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let cfg = backup_config(&dir);

    let client = CvatClient::login(&client_config(&base_url, "secret")).await.unwrap();
    let err = BackupOrchestrator::new(client, cfg.clone())
        .unwrap()
        .run_on(day())
        .await
        .unwrap_err();

    assert!(
        matches!(err, BackupError::RetryExhausted { task_id: 1, attempts: 3, .. }),
        "{err:?}"
    );
    assert!(err.to_string().contains("202"), "{err}");
    // Task 2 was never requested and no record was written.
    assert_eq!(svc.lock().unwrap().downloads, vec![1, 1, 1]);
    assert!(!cfg.state_file.exists());
    assert!(listing(&cfg.output_dir).is_empty());
}

#[tokio::test]
async fn wrong_password_is_an_authentication_error() {
    let (_svc, base_url) = spawn_service(|_| {}).await;
    let err = CvatClient::login(&client_config(&base_url, "wrong"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, BackupError::Authentication { .. }), "{err:?}");
    assert!(err.to_string().contains("400"), "{err}");
}
