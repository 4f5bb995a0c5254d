use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use avscan_client::{
    error::{ACCESS_DENIED_MESSAGE, NETWORK_MESSAGE},
    ApiClient, Config, DirectoryUpload, ErrorKind, ScanController, ScanEvent, ScanTarget,
    SessionStatus,
};
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Backend {
    uploads: Arc<Mutex<Vec<(String, Option<String>, String)>>>,
    bodies: Arc<Mutex<Vec<(String, Value)>>>,
    status_polls: Arc<AtomicUsize>,
}

async fn serve(app: Router) -> SocketAddr {
    let _ = env_logger::builder().is_test(true).try_init();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

fn config_for(addr: SocketAddr) -> Config {
    Config {
        antivirus_url: format!("http://{addr}/api/antivirus"),
        network_security_url: format!("http://{addr}/api/network-security/"),
        poll_interval_ms: 10,
        request_timeout_secs: 5,
    }
}

// records every multipart field as (name, file name, text content)
async fn record_upload(backend: &Backend, mut multipart: Multipart) {
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let data = field.text().await.unwrap();
        backend.uploads.lock().unwrap().push((name, file_name, data));
    }
}

async fn scan_file(State(backend): State<Backend>, multipart: Multipart) -> Json<Value> {
    record_upload(&backend, multipart).await;
    let uploads = backend.uploads.lock().unwrap();
    let file_name = uploads[0].1.clone().unwrap_or_default();
    Json(json!({
        "filePath": file_name,
        "infected": true,
        "threatType": "VIRUS",
        "threatDetails": "EICAR test signature",
    }))
}

async fn scan_directory(State(backend): State<Backend>, multipart: Multipart) -> Json<Value> {
    record_upload(&backend, multipart).await;
    let results: Vec<Value> = backend
        .uploads
        .lock()
        .unwrap()
        .iter()
        .filter(|(name, _, _)| name == "files")
        .map(|(_, file_name, _)| json!({"filePath": file_name, "infected": false, "threatType": null}))
        .collect();
    Json(json!({
        "totalFiles": results.len(),
        "infectedFiles": 0,
        "cleanFiles": results.len(),
        "results": results,
    }))
}

async fn system_status(State(backend): State<Backend>) -> Json<Value> {
    let polls = backend.status_polls.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "isRunning": polls < 3 }))
}

async fn history() -> Json<Value> {
    Json(json!([
        {"id": 1, "filePath": "C:/Windows/a.dll", "infected": false, "threatType": null, "threatDetails": null, "scanType": "SYSTEM"},
        {"id": 2, "filePath": "C:/Users/b.exe", "infected": true, "threatType": "TROJAN", "threatDetails": "Trojan.Generic", "scanType": "SYSTEM"},
        {"id": 3, "filePath": "C:/pagefile.sys", "infected": false, "threatType": "ERROR", "threatDetails": "Access denied", "scanType": "SYSTEM"},
    ]))
}

async fn record_json(backend: &Backend, path: &str, body: Value) {
    backend
        .bodies
        .lock()
        .unwrap()
        .push((path.to_string(), body));
}

fn antivirus_routes() -> Router<Backend> {
    Router::new()
        .route("/api/antivirus/scan/file", post(scan_file))
        .route("/api/antivirus/scan/directory", post(scan_directory))
        .route("/api/antivirus/scan/system", post(|| async { Json(json!([])) }))
        .route("/api/antivirus/scan/system/status", get(system_status))
        .route("/api/antivirus/scan/system/stop", post(|| async { StatusCode::OK }))
        .route("/api/antivirus/history", get(history))
}

async fn scan_network(State(backend): State<Backend>, Json(body): Json<Value>) -> Json<Value> {
    record_json(&backend, "scan", body).await;
    Json(json!({
        "threats": 2,
        "vulnerabilities": [
            {"type": "OPEN_PORT", "description": "Port 3389 is open and potentially vulnerable",
             "severity": "CRITICAL", "recommendation": "Disable RDP or restrict access"},
            {"type": "FIREWALL_DISABLED", "description": "Firewall is disabled", "severity": "CRITICAL"}
        ],
        "scanTime": "2024-03-01T12:30:15",
        "status": "COMPLETED",
        "openPorts": ["3389"],
        "suspiciousConnections": [],
        "firewallEnabled": false,
        "webProtectionEnabled": true,
        "activeThreats": 0,
        "blockedAttempts": 4
    }))
}

fn network_routes() -> Router<Backend> {
    Router::new()
        .route("/api/network-security/scan", post(scan_network))
        .route(
            "/api/network-security/firewall/toggle",
            post(|State(b): State<Backend>, Json(body): Json<Value>| async move {
                record_json(&b, "firewall", body).await;
                StatusCode::OK
            }),
        )
        .route(
            "/api/network-security/block",
            post(|State(b): State<Backend>, Json(body): Json<Value>| async move {
                record_json(&b, "block", body).await;
                Json(json!({"success": true, "message": "Domain blocked successfully",
                            "warning": "Domain will be blocked in database only."}))
            }),
        )
        .route(
            "/api/network-security/unblock",
            post(|State(b): State<Backend>, Json(body): Json<Value>| async move {
                record_json(&b, "unblock", body).await;
                StatusCode::OK
            }),
        )
}

async fn backend() -> (Backend, ApiClient, Config) {
    let state = Backend::default();
    let app = antivirus_routes()
        .merge(network_routes())
        .with_state(state.clone());
    let addr = serve(app).await;
    let config = config_for(addr);
    (state, ApiClient::new(&config).unwrap(), config)
}

#[tokio::test]
async fn file_scan_uploads_a_named_file_part() {
    let (state, client, _) = backend().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eicar.com");
    std::fs::write(&path, "X5O!P%@AP").unwrap();

    let finding = client.scan_file(&path).await.unwrap();
    assert_eq!(finding.file_path, "eicar.com");
    assert!(finding.infected);

    let uploads = state.uploads.lock().unwrap();
    assert_eq!(
        *uploads,
        vec![(
            "file".to_string(),
            Some("eicar.com".to_string()),
            "X5O!P%@AP".to_string()
        )]
    );
}

#[tokio::test]
async fn directory_scan_sends_relative_paths() {
    let (state, client, _) = backend().await;
    let dir = tempfile::Builder::new().prefix("payloads").tempdir().unwrap();
    std::fs::write(dir.path().join("one.txt"), "1").unwrap();
    std::fs::create_dir(dir.path().join("deep")).unwrap();
    std::fs::write(dir.path().join("deep").join("two.txt"), "2").unwrap();

    let upload = DirectoryUpload::new(dir.path(), true);
    let name = upload.directory_name();
    let report = client.scan_directory(&upload).await.unwrap();
    assert_eq!(report.total_files, 2);

    let uploads = state.uploads.lock().unwrap();
    let fields: Vec<(&str, Option<&str>)> = uploads
        .iter()
        .map(|(field, file_name, _)| (field.as_str(), file_name.as_deref()))
        .collect();
    let deep = format!("{name}/deep/two.txt");
    let one = format!("{name}/one.txt");
    assert_eq!(
        fields,
        vec![
            ("directoryName", None),
            ("recursive", None),
            ("files", Some(deep.as_str())),
            ("files", Some(one.as_str())),
        ]
    );
    assert_eq!(uploads[0].2, name);
    assert_eq!(uploads[1].2, "true");
}

#[tokio::test]
async fn system_scan_runs_to_completion_over_http() {
    let (state, client, config) = backend().await;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let controller = ScanController::with_events(Arc::new(client), config.poll_interval(), tx);

    let session = controller.start(ScanTarget::System).await.unwrap();
    assert_eq!(session.status, SessionStatus::Running);

    let summary = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Some(ScanEvent::Completed { summary, .. }) => break summary,
                Some(ScanEvent::Failed { message, .. }) => panic!("scan failed: {message}"),
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(summary.total_files, 3);
    assert_eq!(summary.threats, 1);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.clean, 1);
    assert_eq!(state.status_polls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn stop_accepts_an_empty_response() {
    let (_, client, _) = backend().await;
    client.stop_system_scan().await.unwrap();
}

#[tokio::test]
async fn forbidden_is_access_denied_only_for_network_security() {
    let app = Router::new()
        .route(
            "/api/network-security/status",
            get(|| async { StatusCode::FORBIDDEN }),
        )
        .route(
            "/api/antivirus/history",
            get(|| async { (StatusCode::FORBIDDEN, Json(json!({"message": "login required"}))) }),
        );
    let addr = serve(app).await;
    let client = ApiClient::new(&config_for(addr)).unwrap();

    let err = client.network_status().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
    assert_eq!(err.message(), ACCESS_DENIED_MESSAGE);

    let err = client.scan_history().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Rejected);
    assert_eq!(err.message(), "login required");
}

#[tokio::test]
async fn server_error_message_is_surfaced_verbatim() {
    let app = Router::new().route(
        "/api/antivirus/scan/system",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"message": "scanner engine not initialised"})),
            )
                .into_response()
        }),
    );
    let addr = serve(app).await;
    let client = ApiClient::new(&config_for(addr)).unwrap();

    let err = client.start_system_scan().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Rejected);
    assert_eq!(err.message(), "scanner engine not initialised");
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    // grab a free port and close it again so nothing is listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ApiClient::new(&config_for(addr)).unwrap();
    let err = client.system_scan_status().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(err.message(), NETWORK_MESSAGE);
}

#[tokio::test]
async fn network_scan_posts_and_decodes_the_report() {
    let (state, client, _) = backend().await;

    let result = client.scan_network().await.unwrap();
    assert_eq!(result.threats, 2);
    assert_eq!(result.status.as_deref(), Some("COMPLETED"));
    assert_eq!(result.open_ports, vec!["3389".to_string()]);
    assert_eq!(result.vulnerabilities[1].kind, "FIREWALL_DISABLED");
    assert!(!result.firewall_enabled);
    assert_eq!(result.blocked_attempts, 4);

    let bodies = state.bodies.lock().unwrap();
    assert_eq!(*bodies, vec![("scan".to_string(), json!({}))]);
}

#[tokio::test]
async fn network_scan_forbidden_is_access_denied() {
    let app = Router::new().route(
        "/api/network-security/scan",
        post(|| async { StatusCode::FORBIDDEN }),
    );
    let addr = serve(app).await;
    let client = ApiClient::new(&config_for(addr)).unwrap();

    let err = client.scan_network().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
}

#[tokio::test]
async fn network_security_requests_carry_expected_bodies() {
    let (state, client, _) = backend().await;

    client.toggle_firewall(true).await.unwrap();
    let blocked = client
        .block_domain("malware.test", Some("phishing"))
        .await
        .unwrap();
    assert!(blocked.success);
    assert!(blocked.warning.is_some());

    let unblocked = client.unblock_domain("malware.test").await.unwrap();
    assert!(unblocked.success);

    let bodies = state.bodies.lock().unwrap();
    assert_eq!(
        *bodies,
        vec![
            ("firewall".to_string(), json!({"enabled": true})),
            (
                "block".to_string(),
                json!({"domain": "malware.test", "reason": "phishing"})
            ),
            ("unblock".to_string(), json!({"domain": "malware.test"})),
        ]
    );
}
