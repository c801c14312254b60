//! HTTP surface, driven in-process

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

use updater_agent::archive::{EncodingCandidates, Extractor};
use updater_agent::authn::signature::compute_signature_today;
use updater_agent::authn::AuthGate;
use updater_agent::deploy::{LocalContentStore, UpdateOrchestrator};
use updater_agent::filesys::exclusion::ExclusionSet;
use updater_agent::filesys::snapshot::SnapshotManager;
use updater_agent::lifecycle::SettleOptions;
use updater_agent::server::serve::router;
use updater_agent::server::state::{Gates, ServerState};
use updater_agent::targets::{DeploymentTarget, TargetKind, TargetRegistry};

use crate::support::{build_zip, calls, new_log, read_tree, write_tree, CallLog, FakeController};

const SUFFIX: &str = "Acme";
const API_KEY: &str = "deployer-1";
const UPDATE_SECRET: &str = "update-secret";
const CONTROL_SECRET: &str = "control-secret";
const BOUNDARY: &str = "updater-test-boundary";

struct Fixture {
    _tmp: tempfile::TempDir,
    content: PathBuf,
    backups: PathBuf,
    log: CallLog,
    app: Router,
}

fn gate(secret: &str) -> AuthGate {
    AuthGate::new(Some(&SecretString::from(secret.to_string())), SUFFIX)
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let content = tmp.path().join("apps").join("site-a");
    let backups = tmp.path().join("backups");
    let log = new_log();

    let registry = TargetRegistry::from_targets([
        DeploymentTarget {
            name: "site-a".to_string(),
            kind: TargetKind::AppPool,
            content_dir: content.clone(),
            backup_dir: Some(backups.clone()),
            exclusions: ExclusionSet::new(["uploads"]),
            controller: Arc::new(FakeController::new("site-a", log.clone())),
        },
        DeploymentTarget {
            name: "storefront".to_string(),
            kind: TargetKind::Process,
            content_dir: tmp.path().join("apps").join("storefront"),
            backup_dir: None,
            exclusions: ExclusionSet::new(["node_modules"]),
            controller: Arc::new(FakeController::new("storefront", log.clone())),
        },
    ])
    .unwrap();

    let store = LocalContentStore::new(
        SnapshotManager::default(),
        Extractor::new(EncodingCandidates::with_host(None)),
    );
    let orchestrator = UpdateOrchestrator::new(Arc::new(store), SettleOptions::immediate());

    let state = ServerState::new(
        Arc::new(registry),
        Arc::new(orchestrator),
        Gates {
            update: gate(UPDATE_SECRET),
            start: gate(CONTROL_SECRET),
            stop: gate(CONTROL_SECRET),
            host_info: AuthGate::new(None, SUFFIX),
        },
        16 * 1024 * 1024,
    );

    Fixture {
        _tmp: tmp,
        content,
        backups,
        log,
        app: router(Arc::new(state)),
    }
}

fn signature(secret: &str) -> String {
    compute_signature_today(secret.as_bytes(), API_KEY, SUFFIX).unwrap()
}

fn multipart_body(content_type: &str, archive: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"site.zip\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(archive);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(uri: &str, content_type: &str, archive: &[u8], secret: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"));
    if let Some(secret) = secret {
        builder = builder
            .header("x-api-key", API_KEY)
            .header("x-signature", signature(secret));
    }
    builder
        .body(Body::from(multipart_body(content_type, archive)))
        .unwrap()
}

fn control_request(uri: &str, secret: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-api-key", API_KEY)
        .header("x-signature", signature(secret))
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn snapshot_dirs(backups: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(backups) else {
        return Vec::new();
    };
    entries.map(|e| e.unwrap().path()).collect()
}

#[tokio::test]
async fn test_health() {
    let f = fixture();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, json) = send(&f.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["targets"], 2);
}

#[tokio::test]
async fn test_update_site_end_to_end() {
    let f = fixture();
    write_tree(
        &f.content,
        &[
            ("index.html", "<html>v1</html>"),
            ("app.js", "console.log(1)"),
            ("uploads/photo.jpg", "jpeg"),
        ],
    );

    let archive = build_zip(&[("index.html", b"<html>v2</html>"), ("app.js", b"console.log(2)")]);
    let request = upload_request("/api/update/pool/site-a", "application/zip", &archive, Some(UPDATE_SECRET));
    let (status, json) = send(&f.app, request).await;

    assert_eq!(status, StatusCode::OK, "{}", json);
    assert_eq!(json["target"], "site-a");
    assert_eq!(json["kind"], "app_pool");
    assert_eq!(json["state"], "running");
    assert_eq!(json["extracted"]["files"], 2);
    assert_eq!(json["cleared"]["preserved"][0], "uploads");

    // Snapshot holds the prior version without the excluded directory
    let snapshots = snapshot_dirs(&f.backups);
    assert_eq!(snapshots.len(), 1);
    let name = snapshots[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("site-a_"));
    let saved = read_tree(&snapshots[0]);
    assert_eq!(saved.keys().map(String::as_str).collect::<Vec<_>>(), vec!["app.js", "index.html"]);
    assert_eq!(saved["index.html"], b"<html>v1</html>".to_vec());

    // Content holds the new version plus the untouched uploads
    let live = read_tree(&f.content);
    assert_eq!(live["index.html"], b"<html>v2</html>".to_vec());
    assert_eq!(live["app.js"], b"console.log(2)".to_vec());
    assert_eq!(live["uploads/photo.jpg"], b"jpeg".to_vec());

    assert_eq!(calls(&f.log), vec!["stop:site-a", "start:site-a"]);
}

#[tokio::test]
async fn test_update_accepts_legacy_zip_mime() {
    let f = fixture();
    let archive = build_zip(&[("index.html", b"hi")]);
    let request = upload_request(
        "/api/update/pool/site-a",
        "application/x-zip-compressed",
        &archive,
        Some(UPDATE_SECRET),
    );
    let (status, _) = send(&f.app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_update_requires_signature_headers() {
    let f = fixture();
    let archive = build_zip(&[("index.html", b"hi")]);
    let request = upload_request("/api/update/pool/site-a", "application/zip", &archive, None);
    let (status, _) = send(&f.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(calls(&f.log).is_empty());
}

#[tokio::test]
async fn test_update_rejects_wrong_secret() {
    let f = fixture();
    let archive = build_zip(&[("index.html", b"hi")]);

    // Control secret does not open the update operation
    let request = upload_request("/api/update/pool/site-a", "application/zip", &archive, Some(CONTROL_SECRET));
    let (status, json) = send(&f.app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "forbidden");
    assert!(calls(&f.log).is_empty());
}

#[tokio::test]
async fn test_update_unknown_target() {
    let f = fixture();
    let archive = build_zip(&[("index.html", b"hi")]);
    let request = upload_request("/api/update/pool/nope", "application/zip", &archive, Some(UPDATE_SECRET));
    let (status, json) = send(&f.app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["message"].as_str().unwrap().contains("not defined"));
}

#[tokio::test]
async fn test_update_wrong_kind_is_not_defined() {
    let f = fixture();
    let archive = build_zip(&[("index.html", b"hi")]);
    let request = upload_request("/api/update/process/site-a", "application/zip", &archive, Some(UPDATE_SECRET));
    let (status, _) = send(&f.app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(calls(&f.log).is_empty());
}

#[tokio::test]
async fn test_update_rejects_non_zip_before_side_effects() {
    let f = fixture();
    write_tree(&f.content, &[("index.html", "<html>v1</html>")]);

    let request = upload_request("/api/update/pool/site-a", "text/plain", b"not a zip", Some(UPDATE_SECRET));
    let (status, json) = send(&f.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "bad_request");
    assert!(calls(&f.log).is_empty());
    assert_eq!(read_tree(&f.content)["index.html"], b"<html>v1</html>".to_vec());
    assert!(snapshot_dirs(&f.backups).is_empty());
}

#[tokio::test]
async fn test_update_corrupt_archive_reports_step() {
    let f = fixture();
    let request = upload_request("/api/update/process/storefront", "application/zip", b"garbage", Some(UPDATE_SECRET));
    let (status, json) = send(&f.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "update_failed");
    assert_eq!(json["message"], "extract failed");
    assert!(json["details"].as_str().is_some());

    // Target is left stopped
    assert_eq!(calls(&f.log), vec!["stop:storefront"]);
}

#[tokio::test]
async fn test_start_and_stop_endpoints() {
    let f = fixture();

    let (status, json) = send(&f.app, control_request("/api/update/process/storefront/stop", CONTROL_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "stopped");

    let (status, json) = send(&f.app, control_request("/api/update/process/storefront/start", CONTROL_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "running");

    let (status, _) = send(&f.app, control_request("/api/update/pool/storefront/start", CONTROL_SECRET)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&f.app, control_request("/api/update/pool/site-a/stop", UPDATE_SECRET)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(calls(&f.log), vec!["stop:storefront", "start:storefront"]);
}

#[tokio::test]
async fn test_host_info_without_secret_is_forbidden() {
    let f = fixture();
    let (status, _) = send(&f.app, control_request("/api/update/computer/info", CONTROL_SECRET)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
