//! ═══════════════════════════════════════════════════════════════════
//! 업데이트 파이프라인 통합 테스트
//! ═══════════════════════════════════════════════════════════════════
//!
//! 로컬 axum 목 서버로 버전 엔드포인트와 APK 파일을 제공하고
//! 전체 흐름을 검증합니다:
//!
//! 1. **버전 확인**: 최신 상태, 선택/강제 업데이트, 건너뛰기, 주기 제한
//! 2. **다운로드 검증**: 크기 미달, ZIP 시그니처 불일치, HTTP 오류
//! 3. **재다운로드**: 같은 버전의 이전 파일 교체
//! 4. **진행률**: 0 → 100, 전체 크기를 모를 때 억제
//! 5. **전체 흐름**: 강제 업데이트 확인 → 다운로드 → 설치 런처
//!
//! 모든 테스트는 `tempdir`을 사용해 파일시스템을 격리합니다.

use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use tempfile::TempDir;

use edulearn_updater::{
    ApkDownloader, CheckOutcome, DownloadProgress, ErrorKind, InstallOutcome, IntentTarget,
    LaunchState, MemoryStore, PlatformKind, RecordingPlatform, UpdateChoice, UpdateConfig,
    UpdateEvent, UpdateOrchestrator, UpdateOutcome, UpdaterError, MIN_ARTIFACT_BYTES,
};

// ═══════════════════════════════════════════════════════
// 테스트 유틸리티
// ═══════════════════════════════════════════════════════

const MIB: usize = 1024 * 1024;

/// 실제 ZIP 구조를 가진 테스트용 APK (압축 없이 `payload_len` 바이트 이상)
fn create_test_apk(payload_len: usize) -> Vec<u8> {
    let buf = std::io::Cursor::new(Vec::new());
    let mut zip_writer = zip::ZipWriter::new(buf);
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);

    zip_writer.start_file("AndroidManifest.xml", options).unwrap();
    zip_writer.write_all(b"<manifest package=\"com.edulearn.app\"/>").unwrap();

    zip_writer.start_file("classes.dex", options).unwrap();
    let body: Vec<u8> = (0..payload_len).map(|i| (i % 251) as u8).collect();
    zip_writer.write_all(&body).unwrap();

    zip_writer.finish().unwrap().into_inner()
}

/// 서버 에러 페이지를 흉내 낸 HTML (크기는 충분히 큼)
fn create_html_page(len: usize) -> Vec<u8> {
    let mut page = b"<!DOCTYPE html><html><body>".to_vec();
    page.resize(len, b' ');
    page
}

struct MockState {
    version_status: StatusCode,
    version_body: String,
    version_hits: AtomicUsize,
    files: HashMap<String, Vec<u8>>,
}

struct MockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    _handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn version_hits(&self) -> usize {
        self.state.version_hits.load(Ordering::SeqCst)
    }
}

async fn version_handler(State(state): State<Arc<MockState>>) -> Response {
    state.version_hits.fetch_add(1, Ordering::SeqCst);
    (
        state.version_status,
        [(header::CONTENT_TYPE, "application/json")],
        state.version_body.clone(),
    )
        .into_response()
}

async fn file_handler(State(state): State<Arc<MockState>>, Path(name): Path<String>) -> Response {
    match state.files.get(&name) {
        Some(data) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/vnd.android.package-archive")],
            data.clone(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

/// Content-Length 없이 청크 전송
async fn stream_handler(State(state): State<Arc<MockState>>, Path(name): Path<String>) -> Response {
    match state.files.get(&name) {
        Some(data) => {
            let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
                data.chunks(64 * 1024).map(|c| Ok(c.to_vec())).collect();
            Response::new(Body::from_stream(futures_util::stream::iter(chunks)))
        }
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

/// 첫 청크 뒤 연결을 끊는 응답
async fn broken_handler(State(state): State<Arc<MockState>>, Path(name): Path<String>) -> Response {
    match state.files.get(&name) {
        Some(data) => {
            let half = data.len() / 2;
            let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
                Ok(data[..half].to_vec()),
                Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "upstream reset")),
            ];
            Response::new(Body::from_stream(futures_util::stream::iter(chunks)))
        }
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

/// 로컬 목 서버 시작
async fn start_mock_server(
    version_status: StatusCode,
    version_body: String,
    files: HashMap<String, Vec<u8>>,
) -> MockServer {
    let state = Arc::new(MockState {
        version_status,
        version_body,
        version_hits: AtomicUsize::new(0),
        files,
    });

    let app = Router::new()
        .route("/api/app/version", get(version_handler))
        .route("/files/:name", get(file_handler))
        .route("/stream/:name", get(stream_handler))
        .route("/broken/:name", get(broken_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockServer { addr, state, _handle: handle }
}

/// 버전 응답 본문 (downloadUrl은 `/files/<name>`으로 연결)
async fn start_version_server(
    latest: &str,
    forced: bool,
    files: HashMap<String, Vec<u8>>,
    apk_name: &str,
) -> MockServer {
    // 주소를 알아야 downloadUrl을 만들 수 있으므로 먼저 바인드할 포트를 예약한다
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let body = json!({
        "latestVersion": latest,
        "downloadUrl": format!("http://{}/files/{}", addr, apk_name),
        "forceUpdate": forced,
        "message": "Improved MCQ timer",
    })
    .to_string();

    let state = Arc::new(MockState {
        version_status: StatusCode::OK,
        version_body: body,
        version_hits: AtomicUsize::new(0),
        files,
    });
    let app = Router::new()
        .route("/api/app/version", get(version_handler))
        .route("/files/:name", get(file_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockServer { addr, state, _handle: handle }
}

fn orchestrator_for(
    server: &MockServer,
    download_dir: &TempDir,
) -> (UpdateOrchestrator, Arc<RecordingPlatform>) {
    let config = UpdateConfig {
        api_base_url: server.base_url(),
        current_version: "1.0.0".to_string(),
        download_dir: Some(download_dir.path().to_string_lossy().to_string()),
        install_delay_ms: 0,
        request_timeout_secs: 10,
        ..Default::default()
    };
    let platform = Arc::new(RecordingPlatform::new(PlatformKind::Android));
    let orchestrator =
        UpdateOrchestrator::from_config(&config, Arc::new(MemoryStore::new()), platform.clone()).unwrap();
    (orchestrator, platform)
}

fn downloader(dir: &TempDir) -> ApkDownloader {
    ApkDownloader::new(dir.path(), "edulearn").unwrap()
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<UpdateEvent>) -> Vec<UpdateEvent> {
    let mut events = Vec::new();
    while let Ok(e) = rx.try_recv() {
        events.push(e);
    }
    events
}

// ═══════════════════════════════════════════════════════
// 1. 버전 확인
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn up_to_date_does_not_download() {
    let server = start_version_server("1.0.0", false, HashMap::new(), "edulearn.apk").await;
    let dir = TempDir::new().unwrap();
    let (orchestrator, platform) = orchestrator_for(&server, &dir);

    let outcome = orchestrator.check_and_handle().await;
    assert!(matches!(outcome, CheckOutcome::UpToDate { .. }), "{:?}", outcome);
    assert!(!outcome.handled());

    assert!(orchestrator.gate().last_check().is_some());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert!(platform.dispatched().is_empty());
}

#[tokio::test]
async fn gate_throttles_second_check() {
    let server = start_version_server("1.0.0", false, HashMap::new(), "edulearn.apk").await;
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = orchestrator_for(&server, &dir);

    orchestrator.check_and_handle().await;
    assert_eq!(orchestrator.check_and_handle().await, CheckOutcome::NotDue);
    assert_eq!(server.version_hits(), 1);

    // 수동 확인은 게이트를 무시
    orchestrator.check_now().await;
    assert_eq!(server.version_hits(), 2);
}

#[tokio::test]
async fn optional_update_can_be_skipped() {
    let server = start_version_server("1.2.0", false, HashMap::new(), "edulearn.apk").await;
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = orchestrator_for(&server, &dir);

    let info = match orchestrator.check_and_handle().await {
        CheckOutcome::PromptOptional { info } => info,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(info.latest_version, "1.2.0");
    assert_eq!(info.current_version, "1.0.0");
    assert_eq!(info.update_message.as_deref(), Some("Improved MCQ timer"));

    assert_eq!(
        orchestrator.respond(UpdateChoice::Skip, &info).await,
        UpdateOutcome::Skipped { version: "1.2.0".into() }
    );
    assert!(matches!(orchestrator.check_now().await, CheckOutcome::Skipped { .. }));
}

#[tokio::test]
async fn forced_update_ignores_previous_skip() {
    let server = start_version_server("1.1.0", true, HashMap::new(), "edulearn.apk").await;
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = orchestrator_for(&server, &dir);
    orchestrator.gate().skip("1.1.0").unwrap();

    let outcome = orchestrator.check_and_handle().await;
    assert!(matches!(outcome, CheckOutcome::PromptForced { .. }));
    assert!(outcome.handled());
}

#[tokio::test]
async fn server_error_is_soft_failure() {
    let server = start_mock_server(
        StatusCode::INTERNAL_SERVER_ERROR,
        "oops".to_string(),
        HashMap::new(),
    )
    .await;
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = orchestrator_for(&server, &dir);

    match orchestrator.check_and_handle().await {
        CheckOutcome::Failed { error } => {
            assert_eq!(error.kind(), ErrorKind::Server);
            assert!(error.is_recoverable());
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(orchestrator.gate().last_check().is_none());
}

#[tokio::test]
async fn malformed_payload_is_server_error() {
    let server = start_mock_server(
        StatusCode::OK,
        json!({ "version": "1.1.0" }).to_string(),
        HashMap::new(),
    )
    .await;
    let dir = TempDir::new().unwrap();
    let (orchestrator, _) = orchestrator_for(&server, &dir);

    match orchestrator.check_and_handle().await {
        CheckOutcome::Failed { error } => assert_eq!(error.kind(), ErrorKind::Server),
        other => panic!("unexpected {:?}", other),
    }
    assert!(orchestrator.gate().should_check());
}

// ═══════════════════════════════════════════════════════
// 2. 다운로드 검증
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn small_file_fails_size_check_and_is_removed() {
    let mut files = HashMap::new();
    files.insert("small.apk".to_string(), create_test_apk(500 * 1024));
    let server = start_mock_server(StatusCode::OK, "{}".into(), files).await;
    let dir = TempDir::new().unwrap();
    let d = downloader(&dir);

    let err = d.download(&server.url("/files/small.apk"), "1.1.0", |_| {}).await.unwrap_err();
    match err {
        UpdaterError::InvalidSize { size, minimum, .. } => {
            assert!(size < MIN_ARTIFACT_BYTES);
            assert_eq!(minimum, MIN_ARTIFACT_BYTES);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!d.artifact_path("1.1.0").exists());
}

#[tokio::test]
async fn html_page_fails_format_check_and_is_removed() {
    let mut files = HashMap::new();
    files.insert("error.apk".to_string(), create_html_page(2 * MIB));
    let server = start_mock_server(StatusCode::OK, "{}".into(), files).await;
    let dir = TempDir::new().unwrap();
    let d = downloader(&dir);

    let err = d.download(&server.url("/files/error.apk"), "1.1.0", |_| {}).await.unwrap_err();
    assert!(matches!(err, UpdaterError::InvalidFormat { .. }), "{:?}", err);
    assert_eq!(err.kind(), ErrorKind::InvalidArtifact);
    assert!(!d.artifact_path("1.1.0").exists());
}

#[tokio::test]
async fn body_shorter_than_signature_is_rejected_without_size_floor() {
    let mut files = HashMap::new();
    files.insert("tiny.apk".to_string(), b"<ht".to_vec());
    let server = start_mock_server(StatusCode::OK, "{}".into(), files).await;
    let dir = TempDir::new().unwrap();
    let d = downloader(&dir).with_min_size(0);

    let err = d.download(&server.url("/files/tiny.apk"), "1.1.0", |_| {}).await.unwrap_err();
    match err {
        UpdaterError::InvalidFormat { signature, .. } => assert_eq!(signature, "3c6874"),
        other => panic!("unexpected {:?}", other),
    }
    assert!(!d.artifact_path("1.1.0").exists());
}

#[tokio::test]
async fn empty_body_is_rejected_without_size_floor() {
    let mut files = HashMap::new();
    files.insert("empty.apk".to_string(), Vec::new());
    let server = start_mock_server(StatusCode::OK, "{}".into(), files).await;
    let dir = TempDir::new().unwrap();
    let d = downloader(&dir).with_min_size(0);

    let err = d.download(&server.url("/files/empty.apk"), "1.1.0", |_| {}).await.unwrap_err();
    assert!(matches!(err, UpdaterError::InvalidFormat { .. }), "{:?}", err);
    assert!(!d.artifact_path("1.1.0").exists());
}

#[tokio::test]
async fn interrupted_transfer_leaves_no_partial_file() {
    let mut files = HashMap::new();
    files.insert("edulearn.apk".to_string(), create_test_apk(2 * MIB));
    let server = start_mock_server(StatusCode::OK, "{}".into(), files).await;
    let dir = TempDir::new().unwrap();
    let d = downloader(&dir);

    let err = d.download(&server.url("/broken/edulearn.apk"), "1.1.0", |_| {}).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(err.download_reason(), Some(edulearn_updater::DownloadFailureReason::Network));
    assert!(!d.artifact_path("1.1.0").exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn http_error_is_network_failure() {
    let server = start_mock_server(StatusCode::OK, "{}".into(), HashMap::new()).await;
    let dir = TempDir::new().unwrap();
    let d = downloader(&dir);

    let err = d.download(&server.url("/files/missing.apk"), "1.1.0", |_| {}).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(!d.artifact_path("1.1.0").exists());
}

// ═══════════════════════════════════════════════════════
// 3. 재다운로드
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn redownload_replaces_stale_artifact() {
    let apk = create_test_apk(2 * MIB);
    let mut files = HashMap::new();
    files.insert("edulearn.apk".to_string(), apk.clone());
    let server = start_mock_server(StatusCode::OK, "{}".into(), files).await;
    let dir = TempDir::new().unwrap();
    let d = downloader(&dir);

    // 이전 시도에서 남은 불완전한 파일
    let stale = d.artifact_path("1.1.0");
    std::fs::write(&stale, b"partial garbage").unwrap();

    let validated = d.download(&server.url("/files/edulearn.apk"), "1.1.0", |_| {}).await.unwrap();
    assert_eq!(validated.path(), stale.as_path());
    assert_eq!(validated.size(), apk.len() as u64);
    assert_eq!(std::fs::read(&stale).unwrap(), apk);

    // 같은 버전을 다시 받아도 파일은 하나
    d.download(&server.url("/files/edulearn.apk"), "1.1.0", |_| {}).await.unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

// ═══════════════════════════════════════════════════════
// 4. 진행률
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn progress_reported_per_chunk_up_to_100() {
    let apk = create_test_apk(3 * MIB);
    let mut files = HashMap::new();
    files.insert("edulearn.apk".to_string(), apk.clone());
    let server = start_mock_server(StatusCode::OK, "{}".into(), files).await;
    let dir = TempDir::new().unwrap();
    let d = downloader(&dir);

    let mut updates: Vec<DownloadProgress> = Vec::new();
    d.download(&server.url("/files/edulearn.apk"), "1.1.0", |p| updates.push(p)).await.unwrap();

    assert!(updates.len() > 2);
    assert_eq!(updates.first().unwrap().progress_percent, 0.0);
    assert_eq!(updates.last().unwrap().progress_percent, 100.0);
    assert_eq!(updates.last().unwrap().bytes_written, apk.len() as u64);
    assert!(updates.iter().all(|p| p.content_length == apk.len() as u64));
    assert!(updates.windows(2).all(|w| w[0].bytes_written <= w[1].bytes_written));
}

#[tokio::test]
async fn progress_suppressed_without_content_length() {
    let mut files = HashMap::new();
    files.insert("edulearn.apk".to_string(), create_test_apk(2 * MIB));
    let server = start_mock_server(StatusCode::OK, "{}".into(), files).await;
    let dir = TempDir::new().unwrap();
    let d = downloader(&dir);

    let mut calls = 0;
    let validated = d
        .download(&server.url("/stream/edulearn.apk"), "1.1.0", |_| calls += 1)
        .await
        .unwrap();

    assert_eq!(calls, 0);
    assert!(validated.size() >= 2 * MIB as u64);
}

// ═══════════════════════════════════════════════════════
// 5. 전체 흐름
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn forced_update_end_to_end() {
    let apk = create_test_apk(5 * MIB);
    let mut files = HashMap::new();
    files.insert("edulearn-1.1.0.apk".to_string(), apk.clone());
    let server = start_version_server("1.1.0", true, files, "edulearn-1.1.0.apk").await;
    let dir = TempDir::new().unwrap();
    let (orchestrator, platform) = orchestrator_for(&server, &dir);
    let mut rx = orchestrator.subscribe();

    let outcome = orchestrator.check_and_handle().await;
    assert!(outcome.handled());
    let info = outcome.info().cloned().unwrap();
    assert!(info.force_update);

    let result = orchestrator.respond(UpdateChoice::UpdateNow, &info).await;
    let apk_path = match result {
        UpdateOutcome::Launched { apk_path, install } => {
            assert_eq!(install, InstallOutcome::InstallerOpened);
            apk_path
        }
        other => panic!("unexpected {:?}", other),
    };

    assert_eq!(apk_path, dir.path().join("edulearn-1.1.0.apk"));
    assert_eq!(std::fs::metadata(&apk_path).unwrap().len(), apk.len() as u64);
    assert_eq!(platform.dispatched(), vec![IntentTarget::InstallPackage(apk_path.clone())]);
    assert_eq!(orchestrator.launcher().state(), LaunchState::Done);
    assert!(!orchestrator.is_busy());

    let events = drain(&mut rx);
    let percents: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            UpdateEvent::Downloading { progress } => Some(progress.progress_percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents.first().copied(), Some(0.0));
    assert_eq!(percents.last().copied(), Some(100.0));
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));

    assert!(events.iter().any(|e| matches!(e, UpdateEvent::DownloadCompleted { .. })));
    assert!(events.iter().any(|e| matches!(e, UpdateEvent::Install { .. })));
    assert!(!events.iter().any(|e| matches!(e, UpdateEvent::Failed { .. })));
}

#[tokio::test]
async fn invalid_artifact_never_reaches_installer() {
    let mut files = HashMap::new();
    files.insert("edulearn-1.1.0.apk".to_string(), create_html_page(2 * MIB));
    let server = start_version_server("1.1.0", false, files, "edulearn-1.1.0.apk").await;
    let dir = TempDir::new().unwrap();
    let (orchestrator, platform) = orchestrator_for(&server, &dir);

    let info = orchestrator.check_now().await.info().cloned().unwrap();
    match orchestrator.respond(UpdateChoice::UpdateNow, &info).await {
        UpdateOutcome::Failed { error, fallback_url } => {
            assert_eq!(error.kind(), ErrorKind::InvalidArtifact);
            assert_eq!(fallback_url, info.download_url);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(platform.dispatched().is_empty());
    assert_eq!(orchestrator.launcher().state(), LaunchState::Idle);
}
