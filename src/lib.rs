//! # EduLearn 인앱 업데이터 라이브러리
//!
//! 앱 스토어를 거치지 않고 APK를 받아 설치하는 업데이트 파이프라인입니다.
//!
//! ## 구성 (의존 순서)
//! - **version**: 점 구분 버전 비교
//! - **store / gate**: 24시간 확인 주기 제한, 건너뛴 버전 기록
//! - **fetcher**: `GET /api/app/version`으로 최신 버전 정보 조회
//! - **downloader**: APK 스트리밍 다운로드 + 크기/ZIP 시그니처 검증
//! - **installer**: OS 설치 프로그램 실행, 권한 안내, 수동 설치 가이드
//! - **orchestrator**: 위 단계를 묶어 UI에 결과/이벤트로 전달
//!
//! ## 서버 응답 형식
//! ```json
//! {
//!   "latestVersion": "1.1.0",
//!   "downloadUrl": "https://cdn.example.com/edulearn-1.1.0.apk",
//!   "forceUpdate": false,
//!   "message": "Bug fixes for the MCQ screen"
//! }
//! ```
//!
//! ## 사용 예
//! ```no_run
//! use std::sync::Arc;
//! use edulearn_updater::{CheckOutcome, FileStore, CommandPlatform, UpdateChoice, UpdateConfig, UpdateOrchestrator};
//!
//! # async fn run() -> Result<(), edulearn_updater::UpdaterError> {
//! let config = UpdateConfig::default();
//! let store = Arc::new(FileStore::new(config.resolve_state_file()));
//! let orchestrator = UpdateOrchestrator::from_config(&config, store, Arc::new(CommandPlatform::new()))?;
//!
//! if let CheckOutcome::PromptOptional { info } | CheckOutcome::PromptForced { info } =
//!     orchestrator.check_and_handle().await
//! {
//!     orchestrator.respond(UpdateChoice::UpdateNow, &info).await;
//! }
//! # Ok(())
//! # }
//! ```

// ══════════════════════════════════════════════════════
// 모듈
// ══════════════════════════════════════════════════════

pub mod config;
pub mod downloader;
pub mod error;
pub mod fetcher;
pub mod gate;
pub mod installer;
pub mod orchestrator;
pub mod platform;
pub mod report;
pub mod store;
pub mod version;


// Re-exports for convenience
pub use config::UpdateConfig;
pub use downloader::{ApkDownloader, DownloadProgress, ValidatedApk, MIN_ARTIFACT_BYTES, ZIP_SIGNATURE};
pub use error::{DownloadFailureReason, ErrorContext, ErrorKind, UpdaterError};
pub use fetcher::{RemoteVersionFetcher, VersionInfo};
pub use gate::VersionCheckGate;
pub use installer::{
    GuideAction, InstallGuide, InstallLauncher, InstallOutcome, InstallStep, IntentTarget,
    LaunchState, PlatformBridge, PlatformKind, RecordingPlatform,
};
pub use orchestrator::{CheckOutcome, UpdateChoice, UpdateEvent, UpdateOrchestrator, UpdateOutcome};
pub use platform::CommandPlatform;
pub use report::{CheckReport, exit_code, report_to_json};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use version::{compare, compare_sign, is_newer};
