//! 업데이트 오케스트레이터: 확인 → 안내 → 다운로드 → 설치 흐름
//!
//! ## 흐름
//! 1. `check_and_handle()`: 게이트 → 원격 확인 → 버전 비교 → 건너뛰기 확인
//!    → `CheckOutcome` 반환 (UI가 다이얼로그를 띄움)
//! 2. `respond(choice, info)`: 사용자의 선택 처리
//!    - 강제 업데이트: "지금 업데이트"만 허용
//!    - 선택 업데이트: 건너뛰기 / 나중에 / 지금 업데이트
//! 3. `update_now(info)`: 다운로드(진행률 이벤트) → 설치 런처
//!    - 실패 시 `download_url`을 브라우저로 여는 대안을 함께 반환
//!
//! 오케스트레이터는 UI 프롬프트를 기다리지 않습니다. 진행 상황은
//! `subscribe()`로 받은 브로드캐스트 채널로 전달됩니다.
//! 확인/다운로드는 동시에 하나만 진행되며, 중복 호출은 `UpdaterError::Busy`로 거절됩니다.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::UpdateConfig;
use crate::downloader::{ApkDownloader, DownloadProgress};
use crate::error::{ErrorContext, ErrorKind, UpdaterError};
use crate::fetcher::{RemoteVersionFetcher, VersionInfo};
use crate::gate::VersionCheckGate;
use crate::installer::{InstallLauncher, InstallOutcome, InstallStep, PlatformBridge};
use crate::store::KeyValueStore;

/// 버전 확인 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// 게이트가 확인을 막음 (24시간 이내) 또는 업데이터 비활성화
    NotDue,
    UpToDate { info: VersionInfo },
    /// 사용자가 이미 건너뛴 선택 업데이트
    Skipped { info: VersionInfo },
    PromptOptional { info: VersionInfo },
    PromptForced { info: VersionInfo },
    Failed { error: UpdaterError },
}

impl CheckOutcome {
    /// 강제 업데이트가 발견되어 앱을 정상 사용할 수 없는 경우에만 true
    pub fn handled(&self) -> bool {
        matches!(self, CheckOutcome::PromptForced { .. })
    }

    pub fn info(&self) -> Option<&VersionInfo> {
        match self {
            CheckOutcome::UpToDate { info }
            | CheckOutcome::Skipped { info }
            | CheckOutcome::PromptOptional { info }
            | CheckOutcome::PromptForced { info } => Some(info),
            CheckOutcome::NotDue | CheckOutcome::Failed { .. } => None,
        }
    }

    /// 사용자에게 업데이트를 제안해야 하는지
    pub fn needs_prompt(&self) -> bool {
        matches!(self, CheckOutcome::PromptOptional { .. } | CheckOutcome::PromptForced { .. })
    }
}

/// 업데이트 안내에 대한 사용자 선택
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateChoice {
    UpdateNow,
    Skip,
    RemindLater,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// 다운로드 완료 후 설치 런처까지 진행됨
    Launched { apk_path: PathBuf, install: InstallOutcome },
    Skipped { version: String },
    /// "나중에": 다음 주기 확인 때 다시 안내
    Deferred,
    /// 강제 업데이트에서 건너뛰기/나중에를 선택함 (거절)
    ForcedPending,
    Failed { error: UpdaterError, fallback_url: Option<String> },
}

/// UI로 브로드캐스트되는 이벤트
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UpdateEvent {
    CheckStarted { manual: bool },
    CheckFinished { outcome: CheckOutcome },
    DownloadStarted { version: String, url: String },
    Downloading { progress: DownloadProgress },
    DownloadCompleted { path: PathBuf, size: u64 },
    Install { step: InstallStep },
    Failed { kind: ErrorKind, message: String, fallback_url: Option<String> },
}

/// 진행 중 플래그: drop 시 해제
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct UpdateOrchestrator {
    enabled: bool,
    current_version: String,
    gate: Arc<VersionCheckGate>,
    fetcher: RemoteVersionFetcher,
    downloader: ApkDownloader,
    launcher: InstallLauncher,
    busy: AtomicBool,
    event_tx: broadcast::Sender<UpdateEvent>,
}

impl UpdateOrchestrator {
    pub fn new(
        current_version: &str,
        gate: Arc<VersionCheckGate>,
        fetcher: RemoteVersionFetcher,
        downloader: ApkDownloader,
        launcher: InstallLauncher,
    ) -> Self {
        let (event_tx, _) = broadcast::channel::<UpdateEvent>(256);
        Self {
            enabled: true,
            current_version: current_version.to_string(),
            gate,
            fetcher,
            downloader,
            launcher,
            busy: AtomicBool::new(false),
            event_tx,
        }
    }

    /// 설정으로부터 전체 파이프라인 구성
    pub fn from_config(
        config: &UpdateConfig,
        store: Arc<dyn KeyValueStore>,
        platform: Arc<dyn PlatformBridge>,
    ) -> Result<Self, UpdaterError> {
        let gate = Arc::new(VersionCheckGate::with_interval_hours(store, config.check_interval_hours));
        let fetcher = RemoteVersionFetcher::new(
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
            gate.clone(),
        )?;
        let downloader = ApkDownloader::new(config.resolve_download_dir(), &config.app_name)?
            .with_min_size(config.min_artifact_bytes);
        let launcher = InstallLauncher::new(platform, &config.package_id)
            .with_app_store_url(config.app_store_url.clone())
            .with_delay(Duration::from_millis(config.install_delay_ms));

        let mut orchestrator = Self::new(&config.current_version, gate, fetcher, downloader, launcher);
        orchestrator.enabled = config.enabled;
        Ok(orchestrator)
    }

    /// 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.event_tx.subscribe()
    }

    pub fn gate(&self) -> &VersionCheckGate {
        &self.gate
    }

    pub fn launcher(&self) -> &InstallLauncher {
        &self.launcher
    }

    pub fn downloader(&self) -> &ApkDownloader {
        &self.downloader
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn emit(&self, event: UpdateEvent) {
        // 구독자가 없어도 무시
        let _ = self.event_tx.send(event);
    }

    /// 앱 시작 시 호출: 게이트(24시간)를 거쳐 확인
    pub async fn check_and_handle(&self) -> CheckOutcome {
        self.run_check(false).await
    }

    /// 설정 화면의 "업데이트 확인": 게이트를 무시하고 즉시 확인
    pub async fn check_now(&self) -> CheckOutcome {
        self.run_check(true).await
    }

    async fn run_check(&self, manual: bool) -> CheckOutcome {
        if !self.enabled {
            tracing::debug!("[Orchestrator] Updater disabled, skipping check");
            return CheckOutcome::NotDue;
        }

        let _guard = match BusyGuard::acquire(&self.busy) {
            Some(g) => g,
            None => {
                tracing::warn!("[Orchestrator] Check requested while another operation is in flight");
                return CheckOutcome::Failed { error: UpdaterError::Busy };
            }
        };

        self.emit(UpdateEvent::CheckStarted { manual });
        let outcome = self.evaluate(manual).await;
        self.emit(UpdateEvent::CheckFinished { outcome: outcome.clone() });
        outcome
    }

    async fn evaluate(&self, manual: bool) -> CheckOutcome {
        if !manual && !self.gate.should_check() {
            tracing::debug!(
                "[Orchestrator] Last check is recent, next check at {:?}",
                self.gate.next_check().map(|t| t.to_rfc3339())
            );
            return CheckOutcome::NotDue;
        }

        let info = match self.fetcher.try_fetch(&self.current_version).await {
            Ok(info) => info,
            Err(error) => {
                ErrorContext::new("version check", error.clone()).log();
                return CheckOutcome::Failed { error };
            }
        };

        if !info.update_available() {
            tracing::info!("[Orchestrator] Up to date ({})", info.current_version);
            return CheckOutcome::UpToDate { info };
        }

        if !info.force_update && self.gate.has_skipped(&info.latest_version) {
            tracing::info!("[Orchestrator] {} was skipped by the user", info.latest_version);
            return CheckOutcome::Skipped { info };
        }

        tracing::info!(
            "[Orchestrator] Update available: {} -> {} (forced={})",
            info.current_version, info.latest_version, info.force_update
        );
        if info.force_update {
            CheckOutcome::PromptForced { info }
        } else {
            CheckOutcome::PromptOptional { info }
        }
    }

    /// 업데이트 안내 다이얼로그의 선택 처리
    pub async fn respond(&self, choice: UpdateChoice, info: &VersionInfo) -> UpdateOutcome {
        match choice {
            UpdateChoice::UpdateNow => self.update_now(info).await,
            UpdateChoice::Skip | UpdateChoice::RemindLater if info.force_update => {
                tracing::warn!("[Orchestrator] {:?} refused for forced update {}", choice, info.latest_version);
                UpdateOutcome::ForcedPending
            }
            UpdateChoice::Skip => match self.gate.skip(&info.latest_version) {
                Ok(()) => UpdateOutcome::Skipped {
                    version: info.latest_version.clone(),
                },
                Err(error) => self.fail(error, None),
            },
            UpdateChoice::RemindLater => {
                tracing::info!("[Orchestrator] Update {} deferred", info.latest_version);
                UpdateOutcome::Deferred
            }
        }
    }

    /// 다운로드 후 설치 런처 실행
    pub async fn update_now(&self, info: &VersionInfo) -> UpdateOutcome {
        let fallback_url = info.download_url.clone();

        let _guard = match BusyGuard::acquire(&self.busy) {
            Some(g) => g,
            None => return self.fail(UpdaterError::Busy, fallback_url),
        };

        let url = match info.download_url.as_deref() {
            Some(url) => url,
            None => {
                return self.fail(
                    UpdaterError::ServerError {
                        status_code: None,
                        message: format!("no download URL for {}", info.latest_version),
                    },
                    None,
                );
            }
        };

        self.emit(UpdateEvent::DownloadStarted {
            version: info.latest_version.clone(),
            url: url.to_string(),
        });

        let tx = self.event_tx.clone();
        // 청크마다가 아니라 정수 퍼센트가 바뀔 때만 브로드캐스트
        let mut last_percent: Option<u8> = None;
        let apk = match self
            .downloader
            .download(url, &info.latest_version, |progress| {
                let percent = progress.progress_percent.floor() as u8;
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    let _ = tx.send(UpdateEvent::Downloading { progress });
                }
            })
            .await
        {
            Ok(apk) => apk,
            Err(error) => return self.fail(error, fallback_url),
        };

        self.emit(UpdateEvent::DownloadCompleted {
            path: apk.path().to_path_buf(),
            size: apk.size(),
        });

        let install = match self
            .launcher
            .launch(&apk, |step| {
                let _ = tx.send(UpdateEvent::Install { step });
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => return self.fail(error, fallback_url),
        };

        UpdateOutcome::Launched {
            apk_path: apk.path().to_path_buf(),
            install,
        }
    }

    /// 다운로드 실패 시 대안: 브라우저로 직접 받기
    pub async fn open_in_browser(&self, url: &str) -> Result<(), UpdaterError> {
        self.launcher.open_url(url).await
    }

    fn fail(&self, error: UpdaterError, fallback_url: Option<String>) -> UpdateOutcome {
        ErrorContext::new("update", error.clone()).log();
        self.emit(UpdateEvent::Failed {
            kind: error.kind(),
            message: error.user_message(),
            fallback_url: fallback_url.clone(),
        });
        UpdateOutcome::Failed { error, fallback_url }
    }
}
