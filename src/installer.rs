//! 설치 런처: 검증된 APK를 OS 설치 프로그램에 넘김
//!
//! ## 상태 전이 (Android)
//! ```text
//! Idle → PermissionPrompt → (지연) → AttemptOpen → Done
//!                                              └→ ManualGuide
//! ```
//! - **PermissionPrompt**: "출처를 알 수 없는 앱 설치" 권한 안내 + 설정 화면 바로가기
//! - **AttemptOpen**: 일정 시간 후 OS의 파일 열기 인텐트로 APK 실행
//! - **ManualGuide**: 실패 시 다운로드 폴더/설정 화면으로 가는 단계별 안내
//!
//! 다이얼로그 표시는 UI 레이어의 몫입니다. 런처는 `InstallStep`을 콜백으로 전달만 합니다.
//! 상태는 영속화하지 않으며 `launch` 호출마다 Idle에서 다시 시작합니다.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::downloader::ValidatedApk;
use crate::error::UpdaterError;

/// APK MIME 타입
pub const APK_MIME_TYPE: &str = "application/vnd.android.package-archive";

/// 권한 안내 후 파일 열기까지의 기본 지연
pub const DEFAULT_INSTALL_DELAY: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    Android,
    Ios,
    Other,
}

impl PlatformKind {
    /// 컴파일 대상 기준 현재 플랫폼
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            PlatformKind::Android
        } else if cfg!(target_os = "ios") {
            PlatformKind::Ios
        } else {
            PlatformKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Android => "android",
            PlatformKind::Ios => "ios",
            PlatformKind::Other => "other",
        }
    }
}

/// OS에 보낼 인텐트/링크 대상
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", content = "target", rename_all = "snake_case")]
pub enum IntentTarget {
    /// 출처를 알 수 없는 앱 관리 화면
    ManageUnknownAppSources,
    /// 위와 같지만 이 앱 패키지로 한정
    ManageUnknownAppSourcesForPackage(String),
    /// 보안 설정 화면
    SecuritySettings,
    /// 앱 상세 설정 화면
    AppSettings(String),
    /// 다운로드 목록
    Downloads,
    /// APK 파일 열기 (설치 프로그램)
    InstallPackage(PathBuf),
    /// 브라우저/스토어 링크
    Url(String),
}

impl IntentTarget {
    /// Android 인텐트 액션
    pub fn action(&self) -> &'static str {
        match self {
            IntentTarget::ManageUnknownAppSources
            | IntentTarget::ManageUnknownAppSourcesForPackage(_) => {
                "android.settings.MANAGE_UNKNOWN_APP_SOURCES"
            }
            IntentTarget::SecuritySettings => "android.settings.SECURITY_SETTINGS",
            IntentTarget::AppSettings(_) => "android.settings.APPLICATION_DETAILS_SETTINGS",
            IntentTarget::Downloads => "android.intent.action.VIEW_DOWNLOADS",
            IntentTarget::InstallPackage(_) | IntentTarget::Url(_) => "android.intent.action.VIEW",
        }
    }

    /// 인텐트 데이터 URI
    pub fn data(&self) -> Option<String> {
        match self {
            IntentTarget::ManageUnknownAppSourcesForPackage(pkg) | IntentTarget::AppSettings(pkg) => {
                Some(format!("package:{}", pkg))
            }
            IntentTarget::InstallPackage(path) => Some(format!("file://{}", path.display())),
            IntentTarget::Url(url) => Some(url.clone()),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            IntentTarget::InstallPackage(_) => Some(APK_MIME_TYPE),
            _ => None,
        }
    }
}

/// OS 연동 지점. 실제 구현은 플랫폼 채널/JNI/셸 명령 등으로 인텐트를 보낸다.
pub trait PlatformBridge: Send + Sync {
    fn kind(&self) -> PlatformKind;

    /// 해당 대상을 열 수 있는지 (Linking.canOpenURL 에 해당)
    fn supports(&self, target: &IntentTarget) -> bool;

    /// 인텐트 전송. 외부 명령이 끝날 때까지 블로킹될 수 있으며,
    /// 런처는 항상 tokio 블로킹 풀에서 호출한다.
    fn dispatch(&self, target: &IntentTarget) -> Result<(), UpdaterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchState {
    Idle,
    PermissionPrompt,
    AttemptOpen,
    Done,
    ManualGuide,
}

/// 안내 다이얼로그의 버튼
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuideAction {
    OpenPermissionSettings,
    OpenDownloads,
    OpenAppSettings,
    Dismiss,
}

impl GuideAction {
    pub fn label(&self) -> &'static str {
        match self {
            GuideAction::OpenPermissionSettings => "Allow installs",
            GuideAction::OpenDownloads => "Open Downloads",
            GuideAction::OpenAppSettings => "Open Settings",
            GuideAction::Dismiss => "Close",
        }
    }
}

/// UI에 표시할 안내 내용
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallGuide {
    pub title: String,
    pub message: String,
    pub steps: Vec<String>,
    pub actions: Vec<GuideAction>,
}

impl InstallGuide {
    fn permission_prompt() -> Self {
        Self {
            title: "Allow app installation".to_string(),
            message: "Android may block installing apps from outside the store. \
                      If asked, allow this app to install unknown apps, then return here."
                .to_string(),
            steps: vec![
                "Tap \"Allow installs\" to open the permission screen.".to_string(),
                "Turn on \"Allow from this source\".".to_string(),
                "Come back to the app; the installer opens automatically.".to_string(),
            ],
            actions: vec![GuideAction::OpenPermissionSettings, GuideAction::Dismiss],
        }
    }

    fn manual(apk: &ValidatedApk) -> Self {
        let file_name = apk
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| apk.path().display().to_string());
        Self {
            title: "Install the update manually".to_string(),
            message: format!("The installer could not be opened automatically. {} is saved in Downloads.", file_name),
            steps: vec![
                "Open your Downloads folder.".to_string(),
                format!("Tap {}.", file_name),
                "If prompted, allow installs from this source in Settings.".to_string(),
                "Tap Install.".to_string(),
            ],
            actions: vec![
                GuideAction::OpenDownloads,
                GuideAction::OpenAppSettings,
                GuideAction::Dismiss,
            ],
        }
    }
}

/// `launch` 진행 중 UI로 전달되는 단계
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum InstallStep {
    PermissionPrompt { guide: InstallGuide },
    AttemptingOpen { path: PathBuf },
    InstallerOpened,
    ManualGuide { guide: InstallGuide },
    RedirectedToStore { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstallOutcome {
    InstallerOpened,
    ManualGuide { guide: InstallGuide },
    RedirectedToStore { url: String },
}

pub struct InstallLauncher {
    platform: Arc<dyn PlatformBridge>,
    package_id: String,
    app_store_url: Option<String>,
    delay: Duration,
    state: Mutex<LaunchState>,
}

impl InstallLauncher {
    pub fn new(platform: Arc<dyn PlatformBridge>, package_id: &str) -> Self {
        Self {
            platform,
            package_id: package_id.to_string(),
            app_store_url: None,
            delay: DEFAULT_INSTALL_DELAY,
            state: Mutex::new(LaunchState::Idle),
        }
    }

    /// Android 이외 플랫폼에서 보낼 스토어 링크
    pub fn with_app_store_url(mut self, url: Option<String>) -> Self {
        self.app_store_url = url.filter(|u| !u.trim().is_empty());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn platform_kind(&self) -> PlatformKind {
        self.platform.kind()
    }

    pub fn state(&self) -> LaunchState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: LaunchState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        tracing::debug!("[Installer] {:?} -> {:?}", *state, next);
        *state = next;
    }

    /// 검증된 APK로 설치 흐름을 진행한다.
    ///
    /// Android가 아니면 스토어 링크로 보내거나 `UnsupportedPlatform`을 반환한다.
    /// 파일 열기 실패는 에러가 아니라 `ManualGuide` 결과로 끝난다.
    pub async fn launch<F>(&self, apk: &ValidatedApk, mut on_step: F) -> Result<InstallOutcome, UpdaterError>
    where
        F: FnMut(InstallStep),
    {
        self.set_state(LaunchState::Idle);

        let kind = self.platform.kind();
        if kind != PlatformKind::Android {
            return self.redirect_to_store(kind, &mut on_step).await;
        }

        // ── 권한 안내 ──
        self.set_state(LaunchState::PermissionPrompt);
        on_step(InstallStep::PermissionPrompt {
            guide: InstallGuide::permission_prompt(),
        });

        // 사용자가 설정을 바꾸고 돌아올 시간
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        // ── 설치 프로그램 열기 ──
        self.set_state(LaunchState::AttemptOpen);
        on_step(InstallStep::AttemptingOpen {
            path: apk.path().to_path_buf(),
        });

        let target = IntentTarget::InstallPackage(apk.path().to_path_buf());
        let opened = if self.platform.supports(&target) {
            self.dispatch(&target).await
        } else {
            Err(UpdaterError::PermissionBlocked {
                message: "file open intent is not available".to_string(),
            })
        };

        match opened {
            Ok(()) => {
                tracing::info!("[Installer] Installer opened for {}", apk.path().display());
                self.set_state(LaunchState::Done);
                on_step(InstallStep::InstallerOpened);
                Ok(InstallOutcome::InstallerOpened)
            }
            Err(e) => {
                tracing::warn!("[Installer] Could not open installer, showing manual guide: {}", e);
                let guide = InstallGuide::manual(apk);
                self.set_state(LaunchState::ManualGuide);
                on_step(InstallStep::ManualGuide { guide: guide.clone() });
                Ok(InstallOutcome::ManualGuide { guide })
            }
        }
    }

    async fn redirect_to_store<F>(&self, kind: PlatformKind, on_step: &mut F) -> Result<InstallOutcome, UpdaterError>
    where
        F: FnMut(InstallStep),
    {
        let unsupported = UpdaterError::UnsupportedPlatform {
            platform: kind.as_str().to_string(),
        };

        let url = match &self.app_store_url {
            Some(url) => url.clone(),
            None => return Err(unsupported),
        };

        let target = IntentTarget::Url(url.clone());
        if !self.platform.supports(&target) {
            return Err(unsupported);
        }
        self.dispatch(&target).await?;

        tracing::info!("[Installer] {} cannot sideload, redirected to store: {}", kind.as_str(), url);
        self.set_state(LaunchState::Done);
        on_step(InstallStep::RedirectedToStore { url: url.clone() });
        Ok(InstallOutcome::RedirectedToStore { url })
    }

    /// 설치 권한 화면 열기. 지원되지 않는 대상은 다음 후보로 넘어간다.
    ///
    /// 순서: 알 수 없는 앱 관리 → 패키지 한정 → 보안 설정 → 앱 상세 설정
    pub async fn open_permission_settings(&self) -> Result<IntentTarget, UpdaterError> {
        let candidates = [
            IntentTarget::ManageUnknownAppSources,
            IntentTarget::ManageUnknownAppSourcesForPackage(self.package_id.clone()),
            IntentTarget::SecuritySettings,
            IntentTarget::AppSettings(self.package_id.clone()),
        ];

        for target in candidates {
            if !self.platform.supports(&target) {
                tracing::debug!("[Installer] {} unsupported, trying next", target.action());
                continue;
            }
            match self.dispatch(&target).await {
                Ok(()) => {
                    tracing::info!("[Installer] Opened settings: {} {:?}", target.action(), target.data());
                    return Ok(target);
                }
                Err(e) => {
                    tracing::warn!("[Installer] {} failed: {}", target.action(), e);
                }
            }
        }

        Err(UpdaterError::PermissionBlocked {
            message: "no settings screen could be opened".to_string(),
        })
    }

    /// 안내 다이얼로그 버튼 처리
    pub async fn perform(&self, action: GuideAction) -> Result<(), UpdaterError> {
        match action {
            GuideAction::OpenPermissionSettings => self.open_permission_settings().await.map(|_| ()),
            GuideAction::OpenDownloads => self.dispatch_checked(IntentTarget::Downloads).await,
            GuideAction::OpenAppSettings => {
                self.dispatch_checked(IntentTarget::AppSettings(self.package_id.clone()))
                    .await
            }
            GuideAction::Dismiss => Ok(()),
        }
    }

    /// 외부 브라우저로 URL 열기 (다운로드 실패 시 대안)
    pub async fn open_url(&self, url: &str) -> Result<(), UpdaterError> {
        self.dispatch_checked(IntentTarget::Url(url.to_string())).await
    }

    async fn dispatch_checked(&self, target: IntentTarget) -> Result<(), UpdaterError> {
        if !self.platform.supports(&target) {
            return Err(UpdaterError::UnsupportedPlatform {
                platform: format!("{} ({})", self.platform.kind().as_str(), target.action()),
            });
        }
        self.dispatch(&target).await
    }

    /// 블로킹 풀에서 플랫폼 인텐트 전송
    async fn dispatch(&self, target: &IntentTarget) -> Result<(), UpdaterError> {
        let platform = Arc::clone(&self.platform);
        let target = target.clone();
        tokio::task::spawn_blocking(move || platform.dispatch(&target))
            .await
            .map_err(|e| UpdaterError::PermissionBlocked {
                message: format!("intent dispatch task failed: {}", e),
            })?
    }
}

/// 테스트용 플랫폼: 보낸 인텐트를 기록한다
#[derive(Debug)]
pub struct RecordingPlatform {
    kind: PlatformKind,
    unsupported: Vec<IntentTarget>,
    failing: Vec<IntentTarget>,
    dispatched: Mutex<Vec<IntentTarget>>,
}

impl RecordingPlatform {
    pub fn new(kind: PlatformKind) -> Self {
        Self {
            kind,
            unsupported: Vec::new(),
            failing: Vec::new(),
            dispatched: Mutex::new(Vec::new()),
        }
    }

    /// `supports`가 false를 반환할 대상
    pub fn unsupported(mut self, target: IntentTarget) -> Self {
        self.unsupported.push(target);
        self
    }

    /// `dispatch`가 실패할 대상
    pub fn failing(mut self, target: IntentTarget) -> Self {
        self.failing.push(target);
        self
    }

    pub fn dispatched(&self) -> Vec<IntentTarget> {
        self.dispatched.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl PlatformBridge for RecordingPlatform {
    fn kind(&self) -> PlatformKind {
        self.kind
    }

    fn supports(&self, target: &IntentTarget) -> bool {
        !self.unsupported.contains(target)
    }

    fn dispatch(&self, target: &IntentTarget) -> Result<(), UpdaterError> {
        if self.failing.contains(target) {
            return Err(UpdaterError::PermissionBlocked {
                message: format!("{} rejected", target.action()),
            });
        }
        self.dispatched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(target.clone());
        Ok(())
    }
}
