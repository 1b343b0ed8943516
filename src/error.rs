//! 에러 처리
//!
//! ## 지원하는 에러 상황
//! - 네트워크 끊김 / 타임아웃 (버전 확인, APK 다운로드)
//! - 서버 응답 오류 (non-2xx, 잘못된 JSON)
//! - 다운로드 파일 검증 실패 (크기, ZIP 시그니처)
//! - 파일 시스템 오류
//! - OS 설치 권한 차단 / 미지원 플랫폼
//!
//! 이 모듈의 어떤 에러도 호스트 앱에 치명적이지 않습니다.
//! 모든 비동기 경계에서 `UpdaterError`로 변환한 뒤 UI 레이어로 전달합니다.

use std::fmt;
use serde::{Deserialize, Serialize};

/// 업데이터 에러 타입
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum UpdaterError {
    /// 네트워크 연결 실패 (요청 전송, 스트림 중단, 다운로드 HTTP 상태 오류)
    NetworkError {
        message: String,
        recoverable: bool,
    },
    /// 버전 서버 응답 오류 (non-2xx 또는 잘못된 페이로드)
    ServerError {
        status_code: Option<u16>,
        message: String,
    },
    /// 다운로드 파일 크기가 너무 작음 (에러 페이지로 간주)
    InvalidSize {
        path: String,
        size: u64,
        minimum: u64,
    },
    /// ZIP 시그니처 불일치
    InvalidFormat {
        path: String,
        signature: String,
    },
    /// 파일 시스템 오류
    FileSystemError {
        operation: String,
        path: String,
        message: String,
    },
    /// OS가 설치 프로그램 실행을 거부함
    PermissionBlocked {
        message: String,
    },
    /// APK 설치를 지원하지 않는 플랫폼
    UnsupportedPlatform {
        platform: String,
    },
    /// 이미 다른 확인/다운로드가 진행 중
    Busy,
    /// 설정 오류
    ConfigError {
        message: String,
    },
}

/// 에러 분류: UI가 어떤 안내를 보여줄지 결정할 때 사용
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Network,
    Server,
    InvalidArtifact,
    PermissionBlocked,
    UnsupportedPlatform,
    FileSystem,
    Busy,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Server => "server",
            ErrorKind::InvalidArtifact => "invalid-artifact",
            ErrorKind::PermissionBlocked => "permission-blocked",
            ErrorKind::UnsupportedPlatform => "unsupported-platform",
            ErrorKind::FileSystem => "filesystem",
            ErrorKind::Busy => "busy",
            ErrorKind::Config => "config",
        }
    }
}

/// 다운로드 실패 사유 (ApkDownloader 결과 분류)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadFailureReason {
    Network,
    InvalidSize,
    InvalidFormat,
    Filesystem,
}

impl fmt::Display for UpdaterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdaterError::NetworkError { message, .. } => {
                write!(f, "Network error: {}", message)
            }
            UpdaterError::ServerError { status_code: Some(code), message } => {
                write!(f, "Server error ({}): {}", code, message)
            }
            UpdaterError::ServerError { status_code: None, message } => {
                write!(f, "Server error: {}", message)
            }
            UpdaterError::InvalidSize { path, size, minimum } => {
                write!(
                    f,
                    "Downloaded file '{}' is too small: {} bytes (minimum {})",
                    path, size, minimum
                )
            }
            UpdaterError::InvalidFormat { path, signature } => {
                write!(f, "Downloaded file '{}' is not a package archive (header {})", path, signature)
            }
            UpdaterError::FileSystemError { operation, path, message } => {
                write!(f, "File system error during {} on '{}': {}", operation, path, message)
            }
            UpdaterError::PermissionBlocked { message } => {
                write!(f, "Installation blocked: {}", message)
            }
            UpdaterError::UnsupportedPlatform { platform } => {
                write!(f, "In-app installation is not supported on {}", platform)
            }
            UpdaterError::Busy => {
                write!(f, "Another update check or download is already in progress")
            }
            UpdaterError::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
        }
    }
}

impl std::error::Error for UpdaterError {}

impl UpdaterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UpdaterError::NetworkError { .. } => ErrorKind::Network,
            UpdaterError::ServerError { .. } => ErrorKind::Server,
            UpdaterError::InvalidSize { .. } | UpdaterError::InvalidFormat { .. } => {
                ErrorKind::InvalidArtifact
            }
            UpdaterError::FileSystemError { .. } => ErrorKind::FileSystem,
            UpdaterError::PermissionBlocked { .. } => ErrorKind::PermissionBlocked,
            UpdaterError::UnsupportedPlatform { .. } => ErrorKind::UnsupportedPlatform,
            UpdaterError::Busy => ErrorKind::Busy,
            UpdaterError::ConfigError { .. } => ErrorKind::Config,
        }
    }

    /// 다운로드 단계에서 발생한 에러라면 그 사유를 반환
    pub fn download_reason(&self) -> Option<DownloadFailureReason> {
        match self {
            UpdaterError::NetworkError { .. } => Some(DownloadFailureReason::Network),
            UpdaterError::InvalidSize { .. } => Some(DownloadFailureReason::InvalidSize),
            UpdaterError::InvalidFormat { .. } => Some(DownloadFailureReason::InvalidFormat),
            UpdaterError::FileSystemError { .. } => Some(DownloadFailureReason::Filesystem),
            _ => None,
        }
    }

    /// 복구 가능한 에러인지 확인 (사용자가 재시도하면 성공할 가능성이 있는지)
    pub fn is_recoverable(&self) -> bool {
        match self {
            UpdaterError::NetworkError { recoverable, .. } => *recoverable,
            UpdaterError::ServerError { status_code, .. } => {
                // 5xx는 재시도 가능, 4xx와 페이로드 오류는 불가능
                status_code.map(|c| c >= 500).unwrap_or(false)
            }
            UpdaterError::InvalidSize { .. } | UpdaterError::InvalidFormat { .. } => true,
            UpdaterError::PermissionBlocked { .. } => true,
            UpdaterError::Busy => true,
            UpdaterError::FileSystemError { .. } => false,
            UpdaterError::UnsupportedPlatform { .. } => false,
            UpdaterError::ConfigError { .. } => false,
        }
    }

    /// 사용자에게 표시할 메시지 (다음 행동을 안내)
    pub fn user_message(&self) -> String {
        match self {
            UpdaterError::NetworkError { .. } => {
                "Could not reach the update server. Check your internet connection and try again.".to_string()
            }
            UpdaterError::ServerError { status_code, .. } => match status_code {
                Some(404) => "No update information is available right now.".to_string(),
                Some(code) if *code >= 500 => {
                    "The update server is having trouble. Please try again later.".to_string()
                }
                Some(code) => format!("The update server returned an error ({}).", code),
                None => "The update server sent an unexpected response.".to_string(),
            },
            UpdaterError::InvalidSize { .. } | UpdaterError::InvalidFormat { .. } => {
                "The downloaded file is not a valid app package. Try again or download it in your browser.".to_string()
            }
            UpdaterError::FileSystemError { .. } => {
                "The update could not be saved. Check that your device has free storage.".to_string()
            }
            UpdaterError::PermissionBlocked { .. } => {
                "Your device blocked the installation. Allow installs from this app in Settings, then open the file from Downloads.".to_string()
            }
            UpdaterError::UnsupportedPlatform { .. } => {
                "Please update the app from your app store.".to_string()
            }
            UpdaterError::Busy => {
                "An update is already in progress.".to_string()
            }
            UpdaterError::ConfigError { message } => {
                format!("Updater is misconfigured: {}", message)
            }
        }
    }

    /// reqwest 에러를 UpdaterError로 변환
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            UpdaterError::NetworkError {
                message: format!("request timed out: {}", err),
                recoverable: true,
            }
        } else if err.is_connect() {
            UpdaterError::NetworkError {
                message: "connection failed".to_string(),
                recoverable: true,
            }
        } else if err.is_decode() {
            UpdaterError::ServerError {
                status_code: None,
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            UpdaterError::ServerError {
                status_code: Some(status.as_u16()),
                message: err.to_string(),
            }
        } else {
            UpdaterError::NetworkError {
                message: err.to_string(),
                recoverable: err.is_request() || err.is_body(),
            }
        }
    }

    /// IO 에러를 UpdaterError로 변환
    pub fn from_io(err: &std::io::Error, operation: &str, path: &str) -> Self {
        UpdaterError::FileSystemError {
            operation: operation.to_string(),
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}

/// 에러 컨텍스트 (디버깅/로깅용)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub timestamp: String,
    pub operation: String,
    pub error: UpdaterError,
}

impl ErrorContext {
    pub fn new(operation: &str, error: UpdaterError) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            operation: operation.to_string(),
            error,
        }
    }

    /// 로그 출력
    pub fn log(&self) {
        if self.error.is_recoverable() {
            tracing::warn!(
                "[Error] {} [{}] (recoverable): {}",
                self.operation,
                self.error.kind().as_str(),
                self.error
            );
        } else {
            tracing::error!(
                "[Error] {} [{}] (fatal to this flow): {}",
                self.operation,
                self.error.kind().as_str(),
                self.error
            );
        }
    }
}
