//! 버전 서버 클라이언트
//!
//! `GET {api_base_url}/api/app/version` 응답을 파싱하여 `VersionInfo`를 만듭니다.
//! 재시도는 하지 않습니다. 실패는 "확인 실패"일 뿐 앱에 치명적이지 않습니다.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorContext, UpdaterError};
use crate::gate::VersionCheckGate;

/// 버전 확인 엔드포인트 경로
pub const VERSION_ENDPOINT: &str = "/api/app/version";

/// 원격 버전 정보 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub current_version: String,
    pub latest_version: String,
    pub download_url: Option<String>,
    pub force_update: bool,
    pub update_message: Option<String>,
}

impl VersionInfo {
    /// 최신 버전이 현재 버전보다 새로운지
    pub fn update_available(&self) -> bool {
        crate::version::is_newer(&self.latest_version, &self.current_version)
    }
}

/// 서버 응답 본문
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionPayload {
    latest_version: String,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    force_update: Option<bool>,
    #[serde(default)]
    message: Option<String>,
}

pub struct RemoteVersionFetcher {
    http: reqwest::Client,
    /// 버전 서버 루트 (끝의 '/' 제거됨)
    base_url: String,
    gate: Arc<VersionCheckGate>,
}

impl RemoteVersionFetcher {
    pub fn new(base_url: &str, timeout: Duration, gate: Arc<VersionCheckGate>) -> Result<Self, UpdaterError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(UpdaterError::ConfigError {
                message: "api_base_url is empty".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("edulearn-updater/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| UpdaterError::ConfigError {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { http, base_url, gate })
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, VERSION_ENDPOINT)
    }

    /// 최신 버전 정보를 가져온다. 실패하면 로그를 남기고 None.
    pub async fn fetch_latest(&self, current_version: &str) -> Option<VersionInfo> {
        match self.try_fetch(current_version).await {
            Ok(info) => Some(info),
            Err(e) => {
                ErrorContext::new("fetch latest version", e).log();
                None
            }
        }
    }

    /// `fetch_latest`와 같지만 실패 원인을 돌려준다.
    ///
    /// 성공한 경우에만 게이트에 확인 시각을 기록한다.
    pub async fn try_fetch(&self, current_version: &str) -> Result<VersionInfo, UpdaterError> {
        let url = self.endpoint();
        tracing::info!("[Fetcher] Checking latest version: {}", url);

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| UpdaterError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpdaterError::ServerError {
                status_code: Some(status.as_u16()),
                message: truncate(&body, 200),
            });
        }

        let payload: VersionPayload = response
            .json()
            .await
            .map_err(|e| UpdaterError::ServerError {
                status_code: Some(status.as_u16()),
                message: format!("malformed version payload: {}", e),
            })?;

        if payload.latest_version.trim().is_empty() {
            return Err(UpdaterError::ServerError {
                status_code: Some(status.as_u16()),
                message: "latestVersion is empty".to_string(),
            });
        }

        let info = VersionInfo {
            current_version: current_version.to_string(),
            latest_version: payload.latest_version,
            download_url: payload.download_url.filter(|u| !u.trim().is_empty()),
            force_update: payload.force_update.unwrap_or(false),
            update_message: payload.message,
        };

        if let Err(e) = self.gate.record_check(Utc::now()) {
            tracing::warn!("[Fetcher] Could not record check time: {}", e);
        }

        tracing::info!(
            "[Fetcher] Server reports {} (current {}, forced={})",
            info.latest_version, info.current_version, info.force_update
        );
        Ok(info)
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}…", head)
    }
}
