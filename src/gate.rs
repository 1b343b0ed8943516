//! 버전 확인 게이트: 원격 확인 주기 제한 및 건너뛰기 상태
//!
//! 앱을 켤 때마다 버전 엔드포인트를 호출하지 않도록 마지막 확인 시각을
//! 저장하고, 선택 업데이트를 "이 버전 건너뛰기"로 무시할 수 있게 합니다.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::store::{KeyValueStore, LAST_CHECK_KEY, SKIP_VERSION_KEY};
use crate::error::UpdaterError;

/// 기본 확인 주기 (시간)
pub const DEFAULT_CHECK_INTERVAL_HOURS: u32 = 24;

pub struct VersionCheckGate {
    store: Arc<dyn KeyValueStore>,
    interval: Duration,
}

impl VersionCheckGate {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_interval_hours(store, DEFAULT_CHECK_INTERVAL_HOURS)
    }

    pub fn with_interval_hours(store: Arc<dyn KeyValueStore>, hours: u32) -> Self {
        Self {
            store,
            interval: Duration::hours(i64::from(hours)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 지금 원격 확인을 해야 하는지
    pub fn should_check(&self) -> bool {
        self.should_check_at(Utc::now())
    }

    /// `now` 기준으로 원격 확인이 필요한지 판단한다.
    ///
    /// 저장된 시각이 없거나, 읽을 수 없거나, 파싱에 실패하면 확인한다.
    pub fn should_check_at(&self, now: DateTime<Utc>) -> bool {
        match self.last_check() {
            Some(last) => now.signed_duration_since(last) >= self.interval,
            None => true,
        }
    }

    /// 마지막 성공 확인 시각
    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        let raw = match self.store.get(LAST_CHECK_KEY) {
            Ok(v) => v?,
            Err(e) => {
                tracing::warn!("[Gate] Failed to read last check time: {}", e);
                return None;
            }
        };

        match DateTime::parse_from_rfc3339(&raw) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!("[Gate] Ignoring malformed last check time '{}': {}", raw, e);
                None
            }
        }
    }

    /// 다음 확인 예정 시각 (기록이 없으면 None)
    pub fn next_check(&self) -> Option<DateTime<Utc>> {
        self.last_check().map(|t| t + self.interval)
    }

    /// 원격 확인 성공 시각 기록
    pub fn record_check(&self, now: DateTime<Utc>) -> Result<(), UpdaterError> {
        self.store.set(LAST_CHECK_KEY, &now.to_rfc3339())?;
        tracing::debug!("[Gate] Recorded version check at {}", now.to_rfc3339());
        Ok(())
    }

    /// 해당 버전을 건너뛰었는지 (정규화 없는 문자열 비교)
    pub fn has_skipped(&self, version: &str) -> bool {
        match self.skipped_version() {
            Some(skipped) => skipped == version,
            None => false,
        }
    }

    pub fn skipped_version(&self) -> Option<String> {
        match self.store.get(SKIP_VERSION_KEY) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("[Gate] Failed to read skipped version: {}", e);
                None
            }
        }
    }

    /// 버전 건너뛰기 저장 (이전 값 덮어씀)
    pub fn skip(&self, version: &str) -> Result<(), UpdaterError> {
        self.store.set(SKIP_VERSION_KEY, version)?;
        tracing::info!("[Gate] Version {} will no longer be offered", version);
        Ok(())
    }
}
