//! 원샷 확인 결과: CLI 출력 및 프로세스 종료 코드
//!
//! 헤드리스 실행(`edulearn-updater check`)이나 다른 프로세스가 업데이터를
//! 스폰해서 결과를 받을 때 사용합니다.

use serde::{Deserialize, Serialize};

use crate::orchestrator::CheckOutcome;

/// 원샷 업데이트 확인 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub current_version: String,
    pub latest_version: Option<String>,
    pub update_available: bool,
    pub force_update: bool,
    pub skipped: bool,
    /// 게이트 때문에 원격 확인을 하지 않음
    pub not_due: bool,
    pub download_url: Option<String>,
    pub message: Option<String>,
    /// 오류 메시지 (있으면)
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl CheckReport {
    pub fn from_outcome(current_version: &str, outcome: &CheckOutcome) -> Self {
        let info = outcome.info();
        let (error, error_kind) = match outcome {
            CheckOutcome::Failed { error } => (Some(error.to_string()), Some(error.kind().as_str().to_string())),
            _ => (None, None),
        };

        Self {
            current_version: current_version.to_string(),
            latest_version: info.map(|i| i.latest_version.clone()),
            update_available: outcome.needs_prompt(),
            force_update: outcome.handled(),
            skipped: matches!(outcome, CheckOutcome::Skipped { .. }),
            not_due: matches!(outcome, CheckOutcome::NotDue),
            download_url: info.and_then(|i| i.download_url.clone()),
            message: info.and_then(|i| i.update_message.clone()),
            error,
            error_kind,
        }
    }
}

/// 결과를 JSON 문자열로 직렬화 (프로세스 간 통신용)
pub fn report_to_json(report: &CheckReport) -> String {
    serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
}

/// 프로세스 종료 코드 결정
///
/// - `0`: 업데이트 있음 (호출측에서 알림 표시)
/// - `1`: 확인 실패 (에러)
/// - `2`: 할 일 없음 (최신, 건너뜀, 주기 미도래)
pub fn exit_code(report: &CheckReport) -> i32 {
    if report.error.is_some() {
        1
    } else if report.update_available {
        0
    } else {
        2
    }
}
