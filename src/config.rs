//! 업데이터 설정 파일 관리
//!
//! `config/updater.toml`에서 설정을 로드합니다. 파일이 없으면 기본값을 사용합니다.
//! 환경 변수 `EDULEARN_UPDATE_URL`, `EDULEARN_DOWNLOAD_DIR`가 있으면 파일 값보다 우선합니다.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::downloader::MIN_ARTIFACT_BYTES;
use crate::gate::DEFAULT_CHECK_INTERVAL_HOURS;

pub const ENV_UPDATE_URL: &str = "EDULEARN_UPDATE_URL";
pub const ENV_DOWNLOAD_DIR: &str = "EDULEARN_DOWNLOAD_DIR";

/// 설정 가능한 키 목록 (`config set` 검증용)
pub const CONFIG_KEYS: &[&str] = &[
    "enabled",
    "api_base_url",
    "app_name",
    "current_version",
    "package_id",
    "check_interval_hours",
    "download_dir",
    "min_artifact_bytes",
    "install_delay_ms",
    "request_timeout_secs",
    "app_store_url",
    "state_file",
];

/// 업데이트 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfig {
    pub enabled: bool,
    /// 버전 서버 루트 URL (`/api/app/version`이 붙음)
    pub api_base_url: String,
    /// APK 파일 이름 접두사
    pub app_name: String,
    /// 현재 설치된 앱 버전
    pub current_version: String,
    /// Android 패키지 ID
    pub package_id: String,
    /// 확인 주기 (시간 단위, 기본 24)
    pub check_interval_hours: u32,
    /// APK 저장 디렉터리 (None이면 플랫폼 기본 다운로드 폴더)
    pub download_dir: Option<String>,
    pub min_artifact_bytes: u64,
    /// 권한 안내 후 설치 프로그램을 열기까지 대기 (ms)
    pub install_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// Android 이외 플랫폼에서 열 스토어 링크
    pub app_store_url: Option<String>,
    /// 확인 상태 저장 파일 (None이면 플랫폼 기본 위치)
    pub state_file: Option<String>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base_url: "http://localhost:5000".to_string(),
            app_name: "edulearn".to_string(),
            current_version: env!("CARGO_PKG_VERSION").to_string(),
            package_id: "com.edulearn.app".to_string(),
            check_interval_hours: DEFAULT_CHECK_INTERVAL_HOURS,
            download_dir: None,
            min_artifact_bytes: MIN_ARTIFACT_BYTES,
            install_delay_ms: 2000,
            request_timeout_secs: 30,
            app_store_url: None,
            state_file: None,
        }
    }
}

impl UpdateConfig {
    /// APK 저장 디렉터리 결정
    ///
    /// 설정값 → 환경 변수 → Android 공용 다운로드 → $HOME/Downloads → ./downloads
    pub fn resolve_download_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.download_dir {
            if !dir.trim().is_empty() {
                return PathBuf::from(dir);
            }
        }
        if let Ok(dir) = std::env::var(ENV_DOWNLOAD_DIR) {
            if !dir.trim().is_empty() {
                return PathBuf::from(dir);
            }
        }
        if cfg!(target_os = "android") {
            return PathBuf::from("/storage/emulated/0/Download");
        }
        home_dir()
            .map(|home| home.join("Downloads"))
            .unwrap_or_else(|| PathBuf::from("./downloads"))
    }

    /// 확인 상태 파일 경로 결정
    pub fn resolve_state_file(&self) -> PathBuf {
        if let Some(ref path) = self.state_file {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA")
                .map(|appdata| PathBuf::from(appdata).join("edulearn").join("update-state.json"))
                .unwrap_or_else(|_| PathBuf::from("update-state.json"))
        }
        #[cfg(not(target_os = "windows"))]
        {
            home_dir()
                .map(|home| home.join(".config").join("edulearn").join("update-state.json"))
                .unwrap_or_else(|| PathBuf::from("update-state.json"))
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    let var = if cfg!(target_os = "windows") { "USERPROFILE" } else { "HOME" };
    std::env::var(var).ok().filter(|h| !h.is_empty()).map(PathBuf::from)
}

/// 설정 파일 경로 결정
pub fn config_file_path() -> PathBuf {
    // 1. 실행 파일 옆 config/updater.toml
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let cfg = dir.join("config").join("updater.toml");
            if cfg.exists() {
                return cfg;
            }
        }
    }

    // 2. 기본: CWD의 config/updater.toml (생성용)
    PathBuf::from("config").join("updater.toml")
}

/// TOML 파일에서 설정 로드 (없으면 기본값) + 환경 변수 적용
pub fn load_updater_config() -> Result<UpdateConfig> {
    let path = config_file_path();

    let mut cfg = if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        let parsed: toml::Value = content.parse()?;
        tracing::info!("[Config] Loaded {:?}", path);
        parse_config(&parsed)
    } else {
        tracing::debug!("[Config] {:?} not found, using defaults", path);
        UpdateConfig::default()
    };

    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

pub fn apply_env_overrides(cfg: &mut UpdateConfig) {
    if let Ok(url) = std::env::var(ENV_UPDATE_URL) {
        if !url.trim().is_empty() {
            cfg.api_base_url = url;
        }
    }
    if let Ok(dir) = std::env::var(ENV_DOWNLOAD_DIR) {
        if !dir.trim().is_empty() {
            cfg.download_dir = Some(dir);
        }
    }
}

/// 알 수 없는 키나 타입이 맞지 않는 값은 무시한다.
pub fn parse_config(val: &toml::Value) -> UpdateConfig {
    let mut cfg = UpdateConfig::default();
    // [updater] 섹션이 있으면 그 안을 읽는다
    let val = val.get("updater").unwrap_or(val);

    if let Some(v) = val.get("enabled").and_then(|v| v.as_bool()) {
        cfg.enabled = v;
    }
    if let Some(v) = val.get("api_base_url").and_then(|v| v.as_str()) {
        cfg.api_base_url = v.to_string();
    }
    if let Some(v) = val.get("app_name").and_then(|v| v.as_str()) {
        cfg.app_name = v.to_string();
    }
    if let Some(v) = val.get("current_version").and_then(|v| v.as_str()) {
        cfg.current_version = v.to_string();
    }
    if let Some(v) = val.get("package_id").and_then(|v| v.as_str()) {
        cfg.package_id = v.to_string();
    }
    if let Some(v) = val.get("check_interval_hours").and_then(|v| v.as_integer()) {
        if let Ok(hours) = u32::try_from(v) {
            if hours > 0 {
                cfg.check_interval_hours = hours;
            }
        }
    }
    if let Some(v) = val.get("download_dir").and_then(|v| v.as_str()) {
        cfg.download_dir = Some(v.to_string());
    }
    if let Some(v) = val.get("min_artifact_bytes").and_then(|v| v.as_integer()) {
        if v >= 0 {
            cfg.min_artifact_bytes = v as u64;
        }
    }
    if let Some(v) = val.get("install_delay_ms").and_then(|v| v.as_integer()) {
        if v >= 0 {
            cfg.install_delay_ms = v as u64;
        }
    }
    if let Some(v) = val.get("request_timeout_secs").and_then(|v| v.as_integer()) {
        if v > 0 {
            cfg.request_timeout_secs = v as u64;
        }
    }
    if let Some(v) = val.get("app_store_url").and_then(|v| v.as_str()) {
        cfg.app_store_url = Some(v.to_string());
    }
    if let Some(v) = val.get("state_file").and_then(|v| v.as_str()) {
        cfg.state_file = Some(v.to_string());
    }
    cfg
}

/// 키 하나를 TOML 값으로 변환 (타입 검증)
pub fn config_value(key: &str, value: &str) -> Result<toml::Value> {
    let toml_val = match key {
        "enabled" => toml::Value::Boolean(value.parse::<bool>().map_err(|_| {
            anyhow::anyhow!("Invalid boolean value: '{}' (use true/false)", value)
        })?),
        "check_interval_hours" | "min_artifact_bytes" | "install_delay_ms" | "request_timeout_secs" => {
            let n = value
                .parse::<i64>()
                .map_err(|_| anyhow::anyhow!("Invalid integer value: '{}'", value))?;
            if n < 0 {
                anyhow::bail!("'{}' must not be negative", key);
            }
            // 0이면 parse_config가 기본값으로 되돌린다
            if n == 0 && matches!(key, "check_interval_hours" | "request_timeout_secs") {
                anyhow::bail!("'{}' must be greater than 0", key);
            }
            if key == "check_interval_hours" && u32::try_from(n).is_err() {
                anyhow::bail!("'{}' is too large: {}", key, n);
            }
            toml::Value::Integer(n)
        }
        "api_base_url" | "app_name" | "current_version" | "package_id" | "download_dir"
        | "app_store_url" | "state_file" => toml::Value::String(value.to_string()),
        _ => {
            anyhow::bail!("Unknown config key: '{}'\nAvailable: {}", key, CONFIG_KEYS.join(", "));
        }
    };
    Ok(toml_val)
}

/// config set <key> <value>
pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    set_config_value_at(&config_file_path(), key, value)
}

pub fn set_config_value_at(path: &std::path::Path, key: &str, value: &str) -> Result<()> {
    let toml_val = config_value(key, value)?;

    let mut table: toml::value::Table = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        content.parse::<toml::Value>()?
            .as_table()
            .cloned()
            .unwrap_or_default()
    } else {
        toml::value::Table::new()
    };

    // 파일이 [updater] 섹션을 쓰면 parse_config도 그 안만 읽는다
    match table.get_mut("updater").and_then(|v| v.as_table_mut()) {
        Some(section) => {
            section.insert(key.to_string(), toml_val);
        }
        None => {
            table.insert(key.to_string(), toml_val);
        }
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(&toml::Value::Table(table))?;
    std::fs::write(path, content)?;
    tracing::info!("[Config] {} = {} -> {:?}", key, value, path);

    Ok(())
}
