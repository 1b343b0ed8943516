//! 키-값 저장소: 업데이트 확인 상태 영속화
//!
//! 게이트는 전역 싱글턴 대신 주입된 `KeyValueStore`를 사용합니다.
//! - `MemoryStore`: 테스트용 인메모리 구현
//! - `FileStore`: JSON 파일 하나에 모든 키를 저장 (앱 재시작 후에도 유지)

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::UpdaterError;

/// 마지막 확인 시각 (RFC 3339)
pub const LAST_CHECK_KEY: &str = "last_version_check";
/// 건너뛴 버전
pub const SKIP_VERSION_KEY: &str = "skip_version";

/// 문자열 키-값 저장소
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, UpdaterError>;
    fn set(&self, key: &str, value: &str) -> Result<(), UpdaterError>;
}

/// 인메모리 저장소
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, UpdaterError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), UpdaterError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON 파일 기반 저장소
///
/// 쓰기마다 파일 전체를 다시 기록한다. 쓰는 쪽은 게이트 하나뿐이다.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>, UpdaterError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(UpdaterError::from_io(&e, "read state", &self.path.to_string_lossy()))
            }
        };

        match serde_json::from_str::<HashMap<String, String>>(&content) {
            Ok(map) => Ok(map),
            Err(e) => {
                // 손상된 상태 파일은 비어 있는 것으로 취급 (다음 쓰기에서 덮어씀)
                tracing::warn!("[Store] Ignoring corrupt state file {:?}: {}", self.path, e);
                Ok(HashMap::new())
            }
        }
    }

    fn save(&self, entries: &HashMap<String, String>) -> Result<(), UpdaterError> {
        let path_str = self.path.to_string_lossy().to_string();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| UpdaterError::from_io(&e, "create state dir", &path_str))?;
            }
        }
        let json = serde_json::to_string_pretty(entries).map_err(|e| UpdaterError::FileSystemError {
            operation: "serialize state".to_string(),
            path: path_str.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&self.path, json).map_err(|e| UpdaterError::from_io(&e, "write state", &path_str))?;
        tracing::debug!("[Store] Saved {} key(s) -> {:?}", entries.len(), self.path);
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, UpdaterError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), UpdaterError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }
}
