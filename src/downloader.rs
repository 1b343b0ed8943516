//! APK 다운로더
//!
//! ## 동작 순서
//! 1. 버전으로부터 고정된 경로 결정: `<download_dir>/<app_name>-<version>.apk`
//! 2. 같은 경로에 파일이 있으면 먼저 삭제 (버전당 파일은 최대 1개)
//! 3. 스트리밍 다운로드 + 청크마다 진행률 콜백
//! 4. HTTP 200이 아니면 네트워크 실패
//! 5. 크기 검증 (기본 1 MiB 이상): 실패 시 파일 삭제
//! 6. ZIP 시그니처(`PK\x03\x04`) 검증: 불일치나 4바이트 미만이면 파일 삭제, I/O 오류는 통과 처리
//!
//! 검증을 모두 통과한 파일만 `ValidatedApk`로 반환되며,
//! 설치 런처는 `ValidatedApk`만 받습니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::UpdaterError;

/// 최소 패키지 크기 (1 MiB). 이보다 작으면 에러 페이지로 간주한다.
pub const MIN_ARTIFACT_BYTES: u64 = 1024 * 1024;

/// ZIP 로컬 파일 헤더 시그니처
pub const ZIP_SIGNATURE: [u8; 4] = *b"PK\x03\x04";

/// 다운로드 진행률
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    /// 0.0 ~ 100.0
    pub progress_percent: f64,
    pub bytes_written: u64,
    pub content_length: u64,
}

impl DownloadProgress {
    /// 전체 크기를 모르면(0 이하) None
    pub fn compute(bytes_written: u64, content_length: u64) -> Option<Self> {
        if content_length == 0 {
            return None;
        }
        let percent = (bytes_written as f64 / content_length as f64) * 100.0;
        Some(Self {
            progress_percent: percent.clamp(0.0, 100.0),
            bytes_written,
            content_length,
        })
    }
}

/// 크기와 시그니처 검증을 통과한 APK
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedApk {
    path: PathBuf,
    version: String,
    size: u64,
}

impl ValidatedApk {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    #[cfg(test)]
    pub(crate) fn for_test(path: impl Into<PathBuf>, version: &str) -> Self {
        Self {
            path: path.into(),
            version: version.to_string(),
            size: MIN_ARTIFACT_BYTES,
        }
    }
}

pub struct ApkDownloader {
    http: reqwest::Client,
    download_dir: PathBuf,
    app_name: String,
    min_bytes: u64,
}

impl ApkDownloader {
    pub fn new(download_dir: impl Into<PathBuf>, app_name: &str) -> Result<Self, UpdaterError> {
        // 본문 전체에는 타임아웃을 두지 않는다 (대용량 APK)
        let http = reqwest::Client::builder()
            .user_agent(concat!("edulearn-updater/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| UpdaterError::ConfigError {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            download_dir: download_dir.into(),
            app_name: app_name.to_string(),
            min_bytes: MIN_ARTIFACT_BYTES,
        })
    }

    /// 최소 크기 기준 변경
    pub fn with_min_size(mut self, bytes: u64) -> Self {
        self.min_bytes = bytes;
        self
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// 버전별 고정 경로
    pub fn artifact_path(&self, version: &str) -> PathBuf {
        let file_name = format!("{}-{}.apk", sanitize(&self.app_name), sanitize(version));
        self.download_dir.join(file_name)
    }

    /// APK를 다운로드하고 검증한다.
    pub async fn download<F>(
        &self,
        url: &str,
        version: &str,
        mut on_progress: F,
    ) -> Result<ValidatedApk, UpdaterError>
    where
        F: FnMut(DownloadProgress),
    {
        let dest = self.artifact_path(version);
        let dest_str = dest.to_string_lossy().to_string();

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|e| UpdaterError::from_io(&e, "create download dir", &self.download_dir.to_string_lossy()))?;

        // ── 이전 파일 제거 ──
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            tracing::info!("[Downloader] Removing stale artifact {}", dest_str);
            tokio::fs::remove_file(&dest)
                .await
                .map_err(|e| UpdaterError::from_io(&e, "remove stale artifact", &dest_str))?;
        }

        tracing::info!("[Downloader] Downloading {} -> {}", url, dest_str);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(UpdaterError::NetworkError {
                message: format!("download returned HTTP {}", status),
                recoverable: status.is_server_error(),
            });
        }

        let content_length = response.content_length().unwrap_or(0);
        if let Some(p) = DownloadProgress::compute(0, content_length) {
            on_progress(p);
        }

        // ── 스트리밍 저장 ──
        // 생성 이후의 실패는 모두 부분 파일을 지운다
        let size = match write_body(response, &dest, content_length, &mut on_progress).await {
            Ok(size) => size,
            Err(e) => {
                remove_quietly(&dest).await;
                return Err(e);
            }
        };

        // ── 검증 ──
        if size < self.min_bytes {
            tracing::warn!(
                "[Downloader] Artifact too small ({} bytes < {}), probably an error page",
                size, self.min_bytes
            );
            remove_quietly(&dest).await;
            return Err(UpdaterError::InvalidSize {
                path: dest_str,
                size,
                minimum: self.min_bytes,
            });
        }

        match read_header(&dest).await {
            Ok(header) if header[..] == ZIP_SIGNATURE[..] => {}
            Ok(header) => {
                // 4바이트보다 짧은 파일도 여기서 걸린다
                tracing::warn!("[Downloader] Artifact header {} is not a ZIP signature", hex_bytes(&header));
                remove_quietly(&dest).await;
                return Err(UpdaterError::InvalidFormat {
                    path: dest_str,
                    signature: hex_bytes(&header),
                });
            }
            Err(e) => {
                tracing::warn!("[Downloader] Could not read artifact header, skipping format check: {}", e);
            }
        }

        tracing::info!("[Downloader] Downloaded {} ({} bytes)", dest_str, size);
        Ok(ValidatedApk {
            path: dest,
            version: version.to_string(),
            size,
        })
    }
}

/// 다운로드 중의 reqwest 에러는 모두 네트워크 실패로 분류
fn transport_error(err: &reqwest::Error) -> UpdaterError {
    match UpdaterError::from_reqwest(err) {
        e @ UpdaterError::NetworkError { .. } => e,
        other => UpdaterError::NetworkError {
            message: other.to_string(),
            recoverable: true,
        },
    }
}

/// 응답 본문을 파일로 쓰고 최종 크기를 반환
async fn write_body<F>(
    response: reqwest::Response,
    dest: &Path,
    content_length: u64,
    on_progress: &mut F,
) -> Result<u64, UpdaterError>
where
    F: FnMut(DownloadProgress),
{
    let dest_str = dest.to_string_lossy();
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| UpdaterError::from_io(&e, "create artifact", &dest_str))?;

    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| transport_error(&e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| UpdaterError::from_io(&e, "write artifact", &dest_str))?;

        written += chunk.len() as u64;
        if let Some(p) = DownloadProgress::compute(written, content_length) {
            on_progress(p);
        }
    }

    file.flush()
        .await
        .map_err(|e| UpdaterError::from_io(&e, "flush artifact", &dest_str))?;
    drop(file);

    let size = tokio::fs::metadata(dest)
        .await
        .map_err(|e| UpdaterError::from_io(&e, "stat artifact", &dest_str))?
        .len();
    Ok(size)
}

/// 앞 4바이트까지 읽는다. 파일이 더 짧으면 읽은 만큼만 반환
async fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = tokio::fs::File::open(path).await?;
    let mut header = Vec::with_capacity(ZIP_SIGNATURE.len());
    file.take(ZIP_SIGNATURE.len() as u64).read_to_end(&mut header).await?;
    Ok(header)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("[Downloader] Failed to remove {:?}: {}", path, e);
        }
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// 파일 이름에 쓸 수 없는 문자는 '_'로 치환
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}
