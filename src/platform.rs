//! 셸 명령 기반 `PlatformBridge`
//!
//! - Android: `am start -a <action> [-d <data>] [-t <mime>]`
//! - Linux: `xdg-open`, macOS: `open`, Windows: `cmd /C start`
//!
//! 데스크톱에서는 URL과 파일 열기만 지원하며 Android 설정 화면은 지원하지 않는다고 보고합니다.

use std::process::Command;

use crate::error::UpdaterError;
use crate::installer::{IntentTarget, PlatformBridge, PlatformKind};

#[derive(Debug, Clone)]
pub struct CommandPlatform {
    kind: PlatformKind,
}

impl CommandPlatform {
    pub fn new() -> Self {
        Self {
            kind: PlatformKind::current(),
        }
    }

    fn android_command(target: &IntentTarget) -> Command {
        let mut cmd = Command::new("am");
        cmd.arg("start").arg("-a").arg(target.action());
        if let Some(data) = target.data() {
            cmd.arg("-d").arg(data);
        }
        if let Some(mime) = target.mime_type() {
            cmd.arg("-t").arg(mime);
        }
        cmd
    }

    fn desktop_command(target: &IntentTarget) -> Option<Command> {
        let arg = match target {
            IntentTarget::Url(url) => url.clone(),
            IntentTarget::InstallPackage(path) => path.display().to_string(),
            _ => return None,
        };

        #[cfg(target_os = "windows")]
        {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", ""]).arg(arg);
            Some(cmd)
        }
        #[cfg(target_os = "macos")]
        {
            let mut cmd = Command::new("open");
            cmd.arg(arg);
            Some(cmd)
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let mut cmd = Command::new("xdg-open");
            cmd.arg(arg);
            Some(cmd)
        }
    }
}

impl Default for CommandPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformBridge for CommandPlatform {
    fn kind(&self) -> PlatformKind {
        self.kind
    }

    fn supports(&self, target: &IntentTarget) -> bool {
        match self.kind {
            PlatformKind::Android => true,
            _ => matches!(target, IntentTarget::Url(_) | IntentTarget::InstallPackage(_)),
        }
    }

    fn dispatch(&self, target: &IntentTarget) -> Result<(), UpdaterError> {
        let mut cmd = match self.kind {
            PlatformKind::Android => Self::android_command(target),
            _ => Self::desktop_command(target).ok_or_else(|| UpdaterError::UnsupportedPlatform {
                platform: format!("{} ({})", self.kind.as_str(), target.action()),
            })?,
        };

        tracing::debug!("[Platform] Dispatching {:?}", cmd);
        let status = cmd.status().map_err(|e| UpdaterError::PermissionBlocked {
            message: format!("failed to run {:?}: {}", cmd.get_program(), e),
        })?;

        if !status.success() {
            return Err(UpdaterError::PermissionBlocked {
                message: format!("{} exited with {}", target.action(), status),
            });
        }
        Ok(())
    }
}
