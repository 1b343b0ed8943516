//! EduLearn 업데이터 CLI
//!
//! GUI 없이 터미널에서 업데이트 파이프라인을 실행합니다.
//!
//! ## 사용법
//! ```text
//! edulearn-updater check                    # 업데이트 확인 (24시간 주기 적용)
//! edulearn-updater check --force            # 주기 무시하고 확인
//! edulearn-updater check --json             # JSON 출력
//! edulearn-updater download <url> <version> # APK 다운로드 + 검증
//! edulearn-updater skip <version>           # 버전 건너뛰기
//! edulearn-updater status                   # 확인 상태 표시
//! edulearn-updater config                   # 설정 표시
//! edulearn-updater config set <key> <value> # 설정 변경
//! edulearn-updater help                     # 도움말
//! ```
//!
//! ## 종료 코드 (check)
//! - `0`: 업데이트 있음
//! - `1`: 에러
//! - `2`: 할 일 없음

use std::io::Write;
use std::sync::Arc;

use edulearn_updater::config::{config_file_path, load_updater_config, set_config_value, CONFIG_KEYS};
use edulearn_updater::{
    exit_code, report_to_json, CheckOutcome, CheckReport, CommandPlatform, DownloadProgress,
    FileStore, UpdateConfig, UpdateOrchestrator,
};

fn main() {
    // stdout의 JSON을 오염시키지 않도록 로그는 stderr로
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Error: failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let code = rt.block_on(async move {
        match run(args).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("✗ Error: {}", e);
                1
            }
        }
    });
    std::process::exit(code);
}

async fn run(args: Vec<String>) -> anyhow::Result<i32> {
    let args_ref: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

    if args_ref.is_empty() || matches!(args_ref[0], "help" | "--help" | "-h") {
        print_help();
        return Ok(0);
    }

    if matches!(args_ref[0], "--version" | "-V") {
        println!("edulearn-updater {}", env!("CARGO_PKG_VERSION"));
        return Ok(0);
    }

    if args_ref[0] == "config" {
        return cmd_config(&args_ref[1..]);
    }

    let cfg = load_updater_config()?;
    let orchestrator = build_orchestrator(&cfg)?;

    match args_ref[0] {
        "check" => cmd_check(&orchestrator, &args_ref[1..]).await,
        "download" => cmd_download(&orchestrator, &args_ref[1..]).await,
        "skip" => cmd_skip(&orchestrator, &args_ref[1..]),
        "status" => cmd_status(&orchestrator, &cfg),
        other => {
            eprintln!("✗ Unknown command: {}", other);
            eprintln!("  Run 'edulearn-updater help' for usage.");
            Ok(1)
        }
    }
}

fn build_orchestrator(cfg: &UpdateConfig) -> anyhow::Result<UpdateOrchestrator> {
    let store = Arc::new(FileStore::new(cfg.resolve_state_file()));
    let platform = Arc::new(CommandPlatform::new());
    Ok(UpdateOrchestrator::from_config(cfg, store, platform)?)
}

// ═══════════════════════════════════════════════════════
// 명령어 핸들러
// ═══════════════════════════════════════════════════════

async fn cmd_check(orchestrator: &UpdateOrchestrator, flags: &[&str]) -> anyhow::Result<i32> {
    let json_mode = flags.contains(&"--json");
    let force = flags.contains(&"--force");

    let outcome = if force {
        orchestrator.check_now().await
    } else {
        orchestrator.check_and_handle().await
    };
    let report = CheckReport::from_outcome(orchestrator.current_version(), &outcome);

    if json_mode {
        println!("{}", report_to_json(&report));
        return Ok(exit_code(&report));
    }

    match &outcome {
        CheckOutcome::NotDue => {
            let next = orchestrator
                .gate()
                .next_check()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string());
            println!("⏳ Checked recently. Next check: {}", next);
            println!("💡 Use 'check --force' to check now.");
        }
        CheckOutcome::UpToDate { info } => {
            println!("✓ EduLearn {} is up to date.", info.current_version);
        }
        CheckOutcome::Skipped { info } => {
            println!("⏭ Version {} is available but was skipped.", info.latest_version);
        }
        CheckOutcome::PromptOptional { info } | CheckOutcome::PromptForced { info } => {
            let label = if info.force_update { "Required update" } else { "Update available" };
            println!("📦 {}: {} → {}", label, info.current_version, info.latest_version);
            if let Some(ref message) = info.update_message {
                println!("  {}", message);
            }
            match info.download_url {
                Some(ref url) => {
                    println!();
                    println!("💡 Run 'edulearn-updater download {} {}'", url, info.latest_version);
                }
                None => println!("⚠ The server did not provide a download link."),
            }
        }
        CheckOutcome::Failed { error } => {
            eprintln!("✗ Check failed: {}", error.user_message());
        }
    }

    Ok(exit_code(&report))
}

async fn cmd_download(orchestrator: &UpdateOrchestrator, args: &[&str]) -> anyhow::Result<i32> {
    let (url, version) = match args {
        [url, version, ..] => (*url, *version),
        _ => {
            eprintln!("Usage: edulearn-updater download <url> <version>");
            return Ok(1);
        }
    };

    println!("⬇ Downloading EduLearn {}...", version);
    let result = orchestrator
        .downloader()
        .download(url, version, print_progress)
        .await;
    eprintln!();

    match result {
        Ok(apk) => {
            println!("✓ Saved {} ({} bytes)", apk.path().display(), apk.size());
            Ok(0)
        }
        Err(e) => {
            eprintln!("✗ Download failed: {}", e.user_message());
            eprintln!("  You can download it in a browser instead: {}", url);
            Ok(1)
        }
    }
}

fn cmd_skip(orchestrator: &UpdateOrchestrator, args: &[&str]) -> anyhow::Result<i32> {
    let Some(version) = args.first() else {
        eprintln!("Usage: edulearn-updater skip <version>");
        return Ok(1);
    };
    orchestrator.gate().skip(version)?;
    println!("✓ Version {} will not be offered again.", version);
    Ok(0)
}

fn cmd_status(orchestrator: &UpdateOrchestrator, cfg: &UpdateConfig) -> anyhow::Result<i32> {
    let gate = orchestrator.gate();

    println!("📋 Update Status");
    println!("─────────────────────────────────────────────");
    println!("  Current version: {}", orchestrator.current_version());
    println!(
        "  Last check:      {}",
        gate.last_check().map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string())
    );
    println!(
        "  Next check:      {}",
        gate.next_check().map(|t| t.to_rfc3339()).unwrap_or_else(|| "now".to_string())
    );
    println!("  Skipped version: {}", gate.skipped_version().as_deref().unwrap_or("-"));
    println!("  Download dir:    {}", cfg.resolve_download_dir().display());
    println!("  State file:      {}", cfg.resolve_state_file().display());
    Ok(0)
}

fn cmd_config(args: &[&str]) -> anyhow::Result<i32> {
    match args.first().copied() {
        Some("set") if args.len() >= 3 => {
            let key = args[1];
            let value = args[2..].join(" ");
            set_config_value(key, &value)?;
            println!("✓ {} = {}", key, value);
        }
        Some("set") => {
            eprintln!("Usage: edulearn-updater config set <key> <value>");
            eprintln!("Keys: {}", CONFIG_KEYS.join(", "));
            return Ok(1);
        }
        Some("--json") => {
            let cfg = load_updater_config()?;
            println!("{}", serde_json::to_string(&cfg).unwrap_or_else(|_| "{}".to_string()));
        }
        _ => {
            let cfg = load_updater_config()?;
            println!("📋 Updater Configuration");
            println!("─────────────────────────────────────────────");
            println!("  enabled:              {}", cfg.enabled);
            println!("  api_base_url:         {}", cfg.api_base_url);
            println!("  app_name:             {}", cfg.app_name);
            println!("  current_version:      {}", cfg.current_version);
            println!("  package_id:           {}", cfg.package_id);
            println!("  check_interval_hours: {}", cfg.check_interval_hours);
            println!("  download_dir:         {}", cfg.resolve_download_dir().display());
            println!("  min_artifact_bytes:   {}", cfg.min_artifact_bytes);
            println!("  install_delay_ms:     {}", cfg.install_delay_ms);
            println!("  request_timeout_secs: {}", cfg.request_timeout_secs);
            println!("  app_store_url:        {}", cfg.app_store_url.as_deref().unwrap_or("(not set)"));
            println!();
            println!("  Config file: {}", config_file_path().display());
            println!();
            println!("  Change with: edulearn-updater config set <key> <value>");
        }
    }
    Ok(0)
}

// ═══════════════════════════════════════════════════════
// 출력 유틸리티
// ═══════════════════════════════════════════════════════

fn print_progress(progress: DownloadProgress) {
    const WIDTH: usize = 30;
    let filled = ((progress.progress_percent / 100.0) * WIDTH as f64).round() as usize;
    let filled = filled.min(WIDTH);
    eprint!(
        "\r  [{}{}] {:>5.1}%  {}/{} KiB",
        "█".repeat(filled),
        "░".repeat(WIDTH - filled),
        progress.progress_percent,
        progress.bytes_written / 1024,
        progress.content_length / 1024,
    );
    let _ = std::io::stderr().flush();
}

fn print_help() {
    println!("edulearn-updater — EduLearn in-app updater");
    println!();
    println!("USAGE:");
    println!("  edulearn-updater <command> [options]");
    println!();
    println!("COMMANDS:");
    println!("  check [--json] [--force]    Check for a newer version");
    println!("  download <url> <version>    Download and validate an APK");
    println!("  skip <version>              Stop offering a version");
    println!("  status                      Show last check and skipped version");
    println!("  config                      Show updater configuration");
    println!("  config set <key> <value>    Change a config value");
    println!("  help                        This help message");
    println!();
    println!("EXIT CODES (check):");
    println!("  0  update available");
    println!("  1  error");
    println!("  2  nothing to do");
    println!();
    println!("ENVIRONMENT:");
    println!("  EDULEARN_UPDATE_URL         Overrides api_base_url");
    println!("  EDULEARN_DOWNLOAD_DIR       Overrides download_dir");
    println!("  RUST_LOG                    Log filter (default: info)");
}
