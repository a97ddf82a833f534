use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use dropwatch_lib::config::{AppConfig, TransferDirection};
use dropwatch_lib::transfer::{
    HiddenEntryPolicy, IntegrityVerifier, TransferEngine, TransferProgress, VerificationReport,
};
use dropwatch_lib::{
    CommandProcessController, LogManager, PipelineError, PipelineListener, PipelineRuntime, PipelineState,
};

#[derive(Parser)]
#[command(name = "dropwatch-cli")]
#[command(version, about = "Copy a newly created folder once it stops changing, then verify it", long_about = None)]
struct Cli {
    /// Watched root (or the source folder with --once / --verify-only)
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Destination root (or the target folder with --once / --verify-only)
    #[arg(short, long)]
    target: Option<PathBuf>,

    /// Settings file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings back to --config
    #[arg(long)]
    save_config: bool,

    /// Copy and verify source into target once, without watching
    #[arg(long)]
    once: bool,

    /// Only compare source against target
    #[arg(long)]
    verify_only: bool,

    #[arg(long)]
    debounce_secs: Option<u64>,

    #[arg(long)]
    include_hidden: bool,

    /// Fill the new watched folder from the same-named target folder
    #[arg(long)]
    seed_watched: bool,

    /// Command run before copying, e.g. "pkill -x Launcher"
    #[arg(long)]
    stop_cmd: Option<String>,

    /// Command run after the pipeline is reset
    #[arg(long)]
    resume_cmd: Option<String>,

    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn split_command(raw: &str) -> Option<Vec<String>> {
    let argv: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
    (!argv.is_empty()).then_some(argv)
}

fn bytes_style() -> anyhow::Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")?
        .progress_chars("#>-"))
}

fn verify_style() -> anyhow::Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.green/blue}] {pos}% {msg}")?
        .progress_chars("#>-"))
}

fn progress_message(progress: &TransferProgress) -> String {
    format!(
        "{:.1} MiB/s, {} files left{}",
        progress.current_speed_mbps,
        progress.remaining_files,
        progress
            .current_file
            .as_deref()
            .map(|f| format!(" - {f}"))
            .unwrap_or_default()
    )
}

fn print_report(report: &VerificationReport) {
    println!("📊 Verification:");
    println!("   Files checked: {}", report.total);
    println!("   Files failed: {}", report.failed_count());
    for failure in &report.failed {
        eprintln!("   ⚠️  {:?}: {:?}", failure.relative_path, failure.reason);
    }
}

/// Renders pipeline events on one progress bar.
struct CliListener {
    pb: ProgressBar,
    bytes: ProgressStyle,
    verify: ProgressStyle,
}

impl CliListener {
    fn new() -> anyhow::Result<Self> {
        let pb = ProgressBar::hidden();
        Ok(Self {
            pb,
            bytes: bytes_style()?,
            verify: verify_style()?,
        })
    }
}

impl PipelineListener for CliListener {
    fn on_progress(&self, progress: &TransferProgress) {
        self.pb.set_length(progress.total_bytes);
        self.pb.set_position(progress.bytes_copied);
        self.pb.set_message(progress_message(progress));
    }

    fn on_verification(&self, percent: u32) {
        self.pb.set_position(u64::from(percent));
    }

    fn on_state_changed(&self, state: PipelineState, error: Option<&PipelineError>) {
        match state {
            PipelineState::Transferring => {
                self.pb.reset();
                self.pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                self.pb.set_style(self.bytes.clone());
                self.pb.set_message("Copying...");
            }
            PipelineState::Verifying => {
                self.pb.reset();
                self.pb.set_style(self.verify.clone());
                self.pb.set_length(100);
                self.pb.set_message("Verifying...");
            }
            PipelineState::Done => self.pb.finish_with_message("✅ Transfer complete!"),
            PipelineState::Failed => {
                let reason = error.map(|e| e.to_string()).unwrap_or_default();
                self.pb.abandon_with_message(format!("❌ Failed: {reason}"));
            }
            PipelineState::Watching => println!("👀 Watching for a new folder..."),
            PipelineState::PendingStability => println!("⏳ New folder found, waiting for it to settle..."),
            PipelineState::Idle => {}
        }
    }
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling...");
            token.cancel();
        }
    });
}

async fn run_once(config: &AppConfig) -> anyhow::Result<()> {
    let (source, target) = config.endpoints();
    println!("🚀 Copying {source:?} -> {target:?}");

    let plan = config.pipeline.enumerator().plan(source, target)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let pb = ProgressBar::new(plan.total_bytes);
    pb.set_style(bytes_style()?);

    let engine = TransferEngine::new();
    match engine
        .transfer(
            &plan,
            |progress| {
                pb.set_position(progress.bytes_copied);
                pb.set_message(progress_message(&progress));
            },
            &cancel,
        )
        .await
    {
        Ok(summary) => {
            pb.finish_with_message("✅ Copy complete!");
            println!("   Files copied: {}", summary.files_copied);
            println!("   Bytes copied: {} MB", summary.bytes_copied / 1_048_576);
        }
        Err(e) => {
            pb.abandon_with_message("❌ Copy failed!");
            return Err(e.into());
        }
    }

    let pb = ProgressBar::new(100);
    pb.set_style(verify_style()?);
    let report = IntegrityVerifier::new()
        .verify(&plan, |percent| pb.set_position(u64::from(percent)))
        .await?;
    pb.finish_and_clear();
    print_report(&report);

    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_verify_only(config: &AppConfig) -> anyhow::Result<()> {
    let (source, target) = config.endpoints();
    println!("🔍 Comparing {source:?} with {target:?}");

    let pb = ProgressBar::new(100);
    pb.set_style(verify_style()?);
    let report = IntegrityVerifier::new()
        .verify_roots(source, target, &config.pipeline.enumerator(), |percent| {
            pb.set_position(u64::from(percent))
        })
        .await?;
    pb.finish_and_clear();
    print_report(&report);

    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_watch(config: &AppConfig) -> anyhow::Result<()> {
    let listener = Arc::new(CliListener::new()?);
    let activity = Arc::new(LogManager::default());
    let process = CommandProcessController::new(
        config.pipeline.stop_command.clone(),
        config.pipeline.resume_command.clone(),
    );

    let (runtime, handle) = PipelineRuntime::with_notify(config, process, listener, activity.clone())?;

    let signals = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signals.cancel_transfer();
            signals.shutdown();
        }
    });

    println!("   Watched: {:?}", config.source_root);
    println!("   Destination: {:?}", config.destination_root);
    handle.start_monitoring();

    let orchestrator = runtime.run().await;
    if let Some(report) = orchestrator.last_report() {
        print_report(report);
    }
    if let Some(e) = orchestrator.last_error() {
        eprintln!("❌ Last run failed: {e}");
    }
    println!("📝 {} activity entries recorded", activity.get_logs(None).len());
    Ok(())
}

fn apply_overrides(cli: &Cli, config: &mut AppConfig) {
    if let Some(source) = &cli.source {
        config.source_root = source.clone();
    }
    if let Some(target) = &cli.target {
        config.destination_root = target.clone();
    }
    if let Some(secs) = cli.debounce_secs {
        config.pipeline.debounce_secs = secs;
    }
    if cli.include_hidden {
        config.pipeline.hidden_policy = HiddenEntryPolicy::Include;
    }
    if cli.seed_watched {
        config.pipeline.direction = TransferDirection::DestinationToWatched;
    }
    if let Some(cmd) = cli.stop_cmd.as_deref() {
        config.pipeline.stop_command = split_command(cmd);
    }
    if let Some(cmd) = cli.resume_cmd.as_deref() {
        config.pipeline.resume_command = split_command(cmd);
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    Ok(match path {
        Some(path) => AppConfig::load_or_default(path)?,
        None => AppConfig::default(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = load_config(cli.config.as_deref())?;
    apply_overrides(&cli, &mut config);

    if config.source_root.as_os_str().is_empty() {
        anyhow::bail!("Missing required argument: --source");
    }
    if config.destination_root.as_os_str().is_empty() {
        anyhow::bail!("Missing required argument: --target");
    }
    config.validate()?;

    if cli.save_config {
        let path = cli
            .config
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--save-config requires --config"))?;
        config.save(path)?;
        println!("💾 Settings saved to {path:?}");
    }

    if cli.verify_only {
        run_verify_only(&config).await
    } else if cli.once {
        run_once(&config).await
    } else {
        run_watch(&config).await
    }
}
