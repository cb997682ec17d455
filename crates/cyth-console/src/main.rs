use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cyth_runtime::{ExecutionHost, HostError, HostEvent, LogKind, SandboxConfig};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "cyth", about = "Run compiled Cyth programs in the sandbox")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ~/.cyth/config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a wasm artifact headless, printing its console output
    Run {
        /// Compiled artifact
        artifact: PathBuf,

        /// Debug descriptor (`.map.json`) emitted alongside the artifact
        #[arg(long)]
        debug: Option<PathBuf>,

        /// Stop an animated program after this many frame ticks
        #[arg(long)]
        frames: Option<u64>,
    },
}

/// How a headless run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Stopped,
    Terminated,
    Crashed,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Run {
            artifact,
            debug,
            frames,
        } => run(config, &artifact, debug.as_deref(), frames).await,
    }
}

fn init_logging(json: bool) {
    // Logs go to stderr so program output on stdout stays clean
    let builder = fmt()
        .with_env_filter(EnvFilter::from_env("CYTH_LOG"))
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> Result<SandboxConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let default = SandboxConfig::default_path();
            if !default.exists() {
                return Ok(SandboxConfig::default());
            }
            default
        }
    };

    tracing::debug!(path = %path.display(), "Loading config");
    SandboxConfig::from_file(&path)
        .with_context(|| format!("loading config from {}", path.display()))
}

async fn run(
    config: SandboxConfig,
    artifact_path: &Path,
    debug_path: Option<&Path>,
    frames: Option<u64>,
) -> Result<ExitCode> {
    let artifact = std::fs::read(artifact_path)
        .with_context(|| format!("reading artifact {}", artifact_path.display()))?;
    let debug = debug_path
        .map(|path| {
            std::fs::read(path).with_context(|| format!("reading debug descriptor {}", path.display()))
        })
        .transpose()?;

    let has_debug = debug.is_some();
    tracing::info!(
        artifact = %artifact_path.display(),
        bytes = artifact.len(),
        has_debug,
        "Starting run"
    );

    let mut host = ExecutionHost::new(config)?;
    match host.upload(artifact, debug) {
        Ok(()) => {}
        Err(HostError::CompileFailure | HostError::Runtime(_)) => {
            print_errors(&host);
            println!("{}", host.status_line());
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    }

    let outcome = drive(&mut host, frames).await?;
    if outcome == Outcome::Terminated {
        for notice in host.log().of_kind(LogKind::Notice) {
            eprintln!("{notice}");
        }
    }
    println!("{}", host.status_line());

    Ok(match outcome {
        Outcome::Crashed => ExitCode::FAILURE,
        Outcome::Stopped | Outcome::Terminated => ExitCode::SUCCESS,
    })
}

/// Relay events and tick the animation clock until the run ends.
async fn drive(host: &mut ExecutionHost, max_ticks: Option<u64>) -> Result<Outcome> {
    let interval = Duration::from_millis(host.config().host.frame_interval_ms.max(1));
    let mut clock = tokio::time::interval(interval);
    clock.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let started = Instant::now();
    let mut ticks = 0u64;

    loop {
        tokio::select! {
            event = host.next_event() => match event {
                Some(HostEvent::Output(line)) => println!("{line}"),
                Some(HostEvent::Stopped { .. }) | None => return Ok(Outcome::Stopped),
                Some(HostEvent::Crashed { message, .. }) => {
                    eprintln!("{}", message.trim_end());
                    return Ok(Outcome::Crashed);
                }
            },
            _ = clock.tick() => {
                if max_ticks.is_some_and(|max| ticks >= max) {
                    tracing::info!(ticks, "Frame limit reached, stopping");
                    host.request_stop()?;
                    return Ok(Outcome::Terminated);
                }
                ticks += 1;
                host.animation_frame(started.elapsed().as_secs_f64() * 1000.0);
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping");
                host.request_stop()?;
                return Ok(Outcome::Terminated);
            }
        }
    }
}

fn print_errors(host: &ExecutionHost) {
    for error in host.log().of_kind(LogKind::Error) {
        eprintln!("{}", error.trim_end());
    }
}
