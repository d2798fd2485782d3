use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use stroke_sync::{FrameInput, Session, SessionConfig, SessionRole, SyncError};

mod config;
mod script;

use crate::config::FileConfig;
use crate::script::ScriptStep;

#[derive(Parser)]
#[command(name = "picto")]
#[command(about = "Two-person shared whiteboard, headless")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./picto.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a room and wait for someone to join
    Host(HostArgs),

    /// Join a room hosted elsewhere
    Join(JoinArgs),
}

#[derive(Parser)]
struct HostArgs {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Pointer script replayed one line per frame
    #[arg(long)]
    script: Option<PathBuf>,
}

#[derive(Parser)]
struct JoinArgs {
    /// Address of the hosting machine
    #[arg(long)]
    host: Option<String>,

    /// Port the room listens on
    #[arg(short, long)]
    port: Option<u16>,

    /// Pointer script replayed one line per frame
    #[arg(long)]
    script: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Some(path) = &cli.config {
        if !path.exists() {
            bail!("Config file {} does not exist", path.display());
        }
    }
    let file_config: FileConfig = config::load_config(cli.config.as_deref())
        .extract()
        .context("Invalid configuration")?;

    let mut session_config = config::session_from_file(&file_config);
    let frame_period = file_config.canvas.frame_period();

    match cli.command {
        Commands::Host(args) => {
            if let Some(port) = args.port {
                session_config.host.bind_addr.set_port(port);
            }
            run(SessionRole::Host, session_config, frame_period, args.script).await
        }
        Commands::Join(args) => {
            if let Some(host) = args.host {
                session_config.client.host = host;
            }
            if let Some(port) = args.port {
                session_config.client.port = port;
            }
            run(SessionRole::Joiner, session_config, frame_period, args.script).await
        }
    }
}

fn init_logging(debug: bool) {
    let default_directive = if debug {
        "picto=debug,stroke_sync=debug,tower_http=debug,info"
    } else {
        "picto=info,stroke_sync=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

async fn run(
    role: SessionRole,
    config: SessionConfig,
    frame_period: Duration,
    script: Option<PathBuf>,
) -> Result<()> {
    let steps = match script {
        Some(path) => script::load(&path)?,
        None => Vec::new(),
    };

    let mut session = Session::new(role, config);
    match session.enter().await {
        Ok(()) => {}
        Err(e @ SyncError::ConnectionUnavailable { .. }) if role == SessionRole::Joiner => {
            warn!("could not join room, drawing offline: {}", e);
        }
        Err(e) => return Err(e).context("Failed to open room"),
    }

    if let Some(addr) = session.host().and_then(|host| host.local_addr()) {
        info!(%addr, "room open, waiting for a peer to join");
    }
    if let Some(label) = session.host_label() {
        info!(host = %label, "in room");
    }

    let mut frames = tokio::time::interval(frame_period);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut report = tokio::time::interval(Duration::from_secs(1));
    report.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut steps = steps.into_iter();
    let mut input = FrameInput::default();

    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);
    let mut signal_armed = true;

    loop {
        tokio::select! {
            res = &mut shutdown_signal, if signal_armed => {
                signal_armed = false;
                match res {
                    Ok(()) => {
                        info!("Received shutdown signal, leaving room...");
                        break;
                    }
                    Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
                }
            }
            _ = frames.tick() => {
                match steps.next() {
                    Some(ScriptStep::Pointer(next)) => input = next,
                    Some(ScriptStep::Clear) => {
                        session.clear();
                        input.primary_down = false;
                    }
                    // Script finished: keep the pointer where it is, released.
                    None => input.primary_down = false,
                }
                session.frame(input);
            }
            _ = report.tick() => {
                info!(
                    points = session.drawing().len(),
                    phase = ?session.phase(),
                    connected = session.is_connected(),
                    "canvas"
                );
            }
        }
    }

    session.leave().await;
    info!("Left room");
    Ok(())
}
