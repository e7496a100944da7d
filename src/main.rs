use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use peerview::cameras::{self, CameraSettings};
use peerview::config::{expand_home, AppConfig};
use peerview::engine::Engine;
use peerview::events::{EngineEvent, EventBus};
use peerview::supervisor::ProcessSupervisor;
use peerview::transport::{delivery_channel, UdpTransport};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// peerview command line arguments
#[derive(Parser, Debug)]
#[command(name = "peerview")]
#[command(version, about = "Shows every remote peer through the camera that faces you", long_about = None)]
struct CliArgs {
    /// Info channel port to listen on for sessions
    #[arg(short = 'p', long, value_name = "PORT")]
    info_port: Option<u16>,

    /// Info channel multicast group
    #[arg(short = 'g', long, value_name = "GROUP")]
    info_group: Option<Ipv4Addr>,

    /// Our node id in every session (default: host name)
    #[arg(short = 'u', long, value_name = "ID")]
    user_id: Option<String>,

    /// Camera configuration file (default: ~/.peerview.json)
    #[arg(short = 'c', long, value_name = "FILE")]
    cameras_config: Option<PathBuf>,

    /// Session to join automatically once it is announced
    #[arg(short = 's', long, value_name = "SESSION")]
    scene_id: Option<String>,

    /// Application configuration file (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Keep stale shared video files instead of deleting them at startup
    #[arg(short = 'C', long)]
    keep_shared_memory: bool,

    /// Media pipeline program
    #[arg(long, value_name = "PROGRAM")]
    pipeline_program: Option<String>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose, args.log_json);

    tracing::info!("Starting peerview v{}", env!("CARGO_PKG_VERSION"));

    let config = build_config(&args)?;
    tracing::info!(
        "User {} on info channel osc.udp://{}:{}",
        config.user_id,
        config.info_group,
        config.info_port
    );

    let local = CameraSettings::load(&config.cameras_config)?;

    if config.clear_shared_memory {
        let removed = cameras::clear_shared_memory(&config.shared_memory_dir)?;
        if removed > 0 {
            tracing::info!("Removed {} stale shared memory files", removed);
        }
    }

    let events = EventBus::new();
    tokio::spawn(display_events(events.subscribe()));

    let (delivery_tx, delivery_rx) = delivery_channel();
    let transport = Arc::new(UdpTransport::new(delivery_tx, config.multicast_ttl)?);
    let supervisor = Arc::new(ProcessSupervisor::new(
        config.pipeline_program.clone(),
        local.clone(),
    ));

    let (mut engine, handle) = Engine::new(
        config,
        local,
        transport,
        supervisor,
        events,
        delivery_rx,
    );

    // Without the info channel there is nothing to do
    if let Err(e) = engine.bind_info().await {
        eprintln!("Cannot listen for sessions: {}", e);
        std::process::exit(1);
    }

    let engine_task = tokio::spawn(engine.run());

    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C, shutting down"),
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
        shutdown_handle.shutdown();
    });

    engine_task.await??;
    drop(handle);

    tracing::info!("peerview stopped");
    Ok(())
}

/// Layer CLI flags over the loaded configuration
fn build_config(args: &CliArgs) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load(args.config.as_deref())?;

    if let Some(port) = args.info_port {
        config.info_port = port;
    }
    if let Some(group) = args.info_group {
        config.info_group = group;
    }
    if let Some(user_id) = &args.user_id {
        config.user_id = user_id.clone();
    }
    if let Some(path) = &args.cameras_config {
        config.cameras_config = expand_home(path);
    }
    if let Some(scene_id) = &args.scene_id {
        tracing::info!("Will join session {} when it is announced", scene_id);
        config.default_session = Some(scene_id.clone());
    }
    if args.keep_shared_memory {
        config.clear_shared_memory = false;
    }
    if let Some(program) = &args.pipeline_program {
        config.pipeline_program = program.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Console stand-in for a graphical display
async fn display_events(mut rx: broadcast::Receiver<EngineEvent>) {
    loop {
        match rx.recv().await {
            Ok(EngineEvent::Snapshot { text, .. }) => {
                tracing::debug!("Snapshot:\n{}", text.trim_end());
            }
            Ok(event) => {
                tracing::info!(
                    "[{}] {}",
                    event.event_name(),
                    serde_json::to_string(&event).unwrap_or_default()
                );
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Display lagged, {} events skipped", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn init_logging(level: LogLevel, verbose_count: u8, json: bool) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "peerview=error",
        LogLevel::Warn => "peerview=warn",
        LogLevel::Info => "peerview=info",
        LogLevel::Verbose => "peerview=debug",
        LogLevel::Debug => "peerview=debug",
        LogLevel::Trace => "peerview=trace",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    let result = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };
    if let Err(err) = result {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
