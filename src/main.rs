use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mocap_relay::config::{CaptureMode, Config};
use mocap_relay::qtm::QtmConnector;
use mocap_relay::session::{Session, SessionSettings};
use mocap_relay::sink::{LogSink, OscSink, PoseSink};

const CONFIG_PATH: &str = "mocap-relay.toml";

/// Streams 6DoF poses from a QTM server to the vehicle pose consumer.
#[derive(Debug, Parser)]
#[command(version = env!("RELAY_BUILD_VERSION"))]
struct Args {
    /// Config file (defaults are used if it does not exist)
    #[arg(short, long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Tracking server host
    #[arg(long)]
    host: Option<String>,

    /// Body to forward, or "all"
    #[arg(short, long)]
    target: Option<String>,

    /// Replay a recorded measurement instead of live capture
    #[arg(long, conflicts_with = "live")]
    replay: Option<String>,

    /// Force live capture
    #[arg(long)]
    live: bool,

    /// Stop after N seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Max frames per second (0 = every frame)
    #[arg(short, long)]
    frequency: Option<u32>,

    /// Log poses instead of sending them
    #[arg(long)]
    no_sink: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(host) = &args.host {
        config.source.host = host.clone();
    }
    if let Some(target) = &args.target {
        config.stream.target = target.clone();
    }
    if let Some(file) = &args.replay {
        config.source.mode = CaptureMode::Replay { file: file.clone() };
    }
    if args.live {
        config.source.mode = CaptureMode::Live;
    }
    if let Some(d) = args.duration {
        config.stream.duration_secs = Some(d);
    }
    if let Some(hz) = args.frequency {
        config.stream.max_frequency = hz;
    }
    if args.no_sink {
        config.sink.enabled = false;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    tracing::info!("mocap-relay {}", env!("RELAY_BUILD_VERSION"));

    let mut config = Config::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    tracing::info!("source: {} ({:?})", config.source.addr(), config.source.mode);
    tracing::info!(
        "target: {}, max frequency: {}, duration: {}",
        config.stream.target,
        config.stream.max_frequency,
        config
            .stream
            .duration_secs
            .map(|d| format!("{}s", d))
            .unwrap_or_else(|| "until stopped".to_string())
    );

    let sink: Box<dyn PoseSink> = if config.sink.enabled {
        tracing::info!("consumer: osc://{}", config.sink.addr);
        Box::new(OscSink::new(&config.sink.addr)?)
    } else {
        Box::new(LogSink)
    };

    let settings = SessionSettings::from_config(&config)?;
    if !settings.transform.is_identity() {
        tracing::info!("position transform: {:?}", config.transform);
    }

    let connector = QtmConnector::new(config.source.addr(), config.source.command_timeout()?);
    let mut session = Session::new(connector, sink, settings);

    let stop = CancellationToken::new();
    let ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, stopping after the current frame");
            ctrl_c.cancel();
        }
    });

    let summary = session.run(stop).await?;
    tracing::info!(
        "done ({}): {}/{} frames delivered, last frame {:?}",
        summary.stop_reason,
        summary.frames_delivered,
        summary.frames_received,
        summary.last_frame_number
    );
    Ok(())
}
