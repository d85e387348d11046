//! Serial MIDI Bridge
//!
//! Relays 3-byte MIDI messages from an Arduino pedalboard on a serial port to
//! a (virtual) MIDI output port.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use serial_midi_bridge::activity::run_activity_log;
use serial_midi_bridge::bridge::{BridgeActor, BridgeHandle, BridgeSettings};
use serial_midi_bridge::cli::{self, PortOverrides};
use serial_midi_bridge::config::{AppConfig, ConfigWatcher};
use serial_midi_bridge::discovery;
use serial_midi_bridge::ports::SystemPorts;

/// Serial MIDI Bridge - forward pedalboard MIDI from a serial port to a MIDI output
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List serial ports and MIDI outputs, then exit
    #[arg(long)]
    list_ports: bool,

    /// Serial device to read from (overrides config and auto-selection)
    #[arg(short, long)]
    serial: Option<String>,

    /// MIDI output name or substring (overrides config and auto-selection)
    #[arg(short, long)]
    midi: Option<String>,

    /// Serial baud rate (overrides config)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Start immediately and run until Ctrl+C, without the prompt
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = AppConfig::load_or_default(&args.config).await?;
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
        config.validate()?;
    }

    // Keep the guard alive so the file log is flushed on exit
    let _log_guard = init_logging(&args.log_level, config.logging.file.as_deref())?;

    info!("Starting Serial MIDI Bridge v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    if args.list_ports {
        discovery::print_ports(&config.serial.auto_select, &config.midi.auto_select);
        return Ok(());
    }

    let (bridge, events) =
        BridgeActor::spawn(Arc::new(SystemPorts), BridgeSettings::from(&config));

    let (frame_log_tx, frame_log_rx) = watch::channel(config.logging.frame_log_every);
    let activity = tokio::spawn(run_activity_log(events, frame_log_rx));

    // Hot reload only makes sense for a file that exists
    let config_watcher = if Path::new(&args.config).exists() {
        match ConfigWatcher::new(args.config.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Config hot-reload disabled: {:#}", e);
                None
            }
        }
    } else {
        info!("No config file found, using defaults");
        None
    };

    let (config_tx, config_rx) = watch::channel(config);
    let overrides = PortOverrides {
        serial: args.serial,
        midi: args.midi,
    };

    let reload = ReloadTargets {
        bridge: bridge.clone(),
        config_tx,
        frame_log_tx,
        baud_override: args.baud,
    };

    let outcome = if args.headless {
        run_headless(&bridge, config_rx, overrides, config_watcher, reload).await
    } else {
        run_interactive(&bridge, config_rx, overrides, config_watcher, reload).await
    };

    info!("Shutting down...");
    bridge.shutdown().await;
    // The activity log ends once the actor drops its event sender
    let _ = activity.await;

    outcome?;
    info!("Serial MIDI Bridge shutdown complete");
    Ok(())
}

/// Everything a config reload has to reach
struct ReloadTargets {
    bridge: BridgeHandle,
    config_tx: watch::Sender<AppConfig>,
    frame_log_tx: watch::Sender<u64>,
    baud_override: Option<u32>,
}

impl ReloadTargets {
    fn apply(&self, mut new_config: AppConfig) {
        info!("📝 Configuration file changed, reloading...");
        if let Some(baud) = self.baud_override {
            new_config.serial.baud_rate = baud;
        }

        self.bridge
            .update_settings(BridgeSettings::from(&new_config));
        self.frame_log_tx
            .send_replace(new_config.logging.frame_log_every);
        self.config_tx.send_replace(new_config);

        if self.bridge.run_state().is_running() {
            info!("✅ Configuration reloaded; port and timing changes apply at the next start");
        } else {
            info!("✅ Configuration reloaded");
        }
    }
}

async fn next_reload(watcher: &mut Option<ConfigWatcher>) -> Option<AppConfig> {
    match watcher {
        Some(watcher) => watcher.next_config().await,
        None => std::future::pending().await,
    }
}

async fn run_headless(
    bridge: &BridgeHandle,
    config: watch::Receiver<AppConfig>,
    overrides: PortOverrides,
    mut config_watcher: Option<ConfigWatcher>,
    reload: ReloadTargets,
) -> Result<()> {
    let (serial, midi) = {
        let config = config.borrow();
        discovery::resolve_ports(overrides.serial.as_deref(), overrides.midi.as_deref(), &config)
    };

    bridge
        .start(serial, midi)
        .await
        .context("Bridge did not start")?;

    info!("Press Ctrl+C to stop");
    let stopped = bridge.wait_stopped();
    tokio::pin!(stopped);

    loop {
        tokio::select! {
            Some(new_config) = next_reload(&mut config_watcher) => reload.apply(new_config),

            // Nothing restarts the bridge in headless mode, so any stop ends the process
            outcome = &mut stopped => {
                outcome.context("Bridge stopped")?;
                anyhow::bail!("Bridge stopped unexpectedly");
            }

            _ = shutdown_signal() => return Ok(()),
        }
    }
}

async fn run_interactive(
    bridge: &BridgeHandle,
    config: watch::Receiver<AppConfig>,
    overrides: PortOverrides,
    mut config_watcher: Option<ConfigWatcher>,
    reload: ReloadTargets,
) -> Result<()> {
    // A plain thread rather than spawn_blocking: the runtime must not wait on
    // a prompt stuck in readline when Ctrl+C arrives
    let (done_tx, mut done_rx) = oneshot::channel();
    let runtime = tokio::runtime::Handle::current();
    let repl_bridge = bridge.clone();
    std::thread::Builder::new()
        .name("repl".to_string())
        .spawn(move || {
            let result = cli::run_repl(runtime, repl_bridge, config, overrides);
            let _ = done_tx.send(result);
        })
        .context("Failed to start the prompt")?;

    loop {
        tokio::select! {
            result = &mut done_rx => {
                if let Ok(Err(e)) = result {
                    warn!("Prompt failed: {:#}", e);
                }
                break;
            }

            Some(new_config) = next_reload(&mut config_watcher) => reload.apply(new_config),

            _ = shutdown_signal() => break,
        }
    }

    Ok(())
}

fn init_logging(level: &str, file: Option<&str>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match file {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", file))?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
