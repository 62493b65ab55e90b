//! CLI entry point for the GenICam bridge
//!
//! # Usage
//!
//! Open the control panel (default):
//! ```bash
//! genicam-bridge gui
//! ```
//!
//! Stream a fixed number of frames without a window and log their statistics:
//! ```bash
//! genicam-bridge headless --frames 100
//! ```
//!
//! Dump the feature tree of the bound device as JSON:
//! ```bash
//! genicam-bridge features
//! ```
//!
//! Show the configuration after file and environment overrides:
//! ```bash
//! genicam-bridge --config config/bridge.toml config
//! ```
//!
//! The device is reached through the simulated GenTL backend.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{error, info, warn};

use genicam_bridge::config::{BridgeConfig, DEFAULT_CONFIG_PATH};
use genicam_bridge::feature::{FeatureValue, Value};
use genicam_bridge::genicam::{SimSystem, ACQUISITION_START};
use genicam_bridge::gui::BridgeApp;
use genicam_bridge::session::{CameraSession, ControlMessage, Mode, SessionTasks};
use genicam_bridge::tracing_setup;

#[derive(Parser)]
#[command(name = "genicam-bridge")]
#[command(about = "Bridge a GenICam camera to a live view and a feature control panel", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the control panel window
    Gui,

    /// Stream frames without a window
    Headless {
        /// Stop after this many frames
        #[arg(long, default_value = "100")]
        frames: u64,
    },

    /// Print the feature tree of the bound device as JSON
    Features,

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BridgeConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.application.log_level = level;
    }
    config.validate()?;
    tracing_setup::init_from_config(&config)?;
    info!(name = %config.application.name, "Starting");

    match cli.command.unwrap_or(Commands::Gui) {
        Commands::Gui => run_gui(&config),
        Commands::Headless { frames } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run_headless(&config, frames))
        }
        Commands::Features => print_features(&config),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn open_session(
    config: &BridgeConfig,
) -> Result<(Arc<CameraSession>, mpsc::UnboundedReceiver<ControlMessage>)> {
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
    let backend = Box::new(SimSystem::with_options(config.sim_options()));
    let session = CameraSession::initialize(config.session_settings(), backend, ctrl_tx)?;
    Ok((Arc::new(session), ctrl_rx))
}

fn run_gui(config: &BridgeConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let (session, ctrl_rx) = open_session(config)?;
    let (edit_tx, edit_rx) = mpsc::unbounded_channel();
    let tasks = {
        let _guard = runtime.enter();
        session.spawn(edit_rx)
    };
    session.publish_specs()?;

    let app = BridgeApp::new(
        Arc::clone(&session),
        ctrl_rx,
        edit_tx,
        config.gui.visibility,
    );
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([config.gui.width, config.gui.height])
            .with_min_inner_size([640.0, 480.0])
            .with_title(&config.application.name),
        ..Default::default()
    };

    // eframe owns the main thread until the window closes.
    let result = eframe::run_native(
        &config.application.name,
        options,
        Box::new(move |_cc| Ok(Box::new(app))),
    );

    if let Err(e) = session.shutdown() {
        warn!(error = %e, "Shutdown reported errors");
    }
    runtime.block_on(join(tasks));
    result.map_err(|e| anyhow!("control panel failed: {e}"))
}

async fn run_headless(config: &BridgeConfig, frames: u64) -> Result<()> {
    let (session, mut ctrl_rx) = open_session(config)?;
    if !session.is_bound() {
        bail!("no device bound; set camera.connect_first_available = true");
    }

    let (edit_tx, edit_rx) = mpsc::unbounded_channel();
    let mut frame_rx = session.subscribe_frames();
    let SessionTasks {
        mut acquisition,
        controls,
    } = session.spawn(edit_rx);
    session.publish_specs()?;

    if session.mode() != Mode::Started {
        let Some(ControlMessage::Specs(specs)) = ctrl_rx.recv().await else {
            bail!("session published no feature tree");
        };
        let start = specs
            .find_by_name(ACQUISITION_START)
            .ok_or_else(|| anyhow!("device has no {ACQUISITION_START} command"))?;
        edit_tx.send(FeatureValue::from_controller(start.id(), Value::Empty))?;
    }

    let mut received = 0;
    let mut finished = None;
    while received < frames {
        tokio::select! {
            frame = frame_rx.recv() => match frame {
                Ok(frame) => {
                    received += 1;
                    info!(
                        sequence = frame.sequence,
                        width = frame.width(),
                        height = frame.height(),
                        format = frame.format,
                        mean = frame.mean(),
                        "Frame"
                    );
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Frames dropped"),
                Err(RecvError::Closed) => break,
            },
            result = &mut acquisition => {
                finished = Some(result);
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }
    info!(received, "Headless run finished");

    session.shutdown()?;
    let acquisition = match finished {
        Some(result) => result,
        None => acquisition.await,
    };
    let controls = controls.await;
    report("acquisition", acquisition);
    report("controls", controls);
    Ok(())
}

fn print_features(config: &BridgeConfig) -> Result<()> {
    let (session, mut ctrl_rx) = open_session(config)?;
    session.publish_specs()?;
    match ctrl_rx.try_recv() {
        Ok(ControlMessage::Specs(specs)) => {
            println!("{}", serde_json::to_string_pretty(&specs)?);
        }
        _ => warn!("No device bound, no features to show"),
    }
    session.shutdown()?;
    Ok(())
}

async fn join(tasks: SessionTasks) {
    report("acquisition", tasks.acquisition.await);
    report("controls", tasks.controls.await);
}

fn report(
    task: &str,
    result: Result<genicam_bridge::BridgeResult<()>, tokio::task::JoinError>,
) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(task, error = %e, "Session task failed"),
        Err(e) => error!(task, error = %e, "Session task panicked"),
    }
}
