//! Presence Gate - Main Entry Point

use anyhow::Context;
use camera_capture::{FrameSource, ImageSequenceSource, MockCamera};
use clap::Parser;
use gate_protocol::{connect_or_detach, LinkChannel, SerialLink};
use gatekeeper::{
    console, init_logging, operator, GateConfig, GateError, MainLoop, OperatorHandle,
    SessionController,
};
use presence::{Classifier, FrameVerdict, MockClassifier};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "gatekeeper", version, about = "Presence-gated door controller")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "GATE_CONFIG")]
    config: Option<PathBuf>,

    /// Mock camera and classifier; device lines are read from stdin and
    /// verdicts written to stdout
    #[arg(long)]
    simulate: bool,

    /// Directory of still images to use as the camera
    #[arg(long, conflicts_with = "simulate")]
    frames: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    info!("=== Presence Gate v{} ===", env!("CARGO_PKG_VERSION"));

    let mut config = GateConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = &cli.frames {
        config.camera.device = dir.to_string_lossy().into_owned();
    }

    let (handle, inbox) = operator::channel();
    spawn_ctrl_c(handle.clone());

    let camera: Box<dyn FrameSource>;
    let classifier: Box<dyn Classifier>;
    let link: Box<dyn LinkChannel>;

    if cli.simulate {
        info!("Simulation mode: type TRIGGER / UNLOCKED on stdin");
        camera = Box::new(MockCamera::new());
        classifier = Box::new(MockClassifier::new().then_repeat(FrameVerdict::Human));
        link = Box::new(SerialLink::from_lines(
            "stdin",
            console::stdin_lines().context("reading stdin")?,
            tokio::io::stdout(),
        ));
    } else {
        spawn_stdin_abort(handle, console::stdin_lines().context("reading stdin")?);
        camera = Box::new(ImageSequenceSource::new());
        classifier = load_classifier(&config)?;
        link = connect_or_detach(
            &config.link.device,
            config.link.baud_rate,
            config.link.settle(),
        )
        .await;
    }

    let controller = SessionController::new(camera, classifier, &config);
    let mut main_loop = MainLoop::new(controller, link, inbox, &config.session);
    main_loop.run().await;

    Ok(())
}

#[cfg(feature = "onnx")]
fn load_classifier(config: &GateConfig) -> Result<Box<dyn Classifier>, GateError> {
    info!("[INFO] Loading detection model...");
    let classifier = presence::OnnxClassifier::new(&config.presence)?;
    Ok(Box::new(classifier))
}

#[cfg(not(feature = "onnx"))]
fn load_classifier(_config: &GateConfig) -> Result<Box<dyn Classifier>, GateError> {
    Err(GateError::Config(
        "built without the `onnx` feature; rebuild with it or run with --simulate".into(),
    ))
}

/// Ctrl+C stops the process after cleanup
fn spawn_ctrl_c(handle: OperatorHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => handle.shutdown(),
            Err(e) => warn!("Unable to listen for Ctrl+C: {}", e),
        }
    });
}

/// A `q` line on stdin aborts the running session
fn spawn_stdin_abort(handle: OperatorHandle, mut lines: mpsc::Receiver<String>) {
    tokio::spawn(async move {
        while let Some(line) = lines.recv().await {
            if line.trim() == "q" {
                handle.abort_session();
            }
        }
    });
}
