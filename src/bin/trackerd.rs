//! trackerd - local object/face tracking daemon
//!
//! This daemon:
//! 1. Loads the shared detection model (or the stub backend)
//! 2. Serves the tracking HTTP API on a local port
//! 3. Holds the face-vs-object tracking mode for the process lifetime

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use tracker_kernel::{
    api::{ApiConfig, ApiServer, AppState},
    config::TrackerdConfig,
    detect::{backend_factory, Detector},
    track::{AliasTable, TrackingState},
};

#[derive(Parser, Debug)]
#[command(name = "trackerd", about = "Local object/face tracking service")]
struct Args {
    /// JSON config file.
    #[arg(long, env = "TRACKER_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (overrides config).
    #[arg(long)]
    addr: Option<String>,

    /// ONNX model path, or "stub" to run without a model (overrides config).
    #[arg(long)]
    model: Option<String>,

    /// Refuse to start when the model cannot be loaded.
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = TrackerdConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        cfg.addr = addr;
    }
    if let Some(model) = args.model {
        cfg.model_path = model;
    }
    if args.strict {
        cfg.strict = true;
    }

    let aliases = match &cfg.alias_path {
        Some(path) => AliasTable::with_overlay_file(path)?,
        None => AliasTable::builtin(),
    };

    let detector = Detector::new(
        backend_factory(&cfg),
        cfg.confidence_threshold,
        cfg.inference_timeout,
    );
    log::info!("loading detection model: {}", cfg.model_path);
    if let Err(err) = detector.ensure_loaded() {
        if cfg.strict {
            return Err(anyhow!("strict mode: {}", err));
        }
        log::warn!("starting without a working detector: {}", err);
    }

    let state = Arc::new(AppState {
        detector,
        aliases,
        tracking: TrackingState::new(),
    });

    let api_config = ApiConfig {
        addr: cfg.addr.clone(),
    };
    let api_handle = ApiServer::new(api_config, state).spawn()?;
    log::info!("tracking api listening on {}", api_handle.addr);
    log::info!("endpoints:");
    log::info!("  GET  /health        - service status");
    log::info!("  GET  /classes       - detectable classes");
    log::info!("  POST /detect        - detect all objects");
    log::info!("  POST /track/face    - face position");
    log::info!("  POST /track/object  - position of a named object");
    log::info!("  POST /track/set     - set the tracked object");
    log::info!("  POST /track/clear   - clear tracking (back to face)");
    log::info!("  POST /track/auto    - face or tracked object, per mode");

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("trackerd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
