use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use namhost::audio::manager::Manager;
use namhost::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "namhost")]
#[command(version = "0.1")]
#[command(about = "A JACK host for neural amp models with cabinet IR convolution.")]
struct Args {
    /// Neural amp model file (.nam) to load on startup
    #[arg(long)]
    model: Option<PathBuf>,

    /// Cabinet impulse response WAV to load on startup
    #[arg(long)]
    ir: Option<PathBuf>,

    /// JACK capture port to connect the input to
    #[arg(long, env = "NAMHOST_INPUT_PORT")]
    input_port: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut settings = Settings::load()?;
    if let Some(port) = args.input_port {
        settings.audio.input_port = port;
    }
    settings.apply_to_environment();
    info!("{settings}");

    let mut manager = Manager::new(settings)?;

    match (&args.model, &args.ir) {
        (None, None) => manager.restore_session(),
        (model, ir) => {
            if let Some(path) = model {
                if let Err(e) = manager.load_model(path) {
                    warn!("Failed to load model {}: {e}", path.display());
                }
            }
            if let Some(path) = ir {
                if let Err(e) = manager.load_ir(path) {
                    warn!("Failed to load IR {}: {e}", path.display());
                }
            }
        }
    }

    info!(
        "namhost running at {} Hz, {} frames",
        manager.sample_rate(),
        manager.buffer_size()
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);

    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_secs(1));
    }

    Ok(())
}
