//! Headless entry point: wires a mock detector and the default correction
//! pipeline together and exercises `request_integration` end-to-end.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mimalloc::MiMalloc;

use xray_acquire::beam::mock::MockBeamSupply;
use xray_acquire::beam::BeamSupply;
use xray_acquire::config::{self, ConfigStore};
use xray_acquire::detector::mock::MockDetector;
use xray_acquire::detector::DetectorDriver;
use xray_acquire::{default_stages, AcquisitionController, FrameStore, Pipeline};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "xray_acquire", about = "X-ray acquisition core demo CLI")]
struct Args {
    /// Application data root (config.json, darks/, flats/, ...). Defaults to
    /// the platform's local data directory if omitted.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Number of frames to integrate in the demo capture.
    #[arg(long, default_value_t = 4)]
    frames: usize,

    /// Simulated per-frame exposure, in seconds.
    #[arg(long, default_value_t = 0.05)]
    exposure_seconds: f64,

    /// Simulate a beam supply requiring an on/ready handshake before capture.
    #[arg(long)]
    with_beam: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level)).init();

    let data_dir = args.data_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("xray-acquire")
    });

    let app_config = config::load(data_dir.join("config.json"))?;
    let config_store = ConfigStore::new(&data_dir, app_config);

    let frame_store = Arc::new(FrameStore::new());
    let pipeline = Arc::new(Pipeline::new(default_stages())?);
    let detector: Arc<dyn DetectorDriver> = Arc::new(MockDetector::new(1024, 1024));
    let beam: Option<Arc<dyn BeamSupply>> = if args.with_beam {
        Some(Arc::new(MockBeamSupply::new(true)))
    } else {
        None
    };
    detector.open()?;

    let controller = AcquisitionController::new(frame_store, pipeline, detector, beam);
    let timeout = Duration::from_secs_f64((args.frames as f64) * (args.exposure_seconds + 5.0));

    log::info!("requesting integration of {} frames", args.frames);
    let (frame, reason) = controller.request_integration(args.frames, args.exposure_seconds, timeout, false);
    match frame {
        Some(frame) => {
            let (w, h) = frame.shape();
            log::info!("captured integrated frame {w}x{h}");
        }
        None => {
            log::warn!("capture failed: {}", reason.map(|r| r.to_string()).unwrap_or_default());
        }
    }

    config_store.flush_if_due(Duration::from_secs(0))?;
    Ok(())
}
