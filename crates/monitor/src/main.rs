//! Driver Monitor - Main Entry Point

use anyhow::{anyhow, Context};
use api::{AppState, StatusHub};
use clap::Parser;
use emergency::EmergencyEngine;
use event_log::{DriverEvent, EventSink, FileEventLog};
use metrics_exporter_prometheus::PrometheusBuilder;
use monitor::config::DEFAULT_CONFIG_FILE;
use monitor::{
    init_logging, ConfigLoader, FrameLoop, InputSource, KeyboardInput, LoopParts, RemoteAckInput,
    StopReason,
};
use notify::{LastFix, SmsReporter};
use sensors::{
    open_speaker, AccelConfig, AccelSource, Clock, GpsService, GpsSource, LastKnownAccel,
    RecordedDrive, SimulatedGps, SystemClock,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Driver drowsiness and emergency escalation monitor
#[derive(Debug, Parser)]
#[command(name = "driver-monitor", version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Observation stream from the landmark pipeline (JSON lines, file or FIFO)
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Also take accelerometer and GPS values from the recording
    #[arg(long)]
    replay: bool,

    /// Use the simulated GPS receiver
    #[arg(long)]
    simulate_gps: bool,

    /// Do not start the status server
    #[arg(long)]
    no_server: bool,
}

#[cfg(target_os = "linux")]
fn open_accelerometer(config: &AccelConfig) -> Option<Box<dyn AccelSource>> {
    if !config.enabled {
        return None;
    }
    match sensors::adxl345::Adxl345::open(config) {
        Ok(device) => Some(Box::new(device)),
        Err(e) => {
            warn!("Accelerometer unavailable: {}", e);
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn open_accelerometer(_config: &AccelConfig) -> Option<Box<dyn AccelSource>> {
    None
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loader = ConfigLoader::load(Some(&cli.config)).context("failed to load configuration")?;
    let config = loader.current().clone();
    init_logging(&config.logging).map_err(|e| anyhow!("failed to install log subscriber: {e}"))?;

    info!("=== Driver Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("driver-monitor-io")
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    let frames_path = cli
        .frames
        .clone()
        .or_else(|| config.frame_loop.frames_path.clone())
        .context("no frame source: pass --frames or set frame_loop.frames_path")?;
    let pace = cli.replay.then(|| config.frame_loop.replay_interval());
    let drive = RecordedDrive::open(&frames_path, pace)
        .with_context(|| format!("failed to open {}", frames_path.display()))?;

    let log = Arc::new(
        FileEventLog::open(&config.frame_loop.event_log_path).context("failed to open event log")?,
    );
    let hub = StatusHub::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let stop = Arc::new(AtomicBool::new(false));
    let last_fix = LastFix::new();

    // Sensors
    let accel_source: Option<Box<dyn AccelSource>> = if cli.replay {
        Some(Box::new(drive.accel_source()))
    } else {
        open_accelerometer(&config.accel)
    };

    let mut gps_service = None;
    let gps: Option<Box<dyn GpsSource>> = if cli.replay {
        Some(Box::new(drive.gps_source()))
    } else if cli.simulate_gps || config.gps.simulate {
        Some(Box::new(SimulatedGps::default()))
    } else if config.gps.enabled {
        match GpsService::spawn(runtime.handle(), &config.gps) {
            Ok(service) => {
                let receiver = service.receiver();
                gps_service = Some(service);
                Some(Box::new(receiver))
            }
            Err(e) => {
                warn!("GPS unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    let dispatcher = SmsReporter::from_config(&config.sms, &config.location, last_fix.clone());
    let emergency = EmergencyEngine::new(Box::new(dispatcher), log.clone());

    let inputs: Vec<Box<dyn InputSource>> = vec![
        Box::new(KeyboardInput::spawn(Arc::clone(&stop))),
        Box::new(RemoteAckInput::new(hub.clone())),
    ];

    // Status server
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = if config.server.enabled && !cli.no_server {
        let state = Arc::new(AppState::new(hub.clone(), metrics));
        let addr = config.server.addr.clone();
        Some(runtime.spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = api::serve(&addr, state, shutdown).await {
                error!("Status server stopped: {}", e);
            }
        }))
    } else {
        info!("Status server disabled");
        None
    };

    runtime.spawn({
        let stop = Arc::clone(&stop);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
                stop.store(true, Ordering::SeqCst);
            }
        }
    });

    log.record(clock.now(), &DriverEvent::ProgramStart);
    info!("Press Enter to acknowledge an emergency alert, q + Enter to quit");

    let parts = LoopParts {
        frames: Box::new(drive),
        accel: LastKnownAccel::new(accel_source),
        gps,
        speaker: open_speaker(&config.speaker),
        inputs,
        clock,
        log,
        hub,
        last_fix,
        emergency,
    };
    let mut frame_loop = FrameLoop::new(parts, loader, stop);
    let reason = frame_loop.run();
    drop(frame_loop);

    let _ = shutdown_tx.send(());
    if let Some(server) = server {
        let _ = runtime.block_on(async { tokio::time::timeout(Duration::from_secs(2), server).await });
    }
    drop(gps_service);
    runtime.shutdown_timeout(Duration::from_secs(1));

    match reason {
        StopReason::CameraFailure => Err(anyhow!("stopped after repeated camera failures")),
        StopReason::EndOfStream | StopReason::Requested => Ok(()),
    }
}
