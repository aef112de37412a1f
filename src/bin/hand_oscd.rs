//! hand_oscd - hand gesture to OSC daemon
//!
//! This daemon:
//! 1. Loads configuration (HAND_OSC_CONFIG file, HAND_OSC_* env, flags)
//! 2. Selects a landmark detector backend
//! 3. Starts a capture stream on the configured camera
//! 4. Streams dominant-hand control values to the OSC target
//!
//! With `--console`, stream control commands are read from stdin instead:
//! `start <device>`, `stop`, `status`, `devices`, `quit`.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::BufRead;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use hand_osc::config::{HandOscConfig, DETECTOR_SCRIPTED};
use hand_osc::detect::{BackendRegistry, SubprocessBackend};
use hand_osc::ingest::{list_devices, V4l2Provider};
use hand_osc::{CapturePipeline, ExtractionStrategy, OscSender, StreamManager, StreamState};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Camera to open at startup (`/dev/videoN`, `N`, or `stub://name`).
    #[arg(long, env = "HAND_OSC_DEVICE")]
    device: Option<String>,
    /// OSC listener, `host:port` or `osc.udp://host:port`.
    #[arg(long, env = "HAND_OSC_TARGET")]
    target: Option<String>,
    /// Landmark pair strategy: `fixed_pair` or `max_pair`.
    #[arg(long, env = "HAND_OSC_STRATEGY")]
    strategy: Option<ExtractionStrategy>,
    /// Read stream commands from stdin instead of starting immediately.
    #[arg(long)]
    console: bool,
}

enum Event {
    Shutdown,
    Command(String),
    InputClosed,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = HandOscConfig::load()?;
    if let Some(device) = args.device {
        cfg.camera.device = device;
    }
    if let Some(target) = args.target {
        cfg.osc.target = target;
    }
    if let Some(strategy) = args.strategy {
        cfg.gesture.strategy = strategy;
    }
    cfg.validate()?;

    let mut registry = BackendRegistry::new();
    registry.register(cfg.scripted_backend());
    if let Some(helper) = cfg.subprocess_config() {
        registry.register(SubprocessBackend::spawn(helper)?);
    }
    registry.set_default(&cfg.detector.backend)?;
    if cfg.detector.backend == DETECTOR_SCRIPTED {
        log::warn!("scripted detector selected: control values are synthetic");
    }

    let sender = OscSender::new(&cfg.osc.target)?;
    log::info!("sending OSC to {}", sender.target());
    let pipeline = CapturePipeline::new(
        cfg.pipeline_settings(),
        registry.default_backend()?,
        Arc::new(sender),
    );
    let manager = StreamManager::new(
        Arc::new(V4l2Provider::new(cfg.camera_template())),
        pipeline,
    );
    log::info!(
        "hand_oscd ready: strategy={}, detector={}, calibration={}..{}",
        cfg.gesture.strategy,
        cfg.detector.backend,
        cfg.gesture.calibration.low,
        cfg.gesture.calibration.high
    );

    let (tx, rx) = mpsc::channel();
    let signal_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = signal_tx.send(Event::Shutdown);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    if args.console {
        spawn_console_reader(tx)?;
        println!("commands: start <device> | stop | status | devices | quit");
    } else {
        manager.request_start(&cfg.camera.device)?;
    }

    let result = loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Event::Shutdown) => {
                log::info!("shutdown signal received, stopping stream...");
                break Ok(());
            }
            Ok(Event::InputClosed) => break Ok(()),
            Ok(Event::Command(line)) => {
                if !handle_command(&manager, &line) {
                    break Ok(());
                }
            }
            Err(RecvTimeoutError::Timeout) if !args.console => {
                let status = manager.status();
                if status.state == StreamState::Stopped {
                    break match status.last_error {
                        Some(err) => Err(anyhow!("stream stopped: {}", err)),
                        None => {
                            log::info!(
                                "stream ended after {} frames",
                                status.frames_processed
                            );
                            Ok(())
                        }
                    };
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break Ok(()),
        }
    };

    manager.stop()?;
    result
}

fn spawn_console_reader(tx: Sender<Event>) -> Result<()> {
    std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(Event::Command(line)).is_err() {
                    return;
                }
            }
            let _ = tx.send(Event::InputClosed);
        })?;
    Ok(())
}

/// Returns false when the console asked to quit.
fn handle_command(manager: &StreamManager, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (None, _) => {}
        (Some("start"), Some(device)) => match manager.request_start(device) {
            Ok(()) => println!("loading {}", device),
            Err(err) => println!("error: {}", err),
        },
        (Some("start"), None) => println!("usage: start <device>"),
        (Some("stop"), _) => match manager.stop() {
            Ok(()) => println!("stopped"),
            Err(err) => println!("error: {}", err),
        },
        (Some("status"), _) => {
            let status = manager.status();
            let device = status
                .active_device
                .or(status.requested_device)
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{} device={} frames={} signals={}",
                status.state, device, status.frames_processed, status.signals_emitted
            );
            if let Some(err) = status.last_error {
                println!("last error: {}", err);
            }
        }
        (Some("devices"), _) => match list_devices() {
            Ok(devices) if devices.is_empty() => println!("no video devices found"),
            Ok(devices) => {
                for device in devices {
                    println!("{}", device);
                }
            }
            Err(err) => println!("error: {}", err),
        },
        (Some("quit") | Some("exit"), _) => return false,
        (Some(other), _) => println!("unknown command: {}", other),
    }
    true
}
