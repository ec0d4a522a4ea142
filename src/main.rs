//! CLI Entry Point for uvc-tracker
//!
//! Drives a [`DeviceSession`] against the mock driver so the session lifecycle and
//! event stream can be exercised without hardware:
//!
//! - `demo` runs attach → activate → start for a few seconds, then stop → dispose.
//! - `repl` reads textual host commands from stdin.
//!
//! # Usage
//!
//! ```bash
//! uvc-tracker demo --descriptor 5 --vendor-id 0x1234 --product-id 0x5678 --seconds 3
//! uvc-tracker demo --tracking --config config/tracker.toml
//! echo "attach 5 0x1234 0x5678
//! start
//! frame
//! dispose" | uvc-tracker repl
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use uvc_tracker::commands::{self, HostCommand};
use uvc_tracker::config::TrackerConfig;
use uvc_tracker::events::{ChannelSink, EventKind, EventSink};
use uvc_tracker::logging;
use uvc_tracker::mock::MockDriver;
use uvc_tracker::profile::StreamProfile;
use uvc_tracker::session::DeviceSession;

#[derive(Parser)]
#[command(name = "uvc-tracker")]
#[command(about = "USB video-capture session manager (mock driver)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach, stream and report telemetry for a fixed time
    Demo {
        /// Host file descriptor of the opened device
        #[arg(long, default_value_t = 5, allow_hyphen_values = true)]
        descriptor: i32,

        /// USB vendor ID (decimal or 0x-hex)
        #[arg(long, default_value = "0x1234", value_parser = parse_id)]
        vendor_id: u16,

        /// USB product ID (decimal or 0x-hex)
        #[arg(long, default_value = "0x5678", value_parser = parse_id)]
        product_id: u16,

        /// How long to stream
        #[arg(long, default_value_t = 3)]
        seconds: u64,

        /// Frame rate of the simulated camera
        #[arg(long, default_value_t = 30)]
        fps: u32,

        /// Enable the synthetic tracking tick
        #[arg(long)]
        tracking: bool,

        /// Optional configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Read host commands from stdin
    Repl {
        /// Optional configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn parse_id(text: &str) -> Result<u16, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid USB id '{text}': {e}"))
}

fn load_config(path: Option<&PathBuf>) -> Result<TrackerConfig> {
    let config = match path {
        Some(path) => TrackerConfig::load_from(path),
        None => TrackerConfig::load(),
    }
    .context("loading configuration")?;
    config.validate()?;
    Ok(config)
}

/// Simulated camera advertising 720p MJPEG and VGA YUYV.
fn demo_driver(fps: u32) -> MockDriver {
    MockDriver::builder()
        .supports(StreamProfile::mjpeg(1280, 720, 30))
        .supports(StreamProfile::yuyv(640, 480, 30))
        .frame_pump(fps, 48 * 1024)
        .with_ptz()
        .build()
}

/// Print every event as `<type> <json>` until the session drops its sink.
fn spawn_printer(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<uvc_tracker::events::EventRecord>,
) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("event-printer".to_string())
        .spawn(move || {
            while let Some(event) = rx.blocking_recv() {
                println!("{} {}", event.kind, event.payload);
            }
        })
        .context("spawning event printer")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            descriptor,
            vendor_id,
            product_id,
            seconds,
            fps,
            tracking,
            config,
        } => {
            let mut config = load_config(config.as_ref())?;
            config.tracking.enabled |= tracking;
            logging::init_from_config(&config.logging)?;
            run_demo(&config, descriptor, vendor_id, product_id, seconds, fps)
        }
        Commands::Repl { config } => {
            let config = load_config(config.as_ref())?;
            logging::init_from_config(&config.logging)?;
            run_repl(&config)
        }
    }
}

fn run_demo(
    config: &TrackerConfig,
    descriptor: i32,
    vendor_id: u16,
    product_id: u16,
    seconds: u64,
    fps: u32,
) -> Result<()> {
    let (sink, rx) = ChannelSink::new();
    let printer = spawn_printer(rx)?;

    let session = DeviceSession::builder(Arc::new(demo_driver(fps)), Arc::new(sink))
        .apply_config(config)?
        .build();

    session.init();
    let started = session.attach(descriptor, vendor_id, product_id)
        && session.activate()
        && session.start();

    if started {
        thread::sleep(Duration::from_secs(seconds));
        if let Some(frame) = session.frame_snapshot() {
            tracing::info!(
                width = frame.width,
                height = frame.height,
                encoding = frame.encoding.code(),
                bytes = frame.payload.len(),
                "Latest frame"
            );
        }
        session.manual_control(0.25, -0.1, 300);
        session.stop();
    }
    session.dispose();

    // Dropping the session drops the sender and ends the printer
    drop(session);
    if printer.join().is_err() {
        tracing::warn!("Event printer panicked");
    }

    if started {
        Ok(())
    } else {
        anyhow::bail!("demo session failed to start")
    }
}

/// Sink printing events inline, interleaved with command results.
struct StdoutSink;

impl EventSink for StdoutSink {
    fn emit(&self, kind: EventKind, payload: &str) -> Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{kind} {payload}")?;
        Ok(())
    }
}

fn run_repl(config: &TrackerConfig) -> Result<()> {
    let session = DeviceSession::builder(Arc::new(demo_driver(30)), Arc::new(StdoutSink))
        .apply_config(config)?
        .build();

    for line in io::stdin().lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if matches!(trimmed, "quit" | "exit") {
            break;
        }
        match trimmed.parse::<HostCommand>() {
            Ok(command) => println!("{}", commands::dispatch(&session, &command)),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    session.dispose();
    Ok(())
}
