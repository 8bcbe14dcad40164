// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use circremote_common::Target;

use crate::device::{ContentProvider, DeviceResolver, DirectDevice, ScriptFile};
use crate::session::{self, CaptureOutcome, SessionOptions};
use crate::transport;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "circremote")]
#[command(about = "Upload and run Python code on CircuitPython devices")]
pub struct Cli {
    /// Serial port (e.g., /dev/ttyACM0) or Web Workflow address (e.g., 192.168.1.100:8080)
    #[arg(value_name = "DEVICE")]
    pub device: String,

    /// Program to run ("-" reads standard input)
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// HTTP basic auth password for Web Workflow connections
    #[arg(short, long, env = "CIRCREMOTE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Seconds to wait for output (0 = wait indefinitely)
    #[arg(
        short,
        long,
        default_value = "10",
        env = "CIRCREMOTE_TIMEOUT",
        value_parser = parse_timeout
    )]
    pub timeout: f64,

    /// Send an additional Ctrl-D after output monitoring to leave raw REPL
    #[arg(short, long)]
    pub double_exit: bool,

    /// Enable verbose debug output
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_timeout(value: &str) -> Result<f64, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", value))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("timeout must be zero or a positive number, got {}", value));
    }
    if Duration::try_from_secs_f64(secs).is_err() {
        return Err(format!("timeout {} is too large", value));
    }
    Ok(secs)
}

/// Install the stderr log subscriber. `RUST_LOG` overrides the verbosity flag.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "circremote=debug" } else { "warn" };
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .try_init();
}

fn spinner(verbose: bool) -> ProgressBar {
    if verbose || !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Execute the parsed command line.
pub fn run(cli: &Cli) -> Result<CaptureOutcome> {
    let device = DirectDevice::new(cli.password.clone()).resolve(&cli.device)?;
    let program = ScriptFile::new(&cli.script).program()?;
    let target = Target::parse(&device.address)
        .with_context(|| format!("Invalid device '{}'", device.address))?;
    let options = SessionOptions::from_secs(cli.timeout, cli.double_exit);
    debug!(%target, ?options, "starting session");

    let progress = spinner(cli.verbose);
    progress.set_message(format!("Connecting to {}", target));
    let mut transport = match transport::open(&target, device.password.as_deref()) {
        Ok(transport) => transport,
        Err(err) => {
            progress.finish_and_clear();
            return Err(err.into());
        }
    };
    if cli.verbose {
        eprintln!("Connected to {}", target);
    }

    // Ctrl-C only stops the capture; teardown still runs.
    let cancel = Arc::new(AtomicBool::new(false));
    let sigint = signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&cancel))
        .context("Failed to install Ctrl-C handler")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let outcome = session::run(
        transport.as_mut(),
        &program,
        &options,
        &cancel,
        &mut out,
        &progress,
    );
    signal_hook::low_level::unregister(sigint);

    match outcome {
        Ok(CaptureOutcome::Interrupted) => eprintln!("\nInterrupted by user"),
        Ok(CaptureOutcome::TimedOut) => {
            warn!("no end marker within {:.1}s, output may be incomplete", cli.timeout)
        }
        Ok(CaptureOutcome::Disconnected) => warn!("device closed the connection before the end marker"),
        _ => {}
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["circremote", "/dev/ttyACM0", "code.py"]).unwrap();
        assert_eq!(cli.device, "/dev/ttyACM0");
        assert_eq!(cli.script, PathBuf::from("code.py"));
        assert_eq!(cli.timeout, 10.0);
        assert!(!cli.double_exit);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_all_flags() {
        let cli = Cli::try_parse_from([
            "circremote",
            "-v",
            "-d",
            "-p",
            "secret",
            "-t",
            "0",
            "192.168.1.100:8080",
            "-",
        ])
        .unwrap();
        assert_eq!(cli.password.as_deref(), Some("secret"));
        assert_eq!(cli.timeout, 0.0);
        assert!(cli.double_exit);
        assert!(cli.verbose);
        assert_eq!(cli.script, PathBuf::from("-"));
    }

    #[test]
    fn test_timeout_validation() {
        assert_eq!(parse_timeout("2.5"), Ok(2.5));
        assert!(parse_timeout("-1").is_err());
        assert!(parse_timeout("soon").is_err());
        assert!(parse_timeout("inf").is_err());
        assert!(parse_timeout("1e30").is_err());
        assert!(Cli::try_parse_from(["circremote", "-t", "1e20", "/dev/ttyACM0", "code.py"]).is_err());
    }

    #[test]
    fn test_missing_script_is_usage_error() {
        assert!(Cli::try_parse_from(["circremote", "/dev/ttyACM0"]).is_err());
    }
}
