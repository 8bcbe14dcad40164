// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Run Python programs on CircuitPython devices over USB serial or Web Workflow.
//!
//! Usage:
//!   circremote /dev/ttyACM0 blink.py
//!   circremote -p mypassword 192.168.1.100:8080 sensors.py
//!   circremote -t 0 -d /dev/ttyUSB0 long_running.py

mod cli;
mod device;
mod error;
mod session;
mod transport;

use std::process::ExitCode;

use clap::Parser;

fn main() -> ExitCode {
    let args = cli::Cli::parse();
    cli::init_logging(args.verbose);

    match cli::run(&args) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", error::report(&err, &args.device));
            ExitCode::FAILURE
        }
    }
}
