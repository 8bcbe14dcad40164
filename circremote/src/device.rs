// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Where the session gets its device address and its program text.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;

/// A resolved device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    /// Serial path or `address[:port]`.
    pub address: String,
    /// Web Workflow password, if any.
    pub password: Option<String>,
}

/// Turns a device name or raw address into a [`Device`].
pub trait DeviceResolver {
    fn resolve(&self, name: &str) -> Result<Device>;
}

/// Treats the given name as the address itself.
pub struct DirectDevice {
    password: Option<String>,
}

impl DirectDevice {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }
}

impl DeviceResolver for DirectDevice {
    fn resolve(&self, name: &str) -> Result<Device> {
        let address = name.trim();
        if address.is_empty() {
            bail!("no device given");
        }
        debug!(device = address, "using device address as given");
        Ok(Device {
            address: address.to_string(),
            password: self.password.clone(),
        })
    }
}

/// Supplies the final program text.
pub trait ContentProvider {
    fn program(&self) -> Result<String>;
}

/// A program read from a file, or from stdin when the path is `-`.
pub struct ScriptFile {
    path: PathBuf,
}

impl ScriptFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn is_stdin(&self) -> bool {
        self.path == Path::new("-")
    }
}

impl ContentProvider for ScriptFile {
    fn program(&self) -> Result<String> {
        let program = if self.is_stdin() {
            let mut program = String::new();
            std::io::stdin()
                .read_to_string(&mut program)
                .context("Failed to read program from stdin")?;
            program
        } else {
            fs::read_to_string(&self.path)
                .with_context(|| format!("Failed to read {}", self.path.display()))?
        };

        if program.trim().is_empty() {
            bail!("{} contains no code", self.path.display());
        }
        debug!(
            bytes = program.len(),
            lines = program.lines().count(),
            "read program from {}",
            self.path.display()
        );
        Ok(program)
    }
}
