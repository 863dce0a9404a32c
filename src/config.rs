//! Persistent settings, loaded from TOML. Command-line flags override them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::device::{DeviceEntry, StaticResolver};
use crate::error::Error;
use crate::protocol::{services, timeouts, LOCKDOWN_PORT, MAX_READ_SIZE};
use crate::session::SessionOptions;
use crate::transfer::TransferOptions;

pub const DEFAULT_PATTERN: &str = "panic";
pub const DEFAULT_REPORT_DIR: &str = ".";
pub const DEFAULT_PREVIEW_BYTES: usize = 2048;
/// Upper bound for `mover_timeout_secs`
pub const MAX_MOVER_TIMEOUT_SECS: u64 = 3600;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Substring a report name must contain
    pub pattern: String,
    /// Remote directory listed on the copy service
    pub report_dir: String,
    pub preview_bytes: usize,
    pub chunk_size: usize,
    pub mover_timeout_secs: u64,
    /// Client label sent to lockdown
    pub label: String,
    pub mover_service: String,
    pub copy_service: String,
    pub lockdown_port: u16,
    pub connect_timeout_ms: u64,
    #[serde(rename = "device")]
    pub devices: Vec<DeviceEntry>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.to_string(),
            report_dir: DEFAULT_REPORT_DIR.to_string(),
            preview_bytes: DEFAULT_PREVIEW_BYTES,
            chunk_size: MAX_READ_SIZE,
            mover_timeout_secs: timeouts::MOVER_MS / 1000,
            label: env!("CARGO_PKG_NAME").to_string(),
            mover_service: services::CRASH_REPORT_MOVER.to_string(),
            copy_service: services::CRASH_REPORT_COPY.to_string(),
            lockdown_port: LOCKDOWN_PORT,
            connect_timeout_ms: timeouts::CONNECT_MS,
            devices: Vec::new(),
        }
    }
}

impl Settings {
    /// Reject values the run cannot work with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.chunk_size == 0 || self.chunk_size > MAX_READ_SIZE {
            return Err(Error::Config(format!(
                "chunk_size must be between 1 and {MAX_READ_SIZE}, got {}",
                self.chunk_size
            )));
        }
        if self.preview_bytes == 0 || self.preview_bytes > MAX_READ_SIZE {
            return Err(Error::Config(format!(
                "preview_bytes must be between 1 and {MAX_READ_SIZE}, got {}",
                self.preview_bytes
            )));
        }
        if self.mover_timeout_secs == 0 || self.mover_timeout_secs > MAX_MOVER_TIMEOUT_SECS {
            return Err(Error::Config(format!(
                "mover_timeout_secs must be between 1 and {MAX_MOVER_TIMEOUT_SECS}, got {}",
                self.mover_timeout_secs
            )));
        }
        if self.report_dir.is_empty() {
            return Err(Error::Config("report_dir must not be empty".into()));
        }
        for d in &self.devices {
            if d.udid.is_empty() || d.host.is_empty() {
                return Err(Error::Config(
                    "every [[device]] needs a udid and a host".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            label: self.label.clone(),
            mover_service: self.mover_service.clone(),
            copy_service: self.copy_service.clone(),
            mover_timeout: Duration::from_secs(self.mover_timeout_secs),
        }
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            chunk_size: self.chunk_size,
            ..TransferOptions::default()
        }
    }

    /// Resolver over the configured device table.
    ///
    /// `extra` is an ad-hoc device (from `--host`) placed ahead of the table.
    pub fn resolver(&self, extra: Option<DeviceEntry>) -> StaticResolver {
        let mut devices = Vec::with_capacity(self.devices.len() + 1);
        devices.extend(extra);
        devices.extend(self.devices.iter().cloned());
        let mut resolver = StaticResolver::new(devices);
        resolver.default_lockdown_port = self.lockdown_port;
        resolver.connect_timeout = Duration::from_millis(self.connect_timeout_ms);
        resolver
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("crashpull");
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("crashpull");
    }
    PathBuf::from(".crashpull")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("crashpull.toml")
}

/// Load settings from `path`, or from the default location when `None`.
///
/// A missing default file yields defaults; a missing explicit file is an error.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, Error> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (default_config_path(), false),
    };
    let data = match std::fs::read_to_string(&path) {
        Ok(data) => data,
        Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Settings::default())
        }
        Err(e) => {
            return Err(Error::Config(format!(
                "cannot read {}: {e}",
                path.display()
            )))
        }
    };
    let settings: Settings = toml::from_str(&data)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    settings.validate()?;
    Ok(settings)
}
