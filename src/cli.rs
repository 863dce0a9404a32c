//! Command-line surface: flags, lenient parsing, and how flags combine with
//! the persisted settings.

use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{CommandFactory, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::config::Settings;
use crate::device::DeviceEntry;
use crate::error::Error;
use crate::logger::LogFormat;
use crate::purge::ClearScope;
use crate::run::RunConfig;

/// Command-line arguments
#[derive(Parser, Debug, Clone)]
#[command(
    name = "crashpull",
    version,
    about = "Pull crash and panic reports off a device, newest first"
)]
pub struct Args {
    /// UDID of the target device (default: the only configured device)
    #[arg(short = 'u', long)]
    pub udid: Option<String>,

    /// Directory reports are written to
    #[arg(short = 'o', long, default_value = "./")]
    pub output: String,

    /// Fetch every matching report instead of only the newest
    #[arg(short = 'a', long)]
    pub all: bool,

    /// Delete reports from the device once the run has read them
    #[arg(short = 'c', long)]
    pub clear: bool,

    /// Which entries --clear deletes
    #[arg(long, value_enum, default_value_t = ClearScope::All)]
    pub clear_scope: ClearScope,

    /// Substring a report name must contain [default: panic]
    #[arg(long)]
    pub pattern: Option<String>,

    /// Bytes of the newest report to print [default: 2048]
    #[arg(long, value_name = "N")]
    pub preview_bytes: Option<usize>,

    /// Seconds to wait for the crash report mover [default: 10]
    #[arg(long, value_name = "SECS")]
    pub mover_timeout: Option<u64>,

    /// Reach the device at HOST[:PORT] instead of the configured table
    #[arg(long, value_name = "ADDR")]
    pub host: Option<String>,

    /// Settings file (default: ~/.config/crashpull/crashpull.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Append log events to this file
    #[arg(long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// With --all, record a failed report and carry on with the rest
    #[arg(long)]
    pub keep_going: bool,
}

impl Args {
    /// Fold flag overrides into `settings`.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(ref pattern) = self.pattern {
            settings.pattern = pattern.clone();
        }
        if let Some(n) = self.preview_bytes {
            settings.preview_bytes = n;
        }
        if let Some(secs) = self.mover_timeout {
            settings.mover_timeout_secs = secs;
        }
    }

    /// The device named by `--host`, if any.
    ///
    /// It takes the UDID from `-u` when given, otherwise the address itself.
    pub fn adhoc_device(&self) -> Result<Option<DeviceEntry>, Error> {
        let Some(ref addr) = self.host else {
            return Ok(None);
        };
        let (host, port) = split_host_port(addr)?;
        if host.is_empty() {
            return Err(Error::Config(format!("--host '{addr}' has no host")));
        }
        Ok(Some(DeviceEntry {
            udid: self.udid.clone().unwrap_or_else(|| addr.clone()),
            host,
            lockdown_port: port,
        }))
    }

    /// Build the run description. `output_path` must already be validated.
    pub fn run_config(&self, settings: &Settings, output_path: String) -> RunConfig {
        let target_id = match self.host {
            Some(ref addr) => Some(self.udid.clone().unwrap_or_else(|| addr.clone())),
            None => self.udid.clone(),
        };
        RunConfig {
            target_id,
            output_path,
            fetch_all: self.all,
            clear: self.clear,
            clear_scope: self.clear_scope,
            pattern: settings.pattern.clone(),
            report_dir: settings.report_dir.clone(),
            preview_bytes: settings.preview_bytes,
            keep_going: self.keep_going,
        }
    }

    /// Status lines printed before any device traffic.
    pub fn banner(&self, output_path: &str) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(ref udid) = self.udid {
            lines.push(format!("+ Working with device with UDID: {udid}"));
        }
        lines.push(format!("+ Dumping to '{output_path}'!"));
        if self.all {
            lines.push("+ Getting all matching reports from device!".to_string());
        } else {
            lines.push("+ Getting only latest matching report from device!".to_string());
        }
        if self.clear {
            lines.push("+ Clearing reports on device!".to_string());
        }
        lines
    }
}

fn split_host_port(addr: &str) -> Result<(String, Option<u16>), Error> {
    let bad_port = |p: &str| Error::Config(format!("--host '{addr}': invalid port '{p}'"));

    if let Some(rest) = addr.strip_prefix('[') {
        // [v6]:port or [v6]
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| Error::Config(format!("--host '{addr}': missing ']'")))?;
        let port = match tail.strip_prefix(':') {
            Some(p) => Some(p.parse().map_err(|_| bad_port(p))?),
            None if tail.is_empty() => None,
            None => return Err(bad_port(tail)),
        };
        return Ok((host.to_string(), port));
    }
    match addr.split_once(':') {
        Some((host, p)) if !p.contains(':') => {
            Ok((host.to_string(), Some(p.parse().map_err(|_| bad_port(p))?)))
        }
        // Bare IPv6 literal
        Some(_) => Ok((addr.to_string(), None)),
        None => Ok((addr.to_string(), None)),
    }
}

pub fn usage() -> String {
    let mut cmd = Args::command();
    format!("{}", cmd.render_usage())
}

/// Parse `argv`, dropping flags clap does not know.
///
/// Returns the parsed arguments and the flags that were skipped. Errors other
/// than an unknown flag (bad values, `--help`, `--version`) are returned.
pub fn try_parse_lenient<I, T>(argv: I) -> Result<(Args, Vec<String>), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
    let mut skipped = Vec::new();
    loop {
        match Args::try_parse_from(&argv) {
            Ok(args) => return Ok((args, skipped)),
            Err(e) if e.kind() == ErrorKind::UnknownArgument => {
                let Some(ContextValue::String(bad)) = e.get(ContextKind::InvalidArg) else {
                    return Err(e);
                };
                let with_value = format!("{bad}=");
                let pos = argv.iter().skip(1).position(|a| {
                    a.to_str()
                        .is_some_and(|a| a == bad.as_str() || a.starts_with(&with_value))
                });
                match pos {
                    Some(i) => {
                        let removed = argv.remove(i + 1);
                        skipped.push(removed.to_string_lossy().into_owned());
                    }
                    None if strip_short_from_cluster(&mut argv, bad) => skipped.push(bad.clone()),
                    None => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Drop the unknown short flag `bad` (`-z`) from a grouped token such as
/// `-az`. Characters after a value-taking flag belong to its value and are
/// left alone.
fn strip_short_from_cluster(argv: &mut Vec<OsString>, bad: &str) -> bool {
    let mut flag = bad.chars();
    let (Some('-'), Some(target), None) = (flag.next(), flag.next(), flag.next()) else {
        return false;
    };
    let cmd = Args::command();
    let takes_value: Vec<char> = cmd
        .get_arguments()
        .filter(|a| a.get_action().takes_values())
        .filter_map(|a| a.get_short())
        .collect();

    for i in 1..argv.len() {
        let Some(token) = argv[i].to_str() else {
            continue;
        };
        if token == "--" {
            break;
        }
        let Some(cluster) = token.strip_prefix('-') else {
            continue;
        };
        if cluster.len() < 2 || cluster.starts_with('-') {
            continue;
        }

        let mut rebuilt = String::from("-");
        let mut found = false;
        let mut chars = cluster.chars();
        while let Some(c) = chars.next() {
            if c == target && !found {
                found = true;
                continue;
            }
            rebuilt.push(c);
            if takes_value.contains(&c) {
                rebuilt.push_str(chars.as_str());
                break;
            }
        }
        if found {
            if rebuilt == "-" {
                argv.remove(i);
            } else {
                argv[i] = rebuilt.into();
            }
            return true;
        }
    }
    false
}

/// `try_parse_lenient`, printing usage for every skipped flag and exiting on
/// any other parse error.
pub fn parse_lenient<I, T>(argv: I) -> Args
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match try_parse_lenient(argv) {
        Ok((args, skipped)) => {
            for flag in skipped {
                eprintln!("[!] Ignoring unknown option '{flag}'");
                eprintln!("{}", usage());
            }
            args
        }
        Err(e) => e.exit(),
    }
}
