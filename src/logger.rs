use anyhow::Result;
use chrono::Utc;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::transfer::TransferResult;

pub trait Logger: Send + Sync {
    fn session(&self, _udid: &str) {}
    fn found(&self, _name: &str, _size: Option<u64>) {}
    fn downloaded(&self, _result: &TransferResult) {}
    fn removed(&self, _name: &str) {}
    fn error(&self, _context: &str, _name: &str, _msg: &str) {}
    fn done(&self, _files: u64, _bytes: u64, _seconds: f64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Jsonl,
}

/// Choose a logger once; falls back to `NoopLogger` when the file cannot be opened.
pub fn open_logger(path: Option<&Path>, format: LogFormat) -> Arc<dyn Logger> {
    let Some(path) = path else {
        return Arc::new(NoopLogger);
    };
    let opened: Result<Arc<dyn Logger>> = match format {
        LogFormat::Text => TextLogger::new(path).map(|l| Arc::new(l) as Arc<dyn Logger>),
        LogFormat::Jsonl => JsonlLogger::new(path).map(|l| Arc::new(l) as Arc<dyn Logger>),
    };
    match opened {
        Ok(l) => l,
        Err(e) => {
            eprintln!("[!] Cannot open log file {}: {e}", path.display());
            Arc::new(NoopLogger)
        }
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            file: Mutex::new(open_append(path.as_ref())?),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn session(&self, udid: &str) {
        self.line(&format!("SESSION udid={udid}"));
    }
    fn found(&self, name: &str, size: Option<u64>) {
        match size {
            Some(size) => self.line(&format!("FOUND name={name} size={size}")),
            None => self.line(&format!("FOUND name={name}")),
        }
    }
    fn downloaded(&self, result: &TransferResult) {
        self.line(&format!(
            "DOWNLOAD name={} dst={} bytes={}",
            result.entry_name,
            result.local_path.display(),
            result.bytes_written
        ));
    }
    fn removed(&self, name: &str) {
        self.line(&format!("REMOVE name={name}"));
    }
    fn error(&self, context: &str, name: &str, msg: &str) {
        self.line(&format!("ERROR ctx={context} name={name} msg={msg}"));
    }
    fn done(&self, files: u64, bytes: u64, seconds: f64) {
        self.line(&format!("DONE files={files} bytes={bytes} seconds={seconds:.3}"));
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogRecord {
    Session {
        udid: String,
    },
    Found {
        name: String,
        size: Option<u64>,
    },
    Download {
        name: String,
        destination: String,
        bytes: u64,
    },
    Remove {
        name: String,
    },
    Error {
        context: String,
        name: String,
        message: String,
    },
    Done {
        files: u64,
        bytes: u64,
        seconds: f64,
    },
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LogEntry {
    pub timestamp: String,
    #[serde(flatten)]
    pub record: LogRecord,
}

/// One JSON object per line.
pub struct JsonlLogger {
    file: Mutex<File>,
}

impl JsonlLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            file: Mutex::new(open_append(path.as_ref())?),
        })
    }

    fn record(&self, record: LogRecord) {
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            record,
        };
        if let Ok(mut f) = self.file.lock() {
            if serde_json::to_writer(&mut *f, &entry).is_ok() {
                let _ = f.write_all(b"\n");
            }
        }
    }
}

impl Logger for JsonlLogger {
    fn session(&self, udid: &str) {
        self.record(LogRecord::Session {
            udid: udid.to_string(),
        });
    }
    fn found(&self, name: &str, size: Option<u64>) {
        self.record(LogRecord::Found {
            name: name.to_string(),
            size,
        });
    }
    fn downloaded(&self, result: &TransferResult) {
        self.record(LogRecord::Download {
            name: result.entry_name.clone(),
            destination: result.local_path.display().to_string(),
            bytes: result.bytes_written,
        });
    }
    fn removed(&self, name: &str) {
        self.record(LogRecord::Remove {
            name: name.to_string(),
        });
    }
    fn error(&self, context: &str, name: &str, msg: &str) {
        self.record(LogRecord::Error {
            context: context.to_string(),
            name: name.to_string(),
            message: msg.to_string(),
        });
    }
    fn done(&self, files: u64, bytes: u64, seconds: f64) {
        self.record(LogRecord::Done {
            files,
            bytes,
            seconds,
        });
    }
}

/// Read back a JSONL log.
pub fn read_jsonl(path: &Path) -> Result<Vec<LogEntry>> {
    let data = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in data.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }
    Ok(entries)
}
