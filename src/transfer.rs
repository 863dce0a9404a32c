//! Moving report bytes off the device: full downloads and bounded previews.

use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use indicatif::ProgressBar;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::afc::{open_read_only, AfcError, FileTransfer};
use crate::error::TransferError;
use crate::metadata::attributes_of;
use crate::protocol::MAX_READ_SIZE;
use crate::protocol_core::{compose_destination, CodecError};

#[derive(Clone, Debug)]
pub struct TransferOptions {
    /// Upper bound for a single read request
    pub chunk_size: usize,
    pub interrupt: Interrupt,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: MAX_READ_SIZE,
            interrupt: Interrupt::default(),
        }
    }
}

/// Stop request shared between a signal handler and running downloads.
///
/// A download checks it between chunks and before touching the destination,
/// so a stopped download never leaves a temporary file behind.
#[derive(Clone, Debug, Default)]
pub struct Interrupt {
    state: Arc<InterruptState>,
}

#[derive(Debug, Default)]
struct InterruptState {
    requested: AtomicBool,
    active: AtomicUsize,
}

impl Interrupt {
    /// Record a stop request. Returns `true` when a download is in flight
    /// and will stop by itself.
    pub fn request(&self) -> bool {
        self.state.requested.store(true, Ordering::SeqCst);
        self.state.active.load(Ordering::SeqCst) > 0
    }

    pub fn is_requested(&self) -> bool {
        self.state.requested.load(Ordering::SeqCst)
    }

    fn enter(&self) -> ActiveTransfer<'_> {
        self.state.active.fetch_add(1, Ordering::SeqCst);
        ActiveTransfer(self)
    }

    fn check(&self, name: &str) -> Result<(), TransferError> {
        if self.is_requested() {
            return Err(TransferError::Interrupted {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

struct ActiveTransfer<'a>(&'a Interrupt);

impl Drop for ActiveTransfer<'_> {
    fn drop(&mut self) {
        self.0.state.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One downloaded entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransferResult {
    pub entry_name: String,
    pub local_path: PathBuf,
    pub bytes_written: u64,
}

/// Leading bytes of a report. `truncated` is set when the report is smaller
/// than the requested window; the bytes are never padded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preview {
    pub bytes: Vec<u8>,
    pub requested: usize,
    pub truncated: bool,
}

impl Preview {
    /// Printable view: text up to the first NUL.
    pub fn text(&self) -> Cow<'_, str> {
        let end = self
            .bytes
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.bytes.len());
        String::from_utf8_lossy(&self.bytes[..end])
    }
}

/// Download `name` to `dest_dir` + `name`.
///
/// The size attribute must be present and non-zero. The destination is
/// replaced atomically, so an interrupted or failed transfer never leaves a
/// partial file behind.
pub fn download<F: FileTransfer + ?Sized>(
    files: &mut F,
    name: &str,
    dest_dir: &str,
    options: &TransferOptions,
    progress: &ProgressBar,
) -> Result<TransferResult, TransferError> {
    let interrupt = &options.interrupt;
    let _active = interrupt.enter();
    interrupt.check(name)?;

    let attrs = attributes_of(files, name)?;
    let size = match attrs.size() {
        Some(size) if size > 0 => size,
        _ => {
            return Err(TransferError::MissingSize {
                name: name.to_string(),
            })
        }
    };
    let dest = compose_destination(dest_dir, name).map_err(|_| TransferError::InvalidName {
        name: name.to_string(),
    })?;

    progress.set_length(size);
    progress.set_position(0);
    progress.set_message(name.to_string());

    let data = read_remote(files, name, size, options, progress)?;
    interrupt.check(name)?;
    write_atomically(&dest, &data)?;

    progress.finish_and_clear();
    Ok(TransferResult {
        entry_name: name.to_string(),
        local_path: dest,
        bytes_written: data.len() as u64,
    })
}

/// Read the first `max_bytes` of `name` with a single request.
pub fn preview<F: FileTransfer + ?Sized>(
    files: &mut F,
    name: &str,
    max_bytes: usize,
) -> Result<Preview, TransferError> {
    let handle = open_read_only(files, name).map_err(remote(name))?;
    let read = files.file_read(handle, max_bytes);
    let closed = files.file_close(handle);

    let mut bytes = read.map_err(remote(name))?;
    closed.map_err(remote(name))?;

    bytes.truncate(max_bytes);
    Ok(Preview {
        truncated: bytes.len() < max_bytes,
        requested: max_bytes,
        bytes,
    })
}

fn remote(name: &str) -> impl Fn(AfcError) -> TransferError + '_ {
    move |source| TransferError::Remote {
        name: name.to_string(),
        source,
    }
}

/// Open, read exactly `size` bytes, close. The handle is closed on every path.
fn read_remote<F: FileTransfer + ?Sized>(
    files: &mut F,
    name: &str,
    size: u64,
    options: &TransferOptions,
    progress: &ProgressBar,
) -> Result<Vec<u8>, TransferError> {
    let too_large = || TransferError::TooLarge {
        name: name.to_string(),
        size,
    };
    let len = usize::try_from(size).map_err(|_| too_large())?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| too_large())?;

    let handle = open_read_only(files, name).map_err(remote(name))?;
    let result = read_chunks(files, handle, name, len, options, &mut buf, progress);
    let closed = files.file_close(handle);

    result?;
    closed.map_err(remote(name))?;
    Ok(buf)
}

fn read_chunks<F: FileTransfer + ?Sized>(
    files: &mut F,
    handle: u64,
    name: &str,
    len: usize,
    options: &TransferOptions,
    buf: &mut Vec<u8>,
    progress: &ProgressBar,
) -> Result<(), TransferError> {
    let chunk_size = options.chunk_size.max(1);
    while buf.len() < len {
        options.interrupt.check(name)?;
        let requested = chunk_size.min(len - buf.len());
        let chunk = files.file_read(handle, requested).map_err(remote(name))?;

        // A short read is fatal for this entry; it is not retried
        if chunk.len() < requested {
            return Err(TransferError::ShortRead {
                name: name.to_string(),
                offset: buf.len() as u64,
                requested,
                received: chunk.len(),
            });
        }
        if chunk.len() > requested {
            return Err(TransferError::Remote {
                name: name.to_string(),
                source: AfcError::Codec(CodecError::TooLarge {
                    size: chunk.len(),
                    max: requested,
                }),
            });
        }

        buf.extend_from_slice(&chunk);
        progress.inc(chunk.len() as u64);
    }
    Ok(())
}

/// Write `data` to a temporary file next to `dest`, then rename it over `dest`.
fn write_atomically(dest: &Path, data: &[u8]) -> Result<(), TransferError> {
    let local = |source: std::io::Error| TransferError::Local {
        path: dest.to_path_buf(),
        source,
    };

    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(local)?;
    tmp.write_all(data).map_err(local)?;
    tmp.flush().map_err(local)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o644));
    }
    tmp.persist(dest).map_err(|e| local(e.error))?;
    Ok(())
}
