//! AFC client: the file-transfer protocol spoken by the crash report copy
//! service.
//!
//! Requests and responses are single packets. A response body is the header
//! arguments followed by the bulk payload; a STATUS response carries a
//! little-endian `u64` code where zero means success.

use std::io::{Read, Write};

use thiserror::Error;

use crate::protocol::{op, open_mode, status, HEADER_LEN};
use crate::protocol_core::{
    build_packet_header, encode_path, parse_packet_header, read_u64_le, split_string_list,
    CodecError,
};

#[derive(Debug, Error)]
pub enum AfcError {
    #[error("device returned status {code} ({})", status::describe(*code))]
    Status { code: u64 },

    #[error("unexpected operation {got:#x} in response (expected {expected:#x})")]
    UnexpectedOperation { expected: u64, got: u64 },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AfcError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AfcError::Status { code } if *code == status::OBJECT_NOT_FOUND)
    }
}

/// Operations the core needs from a remote file namespace.
///
/// Calls are synchronous and the implementation is not expected to be usable
/// from more than one logical stream at a time.
pub trait FileTransfer {
    /// Names in `path`, in the order the remote side reports them.
    fn read_directory(&mut self, path: &str) -> Result<Vec<String>, AfcError>;

    /// Raw attribute listing for `path`: NUL-terminated key/value strings,
    /// interleaved, optionally closed by an empty string.
    fn get_file_info(&mut self, path: &str) -> Result<Vec<u8>, AfcError>;

    fn file_open(&mut self, path: &str, mode: u64) -> Result<u64, AfcError>;

    /// One read of at most `len` bytes from the current position.
    fn file_read(&mut self, handle: u64, len: usize) -> Result<Vec<u8>, AfcError>;

    fn file_write(&mut self, handle: u64, data: &[u8]) -> Result<(), AfcError>;

    fn file_close(&mut self, handle: u64) -> Result<(), AfcError>;

    fn remove_path(&mut self, path: &str) -> Result<(), AfcError>;
}

/// AFC client bound to a connected service channel.
pub struct AfcClient<C> {
    stream: C,
    packet_num: u64,
}

impl<C: Read + Write> AfcClient<C> {
    pub fn new(stream: C) -> Self {
        Self {
            stream,
            packet_num: 0,
        }
    }

    pub fn into_inner(self) -> C {
        self.stream
    }

    fn send(&mut self, operation: u64, header_data: &[u8], payload: &[u8]) -> Result<(), AfcError> {
        let header =
            build_packet_header(operation, self.packet_num, header_data.len(), payload.len());
        self.stream.write_all(&header)?;
        self.stream.write_all(header_data)?;
        if !payload.is_empty() {
            self.stream.write_all(payload)?;
        }
        self.stream.flush()?;
        self.packet_num += 1;
        Ok(())
    }

    /// Read one response packet: (operation, header data ++ payload)
    fn receive(&mut self) -> Result<(u64, Vec<u8>), AfcError> {
        let mut raw = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut raw)?;
        let header = parse_packet_header(&raw)?;

        let mut body = vec![0u8; header.header_data_len() + header.payload_len()];
        self.stream.read_exact(&mut body)?;
        Ok((header.operation, body))
    }

    /// Receive a response of type `expected`. A STATUS packet with a non-zero
    /// code becomes `AfcError::Status`; a successful STATUS yields an empty body.
    fn expect(&mut self, expected: u64) -> Result<Vec<u8>, AfcError> {
        let (operation, body) = self.receive()?;
        if operation == op::STATUS {
            let code = read_u64_le(&body)?;
            if code != status::SUCCESS {
                return Err(AfcError::Status { code });
            }
            return Ok(Vec::new());
        }
        if operation != expected {
            return Err(AfcError::UnexpectedOperation {
                expected,
                got: operation,
            });
        }
        Ok(body)
    }

    fn request(
        &mut self,
        operation: u64,
        header_data: &[u8],
        payload: &[u8],
        expected: u64,
    ) -> Result<Vec<u8>, AfcError> {
        self.send(operation, header_data, payload)?;
        self.expect(expected)
    }
}

impl<C: Read + Write> FileTransfer for AfcClient<C> {
    fn read_directory(&mut self, path: &str) -> Result<Vec<String>, AfcError> {
        let body = self.request(op::READ_DIR, &encode_path(path), &[], op::DATA)?;
        Ok(split_string_list(&body))
    }

    fn get_file_info(&mut self, path: &str) -> Result<Vec<u8>, AfcError> {
        self.request(op::GET_FILE_INFO, &encode_path(path), &[], op::DATA)
    }

    fn file_open(&mut self, path: &str, mode: u64) -> Result<u64, AfcError> {
        let mut args = Vec::with_capacity(8 + path.len() + 1);
        args.extend_from_slice(&mode.to_le_bytes());
        args.extend_from_slice(&encode_path(path));
        let body = self.request(op::FILE_OPEN, &args, &[], op::FILE_OPEN_RES)?;
        Ok(read_u64_le(&body)?)
    }

    fn file_read(&mut self, handle: u64, len: usize) -> Result<Vec<u8>, AfcError> {
        let mut args = [0u8; 16];
        args[0..8].copy_from_slice(&handle.to_le_bytes());
        args[8..16].copy_from_slice(&(len as u64).to_le_bytes());
        self.request(op::FILE_READ, &args, &[], op::DATA)
    }

    fn file_write(&mut self, handle: u64, data: &[u8]) -> Result<(), AfcError> {
        self.request(op::FILE_WRITE, &handle.to_le_bytes(), data, op::STATUS)?;
        Ok(())
    }

    fn file_close(&mut self, handle: u64) -> Result<(), AfcError> {
        self.request(op::FILE_CLOSE, &handle.to_le_bytes(), &[], op::STATUS)?;
        Ok(())
    }

    fn remove_path(&mut self, path: &str) -> Result<(), AfcError> {
        self.request(op::REMOVE_PATH, &encode_path(path), &[], op::STATUS)?;
        Ok(())
    }
}

/// Open `path` read-only.
pub fn open_read_only<F: FileTransfer + ?Sized>(files: &mut F, path: &str) -> Result<u64, AfcError> {
    files.file_open(path, open_mode::RDONLY)
}

/// A view of `inner` with every path taken relative to `dir`.
pub struct Scoped<'a, F: ?Sized> {
    inner: &'a mut F,
    dir: &'a str,
}

impl<'a, F: FileTransfer + ?Sized> Scoped<'a, F> {
    pub fn new(inner: &'a mut F, dir: &'a str) -> Self {
        Self { inner, dir }
    }

    fn resolve(&self, path: &str) -> String {
        match (self.dir, path) {
            ("" | ".", _) => path.to_string(),
            (dir, ".") => dir.to_string(),
            (dir, _) if dir.ends_with('/') => format!("{dir}{path}"),
            (dir, _) => format!("{dir}/{path}"),
        }
    }
}

impl<F: FileTransfer + ?Sized> FileTransfer for Scoped<'_, F> {
    fn read_directory(&mut self, path: &str) -> Result<Vec<String>, AfcError> {
        let path = self.resolve(path);
        self.inner.read_directory(&path)
    }

    fn get_file_info(&mut self, path: &str) -> Result<Vec<u8>, AfcError> {
        let path = self.resolve(path);
        self.inner.get_file_info(&path)
    }

    fn file_open(&mut self, path: &str, mode: u64) -> Result<u64, AfcError> {
        let path = self.resolve(path);
        self.inner.file_open(&path, mode)
    }

    fn file_read(&mut self, handle: u64, len: usize) -> Result<Vec<u8>, AfcError> {
        self.inner.file_read(handle, len)
    }

    fn file_write(&mut self, handle: u64, data: &[u8]) -> Result<(), AfcError> {
        self.inner.file_write(handle, data)
    }

    fn file_close(&mut self, handle: u64) -> Result<(), AfcError> {
        self.inner.file_close(handle)
    }

    fn remove_path(&mut self, path: &str) -> Result<(), AfcError> {
        let path = self.resolve(path);
        self.inner.remove_path(&path)
    }
}
