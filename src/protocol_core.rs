//! Shared wire logic for the AFC client, the lockdown client and the in-memory
//! devices used by the tests.
//!
//! Nothing here touches a socket: these are pure encode/decode helpers over
//! byte slices so both sides of a conversation can share them.

use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::{HEADER_LEN, MAGIC, MAX_LOCKDOWN_MESSAGE, MAX_PACKET_SIZE};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid magic in packet header")]
    InvalidMagic,

    #[error("inconsistent packet lengths: entire={entire} this={this}")]
    BadLength { entire: u64, this: u64 },

    #[error("payload too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    #[error("truncated field: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },

    #[error("unsafe entry name {0:?}")]
    UnsafeName(String),
}

/// Decoded AFC packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub entire_length: u64,
    pub this_length: u64,
    pub packet_num: u64,
    pub operation: u64,
}

impl PacketHeader {
    /// Bytes of header arguments that follow the fixed header.
    pub fn header_data_len(&self) -> usize {
        (self.this_length as usize).saturating_sub(HEADER_LEN)
    }

    /// Bytes of bulk payload that follow the header arguments.
    pub fn payload_len(&self) -> usize {
        (self.entire_length - self.this_length) as usize
    }
}

/// Validate a payload size against MAX_PACKET_SIZE
pub fn validate_packet_size(size: usize) -> Result<(), CodecError> {
    if size > MAX_PACKET_SIZE {
        return Err(CodecError::TooLarge {
            size,
            max: MAX_PACKET_SIZE,
        });
    }
    Ok(())
}

/// Build packet header (40 bytes)
/// Format: MAGIC (8) | ENTIRE_LEN (8) | THIS_LEN (8) | PACKET_NUM (8) | OPERATION (8)
pub fn build_packet_header(
    operation: u64,
    packet_num: u64,
    header_data_len: usize,
    payload_len: usize,
) -> [u8; HEADER_LEN] {
    let this_length = (HEADER_LEN + header_data_len) as u64;
    let entire_length = this_length + payload_len as u64;

    let mut header = [0u8; HEADER_LEN];
    header[0..8].copy_from_slice(MAGIC);
    header[8..16].copy_from_slice(&entire_length.to_le_bytes());
    header[16..24].copy_from_slice(&this_length.to_le_bytes());
    header[24..32].copy_from_slice(&packet_num.to_le_bytes());
    header[32..40].copy_from_slice(&operation.to_le_bytes());
    header
}

/// Parse packet header
pub fn parse_packet_header(header: &[u8; HEADER_LEN]) -> Result<PacketHeader, CodecError> {
    if &header[0..8] != MAGIC {
        return Err(CodecError::InvalidMagic);
    }

    let entire_length = read_u64_le(&header[8..16])?;
    let this_length = read_u64_le(&header[16..24])?;
    let packet_num = read_u64_le(&header[24..32])?;
    let operation = read_u64_le(&header[32..40])?;

    if this_length < HEADER_LEN as u64 || entire_length < this_length {
        return Err(CodecError::BadLength {
            entire: entire_length,
            this: this_length,
        });
    }
    validate_packet_size((entire_length - HEADER_LEN as u64) as usize)?;

    Ok(PacketHeader {
        entire_length,
        this_length,
        packet_num,
        operation,
    })
}

pub fn read_u64_le(buf: &[u8]) -> Result<u64, CodecError> {
    let bytes: [u8; 8] = buf
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or(CodecError::Truncated {
            needed: 8,
            available: buf.len(),
        })?;
    Ok(u64::from_le_bytes(bytes))
}

/// NUL-terminated path argument
pub fn encode_path(path: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(path.len() + 1);
    buf.extend_from_slice(path.as_bytes());
    buf.push(0);
    buf
}

/// Encode a list of strings the way the device sends them: each one
/// NUL-terminated, back to back.
pub fn encode_string_list<S: AsRef<str>>(items: &[S]) -> Vec<u8> {
    let mut buf = Vec::new();
    for item in items {
        buf.extend_from_slice(item.as_ref().as_bytes());
        buf.push(0);
    }
    buf
}

/// Split a NUL-separated payload into strings.
///
/// Stops at the first empty string (two consecutive NULs) or at the end of
/// the payload; a final string without its terminator is still returned.
pub fn split_string_list(payload: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    for chunk in payload.split(|b| *b == 0) {
        if chunk.is_empty() {
            break;
        }
        out.push(String::from_utf8_lossy(chunk).into_owned());
    }
    out
}

/// Lockdown frame: 4-byte big-endian length followed by the body
pub fn build_lockdown_frame(body: &[u8]) -> Result<Vec<u8>, CodecError> {
    if body.len() > MAX_LOCKDOWN_MESSAGE {
        return Err(CodecError::TooLarge {
            size: body.len(),
            max: MAX_LOCKDOWN_MESSAGE,
        });
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

pub fn parse_lockdown_length(prefix: &[u8; 4]) -> Result<usize, CodecError> {
    let len = u32::from_be_bytes(*prefix) as usize;
    if len > MAX_LOCKDOWN_MESSAGE {
        return Err(CodecError::TooLarge {
            size: len,
            max: MAX_LOCKDOWN_MESSAGE,
        });
    }
    Ok(len)
}

/// Join a destination directory and a remote entry name.
///
/// The two are concatenated as strings with no separator handling: the caller
/// supplies a directory that already ends in a separator. The entry name comes
/// from the device, so it must be a single plain component: no separators,
/// no NUL, not `.` or `..`.
pub fn compose_destination(dest_dir: &str, name: &str) -> Result<PathBuf, CodecError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(CodecError::UnsafeName(name.to_string()));
    }

    let mut joined = String::with_capacity(dest_dir.len() + name.len());
    joined.push_str(dest_dir);
    joined.push_str(name);
    Ok(PathBuf::from(joined))
}
