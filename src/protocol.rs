//! Shared protocol constants for the AFC copy service and the lockdown broker

// AFC packet header constants
pub const MAGIC: &[u8; 8] = b"CFA6LPAA";
pub const HEADER_LEN: usize = 40;

// Maximum packet payload size (64MB) - prevents memory exhaustion from a bogus length field
pub const MAX_PACKET_SIZE: usize = 64 * 1024 * 1024;

// Largest single FILE_READ the device will honour
pub const MAX_READ_SIZE: usize = 64 * 1024;

// Lockdown messages are framed with a 4-byte big-endian length
pub const MAX_LOCKDOWN_MESSAGE: usize = 1024 * 1024;
pub const LOCKDOWN_PORT: u16 = 62078;
pub const LOCKDOWN_TYPE: &str = "com.apple.mobile.lockdown";

// Well-known service names
pub mod services {
    pub const CRASH_REPORT_MOVER: &str = "com.apple.crashreportmover";
    pub const CRASH_REPORT_COPY: &str = "com.apple.crashreportcopymobile";
}

// Operation codes (numeric values are fixed by the device side)
pub mod op {
    pub const STATUS: u64 = 0x01;
    pub const DATA: u64 = 0x02;
    pub const READ_DIR: u64 = 0x03;
    pub const REMOVE_PATH: u64 = 0x08;
    pub const GET_FILE_INFO: u64 = 0x0A;
    pub const FILE_OPEN: u64 = 0x0D;
    pub const FILE_OPEN_RES: u64 = 0x0E;
    pub const FILE_READ: u64 = 0x0F;
    pub const FILE_WRITE: u64 = 0x10;
    pub const FILE_CLOSE: u64 = 0x14;
}

// FILE_OPEN modes
pub mod open_mode {
    pub const RDONLY: u64 = 1;
    pub const RW: u64 = 2;
    pub const WRONLY: u64 = 3;
    pub const WR: u64 = 4;
    pub const APPEND: u64 = 5;
    pub const RDAPPEND: u64 = 6;
}

// STATUS codes carried in a STATUS packet
pub mod status {
    pub const SUCCESS: u64 = 0;
    pub const UNKNOWN_ERROR: u64 = 1;
    pub const OP_HEADER_INVALID: u64 = 2;
    pub const NO_RESOURCES: u64 = 3;
    pub const READ_ERROR: u64 = 4;
    pub const WRITE_ERROR: u64 = 5;
    pub const UNKNOWN_PACKET_TYPE: u64 = 6;
    pub const INVALID_ARG: u64 = 7;
    pub const OBJECT_NOT_FOUND: u64 = 8;
    pub const OBJECT_IS_DIR: u64 = 9;
    pub const PERM_DENIED: u64 = 10;
    pub const SERVICE_NOT_CONNECTED: u64 = 11;
    pub const OP_TIMEOUT: u64 = 12;
    pub const TOO_MUCH_DATA: u64 = 13;
    pub const END_OF_DATA: u64 = 14;
    pub const OP_NOT_SUPPORTED: u64 = 15;
    pub const OBJECT_EXISTS: u64 = 16;
    pub const OBJECT_BUSY: u64 = 17;
    pub const NO_SPACE_LEFT: u64 = 18;
    pub const IO_ERROR: u64 = 20;
    pub const INTERNAL_ERROR: u64 = 23;
    pub const DIR_NOT_EMPTY: u64 = 33;

    pub fn describe(code: u64) -> &'static str {
        match code {
            SUCCESS => "success",
            UNKNOWN_ERROR => "unknown error",
            OP_HEADER_INVALID => "invalid operation header",
            NO_RESOURCES => "no resources",
            READ_ERROR => "read error",
            WRITE_ERROR => "write error",
            UNKNOWN_PACKET_TYPE => "unknown packet type",
            INVALID_ARG => "invalid argument",
            OBJECT_NOT_FOUND => "object not found",
            OBJECT_IS_DIR => "object is a directory",
            PERM_DENIED => "permission denied",
            SERVICE_NOT_CONNECTED => "service not connected",
            OP_TIMEOUT => "operation timed out",
            TOO_MUCH_DATA => "too much data",
            END_OF_DATA => "end of data",
            OP_NOT_SUPPORTED => "operation not supported",
            OBJECT_EXISTS => "object exists",
            OBJECT_BUSY => "object busy",
            NO_SPACE_LEFT => "no space left",
            IO_ERROR => "I/O error",
            INTERNAL_ERROR => "internal error",
            DIR_NOT_EMPTY => "directory not empty",
            _ => "unrecognized status",
        }
    }
}

// File-info attribute keys reported by GET_FILE_INFO
pub mod attr {
    pub const SIZE: &str = "st_size";
    pub const BIRTHTIME: &str = "st_birthtime";
    pub const MTIME: &str = "st_mtime";
    pub const IFMT: &str = "st_ifmt";
}

// Centralized timeout constants
pub mod timeouts {
    // Liveness wait on the mover channel (ms)
    pub const MOVER_MS: u64 = 10_000;

    // Connection establishment timeout (ms)
    pub const CONNECT_MS: u64 = 5_000;

    // Per-call socket read/write timeout once a service is bound (ms)
    pub const IO_MS: u64 = 30_000;

    // Progress tick interval for UI updates (ms)
    pub const PROGRESS_TICK_MS: u64 = 100;
}
