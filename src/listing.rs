//! Remote directory enumeration.

use crate::afc::FileTransfer;
use crate::error::ListError;

/// List `remote_path` in the order the device reports it. The result may
/// include the `.` and `..` markers.
pub fn list<F: FileTransfer + ?Sized>(
    files: &mut F,
    remote_path: &str,
) -> Result<Vec<String>, ListError> {
    files
        .read_directory(remote_path)
        .map_err(|source| ListError {
            path: remote_path.to_string(),
            source,
        })
}

/// `.` and `..` never take part in matching or purging.
pub fn is_dot_marker(name: &str) -> bool {
    name == "." || name == ".."
}
