//! Deleting reports from the device.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::afc::FileTransfer;
use crate::error::RemoveError;
use crate::listing::is_dot_marker;
use crate::select::matches_pattern;

/// Which listed entries a clear removes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearScope {
    /// Every entry in the report directory, matched or not
    #[default]
    All,
    /// Only entries matching the report pattern
    Matched,
}

/// Entries of `names` a clear with `scope` would remove, in listing order.
pub fn purge_candidates<'a>(names: &'a [String], pattern: &str, scope: ClearScope) -> Vec<&'a str> {
    names
        .iter()
        .map(String::as_str)
        .filter(|name| match scope {
            ClearScope::All => !is_dot_marker(name),
            ClearScope::Matched => matches_pattern(name, pattern),
        })
        .collect()
}

/// Remove exactly `name`. The result is not checked afterwards.
pub fn remove<F: FileTransfer + ?Sized>(files: &mut F, name: &str) -> Result<(), RemoveError> {
    files.remove_path(name).map_err(|source| RemoveError {
        name: name.to_string(),
        source,
    })
}
