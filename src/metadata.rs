//! Per-entry attributes decoded from a GET_FILE_INFO listing.

use std::collections::HashMap;

use crate::afc::FileTransfer;
use crate::error::StatError;
use crate::protocol::attr;
use crate::protocol_core::split_string_list;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other(String),
}

/// Attribute name -> value for one entry. A key the device did not report is
/// absent, never zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    attrs: HashMap<String, String>,
}

impl AttributeSet {
    /// Decode an interleaved key/value listing.
    ///
    /// Decoding stops at the sentinel (an empty string) or the end of the
    /// payload. A trailing key without a value is dropped; a repeated key
    /// keeps its last value.
    pub fn decode(payload: &[u8]) -> Self {
        let flat = split_string_list(payload);
        Self::from_pairs(
            flat.chunks_exact(2)
                .map(|pair| (pair[0].clone(), pair[1].clone())),
        )
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            attrs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn size(&self) -> Option<u64> {
        self.number(attr::SIZE)
    }

    /// Creation time, epoch seconds.
    pub fn created_at(&self) -> Option<u64> {
        self.number(attr::BIRTHTIME)
    }

    pub fn modified_at(&self) -> Option<u64> {
        self.number(attr::MTIME)
    }

    pub fn kind(&self) -> Option<EntryKind> {
        self.get(attr::IFMT).map(|v| match v {
            "S_IFREG" => EntryKind::File,
            "S_IFDIR" => EntryKind::Directory,
            "S_IFLNK" => EntryKind::Symlink,
            other => EntryKind::Other(other.to_string()),
        })
    }

    // Base-10 only; anything else counts as not reported
    fn number(&self, key: &str) -> Option<u64> {
        let value = self.get(key)?;
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        value.parse().ok()
    }
}

/// Fetch and decode the attributes of `name`.
pub fn attributes_of<F: FileTransfer + ?Sized>(
    files: &mut F,
    name: &str,
) -> Result<AttributeSet, StatError> {
    let raw = files.get_file_info(name).map_err(|source| StatError {
        name: name.to_string(),
        source,
    })?;
    Ok(AttributeSet::decode(&raw))
}
