//! In-memory `FileTransfer` for unit tests.

use std::collections::{HashMap, HashSet};

use crate::afc::{AfcError, FileTransfer};
use crate::protocol::{attr, status};
use crate::protocol_core::encode_string_list;

struct MemoryFile {
    name: String,
    data: Vec<u8>,
    attrs: Vec<(String, String)>,
}

/// A flat report directory (`.`) held in memory.
#[derive(Default)]
pub struct MemoryFs {
    entries: Vec<MemoryFile>,
    handles: HashMap<u64, (String, usize)>,
    next_handle: u64,
    /// Largest number of bytes one read returns
    pub read_cap: Option<usize>,
    pub fail_remove: HashSet<String>,
    pub removed: Vec<String>,
    pub stat_calls: usize,
    pub read_calls: usize,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// A regular file whose size attribute matches its contents.
    pub fn with_report(self, name: &str, data: &[u8], birthtime: u64) -> Self {
        let size = data.len().to_string();
        let birth = birthtime.to_string();
        self.with_entry(
            name,
            data,
            &[
                (attr::SIZE, size.as_str()),
                (attr::IFMT, "S_IFREG"),
                (attr::BIRTHTIME, birth.as_str()),
            ],
        )
    }

    pub fn with_entry(mut self, name: &str, data: &[u8], attrs: &[(&str, &str)]) -> Self {
        self.entries.push(MemoryFile {
            name: name.to_string(),
            data: data.to_vec(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        self
    }

    pub fn with_read_cap(mut self, cap: usize) -> Self {
        self.read_cap = Some(cap);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    fn find(&self, name: &str) -> Result<&MemoryFile, AfcError> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or(AfcError::Status {
                code: status::OBJECT_NOT_FOUND,
            })
    }
}

impl FileTransfer for MemoryFs {
    fn read_directory(&mut self, path: &str) -> Result<Vec<String>, AfcError> {
        if path != "." {
            return Err(AfcError::Status {
                code: status::OBJECT_NOT_FOUND,
            });
        }
        let mut names = vec![".".to_string(), "..".to_string()];
        names.extend(self.entries.iter().map(|e| e.name.clone()));
        Ok(names)
    }

    fn get_file_info(&mut self, path: &str) -> Result<Vec<u8>, AfcError> {
        self.stat_calls += 1;
        let file = self.find(path)?;
        let flat: Vec<&str> = file
            .attrs
            .iter()
            .flat_map(|(k, v)| [k.as_str(), v.as_str()])
            .collect();
        let mut raw = encode_string_list(&flat);
        raw.push(0);
        Ok(raw)
    }

    fn file_open(&mut self, path: &str, _mode: u64) -> Result<u64, AfcError> {
        self.find(path)?;
        self.next_handle += 1;
        self.handles.insert(self.next_handle, (path.to_string(), 0));
        Ok(self.next_handle)
    }

    fn file_read(&mut self, handle: u64, len: usize) -> Result<Vec<u8>, AfcError> {
        self.read_calls += 1;
        let (name, offset) = self.handles.get(&handle).cloned().ok_or(AfcError::Status {
            code: status::INVALID_ARG,
        })?;
        let data = &self.find(&name)?.data;
        let mut n = len.min(data.len().saturating_sub(offset));
        if let Some(cap) = self.read_cap {
            n = n.min(cap);
        }
        let chunk = data[offset..offset + n].to_vec();
        if let Some(entry) = self.handles.get_mut(&handle) {
            entry.1 += n;
        }
        Ok(chunk)
    }

    fn file_write(&mut self, handle: u64, bytes: &[u8]) -> Result<(), AfcError> {
        let (name, _) = self.handles.get(&handle).cloned().ok_or(AfcError::Status {
            code: status::INVALID_ARG,
        })?;
        if let Some(file) = self.entries.iter_mut().find(|e| e.name == name) {
            file.data.extend_from_slice(bytes);
        }
        Ok(())
    }

    fn file_close(&mut self, handle: u64) -> Result<(), AfcError> {
        self.handles
            .remove(&handle)
            .map(|_| ())
            .ok_or(AfcError::Status {
                code: status::INVALID_ARG,
            })
    }

    fn remove_path(&mut self, path: &str) -> Result<(), AfcError> {
        if self.fail_remove.contains(path) {
            return Err(AfcError::Status {
                code: status::PERM_DENIED,
            });
        }
        self.entries.retain(|e| e.name != path);
        self.removed.push(path.to_string());
        Ok(())
    }
}
