//! Disk cache inspection.
//!
//! Read-only: files are listed and read, never written or removed.

use super::format::ByteCountFormatter;
use crate::container::ImageContainer;
use crate::decoder::{DefaultImageDecoder, ImageDecoding};
use bytes::Bytes;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One file stored by a disk cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataCacheDebugInfo {
    pub path: PathBuf,
}

impl DataCacheDebugInfo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Lists every regular file under `dir`, recursively, sorted by path.
    pub fn scan(dir: &Path) -> io::Result<Vec<Self>> {
        let mut found = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            for entry in fs::read_dir(&current)? {
                let entry = entry?;
                let file_type = entry.file_type()?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    found.push(Self::new(entry.path()));
                }
            }
        }
        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    }

    /// File contents, or `None` if unreadable.
    pub fn data(&self) -> Option<Bytes> {
        fs::read(&self.path).ok().map(Bytes::from)
    }

    /// Decoded image, or `None` if unreadable or not an image.
    pub fn image(&self) -> Option<ImageContainer> {
        let data = self.data()?;
        DefaultImageDecoder.decode(&data).ok()
    }

    /// Formatted size of the readable contents, or `"n/a"` if unreadable.
    pub fn data_size(&self, formatter: &ByteCountFormatter) -> String {
        match self.data() {
            Some(data) => formatter.format(data.len() as u64),
            None => "n/a".to_string(),
        }
    }
}
