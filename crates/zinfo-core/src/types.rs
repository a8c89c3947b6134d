use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ZinfoError, ZinfoResult};

/// Byte position in either the compressed or the uncompressed stream
pub type Offset = u64;

/// 0-based checkpoint sequence number
pub type SpanId = u32;

/// One file inside a layer, as recorded by the TOC builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    /// Start of the file's content in the uncompressed layer
    pub uncompressed_offset: Offset,
    pub uncompressed_size: u64,
    #[serde(default)]
    pub mode: u32,
    #[serde(default)]
    pub kind: FileKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[default]
    Regular,
    Directory,
    Symlink,
    Other,
}

impl FileMetadata {
    /// Uncompressed `[start, end)` covered by this file
    pub fn range(&self) -> ZinfoResult<(Offset, Offset)> {
        let end = self
            .uncompressed_offset
            .checked_add(self.uncompressed_size)
            .ok_or_else(|| {
                ZinfoError::format(format!(
                    "{}: range {}+{} overflows",
                    self.name, self.uncompressed_offset, self.uncompressed_size
                ))
            })?;
        Ok((self.uncompressed_offset, end))
    }
}

/// Table of contents for a layer: file name -> uncompressed range
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toc {
    pub files: Vec<FileMetadata>,
}

impl Toc {
    pub fn find(&self, name: &str) -> Option<&FileMetadata> {
        let name = name.trim_start_matches("./").trim_start_matches('/');
        self.files
            .iter()
            .find(|f| f.name.trim_start_matches("./").trim_start_matches('/') == name)
    }

    pub fn from_json(data: &[u8]) -> ZinfoResult<Self> {
        serde_json::from_slice(data).map_err(|e| ZinfoError::format(format!("parsing TOC: {e}")))
    }

    pub fn load(path: &Path) -> ZinfoResult<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }
}
