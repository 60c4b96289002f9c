use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::info;

use crate::DocumentInfo;

/// `<name><suffix>`, with path separators in the name replaced so the result
/// is always a single file name.
pub fn export_file_name(document_name: &str, suffix: &str) -> String {
    let stem: String = document_name
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    let stem = if stem.trim().is_empty() {
        "document".to_owned()
    } else {
        stem
    };
    format!("{stem}{suffix}")
}

/// Receives exported annotation payloads.
pub trait ExportSink: Send + Sync {
    fn write(&self, doc: &DocumentInfo, file_name: &str, payload: &str) -> Result<()>;
}

/// Writes exports into a directory, replacing earlier exports of the same
/// document.
pub struct FileExportSink {
    root: PathBuf,
}

impl FileExportSink {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create export directory at {:?}", root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ExportSink for FileExportSink {
    fn write(&self, doc: &DocumentInfo, file_name: &str, payload: &str) -> Result<()> {
        let path = self.root.join(file_name);
        let tmp = path.with_extension("json.tmp");
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp export file {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to move export into place at {:?}", path))?;
        info!(document = %doc.id, path = %path.display(), "annotations exported");
        Ok(())
    }
}

/// Keeps every export in memory, newest last.
#[derive(Default)]
pub struct MemoryExportSink {
    inner: Mutex<Vec<(String, String)>>,
}

impl MemoryExportSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(file name, payload)` pairs in write order.
    pub fn exports(&self) -> Vec<(String, String)> {
        self.inner.lock().clone()
    }

    pub fn latest(&self) -> Option<(String, String)> {
        self.inner.lock().last().cloned()
    }
}

impl ExportSink for MemoryExportSink {
    fn write(&self, _doc: &DocumentInfo, file_name: &str, payload: &str) -> Result<()> {
        self.inner
            .lock()
            .push((file_name.to_owned(), payload.to_owned()));
        Ok(())
    }
}
