//! Dataset Store - durable, append-only dataset document
//!
//! The dataset is one JSON array, which cannot be appended to in place, so
//! every [`DatasetStore::append`] rewrites the whole document. The write
//! goes to a sibling temp file that is then renamed over the old one: a
//! crash leaves either the previous or the new document, never a torn one.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::DatasetEntry;
use crate::Result;

/// In-memory dataset mirrored to one file.
#[derive(Debug)]
pub struct DatasetStore {
    path: PathBuf,
    entries: Vec<DatasetEntry>,
}

impl DatasetStore {
    /// Start an empty dataset at `path`.
    ///
    /// Nothing is written until the first append; an existing file is
    /// replaced at that point.
    #[must_use]
    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Resume the dataset at `path`, or start empty if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            Self::load(&path)?
        } else {
            Vec::new()
        };
        tracing::info!(path = %path.display(), entries = entries.len(), "opened dataset");
        Ok(Self { path, entries })
    }

    /// Parse a dataset document.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a dataset.
    pub fn load(path: impl AsRef<Path>) -> Result<Vec<DatasetEntry>> {
        let content = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[DatasetEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entry has been committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry and rewrite the document.
    ///
    /// If the write fails the entry is dropped again, so memory and disk
    /// stay in agreement.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized or written.
    pub fn append(&mut self, entry: DatasetEntry) -> Result<()> {
        self.entries.push(entry);
        if let Err(e) = self.persist() {
            self.entries.pop();
            return Err(e);
        }
        tracing::debug!(path = %self.path.display(), entries = self.entries.len(), "dataset persisted");
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
