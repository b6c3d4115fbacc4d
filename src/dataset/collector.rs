//! Result collection
//!
//! Each adapter leaves exactly one JSON document in
//! `<results_dir>/<project>/`. The collector validates those documents and
//! merges them into a [`DatasetEntry`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::{BenchmarkRecord, DatasetEntry, ProjectResult};
use crate::flags::FlagSet;
use crate::{Error, Result};

/// File name adapters write their results to.
pub const RESULT_FILE_NAME: &str = "results.json";

/// Reads and validates per-project result documents.
#[derive(Debug, Clone)]
pub struct ResultCollector {
    results_dir: PathBuf,
}

impl ResultCollector {
    /// Collector rooted at `results_dir`.
    #[must_use]
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    /// Root results directory.
    #[must_use]
    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Directory a project's adapter writes into.
    #[must_use]
    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.results_dir.join(project)
    }

    /// Path of a project's result document.
    #[must_use]
    pub fn result_path(&self, project: &str) -> PathBuf {
        self.project_dir(project).join(RESULT_FILE_NAME)
    }

    /// Remove every previous result so stale documents cannot be collected.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be reset.
    pub fn clear(&self) -> Result<()> {
        if self.results_dir.exists() {
            fs::remove_dir_all(&self.results_dir)?;
        }
        fs::create_dir_all(&self.results_dir)?;
        Ok(())
    }

    /// Read one project's result document.
    ///
    /// # Errors
    ///
    /// [`Error::MissingArtifact`] if the directory is missing, does not hold
    /// exactly one `.json` file, or the file is not a valid record list.
    pub fn collect_project(&self, project: &str) -> Result<ProjectResult> {
        let missing = |reason: String| Error::MissingArtifact {
            project: project.to_string(),
            reason,
        };

        let dir = self.project_dir(project);
        if !dir.is_dir() {
            return Err(missing(format!("no results directory at {}", dir.display())));
        }

        let documents: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(|e| missing(format!("cannot list {}: {e}", dir.display())))?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        let [document] = documents.as_slice() else {
            return Err(missing(format!(
                "expected exactly one JSON document in {}, found {}",
                dir.display(),
                documents.len()
            )));
        };

        let content = fs::read_to_string(document)
            .map_err(|e| missing(format!("cannot read {}: {e}", document.display())))?;
        let records: Vec<BenchmarkRecord> = serde_json::from_str(&content)
            .map_err(|e| missing(format!("malformed {}: {e}", document.display())))?;

        if let Some(bad) = records
            .iter()
            .find(|r| !r.mean_seconds.is_finite() || r.mean_seconds < 0.0)
        {
            return Err(missing(format!(
                "benchmark '{}' has invalid seconds {}",
                bad.name, bad.mean_seconds
            )));
        }

        Ok(ProjectResult::new(records))
    }

    /// Merge every project's results into one entry.
    ///
    /// # Errors
    ///
    /// Fails on the first project whose document is missing or malformed.
    pub fn collect<S: AsRef<str>>(&self, flags: &FlagSet, projects: &[S]) -> Result<DatasetEntry> {
        let mut results = BTreeMap::new();
        for project in projects {
            let project = project.as_ref();
            results.insert(project.to_string(), self.collect_project(project)?);
        }
        Ok(DatasetEntry::new(flags.clone(), results))
    }
}

/// Write a project's records where the collector expects them.
///
/// Overwrites any previous document for the project.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn write_project_result(
    results_dir: &Path,
    project: &str,
    result: &ProjectResult,
) -> Result<PathBuf> {
    let dir = results_dir.join(project);
    fs::create_dir_all(&dir)?;
    let path = dir.join(RESULT_FILE_NAME);
    fs::write(&path, serde_json::to_string_pretty(result)?)?;
    Ok(path)
}
