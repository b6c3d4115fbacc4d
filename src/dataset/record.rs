//! Benchmark and dataset records

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::flags::FlagSet;

/// Measurement for one benchmark executable under one flag set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkRecord {
    /// Benchmark name
    #[serde(rename = "bench")]
    pub name: String,
    /// Executable size in bytes
    #[serde(rename = "bytes")]
    pub artifact_size: u64,
    /// Mean wall-clock seconds over the timed runs
    #[serde(rename = "seconds")]
    pub mean_seconds: f64,
}

impl BenchmarkRecord {
    /// Create a record.
    #[must_use]
    pub fn new(name: impl Into<String>, artifact_size: u64, mean_seconds: f64) -> Self {
        Self {
            name: name.into(),
            artifact_size,
            mean_seconds,
        }
    }

    /// Build a record from exactly `runs` timed durations (seconds).
    ///
    /// Returns `None` unless `timings.len() == runs` and `runs > 0`; a
    /// benchmark with fewer successful runs never produces a record.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_timings(
        name: impl Into<String>,
        artifact_size: u64,
        timings: &[f64],
        runs: usize,
    ) -> Option<Self> {
        if runs == 0 || timings.len() != runs {
            return None;
        }
        let mean = timings.iter().sum::<f64>() / runs as f64;
        Some(Self::new(name, artifact_size, mean))
    }
}

/// All benchmark records of one project under one flag set.
///
/// Serialized as a bare JSON array. May be empty when every benchmark was
/// skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectResult {
    records: Vec<BenchmarkRecord>,
}

impl ProjectResult {
    /// Wrap a list of records.
    #[must_use]
    pub const fn new(records: Vec<BenchmarkRecord>) -> Self {
        Self { records }
    }

    /// The records, in emission order.
    #[must_use]
    pub fn records(&self) -> &[BenchmarkRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if every benchmark was skipped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record by benchmark name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BenchmarkRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Sum of mean seconds over all records.
    #[must_use]
    pub fn total_seconds(&self) -> f64 {
        self.records.iter().map(|r| r.mean_seconds).sum()
    }
}

impl From<Vec<BenchmarkRecord>> for ProjectResult {
    fn from(records: Vec<BenchmarkRecord>) -> Self {
        Self::new(records)
    }
}

/// One dataset sample: a flag set and every project's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntry {
    /// Flags applied uniformly to every project
    pub flags: FlagSet,
    /// Results keyed by project name
    pub results: BTreeMap<String, ProjectResult>,
}

impl DatasetEntry {
    /// Create an entry.
    #[must_use]
    pub const fn new(flags: FlagSet, results: BTreeMap<String, ProjectResult>) -> Self {
        Self { flags, results }
    }

    /// True if every name in `projects` has a result.
    #[must_use]
    pub fn covers<S: AsRef<str>>(&self, projects: &[S]) -> bool {
        projects
            .iter()
            .all(|p| self.results.contains_key(p.as_ref()))
    }

    /// Sum of every benchmark's mean seconds across all projects.
    ///
    /// This is the scalar training target derived from an entry.
    #[must_use]
    pub fn total_seconds(&self) -> f64 {
        self.results.values().map(ProjectResult::total_seconds).sum()
    }

    /// Collapse to the `(flags, target)` training pair.
    #[must_use]
    pub fn reduce(&self) -> ReducedEntry {
        ReducedEntry {
            flags: self.flags.joined(),
            target: self.total_seconds(),
        }
    }
}

/// Training pair derived from a [`DatasetEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducedEntry {
    /// Space-joined flags
    pub flags: String,
    /// Total seconds across every benchmark of every project
    pub target: f64,
}
