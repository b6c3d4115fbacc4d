//! Dataset generation loop
//!
//! ```text
//! Sample ──> Build(0) ──> Build(1) ──> … ──> Collect ──> Persist ──┐
//!   ^           │            │                  │                    │
//!   │           └────────────┴──> Discard <─────┘                    │
//!   └──────────────────────────────────┴─────────────────────────────┘
//! ```
//!
//! An entry is persisted only when every adapter succeeded and every result
//! document was collected. Iteration-fatal errors discard the attempt and
//! resample; run-fatal errors end the run.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::{DatasetEntry, DatasetStore, ResultCollector};
use crate::flags::{FlagProbe, FlagSampler, FlagSet};
use crate::project::Adapter;
use crate::{Error, Result};

/// Default number of dataset entries to produce.
pub const DEFAULT_ITERATIONS: usize = 155;
/// Default number of timed runs per benchmark.
pub const DEFAULT_RUNS: usize = 5;

/// Outcome of one sampling attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IterationStatus {
    /// Attempt in progress.
    Running,
    /// Entry appended to the dataset.
    Persisted,
    /// Attempt discarded; the flag set was dropped.
    Discarded,
}

/// History of one sampling attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    flags: FlagSet,
    status: IterationStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    reason: Option<String>,
}

impl IterationRecord {
    fn start(flags: FlagSet) -> Self {
        Self {
            flags,
            status: IterationStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            reason: None,
        }
    }

    fn complete(&mut self, status: IterationStatus, reason: Option<String>) {
        self.status = status;
        self.reason = reason;
        self.ended_at = Some(Utc::now());
    }

    /// Flag set under test.
    #[must_use]
    pub const fn flags(&self) -> &FlagSet {
        &self.flags
    }

    /// Final status.
    #[must_use]
    pub const fn status(&self) -> IterationStatus {
        self.status
    }

    /// When the attempt started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the attempt ended.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Why the attempt was discarded.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Entries appended during this run
    pub persisted: usize,
    /// Attempts discarded during this run
    pub discarded: usize,
    /// Dataset size when the run ended
    pub dataset_len: usize,
    /// True if the dataset reached the iteration target
    pub target_reached: bool,
    /// Every attempt, in order
    pub iterations: Vec<IterationRecord>,
}

/// Loop limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Dataset size to reach (entries already present count when resuming)
    pub iterations: usize,
    /// Timed runs per benchmark
    pub runs: usize,
    /// Give up after this many discards in a row
    pub max_consecutive_discards: Option<usize>,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            runs: DEFAULT_RUNS,
            max_consecutive_discards: None,
        }
    }
}

enum Phase {
    Sample,
    Build { flags: FlagSet, next: usize },
    Collect { flags: FlagSet },
    Persist { entry: DatasetEntry },
    Discard { error: Error },
}

/// Drives adapters under sampled flag sets and grows the dataset.
pub struct Orchestrator<P> {
    adapters: Vec<Box<dyn Adapter>>,
    probe: P,
    sampler: FlagSampler,
    collector: ResultCollector,
    store: DatasetStore,
    limits: RunLimits,
}

impl<P: FlagProbe> Orchestrator<P> {
    /// Orchestrator with the default sampler and limits.
    #[must_use]
    pub fn new(
        adapters: Vec<Box<dyn Adapter>>,
        probe: P,
        collector: ResultCollector,
        store: DatasetStore,
    ) -> Self {
        Self {
            adapters,
            probe,
            sampler: FlagSampler::default(),
            collector,
            store,
            limits: RunLimits::default(),
        }
    }

    /// Replace the flag sampler.
    #[must_use]
    pub const fn with_sampler(mut self, sampler: FlagSampler) -> Self {
        self.sampler = sampler;
        self
    }

    /// Replace the loop limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The dataset being grown.
    #[must_use]
    pub const fn store(&self) -> &DatasetStore {
        &self.store
    }

    /// Names of the driven projects, in execution order.
    #[must_use]
    pub fn project_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Run until the dataset holds `limits.iterations` entries.
    ///
    /// # Errors
    ///
    /// Returns the first run-fatal error (probe failure, missing source
    /// tree or fixture, IO failure, dataset write failure). Entries
    /// persisted before the error remain on disk.
    pub fn run<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<RunSummary> {
        if self.limits.runs == 0 {
            return Err(Error::Config("timed run count must be at least 1".to_string()));
        }
        let mut summary = RunSummary::default();
        let mut consecutive_discards = 0usize;
        let mut phase = Phase::Sample;

        tracing::info!(
            target_entries = self.limits.iterations,
            existing = self.store.len(),
            projects = self.adapters.len(),
            runs = self.limits.runs,
            "starting dataset generation"
        );

        loop {
            phase = match phase {
                Phase::Sample => {
                    if self.store.len() >= self.limits.iterations {
                        summary.target_reached = true;
                        break;
                    }
                    if self
                        .limits
                        .max_consecutive_discards
                        .is_some_and(|max| consecutive_discards >= max)
                    {
                        tracing::error!(consecutive_discards, "too many discarded iterations, stopping");
                        break;
                    }
                    let flags = self.sampler.sample_valid(rng, &self.probe)?;
                    self.collector.clear()?;
                    tracing::info!(
                        iteration = self.store.len() + 1,
                        flags = %flags,
                        "iteration started"
                    );
                    summary.iterations.push(IterationRecord::start(flags.clone()));
                    Phase::Build { flags, next: 0 }
                }
                Phase::Build { flags, next } => match self.adapters.get(next) {
                    None => Phase::Collect { flags },
                    Some(adapter) => match adapter.run(&flags, self.limits.runs) {
                        Ok(path) => {
                            tracing::debug!(project = adapter.name(), path = %path.display(), "adapter finished");
                            Phase::Build {
                                flags,
                                next: next + 1,
                            }
                        }
                        Err(e) if e.is_run_fatal() => return Err(e),
                        Err(error) => Phase::Discard { error },
                    },
                },
                Phase::Collect { flags } => {
                    let names = self.project_names();
                    match self.collector.collect(&flags, &names) {
                        Ok(entry) => Phase::Persist { entry },
                        Err(e) if e.is_run_fatal() => return Err(e),
                        Err(error) => Phase::Discard { error },
                    }
                }
                Phase::Persist { entry } => {
                    self.store.append(entry)?;
                    consecutive_discards = 0;
                    summary.persisted += 1;
                    if let Some(record) = summary.iterations.last_mut() {
                        record.complete(IterationStatus::Persisted, None);
                    }
                    tracing::info!(
                        entries = self.store.len(),
                        target = self.limits.iterations,
                        "iteration persisted"
                    );
                    Phase::Sample
                }
                Phase::Discard { error } => {
                    consecutive_discards += 1;
                    summary.discarded += 1;
                    tracing::warn!(error = %error, "iteration discarded, resampling");
                    if let Some(record) = summary.iterations.last_mut() {
                        record.complete(IterationStatus::Discarded, Some(error.to_string()));
                    }
                    Phase::Sample
                }
            };
        }

        summary.dataset_len = self.store.len();
        tracing::info!(
            persisted = summary.persisted,
            discarded = summary.discarded,
            dataset_len = summary.dataset_len,
            "dataset generation finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{write_project_result, BenchmarkRecord, ProjectResult};
    use crate::flags::AcceptAll;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::path::{Path, PathBuf};

    struct Fixed {
        name: &'static str,
        results_dir: PathBuf,
    }

    impl Adapter for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn run(&self, _flags: &FlagSet, _runs: usize) -> Result<PathBuf> {
            let result = ProjectResult::new(vec![BenchmarkRecord::new("b", 1, 0.5)]);
            write_project_result(&self.results_dir, self.name, &result)
        }
    }

    fn orchestrator(dir: &Path, names: &[&'static str]) -> Orchestrator<AcceptAll> {
        let results = dir.join("results");
        let adapters: Vec<Box<dyn Adapter>> = names
            .iter()
            .map(|&name| {
                Box::new(Fixed {
                    name,
                    results_dir: results.clone(),
                }) as Box<dyn Adapter>
            })
            .collect();
        Orchestrator::new(
            adapters,
            AcceptAll,
            ResultCollector::new(results),
            DatasetStore::create(dir.join("ml_dataset.json")),
        )
    }

    #[test]
    fn test_reaches_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(dir.path(), &["a", "b"]).with_limits(RunLimits {
            iterations: 3,
            runs: 1,
            max_consecutive_discards: None,
        });
        let summary = orch.run(&mut StdRng::seed_from_u64(7)).unwrap();
        assert!(summary.target_reached);
        assert_eq!(summary.persisted, 3);
        assert_eq!(summary.discarded, 0);
        assert!(orch.store().entries().iter().all(|e| e.covers(&["a", "b"])));
        assert!(summary
            .iterations
            .iter()
            .all(|r| r.status() == IterationStatus::Persisted && r.ended_at().is_some()));
    }

    #[test]
    fn test_zero_runs_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(dir.path(), &["a"]).with_limits(RunLimits {
            runs: 0,
            ..RunLimits::default()
        });
        assert!(orch.run(&mut StdRng::seed_from_u64(1)).is_err());
    }
}
