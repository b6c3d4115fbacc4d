//! Error types for flagbench
//!
//! Every failure carries enough context (command line, captured output) to
//! be diagnosed from the log alone. [`Error::severity`] tells the caller how
//! far the failure reaches.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// How far a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Only the affected benchmark is dropped; siblings proceed.
    LocalSkip,
    /// The whole sampling iteration is discarded and flags are resampled.
    IterationFatal,
    /// The run cannot continue; the process exits non-zero.
    RunFatal,
}

/// Flagbench error types
#[derive(Error, Debug)]
pub enum Error {
    /// Benchmark source failed to compile
    #[error("Compile failed for benchmark '{bench}': {command}\n{stderr}")]
    Compile {
        /// Benchmark name
        bench: String,
        /// Command line that failed
        command: String,
        /// Captured diagnostic output
        stderr: String,
    },

    /// Benchmark object failed to link
    #[error("Link failed for benchmark '{bench}': {command}\n{stderr}")]
    Link {
        /// Benchmark name
        bench: String,
        /// Command line that failed
        command: String,
        /// Captured diagnostic output
        stderr: String,
    },

    /// Benchmark executable failed, crashed, stalled, or timed out
    #[error("Benchmark '{bench}' failed at run time: {reason}")]
    Runtime {
        /// Benchmark name
        bench: String,
        /// Exit status, signal, timeout or stall description
        reason: String,
    },

    /// The project's own configure/build/install step failed
    #[error(
        "Build step failed for project '{project}': {command} ({status})\n\
         ------- STDOUT -------\n{stdout}\n------- STDERR -------\n{stderr}"
    )]
    BuildSystem {
        /// Project name
        project: String,
        /// Command line that failed
        command: String,
        /// Exit status or timeout description
        status: String,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// A result document is absent or malformed
    #[error("Missing or malformed result artifact for project '{project}': {reason}")]
    MissingArtifact {
        /// Project name
        project: String,
        /// What was wrong with the artifact
        reason: String,
    },

    /// Project source or benchmark tree is absent
    #[error("Source tree for project '{project}' not found: {}", path.display())]
    SourceMissing {
        /// Project name
        project: String,
        /// Missing directory
        path: PathBuf,
    },

    /// Benchmark test-data fixture is absent
    #[error("Fixture for project '{project}' not found: {}", path.display())]
    FixtureMissing {
        /// Project name
        project: String,
        /// Missing fixture
        path: PathBuf,
    },

    /// Invalid configuration or project descriptor
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Classify how far this error propagates.
    ///
    /// Compile, link and run-time failures stay inside the adapter. Build
    /// failures and bad result artifacts void the current iteration.
    /// Everything else (missing trees, IO, bad config) ends the run.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::Compile { .. } | Self::Link { .. } | Self::Runtime { .. } => Severity::LocalSkip,
            Self::BuildSystem { .. } | Self::MissingArtifact { .. } => Severity::IterationFatal,
            Self::SourceMissing { .. }
            | Self::FixtureMissing { .. }
            | Self::Config(_)
            | Self::Io(_)
            | Self::Json(_) => Severity::RunFatal,
        }
    }

    /// True if the orchestrator should discard the iteration and resample.
    #[must_use]
    pub const fn is_iteration_fatal(&self) -> bool {
        matches!(self.severity(), Severity::IterationFatal)
    }

    /// True if the whole run must stop.
    #[must_use]
    pub const fn is_run_fatal(&self) -> bool {
        matches!(self.severity(), Severity::RunFatal)
    }
}
