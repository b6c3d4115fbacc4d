//! Harness configuration
//!
//! Values are resolved in this order (later overrides earlier):
//! 1. Hard-coded defaults
//! 2. Config file (`flagbench.toml`)
//! 3. Command-line arguments
//!
//! Relative paths are resolved against `root`, which defaults to the
//! directory holding the config file.
//!
//! ## Example Config File
//!
//! ```toml
//! results_dir = "results"
//! dataset = "ml_dataset.json"
//! cc = "clang"
//! runs = 5
//! iterations = 155
//! expected_projects = 1
//!
//! [[project]]
//! name = "cJSON"
//! source_dir = "dataset/cJSON"
//! bench_dir = "dataset-bench/cJSON"
//! include_dirs = ["{source}"]
//! build = [
//!   { program = "cmake", args = ["-DCMAKE_C_COMPILER={cc}", "-DCMAKE_C_FLAGS={flags}", "{source}"], cwd = "{build}" },
//!   { program = "make", args = ["-j{jobs}"], cwd = "{build}" },
//! ]
//! link_args = ["{build}/libcjson.a"]
//! ```

use std::collections::HashSet;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::flags::{CompilerProbe, FlagSampler, DEFAULT_MAX_FLAGS};
use crate::orchestrator::{RunLimits, DEFAULT_ITERATIONS, DEFAULT_RUNS};
use crate::project::{Adapter, AdapterSettings, ProjectAdapter, ProjectDescriptor};
use crate::{Error, Result};

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "flagbench.toml";

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Base for relative paths (default: config file directory)
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Per-project result documents are written below this directory
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Dataset document
    #[serde(default = "default_dataset")]
    pub dataset: PathBuf,

    /// C compiler driver
    #[serde(default = "default_cc")]
    pub cc: String,

    /// C++ compiler driver
    #[serde(default = "default_cxx")]
    pub cxx: String,

    /// Timed runs per benchmark
    #[serde(default = "default_runs")]
    pub runs: usize,

    /// Dataset entries to produce
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    /// Cap on sampled flags (0 = uncapped)
    #[serde(default = "default_max_flags")]
    pub max_flags: usize,

    /// RNG seed (random if unset)
    #[serde(default)]
    pub seed: Option<u64>,

    /// Limit for each build step and benchmark compile
    #[serde(default)]
    pub build_timeout_secs: Option<u64>,

    /// Limit for each benchmark execution
    #[serde(default)]
    pub bench_timeout_secs: Option<u64>,

    /// Limit for each flag-validation probe compile
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Stop after this many discarded iterations in a row
    #[serde(default)]
    pub max_consecutive_discards: Option<usize>,

    /// Required roster size, checked at load
    #[serde(default)]
    pub expected_projects: Option<usize>,

    /// Parallel jobs for builds (default: CPU count)
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Project roster, in execution order
    #[serde(default, rename = "project")]
    pub projects: Vec<ProjectDescriptor>,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_dataset() -> PathBuf {
    PathBuf::from("ml_dataset.json")
}

fn default_cc() -> String {
    "clang".to_string()
}

fn default_cxx() -> String {
    "clang++".to_string()
}

const fn default_runs() -> usize {
    DEFAULT_RUNS
}

const fn default_iterations() -> usize {
    DEFAULT_ITERATIONS
}

const fn default_max_flags() -> usize {
    DEFAULT_MAX_FLAGS
}

const fn default_probe_timeout() -> u64 {
    60
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            root: None,
            results_dir: default_results_dir(),
            dataset: default_dataset(),
            cc: default_cc(),
            cxx: default_cxx(),
            runs: default_runs(),
            iterations: default_iterations(),
            max_flags: default_max_flags(),
            seed: None,
            build_timeout_secs: None,
            bench_timeout_secs: None,
            probe_timeout_secs: default_probe_timeout(),
            max_consecutive_discards: None,
            expected_projects: None,
            jobs: None,
            projects: Vec::new(),
        }
    }
}

impl HarnessConfig {
    /// Load and validate a config file.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the file is unreadable, malformed or invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let config = Self::from_toml_str(&content, &base)?;
        tracing::debug!(path = %path.display(), projects = config.projects.len(), "loaded config");
        Ok(config)
    }

    /// Parse and validate config text; a relative `root` is taken from `base`.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the text is malformed or invalid.
    pub fn from_toml_str(content: &str, base: &Path) -> Result<Self> {
        let mut config: Self =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.root = Some(match config.root.take() {
            Some(root) => base.join(root),
            None => base.to_path_buf(),
        });
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] naming the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.runs == 0 {
            return Err(Error::Config("runs must be at least 1".to_string()));
        }
        if self.jobs == Some(0) {
            return Err(Error::Config("jobs must be at least 1".to_string()));
        }
        let mut seen = HashSet::new();
        for project in &self.projects {
            if !seen.insert(project.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate project name '{}'",
                    project.name
                )));
            }
            project.validate(&self.root_dir())?;
            self.check_outputs_survive(project)?;
        }
        if let Some(expected) = self.expected_projects {
            if expected != self.projects.len() {
                return Err(Error::Config(format!(
                    "expected {expected} projects, found {}",
                    self.projects.len()
                )));
            }
        }
        Ok(())
    }

    /// Build and install trees are removed after every adapter run, so the
    /// results directory and dataset may not live inside them.
    fn check_outputs_survive(&self, project: &ProjectDescriptor) -> Result<()> {
        let layout = project.layout(&self.root_dir());
        for (label, scratch) in [("build_dir", &layout.build), ("install_dir", &layout.install)] {
            for (kind, output) in [
                ("results_dir", self.results_path()),
                ("dataset", self.dataset_path()),
            ] {
                if output.starts_with(scratch) {
                    return Err(Error::Config(format!(
                        "project '{}': {label} {} would delete {kind} {}",
                        project.name,
                        scratch.display(),
                        output.display()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Base directory for relative paths.
    #[must_use]
    pub fn root_dir(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Absolute results directory.
    #[must_use]
    pub fn results_path(&self) -> PathBuf {
        self.root_dir().join(&self.results_dir)
    }

    /// Absolute dataset path.
    #[must_use]
    pub fn dataset_path(&self) -> PathBuf {
        self.root_dir().join(&self.dataset)
    }

    /// Descriptor of the named project.
    #[must_use]
    pub fn project(&self, name: &str) -> Option<&ProjectDescriptor> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Settings shared by every adapter.
    #[must_use]
    pub fn adapter_settings(&self) -> AdapterSettings {
        AdapterSettings {
            cc: self.cc.clone(),
            cxx: self.cxx.clone(),
            results_dir: self.results_path(),
            build_timeout: self.build_timeout_secs.map(Duration::from_secs),
            bench_timeout: self.bench_timeout_secs.map(Duration::from_secs),
            jobs: self.jobs.unwrap_or_else(num_cpus::get),
        }
    }

    /// Adapter for one descriptor.
    #[must_use]
    pub fn adapter(&self, descriptor: &ProjectDescriptor) -> ProjectAdapter {
        ProjectAdapter::new(descriptor.clone(), self.root_dir(), self.adapter_settings())
    }

    /// One adapter per project, in roster order.
    #[must_use]
    pub fn adapters(&self) -> Vec<Box<dyn Adapter>> {
        self.projects
            .iter()
            .map(|p| Box::new(self.adapter(p)) as Box<dyn Adapter>)
            .collect()
    }

    /// Flag sampler honoring `max_flags`.
    #[must_use]
    pub fn sampler(&self) -> FlagSampler {
        FlagSampler::new(NonZeroUsize::new(self.max_flags))
    }

    /// Probe validating flags with the configured C compiler.
    #[must_use]
    pub fn probe(&self) -> CompilerProbe {
        CompilerProbe::new(&self.cc)
            .with_timeout(Some(Duration::from_secs(self.probe_timeout_secs)))
    }

    /// Orchestrator loop limits.
    #[must_use]
    pub const fn limits(&self) -> RunLimits {
        RunLimits {
            iterations: self.iterations,
            runs: self.runs,
            max_consecutive_discards: self.max_consecutive_discards,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = HarnessConfig::from_toml_str("", Path::new("/work")).unwrap();
        assert_eq!(c.runs, 5);
        assert_eq!(c.iterations, 155);
        assert_eq!(c.max_flags, 10);
        assert_eq!(c.cc, "clang");
        assert_eq!(c.dataset_path(), PathBuf::from("/work/ml_dataset.json"));
        assert_eq!(c.results_path(), PathBuf::from("/work/results"));
        assert!(c.projects.is_empty());
    }

    #[test]
    fn test_relative_root() {
        let c = HarnessConfig::from_toml_str("root = \"data\"", Path::new("/work")).unwrap();
        assert_eq!(c.root_dir(), PathBuf::from("/work/data"));
    }

    #[test]
    fn test_duplicate_projects_rejected() {
        let text = r#"
            [[project]]
            name = "lz4"
            source_dir = "a"
            bench_dir = "b"

            [[project]]
            name = "lz4"
            source_dir = "c"
            bench_dir = "d"
        "#;
        let err = HarnessConfig::from_toml_str(text, Path::new("/work")).unwrap_err();
        assert!(err.to_string().contains("duplicate project name"));
    }

    #[test]
    fn test_results_inside_build_dir_rejected() {
        let text = r#"
            results_dir = "dataset/cJSON/build/results"
            [[project]]
            name = "cJSON"
            source_dir = "dataset/cJSON"
            bench_dir = "dataset-bench/cJSON"
        "#;
        let err = HarnessConfig::from_toml_str(text, Path::new("/work")).unwrap_err();
        assert!(err.to_string().contains("would delete results_dir"), "{err}");

        let text = r#"
            dataset = "out/install/ml_dataset.json"
            [[project]]
            name = "redis"
            source_dir = "dataset/redis"
            bench_dir = "dataset-bench/redis"
            install_dir = "out/install"
        "#;
        let err = HarnessConfig::from_toml_str(text, Path::new("/work")).unwrap_err();
        assert!(err.to_string().contains("would delete dataset"), "{err}");
    }

    #[test]
    fn test_expected_project_count() {
        let text = r#"
            expected_projects = 16
            [[project]]
            name = "lz4"
            source_dir = "a"
            bench_dir = "b"
        "#;
        let err = HarnessConfig::from_toml_str(text, Path::new("/work")).unwrap_err();
        assert!(err.to_string().contains("expected 16 projects, found 1"));
    }

    #[test]
    fn test_zero_runs_rejected() {
        assert!(HarnessConfig::from_toml_str("runs = 0", Path::new("/work")).is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(HarnessConfig::from_toml_str("iterationz = 3", Path::new("/work")).is_err());
    }

    #[test]
    fn test_uncapped_sampler() {
        let c = HarnessConfig::from_toml_str("max_flags = 0", Path::new("/work")).unwrap();
        assert!(c.sampler().max_flags().is_none());
    }
}
