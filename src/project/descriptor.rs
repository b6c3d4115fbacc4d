//! Declarative project descriptors
//!
//! A descriptor captures everything project-specific about building and
//! benchmarking one third-party code base, so a single generic adapter can
//! drive every project.
//!
//! ```toml
//! [[project]]
//! name = "libyaml"
//! source_dir = "dataset/libyaml"
//! bench_dir = "dataset-bench/libyaml"
//! build_dir = "dataset/libyaml-build"
//! fixtures = ["config.yaml"]
//! build = [
//!   { program = "./bootstrap", cwd = "{source}" },
//!   { program = "{source}/configure", args = ["--prefix={install}", "--disable-shared"],
//!     cwd = "{build}", env = { CC = "{cc}", CFLAGS = "{flags}" } },
//!   { program = "make", args = ["-j", "{jobs}", "install"], cwd = "{build}" },
//! ]
//! pkg_config = { package = "yaml-0.1", static = true }
//!
//! [project.discovery]
//! extensions = ["c"]
//! suffix = "_bench"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::TemplateContext;
use crate::process::CommandSpec;
use crate::{Error, Result};

/// Source extensions compiled with the C++ driver.
pub const CXX_EXTENSIONS: &[&str] = &["cc", "cpp", "cxx"];

/// Everything project-specific the generic adapter needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectDescriptor {
    /// Project identifier; key in the dataset's `results` map
    pub name: String,
    /// Project source tree
    pub source_dir: PathBuf,
    /// Directory holding benchmark sources and fixtures
    pub bench_dir: PathBuf,
    /// Scratch build directory (default `<source_dir>/build`)
    #[serde(default)]
    pub build_dir: Option<PathBuf>,
    /// Install prefix (default `<build_dir>/install`)
    #[serde(default)]
    pub install_dir: Option<PathBuf>,
    /// Extra reset steps run after the build directory is recreated
    #[serde(default)]
    pub clean: Vec<BuildStep>,
    /// Configure/build/install steps, run in order
    #[serde(default)]
    pub build: Vec<BuildStep>,
    /// Best-effort teardown steps (e.g. `make distclean` for in-tree builds)
    #[serde(default)]
    pub cleanup: Vec<BuildStep>,
    /// How benchmark sources are found
    #[serde(default)]
    pub discovery: Discovery,
    /// Extra arguments for every benchmark compile (e.g. `-std=c99`)
    #[serde(default)]
    pub compile_args: Vec<String>,
    /// Include directories (templated)
    #[serde(default)]
    pub include_dirs: Vec<String>,
    /// Extra arguments for every benchmark link (libraries, templated)
    #[serde(default)]
    pub link_args: Vec<String>,
    /// Query compile/link flags from an installed `.pc` file
    #[serde(default)]
    pub pkg_config: Option<PkgConfig>,
    /// Environment for benchmark execution (e.g. `LD_LIBRARY_PATH`)
    #[serde(default)]
    pub runtime_env: BTreeMap<String, String>,
    /// Files from `bench_dir` copied next to the running benchmarks
    #[serde(default)]
    pub fixtures: Vec<PathBuf>,
    /// Per-benchmark argument overrides, keyed by benchmark name
    #[serde(default)]
    pub bench_args: BTreeMap<String, BenchArgs>,
    /// Executables produced by the project build itself
    #[serde(default)]
    pub prebuilt: Vec<PrebuiltBench>,
    /// Output that means a benchmark is blocked waiting for input
    #[serde(default)]
    pub stall_markers: Vec<String>,
    /// Background server the benchmarks talk to
    #[serde(default)]
    pub service: Option<ServiceSpec>,
}

/// One external build command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildStep {
    /// Program to run (templated)
    pub program: String,
    /// Arguments (templated; `{flags}` alone splices tokens)
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory (templated, default `{source}`)
    #[serde(default)]
    pub cwd: Option<String>,
    /// Extra environment (values templated)
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Treat a non-zero exit as success
    #[serde(default)]
    pub ignore_failure: bool,
}

impl BuildStep {
    /// A step running `program` with `args` in the source directory.
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            env: BTreeMap::new(),
            ignore_failure: false,
        }
    }

    /// Concrete command for this step.
    #[must_use]
    pub fn command(&self, ctx: &TemplateContext) -> CommandSpec {
        let cwd = self
            .cwd
            .as_deref()
            .map_or_else(|| ctx.expand("{source}"), |c| ctx.expand(c));
        CommandSpec::new(ctx.expand(&self.program))
            .args(ctx.expand_args(&self.args))
            .cwd(cwd)
            .envs(ctx.expand_env(&self.env))
    }
}

/// Benchmark source discovery rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Discovery {
    /// File extensions without the dot
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Required file-stem suffix (e.g. `_bench`)
    #[serde(default)]
    pub suffix: Option<String>,
    /// Stems to skip
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Descend into subdirectories
    #[serde(default)]
    pub recursive: bool,
}

fn default_extensions() -> Vec<String> {
    vec!["c".to_string()]
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            suffix: None,
            exclude: Vec::new(),
            recursive: false,
        }
    }
}

impl Discovery {
    /// True if `path` names a benchmark source under these rules.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return false;
        };
        self.extensions.iter().any(|e| e == ext)
            && self.suffix.as_deref().map_or(true, |s| stem.ends_with(s))
            && !self.exclude.iter().any(|x| x == stem)
    }

    /// Matching source files under `dir`, sorted by path.
    ///
    /// Files whose stem repeats an earlier match are dropped so every
    /// benchmark name is unique.
    #[must_use]
    pub fn discover(&self, dir: &Path) -> Vec<PathBuf> {
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(if self.recursive { usize::MAX } else { 1 })
            .sort_by_file_name();
        let mut found: Vec<PathBuf> = walker
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file() && self.matches(e.path()))
            .map(walkdir::DirEntry::into_path)
            .collect();
        found.sort();

        let mut seen = std::collections::HashSet::new();
        found.retain(|p| {
            let stem = p.file_stem().map(|s| s.to_string_lossy().into_owned());
            let fresh = stem.is_some_and(|s| seen.insert(s));
            if !fresh {
                tracing::warn!(path = %p.display(), "duplicate benchmark name, skipping");
            }
            fresh
        });
        found
    }
}

/// `pkg-config` lookup against the freshly installed tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PkgConfig {
    /// Package name (e.g. `yaml-0.1`)
    pub package: String,
    /// Ask for static link flags
    #[serde(default, rename = "static")]
    pub static_libs: bool,
}

/// Per-benchmark run overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchArgs {
    /// Extra arguments (templated)
    #[serde(default)]
    pub args: Vec<String>,
    /// Name recorded in the result instead of the benchmark name
    #[serde(default)]
    pub rename: Option<String>,
}

/// An executable the project build produces and that is measured as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrebuiltBench {
    /// Benchmark name
    pub name: String,
    /// Path to the executable (templated)
    pub path: String,
}

/// A long-lived server started before the benchmarks run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSpec {
    /// Server program (templated)
    pub program: String,
    /// Server arguments (templated)
    #[serde(default)]
    pub args: Vec<String>,
    /// TCP port on 127.0.0.1 that signals readiness
    pub port: u16,
    /// How long to wait for the port to accept connections
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
}

const fn default_startup_timeout() -> u64 {
    10
}

/// Absolute directories of one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    /// Project sources
    pub source: PathBuf,
    /// Benchmark sources and fixtures
    pub bench: PathBuf,
    /// Scratch build directory, removed after every run
    pub build: PathBuf,
    /// Install prefix, removed after every run
    pub install: PathBuf,
}

impl ProjectDescriptor {
    /// Minimal descriptor with default layout and no build steps.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        source_dir: impl Into<PathBuf>,
        bench_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            source_dir: source_dir.into(),
            bench_dir: bench_dir.into(),
            build_dir: None,
            install_dir: None,
            clean: Vec::new(),
            build: Vec::new(),
            cleanup: Vec::new(),
            discovery: Discovery::default(),
            compile_args: Vec::new(),
            include_dirs: Vec::new(),
            link_args: Vec::new(),
            pkg_config: None,
            runtime_env: BTreeMap::new(),
            fixtures: Vec::new(),
            bench_args: BTreeMap::new(),
            prebuilt: Vec::new(),
            stall_markers: Vec::new(),
            service: None,
        }
    }

    /// Resolve directories against `root`.
    #[must_use]
    pub fn layout(&self, root: &Path) -> ProjectLayout {
        let source = root.join(&self.source_dir);
        let bench = root.join(&self.bench_dir);
        let build = self
            .build_dir
            .as_ref()
            .map_or_else(|| source.join("build"), |b| root.join(b));
        let install = self
            .install_dir
            .as_ref()
            .map_or_else(|| build.join("install"), |i| root.join(i));
        ProjectLayout {
            source,
            bench,
            build,
            install,
        }
    }

    /// Check the descriptor is safe to run.
    ///
    /// Build and install trees are deleted after every run, so neither may
    /// be (or contain) the source or benchmark tree.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] describing the first problem found.
    pub fn validate(&self, root: &Path) -> Result<()> {
        if self.name.is_empty() || self.name.contains(['/', '\\']) || self.name.starts_with('.') {
            return Err(Error::Config(format!(
                "invalid project name '{}'",
                self.name
            )));
        }
        let layout = self.layout(root);
        for (label, scratch) in [("build_dir", &layout.build), ("install_dir", &layout.install)] {
            for (kind, tree) in [("source_dir", &layout.source), ("bench_dir", &layout.bench)] {
                if tree.starts_with(scratch) {
                    return Err(Error::Config(format!(
                        "project '{}': {label} {} would delete {kind} {}",
                        self.name,
                        scratch.display(),
                        tree.display()
                    )));
                }
            }
        }
        if let Some(service) = &self.service {
            if service.port == 0 {
                return Err(Error::Config(format!(
                    "project '{}': service port must be non-zero",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_layout_defaults() {
        let d = ProjectDescriptor::new("cJSON", "dataset/cJSON", "dataset-bench/cJSON");
        let l = d.layout(Path::new("/work"));
        assert_eq!(l.source, PathBuf::from("/work/dataset/cJSON"));
        assert_eq!(l.build, PathBuf::from("/work/dataset/cJSON/build"));
        assert_eq!(l.install, PathBuf::from("/work/dataset/cJSON/build/install"));
        assert!(d.validate(Path::new("/work")).is_ok());
    }

    #[test]
    fn test_build_dir_may_not_contain_source() {
        let mut d = ProjectDescriptor::new("redis", "dataset/redis", "dataset-bench/redis");
        d.build_dir = Some(PathBuf::from("dataset/redis"));
        assert!(d.validate(Path::new("/work")).is_err());

        d.build_dir = Some(PathBuf::from("dataset"));
        assert!(d.validate(Path::new("/work")).is_err());

        d.build_dir = Some(PathBuf::from("dataset/redis-build"));
        assert!(d.validate(Path::new("/work")).is_ok());
    }

    #[test]
    fn test_bad_names_rejected() {
        for name in ["", "a/b", ".hidden"] {
            let d = ProjectDescriptor::new(name, "src", "bench");
            assert!(d.validate(Path::new("/work")).is_err(), "{name:?}");
        }
    }

    #[test]
    fn test_discovery_rules() {
        let rules = Discovery {
            extensions: vec!["c".into(), "cpp".into()],
            suffix: Some("_bench".into()),
            exclude: vec!["broken_bench".into()],
            recursive: false,
        };
        assert!(rules.matches(Path::new("x/list_bench.c")));
        assert!(rules.matches(Path::new("x/graph_bench.cpp")));
        assert!(!rules.matches(Path::new("x/list.c")));
        assert!(!rules.matches(Path::new("x/list_bench.h")));
        assert!(!rules.matches(Path::new("x/broken_bench.c")));
    }

    #[test]
    fn test_discover_sorted_and_recursive() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("benchmarks")).unwrap();
        for f in ["b_bench.c", "a_bench.c", "README.md", "benchmarks/c_bench.c"] {
            fs::write(dir.path().join(f), "").unwrap();
        }

        let flat = Discovery::default().discover(dir.path());
        let names: Vec<_> = flat.iter().map(|p| p.file_name().unwrap().to_owned()).collect();
        assert_eq!(names, vec!["a_bench.c", "b_bench.c"]);

        let deep = Discovery {
            recursive: true,
            ..Discovery::default()
        }
        .discover(dir.path());
        assert_eq!(deep.len(), 3);
    }

    #[test]
    fn test_descriptor_from_toml() {
        let d: ProjectDescriptor = toml::from_str(
            r#"
            name = "c-ares"
            source_dir = "dataset/c-ares"
            bench_dir = "dataset/c-ares/test"
            build_dir = "dataset/c-ares-build"
            link_args = ["-L{build}/lib", "-lcares", "-lpthread"]
            pkg_config = { package = "libcares", static = true }
            build = [
              { program = "cmake", args = ["-DCMAKE_C_FLAGS={flags}", "{source}"], cwd = "{build}" },
            ]

            [discovery]
            exclude = ["ares-test-init"]

            [bench_args.adig]
            args = ["localhost"]
            rename = "adig_localhost"
            "#,
        )
        .unwrap();
        assert_eq!(d.name, "c-ares");
        assert!(d.pkg_config.as_ref().unwrap().static_libs);
        assert_eq!(d.bench_args["adig"].rename.as_deref(), Some("adig_localhost"));
        assert_eq!(d.discovery.extensions, vec!["c"]);
        assert_eq!(d.build.len(), 1);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let r: std::result::Result<ProjectDescriptor, _> = toml::from_str(
            r#"
            name = "x"
            source_dir = "a"
            bench_dir = "b"
            colour = "blue"
            "#,
        );
        assert!(r.is_err());
    }
}
