//! Descriptor-driven project adapter
//!
//! One [`ProjectAdapter::run`] performs a full cycle for one project under
//! one flag set:
//!
//! 1. verify the source, benchmark and fixture paths
//! 2. reset the build tree and run the clean steps
//! 3. run the project's build steps with the flags applied
//! 4. compile and link every discovered benchmark (in parallel)
//! 5. execute each benchmark once as warm-up, then `runs` timed times
//! 6. write the records to `<results_dir>/<project>/results.json`
//!
//! Build and install trees are removed on every exit path.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use super::{
    Adapter, BuildStep, ProjectDescriptor, ProjectLayout, ServiceGuard, TemplateContext,
    CXX_EXTENSIONS,
};
use crate::dataset::{write_project_result, BenchmarkRecord, ProjectResult};
use crate::flags::FlagSet;
use crate::process::{self, CommandOutput, CommandSpec};
use crate::{Error, Result, Severity};

/// Sub-directory of the build tree holding benchmark objects and executables.
const BENCH_BIN_DIR: &str = "bench-bin";
/// Sub-directory of the build tree benchmarks run in.
const RUN_DIR: &str = "bench-run";

/// Settings shared by every project adapter of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSettings {
    /// C compiler driver
    pub cc: String,
    /// C++ compiler driver
    pub cxx: String,
    /// Root directory result documents are written under
    pub results_dir: PathBuf,
    /// Limit for each build step and benchmark compile
    pub build_timeout: Option<Duration>,
    /// Limit for each benchmark execution
    pub bench_timeout: Option<Duration>,
    /// Parallelism for builds and benchmark compiles
    pub jobs: usize,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            cc: "clang".to_string(),
            cxx: "clang++".to_string(),
            results_dir: PathBuf::from("results"),
            build_timeout: None,
            bench_timeout: None,
            jobs: num_cpus::get(),
        }
    }
}

/// A benchmark executable ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BenchBinary {
    name: String,
    path: PathBuf,
}

/// Adapter for a project described by a [`ProjectDescriptor`].
#[derive(Debug, Clone)]
pub struct ProjectAdapter {
    descriptor: ProjectDescriptor,
    root: PathBuf,
    settings: AdapterSettings,
}

impl ProjectAdapter {
    /// Adapter resolving the descriptor's paths against `root`.
    #[must_use]
    pub fn new(descriptor: ProjectDescriptor, root: impl Into<PathBuf>, settings: AdapterSettings) -> Self {
        Self {
            descriptor,
            root: root.into(),
            settings,
        }
    }

    /// The descriptor this adapter drives.
    #[must_use]
    pub const fn descriptor(&self) -> &ProjectDescriptor {
        &self.descriptor
    }

    /// Absolute project directories.
    #[must_use]
    pub fn layout(&self) -> ProjectLayout {
        self.descriptor.layout(&self.root)
    }

    fn project(&self) -> &str {
        &self.descriptor.name
    }

    fn check_sources(&self, layout: &ProjectLayout) -> Result<()> {
        for dir in [&layout.source, &layout.bench] {
            if !dir.is_dir() {
                return Err(Error::SourceMissing {
                    project: self.project().to_string(),
                    path: dir.clone(),
                });
            }
        }
        for fixture in &self.descriptor.fixtures {
            let path = layout.bench.join(fixture);
            if !path.exists() {
                return Err(Error::FixtureMissing {
                    project: self.project().to_string(),
                    path,
                });
            }
        }
        Ok(())
    }

    fn run_step(&self, step: &BuildStep, ctx: &TemplateContext) -> Result<()> {
        let spec = step.command(ctx).timeout(self.settings.build_timeout);
        tracing::debug!(project = self.project(), command = %spec, "build step");
        let out = process::run(&spec)?;
        if out.success() || step.ignore_failure {
            return Ok(());
        }
        Err(Error::BuildSystem {
            project: self.project().to_string(),
            command: spec.to_string(),
            status: out.describe_status(),
            stdout: out.stdout,
            stderr: out.stderr,
        })
    }

    fn clean(&self, layout: &ProjectLayout, ctx: &TemplateContext) -> Result<()> {
        remove_tree(&layout.build)?;
        remove_tree(&layout.install)?;
        fs::create_dir_all(&layout.build)?;
        fs::create_dir_all(&layout.install)?;
        for step in &self.descriptor.clean {
            self.run_step(step, ctx)?;
        }
        Ok(())
    }

    /// Compile and link flags reported by `pkg-config` for the installed tree.
    fn pkg_config_flags(&self, layout: &ProjectLayout) -> Result<(Vec<String>, Vec<String>)> {
        let Some(pc) = &self.descriptor.pkg_config else {
            return Ok((Vec::new(), Vec::new()));
        };
        let search = [
            layout.install.join("lib").join("pkgconfig"),
            layout.install.join("lib64").join("pkgconfig"),
            layout.install.join("share").join("pkgconfig"),
        ]
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(":");

        let query = |what: &str| -> Result<Vec<String>> {
            let mut spec = CommandSpec::new("pkg-config")
                .arg(what)
                .env("PKG_CONFIG_PATH", &search)
                .timeout(self.settings.build_timeout);
            if pc.static_libs {
                spec = spec.arg("--static");
            }
            spec = spec.arg(&pc.package);
            let out = process::run(&spec)?;
            if !out.success() {
                return Err(Error::BuildSystem {
                    project: self.project().to_string(),
                    command: spec.to_string(),
                    status: out.describe_status(),
                    stdout: out.stdout,
                    stderr: out.stderr,
                });
            }
            Ok(out.stdout.split_whitespace().map(str::to_string).collect())
        };
        Ok((query("--cflags")?, query("--libs")?))
    }

    /// Name a benchmark is recorded under, after any rename.
    fn record_name<'a>(&'a self, bench: &'a str) -> &'a str {
        self.descriptor
            .bench_args
            .get(bench)
            .and_then(|o| o.rename.as_deref())
            .unwrap_or(bench)
    }

    fn driver_for(&self, source: &Path) -> &str {
        let cxx = source
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| CXX_EXTENSIONS.contains(&e));
        if cxx {
            &self.settings.cxx
        } else {
            &self.settings.cc
        }
    }

    /// Compile then link one benchmark source.
    fn build_bench(
        &self,
        source: &Path,
        out_dir: &Path,
        flags: &FlagSet,
        ctx: &TemplateContext,
        pkg: &(Vec<String>, Vec<String>),
    ) -> Result<BenchBinary> {
        let name = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let driver = self.driver_for(source);
        let object = out_dir.join(format!("{name}.o"));
        let binary = out_dir.join(&name);

        let compile = CommandSpec::new(driver)
            .args(flags.tokens().iter().cloned())
            .args(ctx.expand_args(&self.descriptor.compile_args))
            .args(
                self.descriptor
                    .include_dirs
                    .iter()
                    .map(|d| format!("-I{}", ctx.expand(d))),
            )
            .args(pkg.0.iter().cloned())
            .arg("-c")
            .arg(source.display().to_string())
            .arg("-o")
            .arg(object.display().to_string())
            .cwd(out_dir)
            .timeout(self.settings.build_timeout);
        let out = process::run(&compile)?;
        if !out.success() {
            return Err(Error::Compile {
                bench: name,
                command: compile.to_string(),
                stderr: failure_text(&out),
            });
        }

        let link = CommandSpec::new(driver)
            .args(flags.tokens().iter().cloned())
            .arg(object.display().to_string())
            .arg("-o")
            .arg(binary.display().to_string())
            .args(ctx.expand_args(&self.descriptor.link_args))
            .args(pkg.1.iter().cloned())
            .cwd(out_dir)
            .timeout(self.settings.build_timeout);
        let out = process::run(&link)?;
        if !out.success() {
            return Err(Error::Link {
                bench: name,
                command: link.to_string(),
                stderr: failure_text(&out),
            });
        }

        Ok(BenchBinary { name, path: binary })
    }

    /// Build every discovered benchmark; failed ones are logged and skipped.
    fn build_benches(
        &self,
        layout: &ProjectLayout,
        flags: &FlagSet,
        ctx: &TemplateContext,
    ) -> Result<Vec<BenchBinary>> {
        let pkg = self.pkg_config_flags(layout)?;
        let out_dir = layout.build.join(BENCH_BIN_DIR);
        fs::create_dir_all(&out_dir)?;

        let sources = self.descriptor.discovery.discover(&layout.bench);
        tracing::debug!(project = self.project(), sources = sources.len(), "benchmark sources discovered");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.jobs.max(1))
            .build()
            .map_err(|e| Error::Config(format!("cannot create compile pool: {e}")))?;
        let built: Vec<Result<BenchBinary>> = pool.install(|| {
            sources
                .par_iter()
                .map(|src| self.build_bench(src, &out_dir, flags, ctx, &pkg))
                .collect()
        });

        let mut binaries = Vec::with_capacity(built.len());
        for result in built {
            match result {
                Ok(bin) => binaries.push(bin),
                Err(e) if e.severity() == Severity::LocalSkip => {
                    tracing::warn!(project = self.project(), error = %e, "skipping benchmark");
                }
                Err(e) => return Err(e),
            }
        }

        for prebuilt in &self.descriptor.prebuilt {
            let path = PathBuf::from(ctx.expand(&prebuilt.path));
            if path.is_file() {
                binaries.push(BenchBinary {
                    name: prebuilt.name.clone(),
                    path,
                });
            } else {
                tracing::warn!(
                    project = self.project(),
                    bench = %prebuilt.name,
                    path = %path.display(),
                    "prebuilt benchmark missing, skipping"
                );
            }
        }

        let mut seen = HashSet::new();
        binaries.retain(|bin| {
            let name = self.record_name(&bin.name);
            let fresh = seen.insert(name.to_string());
            if !fresh {
                tracing::warn!(
                    project = self.project(),
                    bench = %bin.name,
                    path = %bin.path.display(),
                    "duplicate benchmark name, skipping"
                );
            }
            fresh
        });
        Ok(binaries)
    }

    /// One execution of a benchmark; any failure is a [`Error::Runtime`].
    fn execute(&self, spec: &CommandSpec, bench: &str) -> Result<Duration> {
        let out = process::run(spec).map_err(|e| Error::Runtime {
            bench: bench.to_string(),
            reason: e.to_string(),
        })?;
        if let Some(marker) = self
            .descriptor
            .stall_markers
            .iter()
            .find(|m| out.mentions(m))
        {
            return Err(Error::Runtime {
                bench: bench.to_string(),
                reason: format!("stalled waiting for input ({marker:?})"),
            });
        }
        if !out.success() {
            return Err(Error::Runtime {
                bench: bench.to_string(),
                reason: out.describe_status(),
            });
        }
        Ok(out.elapsed)
    }

    /// Warm-up run followed by `runs` timed runs.
    fn measure(
        &self,
        bin: &BenchBinary,
        run_dir: &Path,
        runs: usize,
        ctx: &TemplateContext,
    ) -> Result<BenchmarkRecord> {
        let overrides = self.descriptor.bench_args.get(&bin.name);
        let record_name = self.record_name(&bin.name).to_string();
        let spec = CommandSpec::new(bin.path.display().to_string())
            .args(overrides.map(|o| ctx.expand_args(&o.args)).unwrap_or_default())
            .envs(ctx.expand_env(&self.descriptor.runtime_env))
            .cwd(run_dir)
            .timeout(self.settings.bench_timeout);

        self.execute(&spec, &record_name)?;
        let timings = (0..runs)
            .map(|_| self.execute(&spec, &record_name).map(|d| d.as_secs_f64()))
            .collect::<Result<Vec<f64>>>()?;

        let size = fs::metadata(&bin.path)
            .map_err(|e| Error::Runtime {
                bench: record_name.clone(),
                reason: format!("cannot stat executable: {e}"),
            })?
            .len();
        BenchmarkRecord::from_timings(&record_name, size, &timings, runs).ok_or_else(|| {
            Error::Runtime {
                bench: record_name.clone(),
                reason: format!("expected {runs} timings, got {}", timings.len()),
            }
        })
    }

    fn run_benches(
        &self,
        layout: &ProjectLayout,
        binaries: &[BenchBinary],
        runs: usize,
        ctx: &TemplateContext,
    ) -> Result<ProjectResult> {
        let run_dir = layout.build.join(RUN_DIR);
        fs::create_dir_all(&run_dir)?;
        for fixture in &self.descriptor.fixtures {
            let target = run_dir.join(fixture.file_name().unwrap_or(fixture.as_os_str()));
            fs::copy(layout.bench.join(fixture), target)?;
        }

        let _service = self
            .descriptor
            .service
            .as_ref()
            .map(|spec| ServiceGuard::start(self.project(), spec, ctx))
            .transpose()?;

        let mut records = Vec::with_capacity(binaries.len());
        for bin in binaries {
            let start = Instant::now();
            match self.measure(bin, &run_dir, runs, ctx) {
                Ok(record) => {
                    tracing::debug!(
                        project = self.project(),
                        bench = %record.name,
                        seconds = record.mean_seconds,
                        elapsed_ms = start.elapsed().as_millis(),
                        "benchmark measured"
                    );
                    records.push(record);
                }
                Err(e) => tracing::warn!(project = self.project(), error = %e, "skipping benchmark"),
            }
        }
        Ok(ProjectResult::new(records))
    }
}

impl Adapter for ProjectAdapter {
    fn name(&self) -> &str {
        self.project()
    }

    fn run(&self, flags: &FlagSet, runs: usize) -> Result<PathBuf> {
        if runs == 0 {
            return Err(Error::Config("timed run count must be at least 1".to_string()));
        }
        let layout = self.layout();
        self.check_sources(&layout)?;

        let ctx = TemplateContext::new(
            &layout,
            &self.settings.cc,
            &self.settings.cxx,
            flags,
            self.settings.jobs.max(1),
        );
        let _artifacts = ArtifactGuard {
            adapter: self,
            layout: &layout,
            ctx: &ctx,
        };

        self.clean(&layout, &ctx)?;
        for step in &self.descriptor.build {
            self.run_step(step, &ctx)?;
        }
        let binaries = self.build_benches(&layout, flags, &ctx)?;
        let result = self.run_benches(&layout, &binaries, runs, &ctx)?;

        tracing::info!(
            project = self.project(),
            benches = result.len(),
            skipped = binaries.len().saturating_sub(result.len()),
            "project measured"
        );
        write_project_result(&self.settings.results_dir, self.project(), &result)
    }
}

/// Tears down build artifacts when an adapter run ends, however it ends.
struct ArtifactGuard<'a> {
    adapter: &'a ProjectAdapter,
    layout: &'a ProjectLayout,
    ctx: &'a TemplateContext,
}

impl Drop for ArtifactGuard<'_> {
    fn drop(&mut self) {
        for step in &self.adapter.descriptor.cleanup {
            if let Err(e) = self.adapter.run_step(step, self.ctx) {
                tracing::debug!(project = self.adapter.project(), error = %e, "cleanup step failed");
            }
        }
        for dir in [&self.layout.install, &self.layout.build] {
            if let Err(e) = remove_tree(dir) {
                tracing::warn!(path = %dir.display(), error = %e, "cannot remove build artifacts");
            }
        }
    }
}

fn remove_tree(dir: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn failure_text(out: &CommandOutput) -> String {
    if out.timed_out {
        return out.describe_status();
    }
    if out.stderr.trim().is_empty() {
        out.stdout.clone()
    } else {
        out.stderr.clone()
    }
}
