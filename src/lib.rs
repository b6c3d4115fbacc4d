//! # Flagbench: Compiler-Flag Benchmark Dataset Generator
//!
//! Flagbench samples random compiler flag sets, rebuilds a roster of
//! third-party C/C++ projects under each set, compiles and times every
//! project's micro-benchmarks, and appends the measurements to a JSON
//! dataset used to train models that predict performance from flags.
//!
//! ## Design Principles
//!
//! - **All or nothing**: an entry is persisted only when every project
//!   produced a result under the same flag set
//! - **Contained failures**: a broken benchmark is skipped, a broken build
//!   discards the iteration, a missing source tree stops the run
//! - **Reproducible sampling**: the RNG is passed in, so a seed fixes the
//!   flag sequence
//! - **Bounded subprocesses**: every external command can be time-limited
//!   and is killed with its whole process group on expiry
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use flagbench::config::HarnessConfig;
//! use flagbench::dataset::{DatasetStore, ResultCollector};
//! use flagbench::orchestrator::Orchestrator;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let config = HarnessConfig::load("flagbench.toml")?;
//! let mut orchestrator = Orchestrator::new(
//!     config.adapters(),
//!     config.probe(),
//!     ResultCollector::new(config.results_path()),
//!     DatasetStore::open(config.dataset_path())?,
//! )
//! .with_sampler(config.sampler())
//! .with_limits(config.limits());
//!
//! let summary = orchestrator.run(&mut StdRng::seed_from_u64(42))?;
//! println!("{} entries persisted", summary.persisted);
//! # Ok::<(), flagbench::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod flags;
pub mod orchestrator;
pub mod process;
pub mod project;

pub use error::{Error, Result, Severity};
