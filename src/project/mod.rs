//! Project adapters
//!
//! An [`Adapter`] takes one third-party project through
//! clean → build → benchmark-compile → benchmark-run → result write for a
//! given flag set. [`ProjectAdapter`] implements that cycle once, driven by
//! a declarative [`ProjectDescriptor`]; per-project quirks live in data.
//!
//! ## Failure containment
//!
//! | failure                               | effect                         |
//! |---------------------------------------|--------------------------------|
//! | benchmark compile/link/run failure    | benchmark omitted, run goes on |
//! | build step or service startup failure | `Err`, iteration discarded     |
//! | missing source tree or fixture        | `Err`, whole run stops         |

mod adapter;
mod descriptor;
mod service;
mod template;

use std::path::PathBuf;

use crate::flags::FlagSet;
use crate::Result;

pub use adapter::{AdapterSettings, ProjectAdapter};
pub use descriptor::{
    BenchArgs, BuildStep, Discovery, PkgConfig, PrebuiltBench, ProjectDescriptor, ProjectLayout,
    ServiceSpec, CXX_EXTENSIONS,
};
pub use service::ServiceGuard;
pub use template::{TemplateContext, FLAGS_PLACEHOLDER};

/// Builds and benchmarks one project under a flag set.
pub trait Adapter: Send + Sync {
    /// Project identifier; key in the dataset's `results` map.
    fn name(&self) -> &str;

    /// Run a full cycle and return the path of the written result document.
    ///
    /// The document is written even when every benchmark was skipped.
    ///
    /// # Errors
    ///
    /// Build-system failures are iteration-fatal; missing sources or
    /// fixtures and IO failures are run-fatal. See [`crate::Severity`].
    fn run(&self, flags: &FlagSet, runs: usize) -> Result<PathBuf>;
}
