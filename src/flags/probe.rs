//! Flag-set validation against a trivial probe program

use std::fs;
use std::time::Duration;

use super::FlagSet;
use crate::process::{self, CommandSpec};
use crate::Result;

/// Source compiled by [`CompilerProbe`].
pub const PROBE_SOURCE: &str = "int main() { return 0; }\n";

/// Decides whether a candidate flag set is usable.
pub trait FlagProbe {
    /// `Ok(false)` rejects the candidate and triggers a resample.
    ///
    /// # Errors
    ///
    /// An error means the probe itself could not run (e.g. the compiler is
    /// missing), which no amount of resampling fixes.
    fn accepts(&self, flags: &FlagSet) -> Result<bool>;
}

/// Accepts every flag set. Useful for dry runs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl FlagProbe for AcceptAll {
    fn accepts(&self, _flags: &FlagSet) -> Result<bool> {
        Ok(true)
    }
}

/// Compiles [`PROBE_SOURCE`] with the candidate flags.
#[derive(Debug, Clone)]
pub struct CompilerProbe {
    cc: String,
    timeout: Option<Duration>,
}

impl CompilerProbe {
    /// Probe using compiler `cc`.
    #[must_use]
    pub fn new(cc: impl Into<String>) -> Self {
        Self {
            cc: cc.into(),
            timeout: None,
        }
    }

    /// Bound each probe compile.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl FlagProbe for CompilerProbe {
    fn accepts(&self, flags: &FlagSet) -> Result<bool> {
        let scratch = tempfile::Builder::new().prefix("flagbench-probe").tempdir()?;
        let source = scratch.path().join("flag_test.c");
        let object = scratch.path().join("flag_test.o");
        fs::write(&source, PROBE_SOURCE)?;

        let spec = CommandSpec::new(&self.cc)
            .arg("-c")
            .arg(source.to_string_lossy())
            .arg("-o")
            .arg(object.to_string_lossy())
            .args(flags.tokens().iter().cloned())
            .timeout(self.timeout);
        let out = process::run(&spec)?;
        if !out.success() {
            tracing::debug!(
                flags = %flags,
                status = %out.describe_status(),
                stderr = %out.stderr.trim(),
                "probe rejected flag set"
            );
        }
        Ok(out.success())
    }
}
