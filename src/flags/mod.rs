//! Flag sampling
//!
//! A [`FlagSampler`] draws a random [`FlagSet`] from the static
//! [`FLAG_TABLE`]. Randomness always comes from a generator the caller
//! passes in, so a seed fully determines the result.
//!
//! ## Usage
//!
//! ```rust
//! use flagbench::flags::{AcceptAll, FlagSampler};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let sampler = FlagSampler::default();
//! let mut rng = StdRng::seed_from_u64(7);
//! let flags = sampler.sample_valid(&mut rng, &AcceptAll)?;
//! assert!(flags.has_optimization_level());
//! assert_eq!(flags, FlagSampler::default().sample_seeded(7));
//! # Ok::<(), flagbench::Error>(())
//! ```

mod probe;
mod table;

pub use probe::{AcceptAll, CompilerProbe, FlagProbe, PROBE_SOURCE};
pub use table::{category, category_of, opt_levels, FlagCategory, FLAG_TABLE, OPT_LEVEL};

use std::convert::Infallible;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Probability that any one category contributes a flag.
pub const INCLUDE_PROBABILITY: f64 = 0.40;

/// Default cap on the number of sampled tokens.
pub const DEFAULT_MAX_FLAGS: usize = 10;

/// Conventional separator between harness options and raw flags.
pub const FLAG_SEPARATOR: &str = "--";

/// Optimization level used when none could be drawn from the table.
const FALLBACK_OPT_LEVEL: &str = "-O2";

/// An ordered list of compiler flag tokens applied to every project.
///
/// Serialized as one space-joined string, e.g. `"-O2 -flto=thin"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FlagSet {
    tokens: Vec<String>,
}

impl FlagSet {
    /// Build a flag set from raw tokens.
    ///
    /// The `--` separator, empty tokens and repeated tokens are dropped;
    /// the first occurrence wins.
    #[must_use]
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for token in tokens {
            let token = token.as_ref().trim();
            if token.is_empty() || token == FLAG_SEPARATOR || out.iter().any(|t| t == token) {
                continue;
            }
            out.push(token.to_string());
        }
        Self { tokens: out }
    }

    /// The flag tokens, in order.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True if there are no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// True if some token is an optimization level (`-O*`).
    #[must_use]
    pub fn has_optimization_level(&self) -> bool {
        self.optimization_level().is_some()
    }

    /// The first optimization-level token, if any.
    #[must_use]
    pub fn optimization_level(&self) -> Option<&str> {
        self.tokens
            .iter()
            .map(String::as_str)
            .find(|t| is_opt_level(t))
    }

    /// Category of each token (`None` for tokens outside the table).
    pub fn categories(&self) -> impl Iterator<Item = Option<&'static str>> + '_ {
        self.tokens
            .iter()
            .map(|t| category_of(t).map(|c| c.name))
    }

    /// Tokens joined with single spaces.
    #[must_use]
    pub fn joined(&self) -> String {
        self.tokens.join(" ")
    }
}

fn is_opt_level(token: &str) -> bool {
    category_of(token).map_or(token.starts_with("-O"), |c| c.name == OPT_LEVEL)
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

impl FromStr for FlagSet {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_tokens(s.split_whitespace()))
    }
}

impl From<String> for FlagSet {
    fn from(s: String) -> Self {
        Self::from_tokens(s.split_whitespace())
    }
}

impl From<FlagSet> for String {
    fn from(flags: FlagSet) -> Self {
        flags.joined()
    }
}

/// Draws flag sets from [`FLAG_TABLE`].
#[derive(Debug, Clone, Copy)]
pub struct FlagSampler {
    max_flags: Option<NonZeroUsize>,
}

impl Default for FlagSampler {
    fn default() -> Self {
        Self {
            max_flags: NonZeroUsize::new(DEFAULT_MAX_FLAGS),
        }
    }
}

impl FlagSampler {
    /// Sampler with the given cap. `None` lets every category contribute.
    #[must_use]
    pub const fn new(max_flags: Option<NonZeroUsize>) -> Self {
        Self { max_flags }
    }

    /// The configured cap on drawn tokens.
    #[must_use]
    pub const fn max_flags(&self) -> Option<NonZeroUsize> {
        self.max_flags
    }

    /// Draw one candidate flag set.
    ///
    /// Categories are visited in a shuffled order; each is included with
    /// probability [`INCLUDE_PROBABILITY`] and contributes one uniformly
    /// chosen variant. Drawing stops at the cap. If no optimization level
    /// was drawn, one is prepended, so the result can exceed the cap by one.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> FlagSet {
        let mut order: Vec<&FlagCategory> = FLAG_TABLE.iter().collect();
        order.shuffle(rng);

        let mut chosen: Vec<String> = Vec::new();
        for cat in order {
            if !rng.gen_bool(INCLUDE_PROBABILITY) {
                continue;
            }
            if let Some(variant) = cat.variants.choose(rng) {
                chosen.push((*variant).to_string());
            }
            if self.max_flags.is_some_and(|cap| chosen.len() >= cap.get()) {
                break;
            }
        }

        if !chosen.iter().any(|t| is_opt_level(t)) {
            let level = opt_levels()
                .choose(rng)
                .copied()
                .unwrap_or(FALLBACK_OPT_LEVEL);
            chosen.insert(0, level.to_string());
        }

        FlagSet { tokens: chosen }
    }

    /// Draw one candidate from a fresh generator seeded with `seed`.
    #[must_use]
    pub fn sample_seeded(&self, seed: u64) -> FlagSet {
        let mut rng = StdRng::seed_from_u64(seed);
        self.sample(&mut rng)
    }

    /// Draw candidates until `probe` accepts one.
    ///
    /// There is no attempt limit: most flags are valid on their own, so
    /// rejection is rare.
    ///
    /// # Errors
    ///
    /// Propagates a probe failure (the probe could not run at all).
    pub fn sample_valid<R, P>(&self, rng: &mut R, probe: &P) -> Result<FlagSet>
    where
        R: Rng + ?Sized,
        P: FlagProbe + ?Sized,
    {
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            let candidate = self.sample(rng);
            if probe.accepts(&candidate)? {
                tracing::debug!(flags = %candidate, attempts, "sampled flag set");
                return Ok(candidate);
            }
            tracing::debug!(flags = %candidate, attempts, "flag set rejected by probe, resampling");
        }
    }
}
