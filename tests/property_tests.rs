//! Property-based tests for flagbench
//!
//! - Sampled flag sets respect the category table
//! - Seeds fully determine samples
//! - Dataset documents survive a write/read cycle
//! - Run with ProptestConfig::with_cases(100)

use std::collections::{BTreeMap, HashSet};
use std::num::NonZeroUsize;

use flagbench::dataset::{BenchmarkRecord, DatasetEntry, DatasetStore, ProjectResult};
use flagbench::flags::{category_of, FlagSampler, FlagSet, OPT_LEVEL};
use proptest::prelude::*;

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Any finite, non-negative duration.
fn arb_seconds() -> impl Strategy<Value = f64> {
    use proptest::num::f64 as float;
    float::POSITIVE | float::NORMAL | float::SUBNORMAL | float::ZERO
}

fn arb_record() -> impl Strategy<Value = BenchmarkRecord> {
    ("[a-z_]{1,12}", 0u64..10_000_000, arb_seconds())
        .prop_map(|(name, bytes, seconds)| BenchmarkRecord::new(name, bytes, seconds))
}

fn arb_entry() -> impl Strategy<Value = DatasetEntry> {
    (
        any::<u64>(),
        proptest::collection::btree_map(
            "[a-z]{1,8}",
            proptest::collection::vec(arb_record(), 0..4),
            1..4,
        ),
    )
        .prop_map(|(seed, projects)| {
            let results: BTreeMap<String, ProjectResult> = projects
                .into_iter()
                .map(|(name, records)| (name, ProjectResult::new(records)))
                .collect();
            DatasetEntry::new(FlagSampler::default().sample_seeded(seed), results)
        })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every sample has exactly one optimization level
    #[test]
    fn prop_single_optimization_level(seed in any::<u64>()) {
        let flags = FlagSampler::default().sample_seeded(seed);
        let levels = flags
            .tokens()
            .iter()
            .filter(|t| category_of(t).is_some_and(|c| c.name == OPT_LEVEL))
            .count();
        prop_assert_eq!(levels, 1);
    }

    /// No category contributes more than one token
    #[test]
    fn prop_one_token_per_category(seed in any::<u64>()) {
        let flags = FlagSampler::default().sample_seeded(seed);
        let mut seen = HashSet::new();
        for category in flags.categories() {
            let category = category.expect("sampled token is in the table");
            prop_assert!(seen.insert(category), "category {} drawn twice", category);
        }
    }

    /// The cap holds, plus at most the prepended optimization level
    #[test]
    fn prop_respects_cap(seed in any::<u64>(), cap in 1usize..12) {
        let sampler = FlagSampler::new(NonZeroUsize::new(cap));
        let flags = sampler.sample_seeded(seed);
        prop_assert!(flags.len() <= cap + 1);
    }

    /// Same seed, same flag set
    #[test]
    fn prop_seed_determinism(seed in any::<u64>()) {
        let sampler = FlagSampler::default();
        prop_assert_eq!(sampler.sample_seeded(seed), sampler.sample_seeded(seed));
    }

    /// Parsing the joined form gives back the same flag set
    #[test]
    fn prop_flags_text_stable(seed in any::<u64>()) {
        let flags = FlagSampler::default().sample_seeded(seed);
        let reparsed: FlagSet = flags.to_string().parse().unwrap();
        prop_assert_eq!(reparsed, flags);
    }

    /// A written dataset reads back with the same entries
    #[test]
    fn prop_dataset_persists(entries in proptest::collection::vec(arb_entry(), 1..4)) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ml_dataset.json");
        let mut store = DatasetStore::create(&path);
        for entry in &entries {
            store.append(entry.clone()).unwrap();
        }

        let loaded = DatasetStore::load(&path).unwrap();
        prop_assert_eq!(loaded, entries);
    }

    /// The mean uses exactly `runs` timings
    #[test]
    fn prop_mean_of_exact_runs(timings in proptest::collection::vec(0.0f64..10.0, 1..8)) {
        let runs = timings.len();
        let record = BenchmarkRecord::from_timings("b", 1, &timings, runs).unwrap();
        #[allow(clippy::cast_precision_loss)]
        let expected = timings.iter().sum::<f64>() / runs as f64;
        prop_assert!((record.mean_seconds - expected).abs() < 1e-12);
        prop_assert!(BenchmarkRecord::from_timings("b", 1, &timings, runs + 1).is_none());
    }
}
