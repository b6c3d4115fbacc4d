//! Dataset schema, result collection and persistence
//!
//! ## Schema Overview
//!
//! ```text
//! Dataset (JSON array)
//!   └──< DatasetEntry { flags, results }
//!           └── results: project ──> ProjectResult (JSON array)
//!                                      └──< BenchmarkRecord { bench, bytes, seconds }
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use flagbench::dataset::{BenchmarkRecord, DatasetEntry, ProjectResult};
//! use std::collections::BTreeMap;
//!
//! let record = BenchmarkRecord::from_timings("parse_bench", 18_432, &[0.010, 0.012, 0.011], 3)
//!     .expect("three timings for three runs");
//!
//! let mut results = BTreeMap::new();
//! results.insert("cJSON".to_string(), ProjectResult::new(vec![record]));
//! let entry = DatasetEntry::new("-O2 -flto".parse().unwrap(), results);
//! assert!(entry.covers(&["cJSON"]));
//! ```

mod collector;
mod record;
mod store;

pub use collector::{write_project_result, ResultCollector, RESULT_FILE_NAME};
pub use record::{BenchmarkRecord, DatasetEntry, ProjectResult, ReducedEntry};
pub use store::DatasetStore;
