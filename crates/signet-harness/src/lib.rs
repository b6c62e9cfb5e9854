#![forbid(unsafe_code)]

//! Stress harness for `signet-core` events.
//!
//! Drives one shared event from several threads with seeded, weighted
//! operation streams and reports whether the final live connection count
//! matches the operation balance.
//!
//! ```
//! use signet_harness::{StressConfig, run_stress};
//!
//! let config = StressConfig::default().with_threads(2).with_ops_per_thread(50);
//! let report = run_stress(&config).unwrap();
//! assert!(report.is_consistent());
//! ```

pub mod config;
pub mod stress;

pub use config::{DEFAULT_SEED, HarnessError, StressConfig};
pub use stress::{StressReport, run_stress};
