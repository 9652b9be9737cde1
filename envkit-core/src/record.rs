//! Snapshots of values for logging.
//!
//! [`Registry::record`](crate::Registry::record) returns a [`Record`] with one
//! scalar per value and its error flags:
//!
//! ```rust
//! use envkit_core::{record::RecordValue, ConstrConfig, Registry};
//!
//! let mut registry = Registry::new();
//! registry.add_constrained(ConstrConfig::new(2.0).name("water"))?;
//!
//! let mut record = registry.record()?;
//! record.insert("episode", RecordValue::Scalar(1.0));
//! assert_eq!(record.get_scalar("water")?, 2.0);
//! assert_eq!(record.get_array1("water/errors")?, vec![0.0, 0.0]);
//! # Ok::<(), anyhow::Error>(())
//! ```
mod base;

pub use base::{Record, RecordValue};
