//!
//! # Tracker
//!
//! Durable identity registry for a migration between two content stores. There is one
//! [`Tracker`] per entity type, mapping each source id to the identifiers the target store
//! assigned to it, plus the source-side watermark (usually `updated_at`) observed when the
//! record was last written.
//!
//! The registry is what makes re-running a migration idempotent: absence of an entry is proof
//! that the record was never created on the target, and a differing watermark marks it stale.
//!
//! Other entity types never touch a tracker directly; they receive a [`Resolver`] built from an
//! immutable [`RegistryView`] snapshot and translate their source references through it.
//!
//! ```
//! use mg_tracker::{RegistryEntry, RegistryRead, Resolver, Tracker};
//!
//! let mut tracker = Tracker::empty("tag", "/tmp/tag/registry.json");
//! tracker
//! 	.register(RegistryEntry::new(7, "doc-7", Some("2024-01-01T00:00:00Z".to_string())))
//! 	.unwrap();
//!
//! assert!(tracker.is_stale(7, Some("2024-02-01T00:00:00Z")));
//!
//! let tags = Resolver::new(tracker.snapshot());
//! assert_eq!(tags.resolve_one(7).unwrap().as_str(), "doc-7");
//! assert!(tags.resolve_many([7, 8]).is_err());
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod entry;
mod error;
mod resolver;
mod tracker;

pub use entry::{RESERVED_KEYS, RegistryEntry, SecondaryId, SecondaryIds, SourceId, TargetId};
pub use error::TrackerError;
pub use resolver::{DependencyUnresolved, Resolver};
pub use tracker::{RegistryRead, RegistryView, Tracker};
