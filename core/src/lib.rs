//!
//! # Migration core
//!
//! Drives the migration of a content catalogue from a source store to a target store, one entity
//! type at a time, so that it can be interrupted and re-run at will:
//!
//! - each entity type has a registry ([`mg_tracker::Tracker`]) of what was already migrated,
//!   which makes creates idempotent and tells stale records apart from unchanged ones;
//! - references between entity types are translated through [`Dependencies`] before anything
//!   is written, a record whose references can't be resolved is reported and skipped;
//! - writes go through the [`mg_batch::BatchScheduler`], with bounded concurrency, retries on
//!   transient failures and a graceful shutdown that never loses a completed write.
//!
//! An entity type is described by an [`EntityMapping`] and wired to its stores with an
//! [`EntityMigration`]; a [`MigrationPlan`] runs them in dependency order.

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

pub mod config;
pub mod interrupt;
pub mod logging;

mod dependencies;
mod driver;
mod error;
mod mapping;
mod plan;
mod report;
mod store;

pub use config::{BatchConfig, MigrationConfig};
pub use dependencies::Dependencies;
pub use driver::{classify, Classified, EntityMigration, PendingRecord};
pub use error::{ApiError, ConfigError, ItemError, MigrationError};
pub use mapping::{EntityMapping, SecondaryIdStrategy, DRAFT_ID, NUMERIC_ID, PUBLISHED_ID};
pub use plan::{MigrationPlan, MigrationStep};
pub use report::{FailureReport, MigrationReport, PlanReport};
pub use store::{PublicationStatus, SourceRecord, SourceStore, TargetRecord, TargetStore};
