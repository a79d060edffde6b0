use mg_batch::BatchStats;
use mg_tracker::SourceId;

use std::fmt;

use serde::Serialize;
use tracing::{error, info, warn};

/// A record that couldn't be migrated, with enough context to fix it by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
	pub source_id: SourceId,
	pub label: String,
	pub error: String,
}

/// Outcome of migrating one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
	pub entity: String,
	pub new: usize,
	pub stale: usize,
	pub unchanged: usize,
	pub processed: usize,
	pub succeeded: usize,
	pub failed: usize,
	pub interrupted: bool,
	pub failures: Vec<FailureReport>,
}

impl MigrationReport {
	pub(crate) fn new(entity: impl Into<String>, new: usize, stale: usize, unchanged: usize) -> Self {
		Self {
			entity: entity.into(),
			new,
			stale,
			unchanged,
			..Default::default()
		}
	}

	/// Folds in the outcome of one scheduler run, labelling failures through `describe`.
	pub(crate) fn absorb<T, E: fmt::Display>(
		&mut self,
		stats: BatchStats<T, E>,
		describe: impl Fn(&T) -> (SourceId, String),
	) {
		self.processed += stats.processed;
		self.succeeded += stats.succeeded;
		self.failed += stats.failed;
		self.interrupted |= stats.interrupted;

		self.failures
			.extend(stats.failures.into_iter().map(|failed| {
				let (source_id, label) = describe(failed.item.as_ref());
				FailureReport {
					source_id,
					label,
					error: failed.failure.to_string(),
				}
			}));
	}

	#[must_use]
	pub const fn is_clean(&self) -> bool {
		self.failed == 0 && !self.interrupted
	}

	pub fn log_summary(&self) {
		info!(
			entity = %self.entity,
			new = self.new,
			stale = self.stale,
			unchanged = self.unchanged,
			processed = self.processed,
			succeeded = self.succeeded,
			failed = self.failed,
			"Migration summary",
		);

		if self.interrupted {
			warn!(entity = %self.entity, "Migration was interrupted before processing every record");
		}

		for failure in &self.failures {
			error!(
				entity = %self.entity,
				source_id = failure.source_id,
				label = %failure.label,
				"Failed: {}",
				failure.error,
			);
		}
	}
}

/// Outcome of a whole [`MigrationPlan`](crate::MigrationPlan) run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanReport {
	pub entities: Vec<MigrationReport>,
	pub interrupted: bool,
}

impl PlanReport {
	#[must_use]
	pub fn total_failed(&self) -> usize {
		self.entities.iter().map(|report| report.failed).sum()
	}

	#[must_use]
	pub fn total_succeeded(&self) -> usize {
		self.entities.iter().map(|report| report.succeeded).sum()
	}

	#[must_use]
	pub fn is_clean(&self) -> bool {
		!self.interrupted && self.entities.iter().all(MigrationReport::is_clean)
	}

	#[must_use]
	pub fn get(&self, entity: &str) -> Option<&MigrationReport> {
		self.entities.iter().find(|report| report.entity == entity)
	}

	pub fn log_summary(&self) {
		for report in &self.entities {
			report.log_summary();
		}

		info!(
			entities = self.entities.len(),
			succeeded = self.total_succeeded(),
			failed = self.total_failed(),
			interrupted = self.interrupted,
			"Migration plan finished",
		);
	}
}
