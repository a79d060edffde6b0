use std::sync::Arc;

use super::error::ItemFailure;

/// An item that couldn't be processed, kept together with the reason.
///
/// The item is shared with the task that ran its unit of work.
#[derive(Debug)]
pub struct FailedItem<T, E> {
	pub item: Arc<T>,
	pub failure: ItemFailure<E>,
}

/// Outcome of [`BatchScheduler::process`](crate::BatchScheduler::process).
///
/// `processed == succeeded + failed` always holds; `processed < total` only when the run was
/// interrupted.
#[derive(Debug)]
pub struct BatchStats<T, E> {
	pub total: usize,
	pub processed: usize,
	pub succeeded: usize,
	pub failed: usize,
	pub failures: Vec<FailedItem<T, E>>,
	pub interrupted: bool,
}

impl<T, E> BatchStats<T, E> {
	pub(crate) const fn new(total: usize) -> Self {
		Self {
			total,
			processed: 0,
			succeeded: 0,
			failed: 0,
			failures: Vec::new(),
			interrupted: false,
		}
	}

	pub(crate) fn record_success(&mut self) {
		self.processed += 1;
		self.succeeded += 1;
	}

	pub(crate) fn record_failure(&mut self, item: Arc<T>, failure: ItemFailure<E>) {
		self.processed += 1;
		self.failed += 1;
		self.failures.push(FailedItem { item, failure });
	}

	/// Items never attempted, only non zero after an interruption
	#[must_use]
	pub const fn remaining(&self) -> usize {
		self.total.saturating_sub(self.processed)
	}

	#[must_use]
	pub const fn progress_percent(&self) -> usize {
		if self.total == 0 {
			100
		} else {
			self.processed * 100 / self.total
		}
	}
}
