use std::{convert::Infallible, error::Error, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::{select, task::JoinSet, time::sleep};
use tracing::{debug, error, info, instrument, warn, Instrument};

use super::{
	error::{Classify, ItemFailure},
	retry::{run_with_retry, RetryPolicy},
	shutdown::ShutdownCoordinator,
	stats::BatchStats,
};

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_CONCURRENCY: usize = 5;
const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_secs(1);

/// Something a [`UnitOfWork`] can run on.
pub trait WorkItem: Send + Sync + 'static {
	/// Logical id used in logs and failure reports, usually the record's source id.
	fn item_id(&self) -> String;
}

/// The remote operation performed for each item. Must be safe to retry.
#[async_trait]
pub trait UnitOfWork<T: WorkItem>: Send + Sync {
	type Output: Send + 'static;
	type Error: Classify + Error + Send + Sync + 'static;

	async fn run(&self, item: &T) -> Result<Self::Output, Self::Error>;
}

/// Returned by [`BatchHooks::on_item_success`].
#[derive(Debug)]
pub enum HookError<E, A> {
	/// Only this item failed to commit, it is reported as [`ItemFailure::Commit`]
	Item(E),
	/// The run can't go on, e.g. the durable state became unusable
	Abort(A),
}

/// Callbacks invoked from the flow driving the batches, never concurrently, so implementors can
/// mutate their state without any locking. Units of work run on their own tasks meanwhile, a slow
/// hook never holds back the rest of the chunk.
#[async_trait]
pub trait BatchHooks<T: WorkItem, R: Send + 'static, E: Send + Sync + 'static>: Send {
	type Error: Send;

	/// Called as soon as an item's unit of work succeeded, before the next result is looked at.
	async fn on_item_success(
		&mut self,
		item: &T,
		output: R,
	) -> Result<(), HookError<E, Self::Error>>;

	/// Called after every batch, including the one cut short by a shutdown request.
	async fn on_progress(&mut self, stats: &BatchStats<T, E>) -> Result<(), Self::Error> {
		let _ = stats;
		Ok(())
	}
}

/// Hooks for runs that only care about the final [`BatchStats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

#[async_trait]
impl<T: WorkItem, R: Send + 'static, E: Send + Sync + 'static> BatchHooks<T, R, E> for NoHooks {
	type Error = Infallible;

	async fn on_item_success(&mut self, _: &T, _: R) -> Result<(), HookError<E, Infallible>> {
		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
	/// Items per batch; state is checkpointed through [`BatchHooks::on_progress`] after each one.
	pub batch_size: usize,
	/// Maximum units of work in flight at any moment.
	pub concurrency: usize,
	pub retry: RetryPolicy,
	/// Pause between two batches, to be gentle with the remote side.
	pub inter_batch_delay: Duration,
}

impl Default for BatchOptions {
	fn default() -> Self {
		Self {
			batch_size: DEFAULT_BATCH_SIZE,
			concurrency: DEFAULT_CONCURRENCY,
			retry: RetryPolicy::default(),
			inter_batch_delay: DEFAULT_INTER_BATCH_DELAY,
		}
	}
}

#[derive(Debug, Clone)]
pub struct BatchScheduler {
	options: BatchOptions,
	shutdown: ShutdownCoordinator,
}

impl BatchScheduler {
	#[must_use]
	pub const fn new(options: BatchOptions, shutdown: ShutdownCoordinator) -> Self {
		Self { options, shutdown }
	}

	#[must_use]
	pub const fn options(&self) -> &BatchOptions {
		&self.options
	}

	#[must_use]
	pub const fn shutdown(&self) -> &ShutdownCoordinator {
		&self.shutdown
	}

	/// Runs `work` on every item, `batch_size` items at a time, in chunks of `concurrency`.
	///
	/// A shutdown request is honored before each batch and after each chunk: in flight units are
	/// always awaited and their results committed, no new unit is started afterwards. The
	/// caller, after persisting whatever it needs to, is the one that should call
	/// [`ShutdownCoordinator::notify_safe_to_exit`].
	///
	/// Item failures never fail the run, they end up in [`BatchStats::failures`]. Only
	/// [`HookError::Abort`] or an `on_progress` error do, after the current chunk settled.
	#[instrument(skip_all, fields(total = items.len()))]
	pub async fn process<T, W, H>(
		&self,
		items: Vec<T>,
		work: W,
		hooks: &mut H,
	) -> Result<BatchStats<T, W::Error>, H::Error>
	where
		T: WorkItem,
		W: UnitOfWork<T> + 'static,
		H: BatchHooks<T, W::Output, W::Error>,
	{
		let mut stats = BatchStats::new(items.len());
		if items.is_empty() {
			return Ok(stats);
		}

		let batch_size = self.options.batch_size.max(1);
		let concurrency = self.options.concurrency.max(1);
		let total_batches = items.len().div_ceil(batch_size);

		let work = Arc::new(work);
		let mut items = items.into_iter().peekable();
		let mut batch_number = 0;

		while items.peek().is_some() {
			if self.shutdown.is_shutting_down() {
				stats.interrupted = true;
				break;
			}

			batch_number += 1;
			let mut batch = items
				.by_ref()
				.take(batch_size)
				.collect::<Vec<_>>()
				.into_iter()
				.peekable();

			debug!(batch_number, total_batches, size = batch.len(), "Starting batch");

			while batch.peek().is_some() {
				let chunk = batch.by_ref().take(concurrency).collect::<Vec<_>>();
				self.run_chunk(chunk, &work, hooks, &mut stats).await?;

				if self.shutdown.is_shutting_down()
					&& (batch.peek().is_some() || items.peek().is_some())
				{
					stats.interrupted = true;
					break;
				}
			}

			hooks.on_progress(&stats).await?;

			info!(
				batch_number,
				total_batches,
				processed = stats.processed,
				succeeded = stats.succeeded,
				failed = stats.failed,
				"Batch done ({}%)",
				stats.progress_percent(),
			);

			if stats.interrupted {
				break;
			}

			if items.peek().is_some() && !self.options.inter_batch_delay.is_zero() {
				select! {
					() = sleep(self.options.inter_batch_delay) => {}
					() = self.shutdown.cancelled() => {}
				}
			}
		}

		if stats.interrupted {
			warn!(
				processed = stats.processed,
				remaining = stats.remaining(),
				"Run interrupted by shutdown request",
			);
		}

		Ok(stats)
	}

	async fn run_chunk<T, W, H>(
		&self,
		chunk: Vec<T>,
		work: &Arc<W>,
		hooks: &mut H,
		stats: &mut BatchStats<T, W::Error>,
	) -> Result<(), H::Error>
	where
		T: WorkItem,
		W: UnitOfWork<T> + 'static,
		H: BatchHooks<T, W::Output, W::Error>,
	{
		let mut in_flight = JoinSet::new();

		let mut pending = chunk
			.into_iter()
			.enumerate()
			.map(|(index, item)| {
				let item = Arc::new(item);
				let task_item = Arc::clone(&item);
				let work = Arc::clone(work);
				let policy = self.options.retry.clone();

				in_flight.spawn(
					AssertUnwindSafe(
						async move {
							let item_id = task_item.item_id();
							run_with_retry(&item_id, &policy, || work.run(&task_item)).await
						}
						.in_current_span(),
					)
					.catch_unwind()
					.map(move |res| (index, res)),
				);

				Some(item)
			})
			.collect::<Vec<_>>();

		let mut abort = None;

		while let Some(joined) = in_flight.join_next().await {
			let (index, res) = match joined {
				Ok(done) => done,
				Err(e) => {
					// Its item is still pending, it is reported once the chunk settled
					error!(is_panic = e.is_panic(), "Unit of work task failed: {e:#?}");
					continue;
				}
			};

			let Some(item) = pending.get_mut(index).and_then(Option::take) else {
				continue;
			};
			let item_id = item.item_id();

			match res {
				Ok(Ok(output)) => match hooks.on_item_success(&item, output).await {
					Ok(()) => stats.record_success(),
					Err(HookError::Item(source)) => {
						let failure = ItemFailure::Commit { item_id, source };
						error!(%failure, "Failed to commit item result");
						stats.record_failure(item, failure);
					}
					Err(HookError::Abort(e)) => {
						error!(%item_id, "Committing item result aborted the run");
						// The rest of the chunk already ran remotely, commit it before stopping
						abort.get_or_insert(e);
					}
				},

				Ok(Err(failure)) => {
					warn!(%failure, attempts = ?failure.attempts(), "Item failed");
					stats.record_failure(item, failure);
				}

				Err(_panic) => {
					error!(%item_id, "Unit of work panicked");
					stats.record_failure(item, ItemFailure::Panicked { item_id });
				}
			}
		}

		for item in pending.into_iter().flatten() {
			let item_id = item.item_id();
			stats.record_failure(item, ItemFailure::Panicked { item_id });
		}

		abort.map_or(Ok(()), Err)
	}
}
