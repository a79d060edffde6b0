use mg_batch::{
	run_with_retry, BatchHooks, BatchScheduler, BatchStats, HookError, RetryPolicy, UnitOfWork,
	WorkItem,
};
use mg_tracker::{
	RegistryEntry, RegistryRead, SecondaryIds, SourceId, TargetId, Tracker, TrackerError,
};

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, info, instrument, trace, warn};

use crate::{
	dependencies::Dependencies,
	error::{ItemError, MigrationError},
	mapping::{EntityMapping, DRAFT_ID},
	plan::MigrationStep,
	report::MigrationReport,
	store::{PublicationStatus, SourceRecord, SourceStore, TargetRecord, TargetStore},
};

/// A source record waiting to be created or updated on the target.
#[derive(Debug, Clone)]
pub struct PendingRecord<R> {
	record: R,
	entry: Option<RegistryEntry>,
}

impl<R: SourceRecord> PendingRecord<R> {
	pub const fn record(&self) -> &R {
		&self.record
	}

	/// Registry entry at classification time, `None` for new records
	pub const fn entry(&self) -> Option<&RegistryEntry> {
		self.entry.as_ref()
	}

	fn source_id(&self) -> SourceId {
		self.record.source_id()
	}

	fn is_published(&self) -> bool {
		self.record.status() == PublicationStatus::Published
	}
}

impl<R: SourceRecord> WorkItem for PendingRecord<R> {
	fn item_id(&self) -> String {
		self.source_id().to_string()
	}
}

/// Source records split by what has to happen to each of them.
#[derive(Debug)]
pub struct Classified<R> {
	pub new: Vec<PendingRecord<R>>,
	pub stale: Vec<PendingRecord<R>>,
	pub unchanged: usize,
}

/// Splits records into new (never migrated), stale (migrated, watermark changed) and unchanged.
///
/// A source listing the same record twice only gets the first occurrence migrated.
pub fn classify<R: SourceRecord>(
	records: impl IntoIterator<Item = R>,
	registry: &impl RegistryRead,
) -> Classified<R> {
	let mut seen = HashSet::new();
	let mut classified = Classified {
		new: vec![],
		stale: vec![],
		unchanged: 0,
	};

	for record in records {
		let source_id = record.source_id();

		if !seen.insert(source_id) {
			warn!(
				entity = %registry.entity(),
				source_id,
				"Source listed the same record twice, ignoring the duplicate",
			);
			continue;
		}

		match registry.lookup(source_id) {
			None => classified.new.push(PendingRecord {
				record,
				entry: None,
			}),

			Some(entry) if registry.is_stale(source_id, record.watermark()) => {
				classified.stale.push(PendingRecord {
					record,
					entry: Some(entry.clone()),
				});
			}

			Some(_) => {
				trace!(source_id, "Already migrated, skipping");
				classified.unchanged += 1;
			}
		}
	}

	classified
}

/// Migration of a single entity type from `source` to `target`.
pub struct EntityMigration<M, S, T> {
	mapping: Arc<M>,
	source: S,
	target: Arc<T>,
}

impl<M, S, T> EntityMigration<M, S, T>
where
	M: EntityMapping,
	S: SourceStore<M::Record>,
	T: TargetStore<M::Payload> + 'static,
{
	pub fn new(mapping: M, source: S, target: T) -> Self {
		Self {
			mapping: Arc::new(mapping),
			source,
			target: Arc::new(target),
		}
	}

	pub fn mapping(&self) -> &M {
		&self.mapping
	}

	/// Creates the new records, then updates the stale ones, committing each success to
	/// `tracker` as soon as it happens.
	///
	/// Only registry failures end the migration early; records that fail are listed in the
	/// report and retried by the next run.
	#[instrument(skip_all, fields(entity = %self.mapping.entity(), records = records.len()))]
	pub async fn migrate(
		&self,
		records: Vec<M::Record>,
		tracker: &mut Tracker,
		deps: &Arc<Dependencies>,
		scheduler: &BatchScheduler,
	) -> Result<MigrationReport, MigrationError> {
		let Classified {
			new,
			stale,
			unchanged,
		} = classify(records, &*tracker);

		info!(
			new = new.len(),
			stale = stale.len(),
			skip = unchanged,
			"Categorized records",
		);

		let mut report =
			MigrationReport::new(self.mapping.entity(), new.len(), stale.len(), unchanged);
		let retry = &scheduler.options().retry;

		if !new.is_empty() {
			info!(count = new.len(), "Creating new records");

			let stats = scheduler
				.process(
					new,
					CreateWork {
						mapping: Arc::clone(&self.mapping),
						target: Arc::clone(&self.target),
						deps: Arc::clone(deps),
					},
					&mut CreateHooks {
						mapping: &*self.mapping,
						target: &*self.target,
						tracker: &mut *tracker,
						retry,
					},
				)
				.await?;

			report.absorb(stats, describe);
		}

		if !stale.is_empty() && !report.interrupted {
			info!(count = stale.len(), "Updating stale records");

			let stats = scheduler
				.process(
					stale,
					UpdateWork {
						mapping: Arc::clone(&self.mapping),
						target: Arc::clone(&self.target),
						deps: Arc::clone(deps),
					},
					&mut UpdateHooks {
						mapping: &*self.mapping,
						target: &*self.target,
						tracker: &mut *tracker,
						retry,
					},
				)
				.await?;

			report.absorb(stats, describe);
		}

		Ok(report)
	}
}

#[async_trait]
impl<M, S, T> MigrationStep for EntityMigration<M, S, T>
where
	M: EntityMapping,
	S: SourceStore<M::Record>,
	T: TargetStore<M::Payload> + 'static,
{
	fn entity(&self) -> &str {
		self.mapping.entity()
	}

	fn dependencies(&self) -> &[&str] {
		self.mapping.dependencies()
	}

	async fn run(
		&self,
		tracker: &mut Tracker,
		deps: Dependencies,
		scheduler: &BatchScheduler,
	) -> Result<MigrationReport, MigrationError> {
		info!(entity = %self.mapping.entity(), "Listing source records");

		let records = self
			.source
			.list_all()
			.await
			.map_err(|source| MigrationError::SourceListing {
				entity: self.mapping.entity().to_owned(),
				source,
			})?;

		self.migrate(records, tracker, &Arc::new(deps), scheduler).await
	}
}

fn describe<R: SourceRecord>(pending: &PendingRecord<R>) -> (SourceId, String) {
	(pending.source_id(), pending.record.label())
}

fn abort(e: TrackerError) -> HookError<ItemError, MigrationError> {
	HookError::Abort(e.into())
}

/// Looks up the draft variant of `target_id`, retrying transient failures like any other call.
async fn lookup_draft<P, T>(
	target: &T,
	target_id: &TargetId,
	item_id: &str,
	retry: &RetryPolicy,
) -> Result<TargetRecord, ItemError>
where
	P: Send + Sync + 'static,
	T: TargetStore<P>,
{
	let not_found = || ItemError::VariantNotFound {
		target_id: target_id.clone(),
		status: PublicationStatus::Draft,
	};

	run_with_retry(item_id, retry, move || async move {
		target
			.get(target_id, PublicationStatus::Draft)
			.await?
			.ok_or_else(not_found)
	})
	.await
	.map_err(|failure| failure.into_error().unwrap_or_else(not_found))
}

struct CreateWork<M, T> {
	mapping: Arc<M>,
	target: Arc<T>,
	deps: Arc<Dependencies>,
}

#[async_trait]
impl<M, T> UnitOfWork<PendingRecord<M::Record>> for CreateWork<M, T>
where
	M: EntityMapping,
	T: TargetStore<M::Payload> + 'static,
{
	type Output = TargetRecord;
	type Error = ItemError;

	async fn run(&self, pending: &PendingRecord<M::Record>) -> Result<TargetRecord, ItemError> {
		// References are resolved before any write, a missing one never reaches the target
		let payload = self.mapping.to_payload(&pending.record, &self.deps)?;

		Ok(self
			.target
			.create(&payload, pending.record.status())
			.await?)
	}
}

struct UpdateWork<M, T> {
	mapping: Arc<M>,
	target: Arc<T>,
	deps: Arc<Dependencies>,
}

#[async_trait]
impl<M, T> UnitOfWork<PendingRecord<M::Record>> for UpdateWork<M, T>
where
	M: EntityMapping,
	T: TargetStore<M::Payload> + 'static,
{
	type Output = TargetRecord;
	type Error = ItemError;

	async fn run(&self, pending: &PendingRecord<M::Record>) -> Result<TargetRecord, ItemError> {
		let entry = pending
			.entry()
			.ok_or_else(|| ItemError::NotTracked(pending.source_id()))?;

		let payload = self.mapping.to_payload(&pending.record, &self.deps)?;

		Ok(self
			.target
			.update(entry.target_id(), &payload, pending.record.status())
			.await?)
	}
}

struct CreateHooks<'a, M, T> {
	mapping: &'a M,
	target: &'a T,
	tracker: &'a mut Tracker,
	retry: &'a RetryPolicy,
}

#[async_trait]
impl<'a, M, T> BatchHooks<PendingRecord<M::Record>, TargetRecord, ItemError>
	for CreateHooks<'a, M, T>
where
	M: EntityMapping,
	T: TargetStore<M::Payload>,
{
	type Error = MigrationError;

	async fn on_item_success(
		&mut self,
		pending: &PendingRecord<M::Record>,
		created: TargetRecord,
	) -> Result<(), HookError<ItemError, MigrationError>> {
		let source_id = pending.source_id();
		let is_published = pending.is_published();
		let strategy = self.mapping.secondary_ids();

		// Registered right away, so a failed follow up lookup can never lead to a second create
		let entry = strategy
			.ids_from_write(&created, is_published)
			.into_iter()
			.fold(
				RegistryEntry::new(
					source_id,
					created.target_id.clone(),
					pending.record.watermark().map(str::to_owned),
				),
				|entry, (key, id)| entry.with_secondary(key, id),
			);

		self.tracker.register(entry).map_err(abort)?;

		debug!(source_id, target_id = %created.target_id, "Created");

		if !strategy.needs_draft_lookup(is_published) {
			return Ok(());
		}

		let item_id = pending.item_id();
		let lookup =
			lookup_draft::<M::Payload, _>(self.target, &created.target_id, &item_id, self.retry);

		match lookup.await {
			Ok(draft) => {
				self.tracker
					.update(
						source_id,
						pending.record.watermark().map(str::to_owned),
						SecondaryIds::from([(DRAFT_ID.to_owned(), draft.numeric_id.into())]),
					)
					.map_err(abort)?;

				Ok(())
			}

			Err(e) => {
				// Dropping the watermark makes the record stale, the next run repairs it on update
				self.tracker
					.update(source_id, None, SecondaryIds::new())
					.map_err(abort)?;

				Err(HookError::Item(e))
			}
		}
	}

	async fn on_progress(
		&mut self,
		stats: &BatchStats<PendingRecord<M::Record>, ItemError>,
	) -> Result<(), MigrationError> {
		checkpoint(self.tracker, stats).await
	}
}

struct UpdateHooks<'a, M, T> {
	mapping: &'a M,
	target: &'a T,
	tracker: &'a mut Tracker,
	retry: &'a RetryPolicy,
}

#[async_trait]
impl<'a, M, T> BatchHooks<PendingRecord<M::Record>, TargetRecord, ItemError>
	for UpdateHooks<'a, M, T>
where
	M: EntityMapping,
	T: TargetStore<M::Payload>,
{
	type Error = MigrationError;

	async fn on_item_success(
		&mut self,
		pending: &PendingRecord<M::Record>,
		updated: TargetRecord,
	) -> Result<(), HookError<ItemError, MigrationError>> {
		let source_id = pending.source_id();
		let Some(entry) = pending.entry() else {
			return Err(HookError::Item(ItemError::NotTracked(source_id)));
		};

		let is_published = pending.is_published();
		let strategy = self.mapping.secondary_ids();
		let mut watermark = pending.record.watermark().map(str::to_owned);

		// Only ids the entry doesn't have yet, e.g. the published id of a record that just
		// got published
		let mut new_ids = strategy
			.ids_from_write(&updated, is_published)
			.into_iter()
			.filter(|(key, _)| entry.secondary(key).is_none())
			.map(|(key, id)| (key.to_owned(), id.into()))
			.collect::<SecondaryIds>();

		if strategy.needs_draft_lookup(is_published) && entry.secondary(DRAFT_ID).is_none() {
			let item_id = pending.item_id();
			let lookup =
				lookup_draft::<M::Payload, _>(self.target, entry.target_id(), &item_id, self.retry);

			match lookup.await {
				Ok(draft) => {
					new_ids.insert(DRAFT_ID.to_owned(), draft.numeric_id.into());
				}
				Err(e) => {
					warn!(source_id, "Draft variant still unknown, will retry on next run: {e}");
					watermark = None;
				}
			}
		}

		self.tracker
			.update(source_id, watermark, new_ids)
			.map_err(abort)?;

		debug!(source_id, target_id = %entry.target_id(), "Updated");

		Ok(())
	}

	async fn on_progress(
		&mut self,
		stats: &BatchStats<PendingRecord<M::Record>, ItemError>,
	) -> Result<(), MigrationError> {
		checkpoint(self.tracker, stats).await
	}
}

async fn checkpoint<T>(
	tracker: &Tracker,
	stats: &BatchStats<T, ItemError>,
) -> Result<(), MigrationError> {
	info!(
		processed = stats.processed,
		total = stats.total,
		"Progress: {}/{} ({}%)",
		stats.processed,
		stats.total,
		stats.progress_percent(),
	);

	tracker.save().await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Debug, Clone)]
	struct Row {
		id: SourceId,
		updated_at: Option<&'static str>,
	}

	impl SourceRecord for Row {
		fn source_id(&self) -> SourceId {
			self.id
		}

		fn watermark(&self) -> Option<&str> {
			self.updated_at
		}
	}

	const fn row(id: SourceId, updated_at: Option<&'static str>) -> Row {
		Row { id, updated_at }
	}

	#[test]
	fn splits_new_stale_and_unchanged() {
		let mut tracker = Tracker::empty("page", "/nonexistent/page/registry.json");
		for (id, watermark) in [(1, Some("v1")), (2, Some("v1")), (3, None)] {
			tracker
				.register(RegistryEntry::new(
					id,
					format!("page-{id}"),
					watermark.map(str::to_owned),
				))
				.unwrap();
		}

		let Classified {
			new,
			stale,
			unchanged,
		} = classify(
			[
				row(1, Some("v1")),
				row(2, Some("v2")),
				row(3, None),
				row(4, Some("v1")),
				row(4, Some("v9")),
			],
			&tracker,
		);

		assert_eq!(new.len(), 1);
		assert_eq!(new[0].record().updated_at, Some("v1"));
		assert!(new[0].entry().is_none());

		assert_eq!(stale.len(), 1);
		assert_eq!(stale[0].record().id, 2);
		assert_eq!(stale[0].entry().unwrap().watermark(), Some("v1"));

		assert_eq!(unchanged, 2);
	}
}
