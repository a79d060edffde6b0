use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
	sync::Arc,
};

use mg_utils::fs::{read_if_exists, write_atomic};

use tracing::{debug, info, instrument, trace, warn};

use super::{
	entry::{RegistryEntry, SecondaryIds, SourceId, TargetId},
	error::TrackerError,
};

const REGISTRY_FILE_STEM: &str = "registry";

type Entries = BTreeMap<SourceId, RegistryEntry>;

/// Read-only access to an entity type's registry.
///
/// Implemented by the owning [`Tracker`] and by the immutable [`RegistryView`] snapshots handed
/// to other entity types.
pub trait RegistryRead {
	fn entity(&self) -> &str;

	fn lookup(&self, source_id: SourceId) -> Option<&RegistryEntry>;

	fn exists(&self, source_id: SourceId) -> bool {
		self.lookup(source_id).is_some()
	}

	fn target_id(&self, source_id: SourceId) -> Option<&TargetId> {
		self.lookup(source_id).map(RegistryEntry::target_id)
	}

	/// `false` when there is no entry at all, absence is handled as "not migrated yet", never
	/// as stale.
	fn is_stale(&self, source_id: SourceId, current_watermark: Option<&str>) -> bool {
		self.lookup(source_id)
			.is_some_and(|entry| entry.watermark() != current_watermark)
	}
}

/// Identity registry of a single entity type, backed by a JSON file.
///
/// Writes only happen from the single flow driving a migration, so there is no internal locking.
/// Entries live behind an [`Arc`] so [`Tracker::snapshot`] is cheap; the map is only cloned if
/// a snapshot is still alive when the tracker is mutated.
#[derive(Debug)]
pub struct Tracker {
	entity: Arc<str>,
	path: PathBuf,
	entries: Arc<Entries>,
}

impl Tracker {
	/// Where an entity type's registry lives: `<root>/<entity>/registry.<env>.json`
	pub fn registry_path(root: impl AsRef<Path>, entity: &str, env: &str) -> PathBuf {
		let file_name = if env.is_empty() {
			format!("{REGISTRY_FILE_STEM}.json")
		} else {
			format!("{REGISTRY_FILE_STEM}.{env}.json")
		};

		root.as_ref().join(entity).join(file_name)
	}

	/// A registry with no entries that will be saved at `path`, nothing is read from disk.
	pub fn empty(entity: impl Into<Arc<str>>, path: impl Into<PathBuf>) -> Self {
		Self {
			entity: entity.into(),
			path: path.into(),
			entries: Arc::default(),
		}
	}

	/// Loads the registry for `entity` under `root` for the given environment.
	pub async fn open(
		root: impl AsRef<Path>,
		entity: &str,
		env: &str,
	) -> Result<Self, TrackerError> {
		Self::open_at(entity, Self::registry_path(root, entity, env)).await
	}

	/// Loads a registry file, a missing file is a first run and yields an empty registry.
	///
	/// A file that exists but can't be parsed is never replaced by an empty registry, as that
	/// would cause every record to be created again on the target.
	#[instrument(skip_all, fields(entity = %entity.as_ref(), path = %path.as_ref().display()), err)]
	pub async fn open_at(
		entity: impl AsRef<str>,
		path: impl AsRef<Path>,
	) -> Result<Self, TrackerError> {
		let path = path.as_ref();
		let entity = entity.as_ref();

		let Some(bytes) = read_if_exists(path).await? else {
			info!("No registry found, starting from an empty one");
			return Ok(Self::empty(entity, path));
		};

		let raw_entries = serde_json::from_slice::<Vec<RegistryEntry>>(&bytes).map_err(|source| {
			TrackerError::Corrupted {
				path: path.into(),
				source,
			}
		})?;

		let mut entries = Entries::new();
		for entry in raw_entries {
			let source_id = entry.source_id();
			if entries.insert(source_id, entry).is_some() {
				return Err(TrackerError::DuplicateEntry {
					path: path.into(),
					source_id,
				});
			}
		}

		debug!(count = entries.len(), "Loaded registry");

		Ok(Self {
			entity: entity.into(),
			path: path.to_path_buf(),
			entries: Arc::new(entries),
		})
	}

	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// All entries ordered by source id
	pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> + '_ {
		self.entries.values()
	}

	/// Inserts or replaces the entry for `entry.source_id()`.
	///
	/// Replacing is only allowed while keeping the same target id. Returns the previous entry.
	pub fn register(&mut self, entry: RegistryEntry) -> Result<Option<RegistryEntry>, TrackerError> {
		let source_id = entry.source_id();

		if let Some(current) = self.entries.get(&source_id) {
			if current.target_id() != entry.target_id() {
				return Err(TrackerError::TargetIdMutation {
					entity: self.entity.to_string(),
					source_id,
					current: current.target_id().clone(),
					attempted: entry.target_id().clone(),
				});
			}
		}

		trace!(entity = %self.entity, source_id, target_id = %entry.target_id(), "Registering entry");

		Ok(Arc::make_mut(&mut self.entries).insert(source_id, entry))
	}

	/// Overwrites the watermark and merges `partial_secondary_ids` into an existing entry.
	///
	/// The merge is additive: ids already recorded keep their value. Updating an entry that
	/// doesn't exist means the migration ran out of order and is reported as
	/// [`TrackerError::NotFound`].
	pub fn update(
		&mut self,
		source_id: SourceId,
		watermark: Option<String>,
		partial_secondary_ids: SecondaryIds,
	) -> Result<(), TrackerError> {
		if !self.entries.contains_key(&source_id) {
			return Err(TrackerError::NotFound {
				entity: self.entity.to_string(),
				source_id,
			});
		}

		let entity = Arc::clone(&self.entity);
		let entry = Arc::make_mut(&mut self.entries)
			.get_mut(&source_id)
			.ok_or_else(|| TrackerError::NotFound {
				entity: entity.to_string(),
				source_id,
			})?;

		entry.set_watermark(watermark);

		let conflicting = entry.merge_secondary_ids(partial_secondary_ids);
		if !conflicting.is_empty() {
			warn!(
				%entity,
				source_id,
				?conflicting,
				"Ignoring secondary ids that would overwrite already recorded ones",
			);
		}

		Ok(())
	}

	/// Atomically persists the whole registry; safe to call as often as needed.
	#[instrument(skip(self), fields(entity = %self.entity, count = self.entries.len()), err)]
	pub async fn save(&self) -> Result<(), TrackerError> {
		let entries = self.entries.values().collect::<Vec<_>>();

		let json =
			serde_json::to_vec_pretty(&entries).map_err(|source| TrackerError::Serialize {
				entity: self.entity.to_string(),
				source,
			})?;

		write_atomic(&self.path, &json).await?;

		debug!(path = %self.path.display(), "Saved registry");

		Ok(())
	}

	/// Immutable copy of the current entries, for cross entity lookups.
	#[must_use]
	pub fn snapshot(&self) -> RegistryView {
		RegistryView {
			entity: Arc::clone(&self.entity),
			entries: Arc::clone(&self.entries),
		}
	}
}

impl RegistryRead for Tracker {
	fn entity(&self) -> &str {
		&self.entity
	}

	fn lookup(&self, source_id: SourceId) -> Option<&RegistryEntry> {
		self.entries.get(&source_id)
	}
}

/// Frozen, cheaply clonable view over a [`Tracker`]'s entries.
#[derive(Debug, Clone)]
pub struct RegistryView {
	entity: Arc<str>,
	entries: Arc<Entries>,
}

impl RegistryView {
	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

impl RegistryRead for RegistryView {
	fn entity(&self) -> &str {
		&self.entity
	}

	fn lookup(&self, source_id: SourceId) -> Option<&RegistryEntry> {
		self.entries.get(&source_id)
	}
}
