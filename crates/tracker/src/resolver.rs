use thiserror::Error;

use super::{
	entry::{SecondaryId, SourceId, TargetId},
	tracker::{RegistryRead, RegistryView},
};

/// Some referenced records of `entity` have no registry entry yet, so the entity type holding
/// the reference was migrated before its dependency. Retrying won't help within the same run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("references to {entity} are not migrated yet <source_ids={source_ids:?}>")]
pub struct DependencyUnresolved {
	pub entity: String,
	pub source_ids: Vec<SourceId>,
}

/// Translates source references to one entity type into its target identifiers.
///
/// Resolution is all or nothing: a single unknown id fails the whole call, naming every
/// offending id, so a record is never written with a partial relation.
#[derive(Debug, Clone)]
pub struct Resolver {
	view: RegistryView,
}

impl Resolver {
	#[must_use]
	pub const fn new(view: RegistryView) -> Self {
		Self { view }
	}

	#[must_use]
	pub fn entity(&self) -> &str {
		self.view.entity()
	}

	pub fn resolve_one(&self, source_id: SourceId) -> Result<TargetId, DependencyUnresolved> {
		self.view
			.target_id(source_id)
			.cloned()
			.ok_or_else(|| self.unresolved(vec![source_id]))
	}

	/// An absent reference (`None`) is not an error, it simply resolves to `None`.
	pub fn resolve_optional(
		&self,
		maybe_source_id: Option<SourceId>,
	) -> Result<Option<TargetId>, DependencyUnresolved> {
		maybe_source_id
			.map(|source_id| self.resolve_one(source_id))
			.transpose()
	}

	pub fn resolve_many(
		&self,
		source_ids: impl IntoIterator<Item = SourceId>,
	) -> Result<Vec<TargetId>, DependencyUnresolved> {
		let (resolved, missing) = source_ids.into_iter().fold(
			(Vec::new(), Vec::new()),
			|(mut resolved, mut missing), source_id| {
				match self.view.target_id(source_id) {
					Some(target_id) => resolved.push(target_id.clone()),
					None => missing.push(source_id),
				}
				(resolved, missing)
			},
		);

		if missing.is_empty() {
			Ok(resolved)
		} else {
			Err(self.unresolved(missing))
		}
	}

	/// Resolves a named secondary id, e.g. a numeric id required where the opaque one can't be
	/// used. An entry lacking that key counts as unresolved.
	pub fn resolve_secondary(
		&self,
		source_id: SourceId,
		key: &str,
	) -> Result<SecondaryId, DependencyUnresolved> {
		self.view
			.lookup(source_id)
			.and_then(|entry| entry.secondary(key))
			.cloned()
			.ok_or_else(|| self.unresolved(vec![source_id]))
	}

	fn unresolved(&self, source_ids: Vec<SourceId>) -> DependencyUnresolved {
		DependencyUnresolved {
			entity: self.entity().to_owned(),
			source_ids,
		}
	}
}
