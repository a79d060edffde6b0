use mg_tracker::{DependencyUnresolved, Resolver, SecondaryId, SourceId, TargetId};

use std::collections::HashMap;

use tracing::error;

/// Resolvers for the entity types a mapping declared as dependencies, keyed by entity type.
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
	resolvers: HashMap<String, Resolver>,
}

impl Dependencies {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, resolver: Resolver) -> Self {
		self.insert(resolver);
		self
	}

	pub fn insert(&mut self, resolver: Resolver) {
		self.resolvers.insert(resolver.entity().to_owned(), resolver);
	}

	#[must_use]
	pub fn resolver(&self, entity: &str) -> Option<&Resolver> {
		self.resolvers.get(entity)
	}

	pub fn resolve_one(
		&self,
		entity: &str,
		source_id: SourceId,
	) -> Result<TargetId, DependencyUnresolved> {
		self.get(entity, || vec![source_id])?.resolve_one(source_id)
	}

	pub fn resolve_optional(
		&self,
		entity: &str,
		maybe_source_id: Option<SourceId>,
	) -> Result<Option<TargetId>, DependencyUnresolved> {
		match maybe_source_id {
			Some(source_id) => self.resolve_one(entity, source_id).map(Some),
			None => Ok(None),
		}
	}

	pub fn resolve_many(
		&self,
		entity: &str,
		source_ids: impl IntoIterator<Item = SourceId>,
	) -> Result<Vec<TargetId>, DependencyUnresolved> {
		let source_ids = source_ids.into_iter().collect::<Vec<_>>();
		if source_ids.is_empty() {
			return Ok(vec![]);
		}

		self.get(entity, || source_ids.clone())?
			.resolve_many(source_ids)
	}

	pub fn resolve_secondary(
		&self,
		entity: &str,
		source_id: SourceId,
		key: &str,
	) -> Result<SecondaryId, DependencyUnresolved> {
		self.get(entity, || vec![source_id])?
			.resolve_secondary(source_id, key)
	}

	fn get(
		&self,
		entity: &str,
		source_ids: impl FnOnce() -> Vec<SourceId>,
	) -> Result<&Resolver, DependencyUnresolved> {
		self.resolvers.get(entity).ok_or_else(|| {
			error!(%entity, "Entity type was used but never declared as a dependency");
			DependencyUnresolved {
				entity: entity.to_owned(),
				source_ids: source_ids(),
			}
		})
	}
}
