use mg_tracker::DependencyUnresolved;

use crate::{
	dependencies::Dependencies,
	store::{SourceRecord, TargetRecord},
};

/// Secondary id key holding a target's numeric id, for relations that can't use the opaque one.
pub const NUMERIC_ID: &str = "strapi5Id";
/// Secondary id key holding the numeric id of the published variant.
pub const PUBLISHED_ID: &str = "publishedStrapi5Id";
/// Secondary id key holding the numeric id of the draft variant.
pub const DRAFT_ID: &str = "draftStrapi5Id";

/// Which extra target identifiers an entity type keeps in its registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SecondaryIdStrategy {
	/// Only the target id
	#[default]
	None,
	/// The numeric id under [`NUMERIC_ID`]
	NumericId,
	/// The ids of both variants under [`PUBLISHED_ID`] and [`DRAFT_ID`], a published create
	/// is followed by a lookup of its draft counterpart
	Variants,
}

impl SecondaryIdStrategy {
	/// Whether writing a record in this state must be followed by a lookup of its draft variant.
	pub(crate) fn needs_draft_lookup(self, is_published: bool) -> bool {
		self == Self::Variants && is_published
	}

	/// Ids known right after a write, without any extra call.
	pub(crate) fn ids_from_write(
		self,
		written: &TargetRecord,
		is_published: bool,
	) -> Vec<(&'static str, i64)> {
		match self {
			Self::None => vec![],
			Self::NumericId => vec![(NUMERIC_ID, written.numeric_id)],
			Self::Variants if is_published => vec![(PUBLISHED_ID, written.numeric_id)],
			Self::Variants => vec![(DRAFT_ID, written.numeric_id)],
		}
	}
}

/// The per entity type part of a migration: how a source record becomes a target payload.
///
/// Every cross entity reference must be resolved through `deps` inside
/// [`to_payload`](Self::to_payload), before anything is sent to the target store.
pub trait EntityMapping: Send + Sync + 'static {
	type Record: SourceRecord;
	type Payload: Send + Sync + 'static;

	/// Names the registry of this entity type
	fn entity(&self) -> &str;

	/// Entity types referenced by this one, they must be migrated first.
	fn dependencies(&self) -> &[&str] {
		&[]
	}

	fn to_payload(
		&self,
		record: &Self::Record,
		deps: &Dependencies,
	) -> Result<Self::Payload, DependencyUnresolved>;

	fn secondary_ids(&self) -> SecondaryIdStrategy {
		SecondaryIdStrategy::None
	}
}
