use std::path::Path;

use mg_utils::error::FileIOError;

use thiserror::Error;

use super::entry::{SourceId, TargetId};

#[derive(Debug, Error)]
pub enum TrackerError {
	#[error("registry entry not found: <entity='{entity}', source_id='{source_id}'>")]
	NotFound { entity: String, source_id: SourceId },
	#[error(
		"target id is write once: <entity='{entity}', source_id='{source_id}', \
		current='{current}', attempted='{attempted}'>"
	)]
	TargetIdMutation {
		entity: String,
		source_id: SourceId,
		current: TargetId,
		attempted: TargetId,
	},

	#[error("registry file is corrupted: {source}; path: '{}'", .path.display())]
	Corrupted {
		path: Box<Path>,
		#[source]
		source: serde_json::Error,
	},
	#[error("registry file has duplicated entries <source_id='{source_id}'>; path: '{}'", .path.display())]
	DuplicateEntry { path: Box<Path>, source_id: SourceId },

	#[error("failed to serialize registry <entity='{entity}'>: {source}")]
	Serialize {
		entity: String,
		#[source]
		source: serde_json::Error,
	},

	#[error(transparent)]
	FileIO(#[from] FileIOError),
}

impl TrackerError {
	/// An ordering or logic bug: updating something never registered, or rewriting a target id.
	#[must_use]
	pub const fn is_invariant_violation(&self) -> bool {
		matches!(self, Self::NotFound { .. } | Self::TargetIdMutation { .. })
	}

	/// The durable store exists but can't be trusted, nothing may be written to the target.
	#[must_use]
	pub const fn is_corruption(&self) -> bool {
		matches!(self, Self::Corrupted { .. } | Self::DuplicateEntry { .. })
	}
}
