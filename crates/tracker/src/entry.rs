use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Names of the fields every entry has, never usable as secondary id keys.
pub const RESERVED_KEYS: [&str; 3] = ["id", "documentId", "updated_at"];

/// Identifier of a record in the source store, unique within its entity type.
pub type SourceId = i64;

/// Extra identifiers some dependents need besides the [`TargetId`], keyed by name
/// (e.g. `draftStrapi5Id` / `publishedStrapi5Id` pairs, or a numeric id for media relations).
pub type SecondaryIds = BTreeMap<String, SecondaryId>;

/// Primary identifier assigned by the target store. Opaque to us.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}

	#[must_use]
	pub fn into_inner(self) -> String {
		self.0
	}
}

impl fmt::Display for TargetId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<String> for TargetId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

impl From<&str> for TargetId {
	fn from(id: &str) -> Self {
		Self(id.to_owned())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SecondaryId {
	Number(i64),
	Text(String),
}

impl SecondaryId {
	#[must_use]
	pub const fn as_number(&self) -> Option<i64> {
		match self {
			Self::Number(n) => Some(*n),
			Self::Text(_) => None,
		}
	}

	#[must_use]
	pub fn as_text(&self) -> Option<&str> {
		match self {
			Self::Text(s) => Some(s),
			Self::Number(_) => None,
		}
	}
}

impl fmt::Display for SecondaryId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Number(n) => write!(f, "{n}"),
			Self::Text(s) => f.write_str(s),
		}
	}
}

impl From<i64> for SecondaryId {
	fn from(n: i64) -> Self {
		Self::Number(n)
	}
}

impl From<String> for SecondaryId {
	fn from(s: String) -> Self {
		Self::Text(s)
	}
}

impl From<&str> for SecondaryId {
	fn from(s: &str) -> Self {
		Self::Text(s.to_owned())
	}
}

/// One row of a registry file.
///
/// On disk this is the flat object the migration has always written:
/// `{ "id": 1, "documentId": "..", "updated_at": "..", "draftStrapi5Id": 10 }`, where every key
/// other than the [`RESERVED_KEYS`] is a secondary id. Extra keys that hold neither an integer nor
/// a string are dropped on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawEntry")]
pub struct RegistryEntry {
	#[serde(rename = "id")]
	source_id: SourceId,
	#[serde(rename = "documentId")]
	target_id: TargetId,
	#[serde(rename = "updated_at", skip_serializing_if = "Option::is_none")]
	watermark: Option<String>,
	#[serde(flatten)]
	secondary_ids: SecondaryIds,
}

impl RegistryEntry {
	pub fn new(
		source_id: SourceId,
		target_id: impl Into<TargetId>,
		watermark: Option<String>,
	) -> Self {
		Self {
			source_id,
			target_id: target_id.into(),
			watermark,
			secondary_ids: SecondaryIds::new(),
		}
	}

	/// Secondary ids under a reserved key are discarded.
	#[must_use]
	pub fn with_secondary_ids(mut self, secondary_ids: SecondaryIds) -> Self {
		self.secondary_ids.extend(
			secondary_ids
				.into_iter()
				.filter(|(key, _)| !rejects_reserved(self.source_id, key)),
		);
		self
	}

	/// Discarded if `key` is reserved.
	#[must_use]
	pub fn with_secondary(mut self, key: impl Into<String>, id: impl Into<SecondaryId>) -> Self {
		let key = key.into();
		if !rejects_reserved(self.source_id, &key) {
			self.secondary_ids.insert(key, id.into());
		}
		self
	}

	#[must_use]
	pub const fn source_id(&self) -> SourceId {
		self.source_id
	}

	#[must_use]
	pub const fn target_id(&self) -> &TargetId {
		&self.target_id
	}

	#[must_use]
	pub fn watermark(&self) -> Option<&str> {
		self.watermark.as_deref()
	}

	#[must_use]
	pub const fn secondary_ids(&self) -> &SecondaryIds {
		&self.secondary_ids
	}

	#[must_use]
	pub fn secondary(&self, key: &str) -> Option<&SecondaryId> {
		self.secondary_ids.get(key)
	}

	pub(crate) fn set_watermark(&mut self, watermark: Option<String>) {
		self.watermark = watermark;
	}

	/// Adds the ids not yet present, returning the keys whose incoming value was
	/// discarded because a different one was already recorded.
	pub(crate) fn merge_secondary_ids(&mut self, incoming: SecondaryIds) -> Vec<String> {
		let mut conflicting = Vec::new();

		for (key, id) in incoming {
			if rejects_reserved(self.source_id, &key) {
				continue;
			}

			match self.secondary_ids.get(&key) {
				None => {
					self.secondary_ids.insert(key, id);
				}
				Some(current) if *current == id => {}
				Some(_) => conflicting.push(key),
			}
		}

		conflicting
	}
}

fn rejects_reserved(source_id: SourceId, key: &str) -> bool {
	let reserved = RESERVED_KEYS.contains(&key);
	if reserved {
		warn!(source_id, key, "Ignoring secondary id stored under a reserved key");
	}

	reserved
}

fn secondary_from_value(value: Value) -> Option<SecondaryId> {
	match value {
		Value::Number(n) => n.as_i64().map(SecondaryId::Number),
		Value::String(s) => Some(SecondaryId::Text(s)),
		_ => None,
	}
}

#[derive(Deserialize)]
struct RawEntry {
	id: SourceId,
	#[serde(rename = "documentId")]
	document_id: TargetId,
	#[serde(default)]
	updated_at: Option<String>,
	#[serde(flatten)]
	extra: BTreeMap<String, Value>,
}

impl From<RawEntry> for RegistryEntry {
	fn from(
		RawEntry {
			id,
			document_id,
			updated_at,
			extra,
		}: RawEntry,
	) -> Self {
		Self {
			source_id: id,
			target_id: document_id,
			watermark: updated_at,
			secondary_ids: extra
				.into_iter()
				.filter_map(|(key, value)| secondary_from_value(value).map(|id| (key, id)))
				.collect(),
		}
	}
}
