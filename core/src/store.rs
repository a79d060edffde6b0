use mg_tracker::{SourceId, TargetId};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::ApiError;

/// Publication state of a record, on the target side each one is a separate variant of the same
/// document.
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PublicationStatus {
	#[default]
	Published,
	Draft,
}

/// A record as listed by the source store.
pub trait SourceRecord: Send + Sync + 'static {
	fn source_id(&self) -> SourceId;

	/// Last modification marker, compared verbatim against the registry; `None` never goes stale.
	fn watermark(&self) -> Option<&str>;

	/// Human readable name, used when reporting failures.
	fn label(&self) -> String {
		format!("#{}", self.source_id())
	}

	fn status(&self) -> PublicationStatus {
		PublicationStatus::Published
	}
}

#[async_trait]
pub trait SourceStore<R: SourceRecord>: Send + Sync {
	/// Every record needed for one migration pass, pagination is up to the implementor.
	async fn list_all(&self) -> Result<Vec<R>, ApiError>;
}

/// What the target store answers after a write or a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRecord {
	pub target_id: TargetId,
	/// Id of the specific variant (draft or published) the call touched.
	pub numeric_id: i64,
}

#[async_trait]
pub trait TargetStore<P: Send + Sync + 'static>: Send + Sync {
	async fn create(&self, payload: &P, status: PublicationStatus)
		-> Result<TargetRecord, ApiError>;

	async fn update(
		&self,
		target_id: &TargetId,
		payload: &P,
		status: PublicationStatus,
	) -> Result<TargetRecord, ApiError>;

	async fn get(
		&self,
		target_id: &TargetId,
		status: PublicationStatus,
	) -> Result<Option<TargetRecord>, ApiError>;
}
