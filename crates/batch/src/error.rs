use thiserror::Error;

/// How a failed attempt should be treated by [`run_with_retry`](crate::run_with_retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
	/// Temporary condition on the remote side (connection reset, timeout, throttling, 5xx).
	Retryable,
	/// Retrying can't change the outcome (validation errors, unresolved references, ...).
	Fatal,
}

/// Errors produced by units of work must say whether another attempt could succeed.
pub trait Classify {
	fn class(&self) -> ErrorClass;

	fn is_retryable(&self) -> bool {
		self.class() == ErrorClass::Retryable
	}
}

/// Why a single item ended up in the failed list, always tagged with the item's logical id.
#[derive(Debug, Error)]
pub enum ItemFailure<E> {
	#[error("failed to process item <id='{item_id}'> with a non retryable error: {source}")]
	Fatal {
		item_id: String,
		attempts: u32,
		#[source]
		source: E,
	},
	#[error("failed to process item <id='{item_id}'> after {attempts} attempt(s): {source}")]
	Exhausted {
		item_id: String,
		attempts: u32,
		#[source]
		source: E,
	},
	#[error("item <id='{item_id}'> was processed but committing its result failed: {source}")]
	Commit {
		item_id: String,
		#[source]
		source: E,
	},
	#[error("unit of work panicked <item_id='{item_id}'>")]
	Panicked { item_id: String },
}

impl<E> ItemFailure<E> {
	#[must_use]
	pub fn item_id(&self) -> &str {
		match self {
			Self::Fatal { item_id, .. }
			| Self::Exhausted { item_id, .. }
			| Self::Commit { item_id, .. }
			| Self::Panicked { item_id } => item_id,
		}
	}

	/// The underlying error, `None` for panics
	#[must_use]
	pub const fn error(&self) -> Option<&E> {
		match self {
			Self::Fatal { source, .. }
			| Self::Exhausted { source, .. }
			| Self::Commit { source, .. } => Some(source),
			Self::Panicked { .. } => None,
		}
	}

	#[must_use]
	pub fn into_error(self) -> Option<E> {
		match self {
			Self::Fatal { source, .. }
			| Self::Exhausted { source, .. }
			| Self::Commit { source, .. } => Some(source),
			Self::Panicked { .. } => None,
		}
	}

	/// How many times the unit of work ran before giving up, `None` when the failure happened
	/// after the work itself succeeded or when it panicked.
	#[must_use]
	pub const fn attempts(&self) -> Option<u32> {
		match self {
			Self::Fatal { attempts, .. } | Self::Exhausted { attempts, .. } => Some(*attempts),
			Self::Commit { .. } | Self::Panicked { .. } => None,
		}
	}
}
