use mg_batch::{Classify, ErrorClass};
use mg_tracker::{DependencyUnresolved, SourceId, TargetId, TrackerError};
use mg_utils::error::FileIOError;

use std::path::Path;

use thiserror::Error;

use crate::store::PublicationStatus;

const TOO_MANY_REQUESTS: u16 = 429;

/// Failure talking to one of the content APIs.
#[derive(Debug, Error)]
pub enum ApiError {
	#[error("connection to the content API failed: {0}")]
	Connection(String),
	#[error("request to the content API timed out")]
	Timeout,
	#[error("content API answered with status {status}: {message}")]
	Status { status: u16, message: String },
	#[error("malformed content API response: {0}")]
	MalformedResponse(String),
	#[error("content API request failed: {0}")]
	Other(String),
}

impl Classify for ApiError {
	fn class(&self) -> ErrorClass {
		match self {
			Self::Connection(_) | Self::Timeout => ErrorClass::Retryable,
			Self::Status { status, .. }
				if *status == TOO_MANY_REQUESTS || (500..=599).contains(status) =>
			{
				ErrorClass::Retryable
			}
			Self::Status { .. } | Self::MalformedResponse(_) | Self::Other(_) => ErrorClass::Fatal,
		}
	}
}

impl From<reqwest::Error> for ApiError {
	fn from(e: reqwest::Error) -> Self {
		if e.is_timeout() {
			Self::Timeout
		} else if let Some(status) = e.status() {
			Self::Status {
				status: status.as_u16(),
				message: e.to_string(),
			}
		} else if e.is_connect() || e.is_request() {
			Self::Connection(e.to_string())
		} else if e.is_decode() || e.is_body() {
			Self::MalformedResponse(e.to_string())
		} else {
			Self::Other(e.to_string())
		}
	}
}

/// Why a single record couldn't be migrated; never stops the run.
#[derive(Debug, Error)]
pub enum ItemError {
	#[error(transparent)]
	Api(#[from] ApiError),
	#[error(transparent)]
	DependencyUnresolved(#[from] DependencyUnresolved),
	#[error("target record has no {status} variant <target_id='{target_id}'>")]
	VariantNotFound {
		target_id: TargetId,
		status: PublicationStatus,
	},
	#[error("record is not in the registry <source_id='{0}'>")]
	NotTracked(SourceId),
}

impl Classify for ItemError {
	fn class(&self) -> ErrorClass {
		match self {
			Self::Api(e) => e.class(),
			Self::DependencyUnresolved(_) | Self::VariantNotFound { .. } | Self::NotTracked(_) => {
				ErrorClass::Fatal
			}
		}
	}
}

/// Stops the migration of an entity type, and with it the whole plan.
#[derive(Debug, Error)]
pub enum MigrationError {
	#[error(transparent)]
	Tracker(#[from] TrackerError),
	#[error("failed to list source records <entity='{entity}'>: {source}")]
	SourceListing {
		entity: String,
		#[source]
		source: ApiError,
	},
	#[error("no registry was opened for entity type <entity='{0}'>")]
	UnknownEntity(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid value for {key}: '{value}'")]
	InvalidEnvValue { key: &'static str, value: String },
	#[error("invalid configuration: {0}")]
	Invalid(&'static str),
	#[error("failed to parse config file: {source}; path: '{}'", .path.display())]
	Parse {
		path: Box<Path>,
		#[source]
		source: serde_json::Error,
	},
	#[error(transparent)]
	FileIO(#[from] FileIOError),
}

#[cfg(test)]
mod tests {
	use super::*;

	fn status(status: u16) -> ApiError {
		ApiError::Status {
			status,
			message: String::new(),
		}
	}

	#[test]
	fn transient_api_errors_are_retryable() {
		assert!(ApiError::Connection("reset by peer".to_string()).is_retryable());
		assert!(ApiError::Timeout.is_retryable());
		assert!(status(429).is_retryable());
		assert!(status(500).is_retryable());
		assert!(status(503).is_retryable());

		assert!(!status(400).is_retryable());
		assert!(!status(404).is_retryable());
		assert!(!ApiError::MalformedResponse("missing data".to_string()).is_retryable());
	}

	#[test]
	fn unresolved_dependencies_are_fatal() {
		let err = ItemError::from(DependencyUnresolved {
			entity: "tag".to_string(),
			source_ids: vec![3],
		});

		assert_eq!(err.class(), ErrorClass::Fatal);
		assert!(ItemError::from(status(502)).is_retryable());
	}

	#[test]
	fn client_build_errors_are_fatal() {
		let err = reqwest::Client::new()
			.get("not a url")
			.build()
			.map(|_| ())
			.unwrap_err();

		assert!(!ApiError::from(err).is_retryable());
	}
}
