//! Migration configuration

use mg_batch::{BatchOptions, RetryPolicy};
use mg_utils::error::FileIOError;

use std::{
	env,
	path::{Path, PathBuf},
	str::FromStr,
	time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::error::ConfigError;

const ENV_NAME: &str = "ENV_NAME";
const REGISTRY_DIR: &str = "MIGRATION_REGISTRY_DIR";
const LOG_LEVEL: &str = "MIGRATION_LOG_LEVEL";
const BATCH_SIZE: &str = "MIGRATION_BATCH_SIZE";
const CONCURRENCY: &str = "MIGRATION_CONCURRENCY";
const MAX_RETRIES: &str = "MIGRATION_MAX_RETRIES";
const BATCH_DELAY_MS: &str = "MIGRATION_BATCH_DELAY_MS";
const BACKOFF_UNIT_MS: &str = "MIGRATION_BACKOFF_UNIT_MS";

/// Main migration configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
	/// Environment the registries belong to, registry files are named `registry.<env_name>.json`
	pub env_name: String,

	/// Root directory of the per entity type registries
	pub registry_dir: PathBuf,

	/// Level used for the workspace crates when `RUST_LOG` isn't set
	pub log_level: String,

	/// Batch scheduler tuning
	pub batch: BatchConfig,
}

impl Default for MigrationConfig {
	fn default() -> Self {
		Self {
			env_name: String::new(),
			registry_dir: PathBuf::from("registries"),
			log_level: "info".to_string(),
			batch: BatchConfig::default(),
		}
	}
}

/// Configuration for the batch scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
	/// Records per batch, the registry is saved after each one
	pub batch_size: usize,

	/// Maximum concurrent requests to the target
	pub concurrency: usize,

	/// Attempts per record, the first one included
	pub max_retries: u32,

	/// Pause between batches in milliseconds
	pub batch_delay_ms: u64,

	/// Backoff after the failed attempt `n` is `backoff_unit_ms * 2^n`
	pub backoff_unit_ms: u64,
}

impl Default for BatchConfig {
	fn default() -> Self {
		Self {
			batch_size: 10,
			concurrency: 5,
			max_retries: 3,
			batch_delay_ms: 1000,
			backoff_unit_ms: 1000,
		}
	}
}

impl From<&BatchConfig> for BatchOptions {
	fn from(config: &BatchConfig) -> Self {
		Self {
			batch_size: config.batch_size,
			concurrency: config.concurrency,
			retry: RetryPolicy {
				max_attempts: config.max_retries,
				backoff_unit: Duration::from_millis(config.backoff_unit_ms),
			},
			inter_batch_delay: Duration::from_millis(config.batch_delay_ms),
		}
	}
}

impl MigrationConfig {
	/// Defaults overridden by the `ENV_NAME` and `MIGRATION_*` environment variables
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|key| env::var(key).ok())
	}

	fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let mut config = Self::default();

		if let Some(env_name) = lookup(ENV_NAME) {
			config.env_name = env_name;
		}
		if let Some(registry_dir) = lookup(REGISTRY_DIR) {
			config.registry_dir = registry_dir.into();
		}
		if let Some(log_level) = lookup(LOG_LEVEL) {
			config.log_level = log_level;
		}

		let batch = &mut config.batch;
		override_with(&lookup, BATCH_SIZE, &mut batch.batch_size)?;
		override_with(&lookup, CONCURRENCY, &mut batch.concurrency)?;
		override_with(&lookup, MAX_RETRIES, &mut batch.max_retries)?;
		override_with(&lookup, BATCH_DELAY_MS, &mut batch.batch_delay_ms)?;
		override_with(&lookup, BACKOFF_UNIT_MS, &mut batch.backoff_unit_ms)?;

		config.validate()?;

		debug!(?config, "Loaded configuration from environment");

		Ok(config)
	}

	/// Load configuration from a JSON file, missing fields take their default value
	pub async fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();

		info!("Loading config from {}", path.display());

		let bytes = fs::read(path)
			.await
			.map_err(|e| FileIOError::from((path, e, "failed to read config file")))?;

		let config = serde_json::from_slice::<Self>(&bytes).map_err(|source| ConfigError::Parse {
			path: path.into(),
			source,
		})?;

		config.validate()?;

		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.batch.batch_size == 0 {
			return Err(ConfigError::Invalid("batch size must be at least 1"));
		}
		if self.batch.concurrency == 0 {
			return Err(ConfigError::Invalid("concurrency must be at least 1"));
		}
		if self.batch.max_retries == 0 {
			return Err(ConfigError::Invalid("max retries must be at least 1"));
		}

		Ok(())
	}

	#[must_use]
	pub fn batch_options(&self) -> BatchOptions {
		(&self.batch).into()
	}
}

fn override_with<T: FromStr>(
	lookup: impl Fn(&str) -> Option<String>,
	key: &'static str,
	value: &mut T,
) -> Result<(), ConfigError> {
	if let Some(raw) = lookup(key) {
		*value = raw
			.trim()
			.parse()
			.map_err(|_| ConfigError::InvalidEnvValue { key, value: raw })?;
	}

	Ok(())
}
