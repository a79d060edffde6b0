use mg_batch::{BatchScheduler, ShutdownCoordinator};
use mg_tracker::{Resolver, Tracker};
use mg_utils::error::report_error;

use std::{collections::HashMap, iter, path::PathBuf};

use async_trait::async_trait;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
	config::MigrationConfig,
	dependencies::Dependencies,
	error::MigrationError,
	report::{MigrationReport, PlanReport},
};

/// One entity type's migration, as seen by a [`MigrationPlan`].
#[async_trait]
pub trait MigrationStep: Send + Sync {
	fn entity(&self) -> &str;

	fn dependencies(&self) -> &[&str];

	async fn run(
		&self,
		tracker: &mut Tracker,
		deps: Dependencies,
		scheduler: &BatchScheduler,
	) -> Result<MigrationReport, MigrationError>;
}

/// Runs entity migrations one after the other, in the order they were added.
///
/// That order must be a dependency order: an entity type's references can only be resolved
/// once the referenced entity types were migrated.
pub struct MigrationPlan {
	registry_dir: PathBuf,
	env_name: String,
	scheduler: BatchScheduler,
	steps: Vec<Box<dyn MigrationStep>>,
}

impl MigrationPlan {
	pub fn new(
		registry_dir: impl Into<PathBuf>,
		env_name: impl Into<String>,
		scheduler: BatchScheduler,
	) -> Self {
		Self {
			registry_dir: registry_dir.into(),
			env_name: env_name.into(),
			scheduler,
			steps: vec![],
		}
	}

	#[must_use]
	pub fn from_config(config: &MigrationConfig, shutdown: ShutdownCoordinator) -> Self {
		Self::new(
			&config.registry_dir,
			&config.env_name,
			BatchScheduler::new(config.batch_options(), shutdown),
		)
	}

	#[must_use]
	pub fn step(mut self, step: impl MigrationStep + 'static) -> Self {
		self.steps.push(Box::new(step));
		self
	}

	pub fn entities(&self) -> impl Iterator<Item = &str> + '_ {
		self.steps.iter().map(|step| step.entity())
	}

	/// Runs every step, stopping at the first run level error or shutdown request.
	///
	/// All registries are loaded before the first write, so a corrupted one fails the plan
	/// before the target is touched. Each step's registry is saved once the step ends, whatever
	/// its outcome.
	#[instrument(skip_all, fields(run_id = %Uuid::new_v4(), steps = self.steps.len()))]
	pub async fn run(&self) -> Result<PlanReport, MigrationError> {
		let res = self.run_steps().await;

		let shutdown = self.scheduler.shutdown();
		if shutdown.is_shutting_down() {
			// Registries are saved by now, nothing else would be lost by exiting
			shutdown.notify_safe_to_exit();
		}

		if let Ok(report) = &res {
			report.log_summary();
		}

		res
	}

	async fn run_steps(&self) -> Result<PlanReport, MigrationError> {
		let mut trackers = self.open_registries().await?;
		let mut report = PlanReport::default();

		for step in &self.steps {
			let entity = step.entity();

			if self.scheduler.shutdown().is_shutting_down() {
				warn!(%entity, "Shutdown requested, not starting the remaining migrations");
				report.interrupted = true;
				break;
			}

			// Snapshots are taken before the step's own registry is borrowed mutably
			let deps = step
				.dependencies()
				.iter()
				.map(|dependency| {
					trackers
						.get(*dependency)
						.map(|tracker| Resolver::new(tracker.snapshot()))
						.ok_or_else(|| MigrationError::UnknownEntity((*dependency).to_owned()))
				})
				.collect::<Result<Vec<_>, _>>()?
				.into_iter()
				.fold(Dependencies::new(), Dependencies::with);

			let tracker = trackers
				.get_mut(entity)
				.ok_or_else(|| MigrationError::UnknownEntity(entity.to_owned()))?;

			info!(%entity, "Migrating entity type");

			let res = step.run(tracker, deps, &self.scheduler).await;
			let saved = tracker.save().await;

			match res {
				Ok(migration_report) => {
					saved?;

					let interrupted = migration_report.interrupted;
					report.entities.push(migration_report);

					if interrupted {
						report.interrupted = true;
						break;
					}
				}

				Err(e) => {
					report_error(&saved);
					error!(%entity, "Migration aborted: {e:#}");
					return Err(e);
				}
			}
		}

		Ok(report)
	}

	async fn open_registries(&self) -> Result<HashMap<String, Tracker>, MigrationError> {
		let mut trackers = HashMap::new();

		let entities = self.steps.iter().flat_map(|step| {
			iter::once(step.entity()).chain(step.dependencies().iter().copied())
		});

		for entity in entities {
			if !trackers.contains_key(entity) {
				let tracker = Tracker::open(&self.registry_dir, entity, &self.env_name).await?;
				trackers.insert(entity.to_owned(), tracker);
			}
		}

		Ok(trackers)
	}
}
