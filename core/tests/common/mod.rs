#![allow(dead_code)]

use mg_batch::{BatchOptions, BatchScheduler, RetryPolicy, ShutdownCoordinator};
use mg_core::{
	ApiError, Dependencies, EntityMapping, EntityMigration, MigrationPlan, PublicationStatus,
	SecondaryIdStrategy, SourceRecord, SourceStore, TargetRecord, TargetStore,
};
use mg_tracker::{DependencyUnresolved, SourceId, TargetId, Tracker};

use std::{
	collections::{BTreeMap, HashMap},
	path::Path,
	sync::{
		atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use async_trait::async_trait;
use tokio::time::sleep;

pub const ENV: &str = "test";
pub const CREATED_AT: &str = "2024-01-01T00:00:00.000Z";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Doc {
	pub id: SourceId,
	pub title: String,
	pub updated_at: Option<String>,
	pub status: PublicationStatus,
	pub tag_ids: Vec<SourceId>,
}

impl Doc {
	pub fn new(id: SourceId, title: &str) -> Self {
		Self {
			id,
			title: title.to_string(),
			updated_at: Some(CREATED_AT.to_string()),
			status: PublicationStatus::Published,
			tag_ids: vec![],
		}
	}

	pub fn tagged(mut self, tag_ids: &[SourceId]) -> Self {
		self.tag_ids = tag_ids.to_vec();
		self
	}

	pub fn draft(mut self) -> Self {
		self.status = PublicationStatus::Draft;
		self
	}

	pub fn touched(mut self, updated_at: &str) -> Self {
		self.updated_at = Some(updated_at.to_string());
		self
	}
}

impl SourceRecord for Doc {
	fn source_id(&self) -> SourceId {
		self.id
	}

	fn watermark(&self) -> Option<&str> {
		self.updated_at.as_deref()
	}

	fn label(&self) -> String {
		self.title.clone()
	}

	fn status(&self) -> PublicationStatus {
		self.status
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
	pub title: String,
	pub tags: Vec<TargetId>,
}

/// Tags keep their numeric id, other entity types reference them by it.
pub struct TagMapping;

impl EntityMapping for TagMapping {
	type Record = Doc;
	type Payload = Payload;

	fn entity(&self) -> &str {
		"tag"
	}

	fn to_payload(&self, record: &Doc, _: &Dependencies) -> Result<Payload, DependencyUnresolved> {
		Ok(Payload {
			title: record.title.clone(),
			tags: vec![],
		})
	}

	fn secondary_ids(&self) -> SecondaryIdStrategy {
		SecondaryIdStrategy::NumericId
	}
}

/// Articles reference tags and exist as draft and published variants.
pub struct ArticleMapping;

impl EntityMapping for ArticleMapping {
	type Record = Doc;
	type Payload = Payload;

	fn entity(&self) -> &str {
		"article"
	}

	fn dependencies(&self) -> &[&str] {
		&["tag"]
	}

	fn to_payload(&self, record: &Doc, deps: &Dependencies) -> Result<Payload, DependencyUnresolved> {
		Ok(Payload {
			title: record.title.clone(),
			tags: deps.resolve_many("tag", record.tag_ids.iter().copied())?,
		})
	}

	fn secondary_ids(&self) -> SecondaryIdStrategy {
		SecondaryIdStrategy::Variants
	}
}

#[derive(Debug, Clone, Default)]
pub struct FakeSource {
	records: Arc<Mutex<Vec<Doc>>>,
	failing: Arc<AtomicBool>,
}

impl FakeSource {
	pub fn with(records: Vec<Doc>) -> Self {
		let source = Self::default();
		source.set(records);
		source
	}

	pub fn set(&self, records: Vec<Doc>) {
		*self.records.lock().unwrap() = records;
	}

	pub fn replace(&self, doc: Doc) {
		let mut records = self.records.lock().unwrap();
		if let Some(current) = records.iter_mut().find(|current| current.id == doc.id) {
			*current = doc;
		}
	}

	pub fn fail_listing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}
}

#[async_trait]
impl SourceStore<Doc> for FakeSource {
	async fn list_all(&self) -> Result<Vec<Doc>, ApiError> {
		if self.failing.load(Ordering::SeqCst) {
			return Err(ApiError::Connection("source is down".to_string()));
		}

		Ok(self.records.lock().unwrap().clone())
	}
}

#[derive(Debug, Clone)]
pub struct Stored {
	pub payload: Payload,
	pub variants: HashMap<PublicationStatus, i64>,
}

#[derive(Debug, Default)]
struct TargetState {
	docs: Mutex<BTreeMap<String, Stored>>,
	next_id: AtomicI64,
	creates: AtomicUsize,
	updates: AtomicUsize,
	gets: AtomicUsize,
	transient_create_failures: AtomicUsize,
	hide_drafts: AtomicBool,
	latency: Mutex<Duration>,
}

/// In memory target store counting every call it receives.
///
/// Publishing a document creates both of its variants, like a headless CMS with draft and
/// publish support does.
#[derive(Debug, Clone, Default)]
pub struct FakeTarget {
	state: Arc<TargetState>,
}

impl FakeTarget {
	/// The next `count` creates answer with a 503
	pub fn fail_creates(&self, count: usize) {
		self.state
			.transient_create_failures
			.store(count, Ordering::SeqCst);
	}

	/// Lookups of draft variants find nothing
	pub fn hide_drafts(&self, hide: bool) {
		self.state.hide_drafts.store(hide, Ordering::SeqCst);
	}

	pub fn with_latency(self, latency: Duration) -> Self {
		*self.state.latency.lock().unwrap() = latency;
		self
	}

	pub fn creates(&self) -> usize {
		self.state.creates.load(Ordering::SeqCst)
	}

	pub fn updates(&self) -> usize {
		self.state.updates.load(Ordering::SeqCst)
	}

	pub fn gets(&self) -> usize {
		self.state.gets.load(Ordering::SeqCst)
	}

	pub fn len(&self) -> usize {
		self.state.docs.lock().unwrap().len()
	}

	pub fn stored(&self, target_id: &TargetId) -> Option<Stored> {
		self.state
			.docs
			.lock()
			.unwrap()
			.get(target_id.as_str())
			.cloned()
	}

	fn next_id(&self) -> i64 {
		self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1
	}

	fn ensure_variants(&self, stored: &mut Stored, status: PublicationStatus) -> i64 {
		if status == PublicationStatus::Published {
			stored
				.variants
				.entry(PublicationStatus::Draft)
				.or_insert_with(|| self.next_id());
		}

		*stored
			.variants
			.entry(status)
			.or_insert_with(|| self.next_id())
	}

	async fn wait(&self) {
		let latency = *self.state.latency.lock().unwrap();
		if !latency.is_zero() {
			sleep(latency).await;
		}
	}
}

fn unavailable() -> ApiError {
	ApiError::Status {
		status: 503,
		message: "service unavailable".to_string(),
	}
}

#[async_trait]
impl TargetStore<Payload> for FakeTarget {
	async fn create(
		&self,
		payload: &Payload,
		status: PublicationStatus,
	) -> Result<TargetRecord, ApiError> {
		self.state.creates.fetch_add(1, Ordering::SeqCst);
		self.wait().await;

		let failing = self
			.state
			.transient_create_failures
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
			.is_ok();
		if failing {
			return Err(unavailable());
		}

		let target_id = format!("doc-{}", self.next_id());
		let mut stored = Stored {
			payload: payload.clone(),
			variants: HashMap::new(),
		};
		let numeric_id = self.ensure_variants(&mut stored, status);

		self.state
			.docs
			.lock()
			.unwrap()
			.insert(target_id.clone(), stored);

		Ok(TargetRecord {
			target_id: target_id.into(),
			numeric_id,
		})
	}

	async fn update(
		&self,
		target_id: &TargetId,
		payload: &Payload,
		status: PublicationStatus,
	) -> Result<TargetRecord, ApiError> {
		self.state.updates.fetch_add(1, Ordering::SeqCst);
		self.wait().await;

		let mut docs = self.state.docs.lock().unwrap();
		let Some(stored) = docs.get_mut(target_id.as_str()) else {
			return Err(ApiError::Status {
				status: 404,
				message: format!("{target_id} not found"),
			});
		};

		stored.payload = payload.clone();
		let numeric_id = self.ensure_variants(stored, status);

		Ok(TargetRecord {
			target_id: target_id.clone(),
			numeric_id,
		})
	}

	async fn get(
		&self,
		target_id: &TargetId,
		status: PublicationStatus,
	) -> Result<Option<TargetRecord>, ApiError> {
		self.state.gets.fetch_add(1, Ordering::SeqCst);

		if status == PublicationStatus::Draft && self.state.hide_drafts.load(Ordering::SeqCst) {
			return Ok(None);
		}

		Ok(self
			.state
			.docs
			.lock()
			.unwrap()
			.get(target_id.as_str())
			.and_then(|stored| stored.variants.get(&status))
			.map(|numeric_id| TargetRecord {
				target_id: target_id.clone(),
				numeric_id: *numeric_id,
			}))
	}
}

/// Tags then articles, each entity type with its own source and target.
pub struct Cms {
	pub tag_source: FakeSource,
	pub tag_target: FakeTarget,
	pub article_source: FakeSource,
	pub article_target: FakeTarget,
}

impl Cms {
	pub fn new(tags: Vec<Doc>, articles: Vec<Doc>) -> Self {
		Self {
			tag_source: FakeSource::with(tags),
			tag_target: FakeTarget::default(),
			article_source: FakeSource::with(articles),
			article_target: FakeTarget::default(),
		}
	}

	pub fn plan(&self, registry_dir: &Path, shutdown: ShutdownCoordinator) -> MigrationPlan {
		MigrationPlan::new(registry_dir, ENV, BatchScheduler::new(options(), shutdown))
			.step(EntityMigration::new(
				TagMapping,
				self.tag_source.clone(),
				self.tag_target.clone(),
			))
			.step(EntityMigration::new(
				ArticleMapping,
				self.article_source.clone(),
				self.article_target.clone(),
			))
	}
}

pub fn options() -> BatchOptions {
	BatchOptions {
		batch_size: 2,
		concurrency: 2,
		retry: RetryPolicy {
			max_attempts: 3,
			backoff_unit: Duration::from_millis(100),
		},
		inter_batch_delay: Duration::from_millis(500),
	}
}

pub async fn registry(registry_dir: &Path, entity: &str) -> Tracker {
	Tracker::open(registry_dir, entity, ENV).await.unwrap()
}

pub fn tags(count: SourceId) -> Vec<Doc> {
	(1..=count)
		.map(|id| Doc::new(id, &format!("Tag {id}")))
		.collect()
}
