use mg_batch::{
	BatchHooks, BatchStats, Classify, ErrorClass, HookError, ShutdownCoordinator, UnitOfWork,
	WorkItem,
};

use std::{
	collections::{HashMap, HashSet, VecDeque},
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tokio::time::{sleep, Instant};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("remote answered with status {0}")]
pub struct Status(pub u16);

impl Classify for Status {
	fn class(&self) -> ErrorClass {
		if self.0 == 429 || (500..600).contains(&self.0) {
			ErrorClass::Retryable
		} else {
			ErrorClass::Fatal
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Item(pub u32);

impl WorkItem for Item {
	fn item_id(&self) -> String {
		format!("item-{}", self.0)
	}
}

pub fn items(count: u32) -> Vec<Item> {
	(0..count).map(Item).collect()
}

#[derive(Debug, Clone, Copy)]
pub enum Latency {
	None,
	Fixed(Duration),
	Random { min_ms: u64, max_ms: u64 },
}

#[derive(Debug, Default)]
struct WorkState {
	scripted: Mutex<HashMap<u32, VecDeque<Status>>>,
	always_failing: Mutex<HashMap<u32, Status>>,
	panicking: Mutex<HashSet<u32>>,
	calls: Mutex<HashMap<u32, Vec<Instant>>>,
	finished: Mutex<HashMap<u32, Instant>>,
	slow: Mutex<HashMap<u32, Duration>>,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
}

/// Fake remote call: succeeds unless a failure was scripted for the item.
#[derive(Debug, Clone)]
pub struct ScriptedWork {
	latency: Latency,
	state: Arc<WorkState>,
}

impl ScriptedWork {
	pub fn new(latency: Latency) -> Self {
		Self {
			latency,
			state: Arc::default(),
		}
	}

	/// The next calls for `item` fail with these statuses, in order, then it succeeds.
	pub fn fail_then_succeed(self, item: u32, statuses: impl IntoIterator<Item = u16>) -> Self {
		self.state
			.scripted
			.lock()
			.unwrap()
			.insert(item, statuses.into_iter().map(Status).collect());
		self
	}

	pub fn always_fail(self, item: u32, status: u16) -> Self {
		self.state
			.always_failing
			.lock()
			.unwrap()
			.insert(item, Status(status));
		self
	}

	/// Overrides the latency of a single item
	pub fn slow(self, item: u32, latency: Duration) -> Self {
		self.state.slow.lock().unwrap().insert(item, latency);
		self
	}

	pub fn panic_on(self, item: u32) -> Self {
		self.state.panicking.lock().unwrap().insert(item);
		self
	}

	pub fn calls(&self, item: u32) -> Vec<Instant> {
		self.state
			.calls
			.lock()
			.unwrap()
			.get(&item)
			.cloned()
			.unwrap_or_default()
	}

	/// When the last call for `item` returned
	pub fn finished(&self, item: u32) -> Option<Instant> {
		self.state.finished.lock().unwrap().get(&item).copied()
	}

	pub fn max_in_flight(&self) -> usize {
		self.state.max_in_flight.load(Ordering::SeqCst)
	}

	fn latency(&self, item: u32) -> Duration {
		if let Some(latency) = self.state.slow.lock().unwrap().get(&item) {
			return *latency;
		}

		match self.latency {
			Latency::None => Duration::ZERO,
			Latency::Fixed(latency) => latency,
			Latency::Random { min_ms, max_ms } => {
				Duration::from_millis(rand::thread_rng().gen_range(min_ms..max_ms))
			}
		}
	}
}

#[async_trait]
impl UnitOfWork<Item> for ScriptedWork {
	type Output = u32;
	type Error = Status;

	async fn run(&self, item: &Item) -> Result<u32, Status> {
		self.state
			.calls
			.lock()
			.unwrap()
			.entry(item.0)
			.or_default()
			.push(Instant::now());

		let in_flight = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.state
			.max_in_flight
			.fetch_max(in_flight, Ordering::SeqCst);

		let latency = self.latency(item.0);
		if !latency.is_zero() {
			sleep(latency).await;
		}

		self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
		self.state
			.finished
			.lock()
			.unwrap()
			.insert(item.0, Instant::now());

		let blows_up = self.state.panicking.lock().unwrap().contains(&item.0);
		assert!(!blows_up, "remote client blew up");

		if let Some(status) = self.state.always_failing.lock().unwrap().get(&item.0) {
			return Err(status.clone());
		}

		let scripted = self
			.state
			.scripted
			.lock()
			.unwrap()
			.get_mut(&item.0)
			.and_then(VecDeque::pop_front);

		scripted.map_or(Ok(item.0 * 10), Err)
	}
}

/// Hooks recording everything the scheduler hands over.
#[derive(Debug, Default)]
pub struct Recorder {
	pub committed: Vec<(u32, u32)>,
	pub progress: Vec<usize>,
	pub reject_commit_of: HashSet<u32>,
	pub abort_on: Option<u32>,
	pub slow_commit_of: Option<(u32, Duration)>,
	pub shutdown_on_commit: Option<(u32, ShutdownCoordinator)>,
	pub shutdown_on_progress: Option<ShutdownCoordinator>,
}

#[async_trait]
impl BatchHooks<Item, u32, Status> for Recorder {
	type Error = String;

	async fn on_item_success(
		&mut self,
		item: &Item,
		output: u32,
	) -> Result<(), HookError<Status, String>> {
		if let Some((trigger, shutdown)) = &self.shutdown_on_commit {
			if *trigger == item.0 {
				shutdown.request_shutdown();
			}
		}

		if let Some((slow, delay)) = self.slow_commit_of {
			if slow == item.0 {
				sleep(delay).await;
			}
		}

		if self.abort_on == Some(item.0) {
			return Err(HookError::Abort(format!("registry unusable at {}", item.0)));
		}

		if self.reject_commit_of.contains(&item.0) {
			return Err(HookError::Item(Status(409)));
		}

		self.committed.push((item.0, output));
		Ok(())
	}

	async fn on_progress(&mut self, stats: &BatchStats<Item, Status>) -> Result<(), String> {
		self.progress.push(stats.processed);

		if let Some(shutdown) = &self.shutdown_on_progress {
			shutdown.request_shutdown();
		}

		Ok(())
	}
}

pub fn committed_ids(recorder: &Recorder) -> Vec<u32> {
	let mut ids = recorder
		.committed
		.iter()
		.map(|(id, _)| *id)
		.collect::<Vec<_>>();
	ids.sort_unstable();
	ids
}

pub fn failed_ids(stats: &BatchStats<Item, Status>) -> Vec<u32> {
	let mut ids = stats
		.failures
		.iter()
		.map(|failed| failed.item.0)
		.collect::<Vec<_>>();
	ids.sort_unstable();
	ids
}
