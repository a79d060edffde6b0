//!
//! # Batch
//!
//! Runs a list of independent units of work against a rate limited remote API, safely:
//! - Items are split into sequential batches, each batch runs at most `concurrency` units at a time,
//!   every unit on its own task;
//! - Every unit goes through [`run_with_retry`], transient failures are retried with exponential
//!   backoff while fatal ones fail the item right away;
//! - A failing item never cancels its siblings, its failure is captured in [`BatchStats`];
//! - Successful results are handed to [`BatchHooks::on_item_success`] as soon as they arrive, and
//!   [`BatchHooks::on_progress`] runs after each batch, the natural place to persist state;
//! - A [`ShutdownCoordinator`] lets a signal handler stop the run between chunks without ever
//!   killing in flight work, and wait until it is safe to exit.
//!
//! ## Basic example
//!
//! ```
//! use mg_batch::{
//! 	BatchOptions, BatchScheduler, Classify, ErrorClass, NoHooks, ShutdownCoordinator,
//! 	UnitOfWork, WorkItem,
//! };
//! use async_trait::async_trait;
//! use thiserror::Error;
//!
//! #[derive(Debug, Error)]
//! #[error("remote said no")]
//! struct Rejected;
//!
//! impl Classify for Rejected {
//! 	fn class(&self) -> ErrorClass {
//! 		ErrorClass::Fatal
//! 	}
//! }
//!
//! struct Page(u32);
//!
//! impl WorkItem for Page {
//! 	fn item_id(&self) -> String {
//! 		self.0.to_string()
//! 	}
//! }
//!
//! struct Publish;
//!
//! #[async_trait]
//! impl UnitOfWork<Page> for Publish {
//! 	type Output = ();
//! 	type Error = Rejected;
//!
//! 	async fn run(&self, page: &Page) -> Result<(), Rejected> {
//! 		if page.0 % 2 == 0 { Ok(()) } else { Err(Rejected) }
//! 	}
//! }
//!
//! #[tokio::main]
//! async fn main() {
//! 	let scheduler = BatchScheduler::new(BatchOptions::default(), ShutdownCoordinator::new());
//!
//! 	let stats = scheduler
//! 		.process((0..4).map(Page).collect(), Publish, &mut NoHooks)
//! 		.await
//! 		.unwrap();
//!
//! 	assert_eq!(stats.succeeded, 2);
//! 	assert_eq!(stats.failed, 2);
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod error;
mod retry;
mod scheduler;
mod shutdown;
mod stats;

pub use error::{Classify, ErrorClass, ItemFailure};
pub use retry::{run_with_retry, RetryPolicy};
pub use scheduler::{
	BatchHooks, BatchOptions, BatchScheduler, HookError, NoHooks, UnitOfWork, WorkItem,
};
pub use shutdown::ShutdownCoordinator;
pub use stats::{BatchStats, FailedItem};
