use std::{fmt, future::Future, time::Duration};

use tokio::time::sleep;
use tracing::{debug, warn};

use super::error::{Classify, ItemFailure};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Total attempts including the first one; `0` behaves as `1`.
	pub max_attempts: u32,
	/// After the failed attempt `n` (counted from 1) we wait `backoff_unit * 2^n`.
	pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: DEFAULT_MAX_ATTEMPTS,
			backoff_unit: DEFAULT_BACKOFF_UNIT,
		}
	}
}

impl RetryPolicy {
	#[must_use]
	pub fn backoff_for(&self, attempt: u32) -> Duration {
		self.backoff_unit
			.saturating_mul(2_u32.saturating_pow(attempt))
	}
}

/// Runs `work` until it succeeds, fails with a non retryable error, or runs out of attempts.
///
/// The returned [`ItemFailure`] carries the last error and `item_id`, so failures can be traced
/// back to the record that caused them.
pub async fn run_with_retry<Out, E, Fut>(
	item_id: &str,
	policy: &RetryPolicy,
	mut work: impl FnMut() -> Fut + Send,
) -> Result<Out, ItemFailure<E>>
where
	Fut: Future<Output = Result<Out, E>> + Send,
	E: Classify + fmt::Display,
{
	let max_attempts = policy.max_attempts.max(1);
	let mut attempt = 1;

	loop {
		match work().await {
			Ok(out) => {
				if attempt > 1 {
					debug!(%item_id, attempt, "Succeeded after retrying");
				}
				return Ok(out);
			}

			Err(e) if !e.is_retryable() => {
				return Err(ItemFailure::Fatal {
					item_id: item_id.to_owned(),
					attempts: attempt,
					source: e,
				});
			}

			Err(e) if attempt >= max_attempts => {
				return Err(ItemFailure::Exhausted {
					item_id: item_id.to_owned(),
					attempts: attempt,
					source: e,
				});
			}

			Err(e) => {
				let delay = policy.backoff_for(attempt);
				warn!(
					%item_id,
					attempt,
					max_attempts,
					delay_ms = delay.as_millis(),
					"Retrying after transient failure: {e}",
				);
				sleep(delay).await;
				attempt += 1;
			}
		}
	}
}
