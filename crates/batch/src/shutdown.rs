use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Cooperative shutdown handshake between a signal handler and a running migration.
///
/// The handler calls [`request_shutdown`](Self::request_shutdown) and then awaits
/// [`wait_for_safe_shutdown`](Self::wait_for_safe_shutdown); the migration checks
/// [`is_shutting_down`](Self::is_shutting_down) at its safe points and, once no work is in flight
/// anymore, calls [`notify_safe_to_exit`](Self::notify_safe_to_exit).
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
	inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
	token: CancellationToken,
	safe_tx: watch::Sender<bool>,
}

impl Default for ShutdownCoordinator {
	fn default() -> Self {
		Self::new()
	}
}

impl ShutdownCoordinator {
	#[must_use]
	pub fn new() -> Self {
		let (safe_tx, _safe_rx) = watch::channel(false);

		Self {
			inner: Arc::new(Inner {
				token: CancellationToken::new(),
				safe_tx,
			}),
		}
	}

	/// Idempotent, only the first call is logged.
	pub fn request_shutdown(&self) {
		if !self.inner.token.is_cancelled() {
			info!("Shutdown requested, waiting for in flight work to finish");
			self.inner.token.cancel();
		}
	}

	#[must_use]
	pub fn is_shutting_down(&self) -> bool {
		self.inner.token.is_cancelled()
	}

	/// Called by the migration once it stopped at a safe point and every completed result was
	/// persisted. Calling it more than once is harmless.
	pub fn notify_safe_to_exit(&self) {
		// `send_replace` stores the value even when nobody is subscribed yet
		if !self.inner.safe_tx.send_replace(true) {
			debug!("Migration reached a safe point to exit");
		}
	}

	/// Resolves once it is safe to exit.
	///
	/// Returns right away if no shutdown was requested, as there is nothing to wait for.
	pub async fn wait_for_safe_shutdown(&self) {
		if !self.is_shutting_down() {
			return;
		}

		let mut safe_rx = self.inner.safe_tx.subscribe();
		// The sender lives in `inner`, which we hold, so the channel can't be closed here
		let _ = safe_rx.wait_for(|is_safe| *is_safe).await;
	}

	/// Resolves when a shutdown is requested, for use in `select!` around sleeps.
	pub async fn cancelled(&self) {
		self.inner.token.cancelled().await;
	}
}
