use mg_batch::ShutdownCoordinator;

use std::future::{pending, Future};

use tokio::signal;
use tracing::{error, info};

/// Requests a graceful shutdown once `signal` resolves, then waits until exiting is safe.
///
/// Meant to run alongside [`MigrationPlan::run`](crate::MigrationPlan::run): the plan finishes
/// its in flight requests, saves its registries and then notifies the safe point. It never
/// returns if neither the signal nor a shutdown request from elsewhere happens, so race it with
/// the plan rather than awaiting it alone.
pub async fn shutdown_on_signal(shutdown: ShutdownCoordinator, signal: impl Future<Output = ()>) {
	tokio::select! {
		() = signal => {
			info!("Received interrupt signal, finishing in flight records before exiting");
			shutdown.request_shutdown();
		}
		() = shutdown.cancelled() => {}
	}

	shutdown.wait_for_safe_shutdown().await;

	info!("Registries saved, safe to exit");
}

/// [`shutdown_on_signal`] wired to Ctrl+C, and SIGTERM on unix.
pub async fn shutdown_on_ctrl_c(shutdown: ShutdownCoordinator) {
	shutdown_on_signal(shutdown, async {
		let ctrl_c = async {
			if let Err(e) = signal::ctrl_c().await {
				error!("Failed to listen for Ctrl+C: {e:#}");
				pending::<()>().await;
			}
		};

		#[cfg(unix)]
		let terminate = async {
			match signal::unix::signal(signal::unix::SignalKind::terminate()) {
				Ok(mut terminate) => {
					terminate.recv().await;
				}
				Err(e) => {
					error!("Failed to listen for SIGTERM: {e:#}");
					pending::<()>().await;
				}
			}
		};

		#[cfg(not(unix))]
		let terminate = pending::<()>();

		tokio::select! {
			() = ctrl_c => {}
			() = terminate => {}
		}
	})
	.await;
}
