use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const WORKSPACE_CRATES: [&str; 4] = ["mg_core", "mg_batch", "mg_tracker", "mg_utils"];

/// Installs the global subscriber, logging to stdout.
///
/// `RUST_LOG` wins over `level` when set. Calling this twice keeps the first subscriber.
pub fn init(level: &str) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

	if let Err(e) = tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer().with_target(true))
		.try_init()
	{
		warn!("Tracing subscriber was already set: {e}");
	}
}

fn default_directives(level: &str) -> String {
	WORKSPACE_CRATES
		.iter()
		.fold("warn".to_string(), |mut directives, krate| {
			directives.push(',');
			directives.push_str(krate);
			directives.push('=');
			directives.push_str(level);
			directives
		})
}
