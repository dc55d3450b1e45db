//! Tracing initialization and configuration.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Initialize logging.
///
/// Reads the `DRIFT_LOG` environment variable for per-subsystem log levels.
/// Format: `DRIFT_LOG=pattern_storage=debug,pattern_engine=info`
///
/// Falls back to `pattern_core=info,pattern_storage=info,pattern_engine=info`
/// if `DRIFT_LOG` is not set or is invalid. Idempotent.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("DRIFT_LOG").unwrap_or_else(|_| {
            EnvFilter::new("pattern_core=info,pattern_storage=info,pattern_engine=info")
        });

        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(filter)
            .try_init();
    });
}
