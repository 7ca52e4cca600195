//! Subscriber setup for the binary.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to this
//! crate and `tower_http` request spans log at debug.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(level: &str) -> String {
    format!("stagegate={},tower_http=debug", level)
}

/// Install the global fmt subscriber. Later calls are no-ops.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(level)));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
