//! apibench Library
//!
//! This module exports the load driver, summary formatter and proxy service
//! components for use by the binaries and integration tests.

pub mod config;
pub mod load;
pub mod proxy;
pub mod summary;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use load::{LoadRunner, Profile, ProfileKind, RunOptions, RunOutcome};
pub use proxy::{ProxyAppState, UpstreamClient, UpstreamError, proxy_routes};
pub use summary::{Comparison, RunSummary, render_run_report};

/// Install the tracing subscriber used by both binaries
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apibench=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
