//! Tracing subscriber setup shared by the pipeline binaries.
use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber.
///
/// The filter is taken from `RUST_LOG` when set, and defaults to `info`
/// otherwise. Call once, before any spans are opened.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
