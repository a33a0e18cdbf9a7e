//! Structured logging configuration.
//!
//! Sets up the `tracing` subscriber with plain or JSON output and an
//! `EnvFilter`, so `RUST_LOG` overrides the configured level.

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Initialize the global tracing subscriber.
///
/// Logs go to stderr so stdout stays free for command output. Calling this
/// a second time in one process is a no-op apart from a debug message.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = if json {
        let json_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true);

        Registry::default().with(env_filter).with(json_layer).try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(true);

        Registry::default().with(env_filter).with(fmt_layer).try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing already initialized");
        return;
    }

    tracing::debug!(level, json, "Tracing initialized");
}

/// Spans shared across the pipeline.
pub mod spans {
    use tracing::{info_span, Span};

    /// Span covering one scan run.
    #[must_use]
    pub fn run_span(run_id: &str) -> Span {
        info_span!("scan", run_id = %run_id)
    }
}
