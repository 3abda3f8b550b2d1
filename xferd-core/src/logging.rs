use tracing_subscriber::EnvFilter;

/// Initializes a `tracing_subscriber` using `XFERD_LOG` first, then `RUST_LOG`, then a default.
///
/// Log field contract for xferd nodes:
/// - Include `node` on liveness and leadership events.
/// - Include `job_id` and `file_id` on any per-transfer event.
/// - Include `kind` on message channel events.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .try_init();
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("XFERD_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
