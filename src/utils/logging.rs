use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the application.
///
/// `RUST_LOG` wins when set; otherwise `default_level` is used. Unknown
/// levels fall back to `info`.
pub fn init(default_level: &str) {
    let lvl = match default_level.to_lowercase().as_str() {
        "error" => "error",
        "warn" | "warning" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(lvl));

    // try_init so tests and embedding applications can call this repeatedly
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
