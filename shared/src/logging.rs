//! Tracing bootstrap shared by the library and the operator binary

use chrono::{DateTime, Utc};

/// Initialize the stdout tracing subscriber with an optional base level
///
/// Noisy HTTP-stack dependencies are pinned to warn so provider traffic
/// doesn't drown registry decisions.
pub fn init_tracing(log_level: Option<&str>) {
    use tracing_subscriber::{EnvFilter, fmt};

    let base_level = log_level.unwrap_or("info");
    let filter = format!("switchboard={base_level},shared={base_level},reqwest=warn,hyper=warn");

    fmt()
        .with_env_filter(EnvFilter::new(&filter))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}
