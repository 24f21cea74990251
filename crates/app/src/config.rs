//! Application configuration loaded from environment variables.

/// Runtime configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `WORKER_COUNT` — pool worker count (default: `4`)
/// - `QUEUE_SIZE` — pool task queue capacity (default: `100`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub worker_count: usize,
    pub queue_size: usize,
    pub log_level: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            worker_count: std::env::var("WORKER_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            queue_size: std::env::var("QUEUE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_size: 100,
            log_level: "info".to_string(),
        }
    }
}
