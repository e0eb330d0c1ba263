use std::env;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// SQLite database file. `None` selects the in-memory store.
    pub database_path: Option<String>,
    /// How long a latest-price quote is reused.
    pub price_ttl: Duration,
    /// Deployment environment (`local`, `dev`, `staging`, `production`, ...).
    pub environment: String,
    /// Upper bound on handling a single request.
    pub request_timeout: Duration,
    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let price_ttl_minutes: u64 = env::var("PRICE_TTL_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        let request_timeout_secs: u64 = env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            database_path: env::var("DATABASE_PATH").ok().filter(|p| !p.trim().is_empty()),
            price_ttl: Duration::from_secs(price_ttl_minutes * 60),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "local".to_string()),
            request_timeout: Duration::from_secs(request_timeout_secs),
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }

    /// Default tracing filter when `RUST_LOG` is not set.
    pub fn default_log_filter(&self) -> &'static str {
        match self.environment.to_lowercase().as_str() {
            "local" | "dev" => "stocky=debug,tower_http=debug",
            _ => "stocky=info,tower_http=info",
        }
    }
}
