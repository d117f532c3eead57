use std::env;

use crate::plotting::range::QuickRange;
use crate::dataloader::ResultId;

#[derive(Debug, Clone)]
pub struct Config {
    // Portal API
    pub portal_base_url: String,
    pub request_timeout_seconds: u64,

    // Caching
    pub metadata_cache_ttl_seconds: u64,
    pub metadata_cache_max_entries: u64,

    // Session
    pub site_code: Option<String>,
    pub plot_result_ids: Vec<ResultId>,
    pub quick_range: QuickRange,

    // Output
    pub export_csv_path: Option<String>,
    pub chart_json_path: Option<String>,
    pub download_csv_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            // Portal API
            portal_base_url: env::var("PORTAL_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string())
                .trim_end_matches('/')
                .to_string(),
            request_timeout_seconds: env::var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),

            // Caching
            metadata_cache_ttl_seconds: env::var("METADATA_CACHE_TTL_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300), // 5 minutes default
            metadata_cache_max_entries: env::var("METADATA_CACHE_MAX_ENTRIES")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .unwrap_or(256),

            // Session
            site_code: env::var("SITE_CODE").ok().filter(|s| !s.trim().is_empty()),
            plot_result_ids: parse_result_ids(&env::var("PLOT_RESULT_IDS").unwrap_or_default())?,
            quick_range: match env::var("QUICK_RANGE") {
                Ok(value) => QuickRange::parse(&value)
                    .ok_or(ConfigError::Invalid("QUICK_RANGE", value))?,
                Err(_) => QuickRange::LastYear,
            },

            // Output
            export_csv_path: env::var("EXPORT_CSV_PATH").ok().filter(|s| !s.is_empty()),
            chart_json_path: env::var("CHART_JSON_PATH").ok().filter(|s| !s.is_empty()),
            download_csv_path: env::var("DOWNLOAD_CSV_PATH").ok().filter(|s| !s.is_empty()),
        })
    }

    /// The site to load, required by the binary.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` when `SITE_CODE` is unset.
    pub fn require_site_code(&self) -> Result<&str, ConfigError> {
        self.site_code.as_deref().ok_or(ConfigError::Missing("SITE_CODE"))
    }
}

/// Parse a comma separated list of result ids, ignoring blanks.
fn parse_result_ids(raw: &str) -> Result<Vec<ResultId>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| ConfigError::Invalid("PLOT_RESULT_IDS", s.to_string()))
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
