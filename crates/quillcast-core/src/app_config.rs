use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub pricing_path: Option<PathBuf>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Absent keys are not a startup error; stages report `config_error`.
    pub generation_api_key: Option<String>,
    pub generation_base_url: String,
    pub generation_model: String,
    pub generation_timeout_secs: u64,
    pub generation_max_retries: u32,
    pub generation_backoff_base_ms: u64,
    pub scraper_api_key: Option<String>,
    pub scraper_base_url: String,
    pub scraper_timeout_secs: u64,
    pub source_batch_size: usize,
    pub source_batch_pause_ms: u64,
    pub publish_timeout_secs: u64,
    pub publish_max_retries: u32,
    pub payment_api_key: Option<String>,
    pub payment_base_url: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("pricing_path", &self.pricing_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "generation_api_key",
                &self.generation_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("generation_base_url", &self.generation_base_url)
            .field("generation_model", &self.generation_model)
            .field("generation_timeout_secs", &self.generation_timeout_secs)
            .field("generation_max_retries", &self.generation_max_retries)
            .field("generation_backoff_base_ms", &self.generation_backoff_base_ms)
            .field(
                "scraper_api_key",
                &self.scraper_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("scraper_base_url", &self.scraper_base_url)
            .field("scraper_timeout_secs", &self.scraper_timeout_secs)
            .field("source_batch_size", &self.source_batch_size)
            .field("source_batch_pause_ms", &self.source_batch_pause_ms)
            .field("publish_timeout_secs", &self.publish_timeout_secs)
            .field("publish_max_retries", &self.publish_max_retries)
            .field(
                "payment_api_key",
                &self.payment_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("payment_base_url", &self.payment_base_url)
            .finish()
    }
}
