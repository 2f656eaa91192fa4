use std::net::SocketAddr;

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
    pub api_key_hash_salt: String,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_request_timeout_secs: u64,
    pub gemini_max_retries: u32,
    pub gemini_backoff_base_ms: u64,
    pub gemini_backoff_cap_ms: u64,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub image_fetch_max_bytes: u64,
    pub image_fetch_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub stale_job_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("api_key_hash_salt", &"[redacted]")
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("gemini_base_url", &self.gemini_base_url)
            .field(
                "gemini_request_timeout_secs",
                &self.gemini_request_timeout_secs,
            )
            .field("gemini_max_retries", &self.gemini_max_retries)
            .field("gemini_backoff_base_ms", &self.gemini_backoff_base_ms)
            .field("gemini_backoff_cap_ms", &self.gemini_backoff_cap_ms)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("image_fetch_max_bytes", &self.image_fetch_max_bytes)
            .field("image_fetch_timeout_secs", &self.image_fetch_timeout_secs)
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("stale_job_timeout_secs", &self.stale_job_timeout_secs)
            .finish()
    }
}
