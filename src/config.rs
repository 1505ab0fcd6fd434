use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub broker: Option<BrokerConfig>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

/// Resolved upload endpoint: scheme, host, port, base path and an optional
/// forward proxy. Produced by configuration loading; the client only ever
/// consumes `base_url()` and `proxy`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Registry base URL; defaults to the upload server's base URL.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchingConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    pub bootstrap_servers: Vec<String>,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default = "default_acks")]
    pub acks: String,
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u32,
    #[serde(default = "default_send_buffer_bytes")]
    pub send_buffer_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub username: String,
    pub token: String,
}

/// Credentials attached to registry and upload requests.
///
/// The credential lifecycle (issuing, refreshing) belongs to the caller;
/// this type only renders the header.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub username: String,
    pub token: String,
}

impl ApiCredentials {
    /// RFC 7617 `Basic` authorization header value.
    pub fn basic_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.token);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

impl From<&AuthConfig> for ApiCredentials {
    fn from(auth: &AuthConfig) -> Self {
        Self {
            username: auth.username.clone(),
            token: auth.token.clone(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("UPLINK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }
}

impl ServerConfig {
    pub fn base_url(&self) -> String {
        let path = self.path.trim_matches('/');
        if path.is_empty() {
            format!("{}://{}:{}", self.scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}/{}", self.scheme, self.host, self.port, path)
        }
    }
}

impl RegistryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl BatchingConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: None,
            cache_ttl_secs: default_cache_ttl(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_age_ms: default_max_age_ms(),
        }
    }
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_max_age_ms() -> u64 {
    10_000
}

fn default_compression() -> String {
    "snappy".to_string()
}

fn default_acks() -> String {
    "all".to_string()
}

fn default_linger_ms() -> u32 {
    100
}

fn default_send_buffer_bytes() -> usize {
    8_388_608 // 8MB
}
