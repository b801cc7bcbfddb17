use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub emit: EmitConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; empty means any origin
    #[serde(default)]
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

/// How live connections are authenticated. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// A valid token is mandatory; connections without one are refused
    #[default]
    Required,
    /// Tokens are verified when present; absent tokens yield anonymous access
    Optional,
    /// Tokens are ignored and every connection is anonymous
    Disabled,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Allow anonymous connections to declare their own tenant
    #[serde(default)]
    pub anonymous: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmitConfig {
    /// Static bearer secret for HTTP ingress. Unset rejects every call.
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Outbound buffer size per connection
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    /// A connection holds at most one user room at a time
    #[serde(default = "default_exclusive")]
    pub exclusive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    #[default]
    Local,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub backend: BusBackend,
    #[serde(default = "default_bus_channel")]
    pub channel: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_otel_service")]
    pub service: String,
    /// Trace sampling ratio (0.0-1.0)
    #[serde(default = "default_otel_sampling")]
    pub sampling: f64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_buffer() -> usize {
    32
}

fn default_exclusive() -> bool {
    true
}

fn default_bus_channel() -> String {
    "relay:events".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service() -> String {
    "tenant-relay".to_string()
}

fn default_otel_sampling() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("auth.mode", "required")?
            .set_default("auth.anonymous", false)?
            .set_default("websocket.buffer", 32)?
            .set_default("websocket.exclusive", true)?
            .set_default("bus.backend", "local")?
            .set_default("bus.channel", "relay:events")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // JWT_SECRET, EMIT_SECRET, AUTH_MODE, REDIS_URL, ...
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.origins"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            origins: vec![],
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            buffer: default_buffer(),
            exclusive: default_exclusive(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            channel: default_bus_channel(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service: default_otel_service(),
            sampling: default_otel_sampling(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 3000);

        let ws = WebSocketConfig::default();
        assert_eq!(ws.buffer, 32);
        assert!(ws.exclusive);

        assert_eq!(AuthConfig::default().mode, AuthMode::Required);
        assert!(!AuthConfig::default().anonymous);
        assert_eq!(BusConfig::default().backend, BusBackend::Local);
    }

    #[test]
    fn test_auth_mode_parses_lowercase() {
        let mode: AuthMode = serde_json::from_str("\"optional\"").unwrap();
        assert_eq!(mode, AuthMode::Optional);
        let mode: AuthMode = serde_json::from_str("\"disabled\"").unwrap();
        assert_eq!(mode, AuthMode::Disabled);
        assert!(serde_json::from_str::<AuthMode>("\"sometimes\"").is_err());
    }
}
