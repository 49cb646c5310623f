use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Protocol constants shared by gateway and client
pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 5080;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_HUB_PATH: &str = "/hubs/notificacoes";
pub const API_SUFFIX: &str = "/api";
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024; // 64 KB hard cap per frame
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30; // tick event cadence
pub const NEGOTIATE_TTL_SECS: u64 = 30; // connection token must be redeemed within 30s
pub const GROUP_CHANNEL_CAPACITY: usize = 64;
pub const DEFAULT_ACCENT_COLOR: &str = "#0d6efd";

/// Top-level config (labhub.toml + LABHUB_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabhubConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Route of the WebSocket hub; `<hub_path>/negotiate` is derived from it.
    #[serde(default = "default_hub_path")]
    pub hub_path: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            hub_path: DEFAULT_HUB_PATH.to_string(),
        }
    }
}

/// Bearer verification for hub connections. Tokens are issued elsewhere;
/// the gateway only checks the HS256 signature, expiry and issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// When set, tokens whose `iss` differs are rejected.
    pub issuer: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me".to_string(),
            issuer: None,
        }
    }
}

/// Authentication mode for the business-side notify trigger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NotifyAuthMode {
    /// HMAC-SHA256 over the raw request body (X-Hub-Signature-256).
    HmacSha256,
    /// Static bearer token in the Authorization header.
    BearerToken,
    /// No authentication: use only for internal/trusted networks.
    None,
}

/// `POST /notify/{group}` trigger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// When false the trigger route returns 404.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    pub auth_mode: NotifyAuthMode,
    /// HMAC signing secret or bearer token value.
    pub secret: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auth_mode: NotifyAuthMode::BearerToken,
            secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// REST base address, e.g. `https://portal.example/api`. The hub address
    /// is derived by stripping the `/api` suffix and appending the hub path.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_hub_path")]
    pub hub_path: String,
    /// File holding the session bearer token. Missing or empty = logged out.
    #[serde(default = "default_token_path")]
    pub token_path: String,
    /// JSON file with persisted UI preferences (accent colour, permission).
    #[serde(default = "default_preferences_path")]
    pub preferences_path: String,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            hub_path: default_hub_path(),
            token_path: default_token_path(),
            preferences_path: default_preferences_path(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Backoff schedule for re-establishing a dropped hub connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_backoff_base_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_backoff_base_ms(),
            max_delay_ms: default_backoff_max_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_hub_path() -> String {
    DEFAULT_HUB_PATH.to_string()
}
fn default_api_base_url() -> String {
    format!("http://{}:{}{}", DEFAULT_BIND, DEFAULT_PORT, API_SUFFIX)
}
fn default_token_path() -> String {
    format!("{}/session.token", data_dir())
}
fn default_preferences_path() -> String {
    format!("{}/preferences.json", data_dir())
}
fn default_backoff_base_ms() -> u64 {
    1_000
}
fn default_backoff_max_ms() -> u64 {
    30_000
}
fn default_max_attempts() -> u32 {
    8
}

fn data_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.labhub", home)
}

impl LabhubConfig {
    /// Load config from a TOML file with LABHUB_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.labhub/labhub.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::LabhubError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("LABHUB_").split("_"))
    }
}

fn default_config_path() -> String {
    format!("{}/labhub.toml", data_dir())
}
