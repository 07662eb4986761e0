use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8789;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const MAX_PAYLOAD_BYTES: usize = 128 * 1024;
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Default per-chat silence before a buffer is flushed into a pending turn.
pub const DEFAULT_DEBOUNCE_MS: u64 = 30_000;
/// Default idle time before an abandoned buffer is garbage-collected.
pub const DEFAULT_GC_IDLE_MS: u64 = 30 * 60_000;
/// Buffer GC sweep cadence.
pub const GC_SWEEP_INTERVAL_SECS: u64 = 60;
/// PolicyCache per-entry TTL.
pub const POLICY_TTL_SECS: u64 = 60;
/// MediaCache entry lifetime.
pub const MEDIA_TTL_SECS: u64 = 15 * 60;
/// MediaCache sweep cadence.
pub const MEDIA_SWEEP_INTERVAL_SECS: u64 = 60;
/// OutboxWatcher poll cadence per active session.
pub const DEFAULT_OUTBOX_POLL_MS: u64 = 2_000;

/// Top-level config (wabridge.toml + WABRIDGE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                port: DEFAULT_PORT,
                bind: DEFAULT_BIND.to_string(),
                auth: AuthConfig {
                    mode: AuthMode::Token,
                    token: Some("change-me".to_string()),
                },
            },
            database: DatabaseConfig::default(),
            buffer: BufferConfig::default(),
            outbox: OutboxConfig::default(),
            sessions: SessionsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    Token,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Tunables for `wabridge-buffer`'s debounce/merge/finalizer behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// 0 disables the hard cap (never overrides the per-push debounce reset).
    #[serde(default)]
    pub hard_cap_ms: u64,
    #[serde(default = "default_gc_idle_ms")]
    pub gc_idle_ms: u64,
    /// Case-insensitive substrings that trigger an immediate flush.
    #[serde(default = "default_finalizer_words")]
    pub finalizer_words: Vec<String>,
    /// Case-insensitive substrings that mark a turn's explicit modality as voice.
    #[serde(default = "default_explicit_voice_words")]
    pub explicit_voice_words: Vec<String>,
    /// Case-insensitive substrings that mark a turn's explicit modality as text.
    #[serde(default = "default_explicit_text_words")]
    pub explicit_text_words: Vec<String>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            hard_cap_ms: 0,
            gc_idle_ms: default_gc_idle_ms(),
            finalizer_words: default_finalizer_words(),
            explicit_voice_words: default_explicit_voice_words(),
            explicit_text_words: default_explicit_text_words(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    #[serde(default = "default_outbox_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_fallback_text")]
    pub fallback_text: String,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_ms: default_outbox_poll_ms(),
            fallback_text: default_fallback_text(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_auth_dir")]
    pub auth_dir: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            auth_dir: default_auth_dir(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.wabridge/wabridge.db")
}
fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}
fn default_gc_idle_ms() -> u64 {
    DEFAULT_GC_IDLE_MS
}
fn default_outbox_poll_ms() -> u64 {
    DEFAULT_OUTBOX_POLL_MS
}
fn default_fallback_text() -> String {
    "Mensaje listo.".to_string()
}
fn default_auth_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.wabridge/auth")
}
fn default_finalizer_words() -> Vec<String> {
    vec!["gracias".to_string(), "listo".to_string(), "eso es todo".to_string()]
}
fn default_explicit_voice_words() -> Vec<String> {
    vec!["audio".to_string(), "nota de voz".to_string(), "escúchame".to_string()]
}
fn default_explicit_text_words() -> Vec<String> {
    vec!["por escrito".to_string(), "en texto".to_string()]
}

impl AppConfig {
    /// Load config from a TOML file with WABRIDGE_* env var overrides.
    ///
    /// Checks in order: explicit path argument, then `WABRIDGE_CONFIG` env,
    /// then `~/.wabridge/wabridge.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("WABRIDGE_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        let config: AppConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("WABRIDGE_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.wabridge/wabridge.toml")
}
