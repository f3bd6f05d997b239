//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// HTTP trigger API
    #[serde(default)]
    pub server: ServerSettings,

    /// Telephony switch control connection
    #[serde(default)]
    pub ari: AriSettings,

    /// Admission policy (calling hours, concurrency ceiling)
    #[serde(default)]
    pub calling: CallingPolicy,

    /// Turn-loop tuning
    #[serde(default)]
    pub conversation: ConversationSettings,

    /// Speech and generation backends
    #[serde(default)]
    pub providers: ProviderSettings,

    /// Transient synthesized-audio handling
    #[serde(default)]
    pub media: MediaSettings,

    /// Datastore connection (disabled = in-memory stores)
    #[serde(default)]
    pub persistence: PersistenceSettings,

    /// Logging
    #[serde(default)]
    pub observability: ObservabilitySettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_enabled: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: false,
            cors_origins: Vec::new(),
        }
    }
}

/// Asterisk REST Interface connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AriSettings {
    /// HTTP base, e.g. `http://127.0.0.1:8088`
    #[serde(default = "default_ari_url")]
    pub url: String,
    /// Stasis application name to register
    #[serde(default = "default_ari_app")]
    pub app: String,
    #[serde(default = "default_ari_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Reconnect attempt budget before the client reports itself down
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    /// Linear backoff base; attempt N waits N * base
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    /// Hard cap on waiting for a playback/recording completion event
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    /// Dial endpoint template; `{phone}` is replaced with the lead's number
    #[serde(default = "default_endpoint_template")]
    pub endpoint_template: String,
    /// Outbound caller id
    #[serde(default)]
    pub caller_id: Option<String>,
    /// Ring timeout for originated channels
    #[serde(default = "default_originate_timeout_secs")]
    pub originate_timeout_secs: u32,
}

fn default_ari_url() -> String {
    "http://127.0.0.1:8088".to_string()
}

fn default_ari_app() -> String {
    "call-agent".to_string()
}

fn default_ari_username() -> String {
    "asterisk".to_string()
}

fn default_reconnect_max_attempts() -> u32 {
    10
}

fn default_reconnect_base_ms() -> u64 {
    1000
}

fn default_operation_timeout_secs() -> u64 {
    60
}

fn default_endpoint_template() -> String {
    "PJSIP/{phone}".to_string()
}

fn default_originate_timeout_secs() -> u32 {
    30
}

impl Default for AriSettings {
    fn default() -> Self {
        Self {
            url: default_ari_url(),
            app: default_ari_app(),
            username: default_ari_username(),
            password: String::new(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            reconnect_base_ms: default_reconnect_base_ms(),
            operation_timeout_secs: default_operation_timeout_secs(),
            endpoint_template: default_endpoint_template(),
            caller_id: None,
            originate_timeout_secs: default_originate_timeout_secs(),
        }
    }
}

impl AriSettings {
    /// Events WebSocket URL derived from the HTTP base.
    pub fn events_url(&self) -> String {
        let ws_base = self
            .url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!(
            "{}/ari/events?app={}&api_key={}:{}",
            ws_base.trim_end_matches('/'),
            self.app,
            self.username,
            self.password
        )
    }

    /// Fill the dial endpoint template for a phone number.
    pub fn endpoint_for(&self, phone: &str) -> String {
        self.endpoint_template.replace("{phone}", phone)
    }
}

/// Admission policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallingPolicy {
    /// First hour (inclusive, local time) calls may be placed
    #[serde(default = "default_hours_start")]
    pub hours_start: u32,
    /// Last hour (exclusive, local time) calls may be placed
    #[serde(default = "default_hours_end")]
    pub hours_end: u32,
    /// Concurrency ceiling for simultaneously active calls
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
    /// DTMF digit that force-ends a conversation
    #[serde(default = "default_end_digit")]
    pub end_digit: char,
}

fn default_hours_start() -> u32 {
    9
}

fn default_hours_end() -> u32 {
    20
}

fn default_max_concurrent_calls() -> usize {
    5
}

fn default_end_digit() -> char {
    '#'
}

impl Default for CallingPolicy {
    fn default() -> Self {
        Self {
            hours_start: default_hours_start(),
            hours_end: default_hours_end(),
            max_concurrent_calls: default_max_concurrent_calls(),
            end_digit: default_end_digit(),
        }
    }
}

impl CallingPolicy {
    /// Whether the given local wall-clock hour is inside the calling window.
    pub fn hour_allowed(&self, hour: u32) -> bool {
        hour >= self.hours_start && hour < self.hours_end
    }
}

/// Turn-loop tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSettings {
    /// Per-turn recording duration cap
    #[serde(default = "default_record_max_secs")]
    pub record_max_secs: u32,
    /// End-of-utterance silence cap
    #[serde(default = "default_record_silence_secs")]
    pub record_silence_secs: u32,
    /// Transcriptions below this confidence are treated as empty
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// Consecutive turn failures tolerated before the exit path
    #[serde(default = "default_turn_failure_budget")]
    pub turn_failure_budget: u32,
    /// Grace period after the closing message before hangup
    #[serde(default = "default_closing_grace_ms")]
    pub closing_grace_ms: u64,
    /// Persona cache TTL
    #[serde(default = "default_persona_ttl_secs")]
    pub persona_ttl_secs: u64,
}

fn default_record_max_secs() -> u32 {
    15
}

fn default_record_silence_secs() -> u32 {
    3
}

fn default_min_confidence() -> f32 {
    0.3
}

fn default_turn_failure_budget() -> u32 {
    3
}

fn default_closing_grace_ms() -> u64 {
    500
}

fn default_persona_ttl_secs() -> u64 {
    30
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            record_max_secs: default_record_max_secs(),
            record_silence_secs: default_record_silence_secs(),
            min_confidence: default_min_confidence(),
            turn_failure_budget: default_turn_failure_budget(),
            closing_grace_ms: default_closing_grace_ms(),
            persona_ttl_secs: default_persona_ttl_secs(),
        }
    }
}

/// Speech/generation provider endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// STT sidecar base URL
    #[serde(default = "default_stt_url")]
    pub stt_url: String,
    /// STT language hint
    #[serde(default)]
    pub stt_language: Option<String>,
    /// TTS sidecar base URL
    #[serde(default = "default_tts_url")]
    pub tts_url: String,
    /// Provider request timeout
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
    /// Reply generation backend
    #[serde(default)]
    pub generation: GenerationSettings,
}

fn default_stt_url() -> String {
    "http://127.0.0.1:8090".to_string()
}

fn default_tts_url() -> String {
    "http://127.0.0.1:8091".to_string()
}

fn default_provider_timeout_ms() -> u64 {
    30000
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            stt_url: default_stt_url(),
            stt_language: None,
            tts_url: default_tts_url(),
            timeout_ms: default_provider_timeout_ms(),
            generation: GenerationSettings::default(),
        }
    }
}

/// OpenAI-compatible chat backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Endpoint base, e.g. `https://api.openai.com/v1` or a local vLLM server
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_generation_temperature")]
    pub temperature: f32,
}

fn default_generation_endpoint() -> String {
    "http://127.0.0.1:8000/v1".to_string()
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_generation_max_tokens() -> usize {
    128
}

fn default_generation_temperature() -> f32 {
    0.7
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            endpoint: default_generation_endpoint(),
            api_key: String::new(),
            model: default_generation_model(),
            max_tokens: default_generation_max_tokens(),
            temperature: default_generation_temperature(),
        }
    }
}

/// Transient media file handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSettings {
    /// Directory shared with the switch where synthesized audio is written
    #[serde(default = "default_media_dir")]
    pub dir: String,
    /// Media URI scheme prefix the switch resolves against `dir`
    #[serde(default = "default_media_scheme")]
    pub scheme: String,
}

fn default_media_dir() -> String {
    "/var/lib/asterisk/sounds/call-agent".to_string()
}

fn default_media_scheme() -> String {
    "sound:call-agent".to_string()
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            dir: default_media_dir(),
            scheme: default_media_scheme(),
        }
    }
}

/// Datastore connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSettings {
    /// false = in-memory stores (development/tests)
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,
    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

fn default_scylla_hosts() -> Vec<String> {
    std::env::var("SCYLLA_HOSTS")
        .map(|s| s.split(',').map(|h| h.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["127.0.0.1:9042".to_string()])
}

fn default_scylla_keyspace() -> String {
    std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "call_agent".to_string())
}

fn default_replication_factor() -> u8 {
    1
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.calling.hours_start >= self.calling.hours_end {
            return Err(ConfigError::InvalidValue {
                field: "calling.hours_start".to_string(),
                message: format!(
                    "start hour {} must be before end hour {}",
                    self.calling.hours_start, self.calling.hours_end
                ),
            });
        }
        if self.calling.hours_end > 24 {
            return Err(ConfigError::InvalidValue {
                field: "calling.hours_end".to_string(),
                message: "must be at most 24".to_string(),
            });
        }
        if self.calling.max_concurrent_calls == 0 {
            return Err(ConfigError::InvalidValue {
                field: "calling.max_concurrent_calls".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.conversation.min_confidence) {
            return Err(ConfigError::InvalidValue {
                field: "conversation.min_confidence".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        if self.conversation.record_max_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "conversation.record_max_secs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.ari.reconnect_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ari.reconnect_max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Load settings from files and environment.
///
/// Priority: env vars > `config/{env}.toml` > `config/default.toml` > defaults.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CALL_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.calling.max_concurrent_calls, 5);
        assert_eq!(settings.conversation.record_max_secs, 15);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_hour_window() {
        let policy = CallingPolicy::default();
        assert!(policy.hour_allowed(9));
        assert!(policy.hour_allowed(19));
        assert!(!policy.hour_allowed(20));
        assert!(!policy.hour_allowed(3));
    }

    #[test]
    fn test_events_url_derivation() {
        let ari = AriSettings {
            url: "http://pbx.local:8088".to_string(),
            app: "call-agent".to_string(),
            username: "ari".to_string(),
            password: "secret".to_string(),
            ..Default::default()
        };
        assert_eq!(
            ari.events_url(),
            "ws://pbx.local:8088/ari/events?app=call-agent&api_key=ari:secret"
        );
    }

    #[test]
    fn test_endpoint_template() {
        let ari = AriSettings::default();
        assert_eq!(ari.endpoint_for("+15550100"), "PJSIP/+15550100");
    }

    #[test]
    fn test_validation_rejects_inverted_hours() {
        let mut settings = Settings::default();
        settings.calling.hours_start = 21;
        settings.calling.hours_end = 9;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_ceiling() {
        let mut settings = Settings::default();
        settings.calling.max_concurrent_calls = 0;
        assert!(settings.validate().is_err());
    }
}
