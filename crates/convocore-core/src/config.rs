use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Hard cap on a single WS frame, enforced during the session gateway's
/// handshake and on every subsequent authenticated frame.
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const HEARTBEAT_GRACE_SECS: u64 = 10;

pub const DEFAULT_FRAME_IDLE_THRESHOLD_MINUTES: i64 = 30;
pub const DEFAULT_PORT: u16 = 8089;
pub const DEFAULT_BIND: &str = "127.0.0.1";

pub const MAX_TOOL_ROUNDS: u32 = 10;
pub const MAX_ORCHESTRATION_HOPS: u32 = 10;
pub const TOOL_APPROVAL_TIMEOUT_SECS: u64 = 60;
pub const TOOL_EXECUTION_TIMEOUT_SECS: u64 = 60;
pub const LLM_STREAM_TIMEOUT_SECS: u64 = 120;
pub const TTS_CHUNK_TIMEOUT_SECS: u64 = 30;
pub const MCP_TOOL_CACHE_TTL_SECS: u64 = 30;
pub const AGENT_MEMORY_MAX_CHARS: usize = 4_000;

/// Top-level config: defaults → optional TOML file → `CONVOCORE_*` env overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub frames: FramesConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl CoreConfig {
    /// Load layered config. `path` overrides `CONVOCORE_CONFIG`, which in turn
    /// overrides the default `./convocore.toml`. Missing file is not an error —
    /// the TOML layer simply contributes nothing.
    pub fn load(path: Option<&str>) -> Result<Self, figment::Error> {
        let toml_path = path
            .map(str::to_string)
            .or_else(|| std::env::var("CONVOCORE_CONFIG").ok())
            .unwrap_or_else(|| "convocore.toml".to_string());

        Figment::from(figment::providers::Serialized::defaults(Self::default()))
            .merge(Toml::file(toml_path))
            .merge(Env::prefixed("CONVOCORE_").split("__"))
            .extract()
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                bind: DEFAULT_BIND.to_string(),
                port: DEFAULT_PORT,
            },
            database: DatabaseConfig::default(),
            providers: ProvidersConfig::default(),
            frames: FramesConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `DATABASE_DSN` — a filesystem path to the embedded database file.
    #[serde(default = "default_database_dsn")]
    pub dsn: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { dsn: default_database_dsn() }
    }
}

fn default_database_dsn() -> String {
    "./convocore.db".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TtsProvider {
    GptSovits,
    IndexTts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsrDevice {
    Cpu,
    Cuda,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// `DEFAULT_LLM_URL`
    pub default_llm_url: Option<String>,
    /// `DEFAULT_TTS_PROVIDER`
    #[serde(default = "default_tts_provider")]
    pub default_tts_provider: TtsProvider,
    /// `ASR_MODEL_PATH`
    pub asr_model_path: Option<String>,
    /// `ASR_DEVICE`
    #[serde(default = "default_asr_device")]
    pub asr_device: AsrDevice,
    /// `MEDIA_INDEX_URL` — base URL the media player resolves search queries against.
    pub media_index_url: Option<String>,
    /// `FACE_DETECTOR_URL` — remote inference endpoint for face localization/embedding.
    pub face_detector_url: Option<String>,
    /// `GESTURE_DETECTOR_URL` — remote inference endpoint for hand/pose gesture classification.
    pub gesture_detector_url: Option<String>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default_llm_url: None,
            default_tts_provider: default_tts_provider(),
            asr_model_path: None,
            asr_device: default_asr_device(),
            media_index_url: None,
            face_detector_url: None,
            gesture_detector_url: None,
        }
    }
}

fn default_tts_provider() -> TtsProvider {
    TtsProvider::IndexTts
}

fn default_asr_device() -> AsrDevice {
    AsrDevice::Auto
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramesConfig {
    /// `FRAME_IDLE_THRESHOLD_MINUTES`
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_minutes: i64,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self { idle_threshold_minutes: default_idle_threshold() }
    }
}

fn default_idle_threshold() -> i64 {
    DEFAULT_FRAME_IDLE_THRESHOLD_MINUTES
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Bearer token compared against `jwt_secret`-signed claims.
    Token,
    /// No authentication — local/dev only.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_auth_mode")]
    pub mode: AuthMode,
    /// `JWT_SECRET` — verification key for bearer tokens. Never written back
    /// to a TOML file by this process; read only from the env layer in
    /// practice, though the field also accepts a file-provided value for
    /// local development.
    pub jwt_secret: Option<String>,
    /// `ACCESS_TOKEN_EXPIRE_DAYS`
    #[serde(default = "default_token_expire_days")]
    pub access_token_expire_days: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: default_auth_mode(),
            jwt_secret: None,
            access_token_expire_days: default_token_expire_days(),
        }
    }
}

fn default_auth_mode() -> AuthMode {
    AuthMode::Token
}

fn default_token_expire_days() -> u32 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.gateway.port, DEFAULT_PORT);
        assert_eq!(cfg.frames.idle_threshold_minutes, 30);
        assert_eq!(cfg.auth.mode, AuthMode::Token);
    }
}
