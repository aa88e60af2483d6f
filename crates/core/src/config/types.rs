use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Static key, required when method = "api_key"
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

/// Synthesis service endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SynthesisConfig {
    /// Service URL (e.g., "http://localhost:9880")
    pub url: String,
    /// Request timeout in seconds (default: 120; long inputs are slow)
    #[serde(default = "default_synthesis_timeout")]
    pub timeout_secs: u64,
}

fn default_synthesis_timeout() -> u64 {
    120
}

/// Generation run defaults, used when start() carries no override
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// How many jobs may synthesize at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Automatic retry ceiling per job
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Voice backend name forwarded to the synthesis service
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Fixed delay after each job, in milliseconds
    #[serde(default = "default_post_job_delay_ms")]
    pub post_job_delay_ms: u64,
    /// Consecutive synthesis failures before the run is stopped (0 disables)
    #[serde(default = "default_failure_streak_limit")]
    pub failure_streak_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            backend: default_backend(),
            post_job_delay_ms: default_post_job_delay_ms(),
            failure_streak_limit: default_failure_streak_limit(),
        }
    }
}

fn default_concurrency() -> usize {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_backend() -> String {
    "default".to_string()
}

fn default_post_job_delay_ms() -> u64 {
    250
}

fn default_failure_streak_limit() -> u32 {
    10
}

/// Ledger document location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("hibiki_run.json")
}

/// Seed script location (line-oriented `key|text`)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_path")]
    pub path: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_source_path(),
        }
    }
}

fn default_source_path() -> PathBuf {
    PathBuf::from("script.txt")
}

/// Artifact output directory
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("wavs")
}

/// Artifact format configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// Target sample rate for written artifacts
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
        }
    }
}

fn default_sample_rate() -> u32 {
    22050
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub synthesis: SynthesisConfig,
    pub engine: EngineConfig,
    pub ledger: LedgerConfig,
    pub source: SourceConfig,
    pub output: OutputConfig,
    pub audio: AudioConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub api_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: match config.auth.method {
                    AuthMethod::None => "none".to_string(),
                    AuthMethod::ApiKey => "api_key".to_string(),
                },
                api_key_configured: config
                    .auth
                    .api_key
                    .as_ref()
                    .is_some_and(|k| !k.is_empty()),
            },
            synthesis: config.synthesis.clone(),
            engine: config.engine.clone(),
            ledger: config.ledger.clone(),
            source: config.source.clone(),
            output: config.output.clone(),
            audio: config.audio.clone(),
            server: config.server.clone(),
        }
    }
}
