pub mod audio;
pub mod auth;
pub mod broadcast;
pub mod config;
pub mod emotion;
pub mod ledger;
pub mod orchestrator;
pub mod synth;
pub mod testing;

pub use audio::{ArtifactInfo, AudioError, AudioProcessor, WavProcessor};
pub use auth::{
    create_authenticator, AuthError, AuthRequest, Authenticator, Identity, NoneAuthenticator,
};
pub use broadcast::{EngineEvent, LogLevel, ProgressBroadcaster};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    SanitizedConfig,
};
pub use emotion::Emotion;
pub use ledger::{
    create_ledger_system, InitReport, Job, JobStatus, JsonLedgerStore, LedgerError, LedgerHandle,
    LedgerStore, ResetOutcome, RunConfig, RunState, RunStatus, RunSummary, SyncReport,
};
pub use orchestrator::{EngineStatus, Orchestrator, OrchestratorError};
pub use synth::{HttpSynthesizer, SynthesisError, SynthesisRequest, Synthesizer};
