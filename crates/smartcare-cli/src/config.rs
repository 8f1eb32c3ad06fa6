//! Configuration for the smartcare CLI

use serde::{Deserialize, Serialize};
use smartcare_session::SessionConfig;
use smartcare_supabase::SupabaseConfig;

/// Environment variable prefix; nested keys use `__`, e.g.
/// `SMARTCARE_SUPABASE__ANON_KEY`.
pub const ENV_PREFIX: &str = "SMARTCARE";

/// Main CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Which collaborators back the session manager
    #[serde(default)]
    pub backend: BackendKind,

    /// Session manager settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Hosted backend settings
    #[serde(default)]
    pub supabase: SupabaseConfig,

    /// In-memory backend settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process collaborators; state lasts for one invocation
    #[default]
    Memory,
    /// Hosted auth provider and profile table
    Supabase,
}

/// In-memory backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Register a demo clinician with a profile at startup
    #[serde(default = "default_true")]
    pub seed_demo: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { seed_demo: true }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl AppConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `SMARTCARE_*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        Self::load_with(path, environment())
    }

    fn load_with(
        path: Option<&str>,
        env: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&AppConfig::default())?);

        // An explicitly named file must exist; the implicit one may not.
        builder = match path {
            Some(path) => builder.add_source(config::File::with_name(path)),
            None => builder.add_source(config::File::with_name("smartcare").required(false)),
        };

        builder = builder.add_source(env);

        builder.build()?.try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
