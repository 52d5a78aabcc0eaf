//! Configuration types for the Warden runtime

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, WardenError};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WardenConfig {
    /// Secure executor configuration
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Orchestrator configuration
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Resource budget configuration
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Audit log configuration
    #[serde(default)]
    pub audit: AuditConfig,

    /// Lifecycle event configuration
    #[serde(default)]
    pub events: EventConfig,
}

/// Secure executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Deadline for a single tool invocation
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,

    /// Lifetime of tokens granted by `request_permission` when none is given
    #[serde(with = "humantime_serde")]
    pub token_duration: Duration,

    /// Maximum characters kept in audit input/output summaries
    pub summary_chars: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            token_duration: Duration::from_secs(300),
            summary_chars: crate::security::DEFAULT_SUMMARY_CHARS,
        }
    }
}

impl ExecutorConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum concurrent invocations
    pub max_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_concurrency: 5 }
    }
}

/// Resource budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Share of an unspent budget credited back on settlement
    pub default_recovery_rate: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_recovery_rate: 0.5,
        }
    }
}

/// Audit log configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuditConfig {
    /// JSON lines file; in-memory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Lifecycle event configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Channel buffer size
    pub buffer_size: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { buffer_size: 100 }
    }
}

impl WardenConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `warden.toml` in the working directory
    /// 3. The file named by `WARDEN_CONFIG_PATH`, if set
    /// 4. `WARDEN_` environment variables, nested with `__`
    ///    (e.g. `WARDEN_ORCHESTRATOR__MAX_CONCURRENCY=8`)
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source is invalid.
    pub fn load() -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(WardenConfig::default()))
            .merge(Toml::file("warden.toml"));

        if let Ok(path) = std::env::var("WARDEN_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: WardenConfig = figment
            .merge(Env::prefixed("WARDEN_").split("__"))
            .extract()
            .map_err(|e| WardenError::Configuration(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: WardenConfig = Figment::from(Serialized::defaults(WardenConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()
            .map_err(|e| {
                WardenError::Configuration(format!("Failed to load configuration file: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.max_concurrency == 0 {
            return Err(WardenError::Configuration(
                "orchestrator.max_concurrency must be at least 1".to_string(),
            ));
        }
        let rate = self.budget.default_recovery_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(WardenError::Configuration(format!(
                "budget.default_recovery_rate must be within [0, 1], got {}",
                rate
            )));
        }
        if self.executor.default_timeout.is_zero() {
            return Err(WardenError::Configuration(
                "executor.default_timeout must be positive".to_string(),
            ));
        }
        if self.events.buffer_size == 0 {
            return Err(WardenError::Configuration(
                "events.buffer_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
