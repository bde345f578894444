//! Run configuration
//!
//! Loaded from an optional TOML file and then from the process
//! environment. Environment variables use the platform's plain names
//! (`CPU_THRESHOLD`, `AZURE_RESOURCE_GROUP`, ...) without a prefix.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::TriageError;

/// Environment variable pointing at an explicit config file
pub const CONFIG_FILE_ENV: &str = "TRIAGE_CONFIG";

/// How the Azure CLI is expected to be authenticated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ServicePrincipal,
    Pat,
}

/// Thresholds, windows and scope for a triage run
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // Scope
    #[serde(default)]
    pub azure_resource_group: Option<String>,
    #[serde(default)]
    pub azure_subscription_id: Option<String>,
    #[serde(default)]
    pub aks_cluster: Option<String>,
    #[serde(default)]
    pub azure_devops_org: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default = "default_istio_namespace")]
    pub istio_namespace: String,

    // Thresholds
    #[serde(default = "default_cpu_threshold")]
    pub cpu_threshold: f64,
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f64,
    #[serde(default = "default_low_cpu_threshold")]
    pub low_cpu_threshold: f64,
    #[serde(default = "default_low_memory_threshold")]
    pub low_memory_threshold: f64,
    #[serde(default = "default_agent_utilization_threshold")]
    pub agent_utilization_threshold: f64,
    #[serde(default = "default_license_utilization_threshold")]
    pub license_utilization_threshold: f64,
    #[serde(default = "default_cert_expiry_hours")]
    pub cert_expiry_hours: f64,
    #[serde(default = "default_restart_threshold")]
    pub restart_threshold: f64,

    // Windows
    #[serde(default = "default_activity_log_offset")]
    pub azure_activity_log_offset: String,
    #[serde(default = "default_lookback_weeks")]
    pub lookback_weeks: u32,
    #[serde(default = "default_metrics_offset")]
    pub metrics_offset: String,
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval: String,
    #[serde(default = "default_log_window")]
    pub log_window: String,

    // Auth
    #[serde(default)]
    pub auth_type: AuthMode,
    #[serde(default)]
    pub azure_devops_ext_pat: Option<String>,

    // Behaviour
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default)]
    pub emit_healthy_issue: bool,
    #[serde(default)]
    pub istio_error_patterns_file: Option<PathBuf>,
}

fn default_istio_namespace() -> String {
    "istio-system".to_string()
}

fn default_cpu_threshold() -> f64 {
    80.0
}

fn default_memory_threshold() -> f64 {
    80.0
}

fn default_low_cpu_threshold() -> f64 {
    20.0
}

fn default_low_memory_threshold() -> f64 {
    30.0
}

fn default_agent_utilization_threshold() -> f64 {
    80.0
}

fn default_license_utilization_threshold() -> f64 {
    50.0
}

fn default_cert_expiry_hours() -> f64 {
    168.0
}

fn default_restart_threshold() -> f64 {
    3.0
}

fn default_activity_log_offset() -> String {
    "24h".to_string()
}

fn default_lookback_weeks() -> u32 {
    4
}

fn default_metrics_offset() -> String {
    "24h".to_string()
}

fn default_metrics_interval() -> String {
    "PT1H".to_string()
}

fn default_log_window() -> String {
    "1h".to_string()
}

fn default_command_timeout_secs() -> u64 {
    120
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            azure_resource_group: None,
            azure_subscription_id: None,
            aks_cluster: None,
            azure_devops_org: None,
            namespace: None,
            context: None,
            istio_namespace: default_istio_namespace(),
            cpu_threshold: default_cpu_threshold(),
            memory_threshold: default_memory_threshold(),
            low_cpu_threshold: default_low_cpu_threshold(),
            low_memory_threshold: default_low_memory_threshold(),
            agent_utilization_threshold: default_agent_utilization_threshold(),
            license_utilization_threshold: default_license_utilization_threshold(),
            cert_expiry_hours: default_cert_expiry_hours(),
            restart_threshold: default_restart_threshold(),
            azure_activity_log_offset: default_activity_log_offset(),
            lookback_weeks: default_lookback_weeks(),
            metrics_offset: default_metrics_offset(),
            metrics_interval: default_metrics_interval(),
            log_window: default_log_window(),
            auth_type: AuthMode::default(),
            azure_devops_ext_pat: None,
            command_timeout_secs: default_command_timeout_secs(),
            emit_healthy_issue: false,
            istio_error_patterns_file: None,
        }
    }
}

impl Settings {
    /// Load from the config file (if any) and the process environment
    pub fn load() -> Result<Self, TriageError> {
        Self::build(config_file_path(), None)
    }

    /// Load from an explicit variable map instead of the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, TriageError> {
        Self::build(None, Some(vars))
    }

    fn build(
        file: Option<PathBuf>,
        vars: Option<HashMap<String, String>>,
    ) -> Result<Self, TriageError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let config = builder
            .add_source(config::Environment::default().try_parsing(true).source(vars))
            .build()
            .map_err(|e| TriageError::InvalidConfig(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| TriageError::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), TriageError> {
        let percentages = [
            ("CPU_THRESHOLD", self.cpu_threshold),
            ("MEMORY_THRESHOLD", self.memory_threshold),
            ("LOW_CPU_THRESHOLD", self.low_cpu_threshold),
            ("LOW_MEMORY_THRESHOLD", self.low_memory_threshold),
            ("AGENT_UTILIZATION_THRESHOLD", self.agent_utilization_threshold),
            ("LICENSE_UTILIZATION_THRESHOLD", self.license_utilization_threshold),
        ];
        for (key, value) in percentages {
            if !(0.0..=100.0).contains(&value) {
                return Err(TriageError::InvalidConfig(format!(
                    "{} must be between 0 and 100, got {}",
                    key, value
                )));
            }
        }
        if self.command_timeout_secs == 0 {
            return Err(TriageError::InvalidConfig(
                "COMMAND_TIMEOUT_SECS must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Return the value of a required scope setting
pub fn require<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str, TriageError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| TriageError::MissingConfig(key.to_string()))
}

/// Config file location: `$TRIAGE_CONFIG` or `~/.config/triage/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs_next::home_dir().map(|home| home.join(".config").join("triage").join("config.toml"))
}
