//! Harness configuration with layered loading.
//!
//! Sources, later overriding earlier:
//! 1. Built-in defaults ([`HarnessConfig::default()`])
//! 2. User-level: `~/.config/icmd-harness/config.toml`
//! 3. Workspace-level: `./.icmd-harness.toml`
//! 4. The file named by `ICMD_HARNESS_CONFIG`
//! 5. `ICMD_*` environment variables
//!
//! Every top-level field in the resulting [`EffectiveConfig`] is annotated
//! with the [`ConfigSource`] that determined it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::HarnessError;

/// Maximum config file size in bytes.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "ICMD_HARNESS_CONFIG";

/// Connection and behaviour settings shared by every test in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Catalog server host.
    pub host: String,
    /// Catalog server port.
    pub port: u16,
    /// Zone every session belongs to.
    pub zone: String,
    /// Administrative user used by the fixtures.
    pub admin_user: String,
    /// Password for `admin_user`.
    pub admin_password: String,
    /// Unprivileged user created by the two-user fixture.
    pub test_user: String,
    /// Password assigned to `test_user`.
    pub test_password: String,
    /// Default storage resource written into session environments.
    pub default_resource: String,
    /// Timeout applied to every assertion command, if any.
    pub command_timeout_secs: Option<u64>,
    /// Time between SIGTERM and SIGKILL when a command is interrupted.
    pub grace_period_ms: u64,
    /// How often a timed run polls the child for exit.
    pub poll_interval_ms: u64,
    /// Bytes of stdout/stderr kept per stream in a failure diagnostic.
    pub diagnostic_limit: usize,
    /// Directory containing the icommands, prepended to `PATH`.
    pub bin_dir: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1247,
            zone: "tempZone".into(),
            admin_user: "rods".into(),
            admin_password: "rods".into(),
            test_user: "alice".into(),
            test_password: "apass".into(),
            default_resource: "demoResc".into(),
            command_timeout_secs: None,
            grace_period_ms: 2000,
            poll_interval_ms: 10,
            diagnostic_limit: 2048,
            bin_dir: None,
        }
    }
}

impl HarnessConfig {
    /// Load the effective configuration with the default search paths.
    pub fn load() -> Result<Self, HarnessError> {
        Ok(ConfigLoader::new().load()?.config)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built-in default.
    BuiltinDefault,
    /// `~/.config/icmd-harness/config.toml`.
    UserFile(PathBuf),
    /// `./.icmd-harness.toml`.
    WorkspaceFile(PathBuf),
    /// The file named by `ICMD_HARNESS_CONFIG`.
    ExplicitFile(PathBuf),
    /// An `ICMD_*` environment variable.
    EnvVar(String),
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::BuiltinDefault => write!(f, "built-in default"),
            ConfigSource::UserFile(p) => write!(f, "user file: {}", p.display()),
            ConfigSource::WorkspaceFile(p) => write!(f, "workspace file: {}", p.display()),
            ConfigSource::ExplicitFile(p) => write!(f, "{CONFIG_PATH_ENV}: {}", p.display()),
            ConfigSource::EnvVar(name) => write!(f, "env var: {name}"),
        }
    }
}

/// The merged config plus provenance for each field.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub config: HarnessConfig,
    /// Field name -> the source that determined its value.
    pub sources: HashMap<String, ConfigSource>,
    /// Config files that were found and loaded, in priority order.
    pub source_files: Vec<PathBuf>,
}

/// Layered configuration loader.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    user_config_path: Option<PathBuf>,
    workspace_config_path: Option<PathBuf>,
    explicit_config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the user config file path.
    #[must_use]
    pub fn with_user_path(mut self, path: PathBuf) -> Self {
        self.user_config_path = Some(path);
        self
    }

    /// Override the workspace config file path.
    #[must_use]
    pub fn with_workspace_path(mut self, path: PathBuf) -> Self {
        self.workspace_config_path = Some(path);
        self
    }

    /// Use this file instead of the one named by `ICMD_HARNESS_CONFIG`.
    #[must_use]
    pub fn with_explicit_path(mut self, path: PathBuf) -> Self {
        self.explicit_config_path = Some(path);
        self
    }

    /// Load and merge configuration from all sources.
    pub fn load(&self) -> Result<EffectiveConfig, HarnessError> {
        let mut sources = HashMap::new();
        let mut source_files = Vec::new();

        let mut merged = toml::Value::try_from(HarnessConfig::default())
            .map_err(|e| HarnessError::Config(format!("failed to serialize defaults: {e}")))?;
        if let toml::Value::Table(ref table) = merged {
            for key in table.keys() {
                sources.insert(key.clone(), ConfigSource::BuiltinDefault);
            }
        }

        let user_path = self.user_config_path.clone().unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
            PathBuf::from(home)
                .join(".config")
                .join("icmd-harness")
                .join("config.toml")
        });
        let workspace_path = self
            .workspace_config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(".icmd-harness.toml"));

        let mut layers = vec![
            (user_path.clone(), ConfigSource::UserFile(user_path)),
            (workspace_path.clone(), ConfigSource::WorkspaceFile(workspace_path)),
        ];
        let explicit = self
            .explicit_config_path
            .clone()
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
        if let Some(path) = explicit {
            // A named file must exist; the implicit ones are optional.
            if !path.exists() {
                return Err(HarnessError::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            layers.push((path.clone(), ConfigSource::ExplicitFile(path)));
        }

        for (path, source) in layers {
            if !path.exists() {
                continue;
            }
            let content = read_config_file(&path)?;
            let layer: toml::Value = toml::from_str(&content).map_err(|e| {
                HarnessError::Config(format!("invalid config {}: {e}", path.display()))
            })?;
            deep_merge(&mut merged, &layer);
            record_sources(&layer, &mut sources, &source);
            debug!(path = %path.display(), "loaded config layer");
            source_files.push(path);
        }

        apply_env_overrides(&mut merged, &mut sources)?;

        let config: HarnessConfig = merged
            .try_into()
            .map_err(|e| HarnessError::Config(format!("failed to parse merged config: {e}")))?;
        validate_config(&config)?;

        Ok(EffectiveConfig {
            config,
            sources,
            source_files,
        })
    }
}

/// Read a config file, enforcing the size limit.
fn read_config_file(path: &Path) -> Result<String, HarnessError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        HarnessError::Config(format!("cannot read config file {}: {e}", path.display()))
    })?;
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(HarnessError::Config(format!(
            "config file {} exceeds maximum size of {MAX_CONFIG_FILE_SIZE} bytes (actual: {} bytes)",
            path.display(),
            metadata.len()
        )));
    }
    std::fs::read_to_string(path).map_err(|e| {
        HarnessError::Config(format!("cannot read config file {}: {e}", path.display()))
    })
}

/// Deep-merge `overlay` into `base`. Tables merge field by field; anything
/// else is replaced.
fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

fn record_sources(
    layer: &toml::Value,
    sources: &mut HashMap<String, ConfigSource>,
    source: &ConfigSource,
) {
    if let toml::Value::Table(table) = layer {
        for key in table.keys() {
            sources.insert(key.clone(), source.clone());
        }
    }
}

/// How an environment variable's text becomes a TOML value.
#[derive(Debug, Clone, Copy)]
enum EnvKind {
    Text,
    Integer,
}

/// Maps an `ICMD_*` environment variable onto a config field.
pub struct EnvMapping {
    pub env_var: &'static str,
    pub field: &'static str,
    kind: EnvKind,
}

/// All supported environment variable overrides.
pub const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping { env_var: "ICMD_HOST", field: "host", kind: EnvKind::Text },
    EnvMapping { env_var: "ICMD_PORT", field: "port", kind: EnvKind::Integer },
    EnvMapping { env_var: "ICMD_ZONE", field: "zone", kind: EnvKind::Text },
    EnvMapping { env_var: "ICMD_ADMIN_USER", field: "admin_user", kind: EnvKind::Text },
    EnvMapping { env_var: "ICMD_ADMIN_PASSWORD", field: "admin_password", kind: EnvKind::Text },
    EnvMapping { env_var: "ICMD_TEST_USER", field: "test_user", kind: EnvKind::Text },
    EnvMapping { env_var: "ICMD_TEST_PASSWORD", field: "test_password", kind: EnvKind::Text },
    EnvMapping {
        env_var: "ICMD_DEFAULT_RESOURCE",
        field: "default_resource",
        kind: EnvKind::Text,
    },
    EnvMapping { env_var: "ICMD_BIN_DIR", field: "bin_dir", kind: EnvKind::Text },
    EnvMapping {
        env_var: "ICMD_COMMAND_TIMEOUT_SECS",
        field: "command_timeout_secs",
        kind: EnvKind::Integer,
    },
];

fn apply_env_overrides(
    merged: &mut toml::Value,
    sources: &mut HashMap<String, ConfigSource>,
) -> Result<(), HarnessError> {
    let toml::Value::Table(table) = merged else {
        return Ok(());
    };
    for mapping in ENV_MAPPINGS {
        let Ok(raw) = std::env::var(mapping.env_var) else {
            continue;
        };
        if raw.chars().any(|c| c.is_control()) {
            return Err(HarnessError::Config(format!(
                "environment variable {} contains control characters",
                mapping.env_var
            )));
        }
        let value = match mapping.kind {
            EnvKind::Text => toml::Value::String(raw),
            EnvKind::Integer => {
                let n: i64 = raw.trim().parse().map_err(|e| {
                    HarnessError::Config(format!(
                        "environment variable {} must be numeric: {e}",
                        mapping.env_var
                    ))
                })?;
                toml::Value::Integer(n)
            }
        };
        table.insert(mapping.field.to_string(), value);
        sources.insert(
            mapping.field.to_string(),
            ConfigSource::EnvVar(mapping.env_var.to_string()),
        );
    }
    Ok(())
}

fn validate_config(config: &HarnessConfig) -> Result<(), HarnessError> {
    if config.zone.is_empty() || config.zone.contains('/') {
        return Err(HarnessError::Config(format!(
            "zone must be a non-empty name without '/', got {:?}",
            config.zone
        )));
    }
    if config.admin_user.is_empty() || config.test_user.is_empty() {
        return Err(HarnessError::Config("user names must not be empty".into()));
    }
    if config.admin_user == config.test_user {
        return Err(HarnessError::Config(format!(
            "test_user must differ from admin_user ({})",
            config.admin_user
        )));
    }
    if config.port == 0 {
        return Err(HarnessError::Config("port must be non-zero".into()));
    }
    Ok(())
}

/// Mask a password for display.
pub fn mask_sensitive(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        "***".to_string()
    }
}
