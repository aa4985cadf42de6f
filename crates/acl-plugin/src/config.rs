//! Configuration file support for the ACL plugin.
//!
//! Loads and validates plugin configuration from TOML files.
//! Default location: /etc/sonic/acl-plugin.toml

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::classifier::ClassifierPolicy;
use crate::types::Action;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Decision when a binding exists but no rule matches
    #[serde(default = "default_no_match_action")]
    pub no_match_action: Action,

    /// Decision when the interface/direction has no binding
    #[serde(default = "default_unbound_action")]
    pub unbound_action: Action,

    /// Classify through the compiled per-binding index
    #[serde(default = "default_use_index")]
    pub use_index: bool,
}

/// Resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of live ACLs
    #[serde(default = "default_max_acls")]
    pub max_acls: usize,

    /// Maximum tag length in bytes
    #[serde(default = "default_max_tag_len")]
    pub max_tag_len: usize,
}

/// Control-plane request queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Bound of the pending request queue
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

/// Complete plugin configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AclConfig {
    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub control: ControlConfig,
}

fn default_no_match_action() -> Action {
    Action::Deny
}

fn default_unbound_action() -> Action {
    Action::Permit
}

fn default_use_index() -> bool {
    true
}

fn default_max_acls() -> usize {
    65535
}

fn default_max_tag_len() -> usize {
    64
}

fn default_queue_depth() -> usize {
    1024
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            no_match_action: default_no_match_action(),
            unbound_action: default_unbound_action(),
            use_index: default_use_index(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_acls: default_max_acls(),
            max_tag_len: default_max_tag_len(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
        }
    }
}

impl AclConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_or_default("/etc/sonic/acl-plugin.toml")
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Classifier policy derived from this configuration
    pub fn policy(&self) -> ClassifierPolicy {
        ClassifierPolicy {
            no_match: self.classifier.no_match_action,
            unbound: self.classifier.unbound_action,
            use_index: self.classifier.use_index,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_acls == 0 {
            return Err(ConfigError::Invalid("max_acls must be > 0".to_string()));
        }

        if self.limits.max_tag_len == 0 {
            return Err(ConfigError::Invalid("max_tag_len must be > 0".to_string()));
        }

        if self.control.queue_depth == 0 {
            return Err(ConfigError::Invalid("queue_depth must be > 0".to_string()));
        }

        Ok(())
    }
}
