//! Configuration loading and validation
//!
//! A configuration is an ordered list of actions in a YAML document. The
//! declaration order is significant: it is preserved exactly and replayed
//! as-is by the dispatcher.

use std::path::Path;

use serde::Deserialize;

use crate::core::action::Action;
use crate::error::ConfigError;

/// The loaded configuration: an ordered action list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Actions, applied strictly in declaration order
    pub actions: Vec<Action>,
}

impl Config {
    /// Load and parse a configuration file.
    ///
    /// Relative `source` paths of create_file actions are resolved against
    /// the config file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let mut config = Self::parse(&content, path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_relative_sources(base);
        tracing::debug!("Config loaded with {} actions", config.actions.len());
        Ok(config)
    }

    /// Parse a configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, Path::new("<inline>"))
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Validate every action before any of them is dispatched.
    ///
    /// The first invalid action aborts the whole run, before any mutation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, action) in self.actions.iter().enumerate() {
            action
                .validate()
                .map_err(|message| ConfigError::Validation {
                    index,
                    action: action.identity(),
                    message,
                })?;
        }
        Ok(())
    }

    /// Whether any declared action uses the chroot's package manager.
    pub fn needs_package_manager(&self) -> bool {
        self.actions.iter().any(Action::needs_package_manager)
    }

    fn resolve_relative_sources(&mut self, base: &Path) {
        for action in &mut self.actions {
            if let Action::CreateFile {
                source: Some(source),
                ..
            } = action
            {
                if source.is_relative() {
                    *source = base.join(&source);
                }
            }
        }
    }
}
