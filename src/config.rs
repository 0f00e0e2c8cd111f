use crate::appearance::Background;
use crate::session::DEFAULT_PLACEHOLDER;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub editor: EditorConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub terminal: TerminalConfig,

    #[serde(default)]
    pub background: Background,
}

/// Editor session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Quiet period after the last edit before it is written to the sandbox
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Text shown while a file is loading. Never persisted.
    #[serde(default = "default_loading_placeholder")]
    pub loading_placeholder: String,
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_loading_placeholder() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

impl EditorConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            loading_placeholder: default_loading_placeholder(),
        }
    }
}

/// Development server lifecycle configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Dependency install step run before every start
    #[serde(default = "default_install_command")]
    pub install_command: String,

    /// Long-running server command
    #[serde(default = "default_start_command")]
    pub start_command: String,

    /// Terminal lines that start the server instead of running as commands
    #[serde(default = "default_start_aliases")]
    pub start_aliases: Vec<String>,

    /// Terminal lines that stop the server
    #[serde(default = "default_stop_aliases")]
    pub stop_aliases: Vec<String>,

    /// Skip the server start when the install step exits non-zero
    #[serde(default = "default_false")]
    pub abort_on_install_failure: bool,
}

fn default_install_command() -> String {
    "npm install".to_string()
}

fn default_start_command() -> String {
    "npm start".to_string()
}

fn default_start_aliases() -> Vec<String> {
    vec![
        "start".to_string(),
        "npm start".to_string(),
        "npm run start".to_string(),
    ]
}

fn default_stop_aliases() -> Vec<String> {
    vec!["exit".to_string(), "stop".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            install_command: default_install_command(),
            start_command: default_start_command(),
            start_aliases: default_start_aliases(),
            stop_aliases: default_stop_aliases(),
            abort_on_install_failure: false,
        }
    }
}

/// Terminal configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalConfig {
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Write the greeting and the first prompt when the session starts
    #[serde(default = "default_true")]
    pub banner: bool,
}

fn default_prompt() -> String {
    "$ ".to_string()
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            banner: true,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path.as_ref(), contents).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.editor.debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "editor.debounce_ms must be greater than 0".to_string(),
            ));
        }

        if self.editor.loading_placeholder.is_empty() {
            return Err(ConfigError::Validation(
                "editor.loading_placeholder cannot be empty".to_string(),
            ));
        }

        for (name, command) in [
            ("install_command", &self.server.install_command),
            ("start_command", &self.server.start_command),
        ] {
            if command.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "server.{name} cannot be empty"
                )));
            }
        }

        if self.terminal.prompt.is_empty() {
            return Err(ConfigError::Validation(
                "terminal.prompt cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Validation error: {0}")]
    Validation(String),
}
