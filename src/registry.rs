//! Action registry - the ordered rule set loaded from the command file
//!
//! The file is a JSON document:
//!
//! ```json
//! { "commands": [ { "name": "say_hello", "triggers": ["hello camcookie"],
//!                   "action": "say_text", "params": { "text": "Hi" } } ] }
//! ```
//!
//! Order matters: the matcher returns the first action whose trigger fits,
//! so the registry keeps actions and triggers exactly as declared.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Named parameters passed to a handler
pub type Params = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("command file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read command file {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid command file {}: {source}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One configured rule: trigger phrases mapped to a handler and its params
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    pub triggers: Vec<String>,
    /// Handler id, looked up only when the action is executed
    pub action: String,
    #[serde(default)]
    pub params: Params,
}

#[derive(Deserialize)]
struct RuleFile {
    commands: Vec<ActionDefinition>,
}

/// Immutable, ordered list of action definitions
#[derive(Debug, Clone, Default)]
pub struct Registry {
    actions: Vec<ActionDefinition>,
}

impl Registry {
    /// Load the rule file. Any failure here is fatal for the caller.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ConfigError::Missing(path.to_path_buf())
            } else {
                ConfigError::Unreadable {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        let registry = Self::from_json(&text).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!(
            "Loaded {} commands from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Parse a rule document, normalizing triggers to lowercase
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let file: RuleFile = serde_json::from_str(text)?;
        Ok(Self::from_actions(file.commands))
    }

    pub fn from_actions(actions: Vec<ActionDefinition>) -> Self {
        let actions = actions.into_iter().map(normalize).collect();
        Self { actions }
    }

    pub fn actions(&self) -> &[ActionDefinition] {
        &self.actions
    }

    pub fn get(&self, name: &str) -> Option<&ActionDefinition> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

fn normalize(mut def: ActionDefinition) -> ActionDefinition {
    let before = def.triggers.len();
    def.triggers = def
        .triggers
        .into_iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.to_lowercase())
        .collect();

    // An empty trigger is a substring of every utterance
    if def.triggers.len() != before {
        tracing::warn!(
            "Command '{}': dropped {} empty trigger(s)",
            def.name,
            before - def.triggers.len()
        );
    }
    if def.triggers.is_empty() {
        tracing::warn!("Command '{}' has no triggers and will never match", def.name);
    }
    def
}
