// Toy VM Configuration
// Loaded from JSON (toy.json by default)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors raised while loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Limits and diagnostics for a [`crate::vm::Vm`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VmConfig {
    /// Operand stack slots available to each context
    #[serde(default = "default_max_stack")]
    pub max_stack: usize,
    /// Nested script calls allowed per context
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
    /// Emit a trace event for every executed instruction
    #[serde(default)]
    pub trace: bool,
}

fn default_max_stack() -> usize {
    65536
}

fn default_max_call_depth() -> usize {
    4096
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_stack: default_max_stack(),
            max_call_depth: default_max_call_depth(),
            trace: false,
        }
    }
}

impl VmConfig {
    pub const FILE_NAME: &'static str = "toy.json";

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Load `toy.json` from `dir` if present, defaults otherwise
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let candidate = dir.join(Self::FILE_NAME);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }
}
