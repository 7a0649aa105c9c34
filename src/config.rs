use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Compiler and renderer limits plus code generation names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deepest allowed nesting of `if`/`for`/`foreach`/`while` bodies.
    pub max_depth: usize,
    /// Iterations a single loop may run before rendering fails.
    pub loop_limit: usize,
    /// Deepest allowed chain of `call` statements while rendering.
    pub max_call_depth: usize,
    pub codegen: CodegenConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_depth: 64,
            loop_limit: 100_000,
            max_call_depth: 64,
            codegen: CodegenConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// Identifiers used in generated Rust source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenConfig {
    /// The `&mut String` output receives are written to.
    pub builder: String,
    /// The `&str` ambient indentation parameter of indentation-aware functions.
    pub whitespace: String,
    /// Appended to a called template's name to reach its indentation-aware variant.
    pub indented_suffix: String,
    /// Path of the crate providing `indent`.
    pub runtime_path: String,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            builder: "builder".to_string(),
            whitespace: "whitespace".to_string(),
            indented_suffix: "_indented".to_string(),
            runtime_path: "cutwork".to_string(),
        }
    }
}
