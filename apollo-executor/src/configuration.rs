//! Logic for loading configuration in to an object model

use std::str::FromStr;

use displaydoc::Display;
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_yaml::Error),
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
}

/// The configuration for the executor.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// Selection tree construction
    pub execution: Execution,

    /// Lazy value resolution
    pub lazy: Lazy,

    /// Document validation
    pub validation: Validation,
}

impl Configuration {
    /// Returns the JSON schema of the configuration file.
    pub fn json_schema() -> RootSchema {
        schemars::schema_for!(Configuration)
    }

    pub(crate) fn validate(self) -> Result<Self, ConfigurationError> {
        if self.execution.recursion_limit == 0 {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "execution.recursion_limit",
                error: "must be greater than 0".to_string(),
            });
        }
        if self.lazy.max_chain_length == 0 {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "lazy.max_chain_length",
                error: "must be greater than 0".to_string(),
            });
        }
        Ok(self)
    }
}

impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Configuration::default());
        }
        serde_yaml::from_str::<Configuration>(s)
            .map_err(ConfigurationError::DeserializeConfigError)?
            .validate()
    }
}

/// Configuration options pertaining to selection tree construction.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Execution {
    /// Maximum nesting of selections accepted in a document
    /// default: 512
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,
}

fn default_recursion_limit() -> usize {
    // The limit is chosen to be:
    //   < # expected to cause stack overflow &&
    //   > # expected in a legitimate query
    512
}

impl Default for Execution {
    fn default() -> Self {
        Self {
            recursion_limit: default_recursion_limit(),
        }
    }
}

/// Configuration options pertaining to lazy value resolution.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Lazy {
    /// Maximum number of unwrap steps for a single lazy value before the field errors
    /// default: 10000
    #[serde(default = "default_max_chain_length")]
    pub max_chain_length: usize,
}

fn default_max_chain_length() -> usize {
    10_000
}

impl Default for Lazy {
    fn default() -> Self {
        Self {
            max_chain_length: default_max_chain_length(),
        }
    }
}

/// Configuration options pertaining to document validation.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Validation {
    /// Validate documents against the schema before executing them.
    /// When disabled, documents are only parsed.
    /// enabled by default
    #[serde(default = "default_validation_enabled")]
    pub enabled: bool,
}

fn default_validation_enabled() -> bool {
    true
}

impl Default for Validation {
    fn default() -> Self {
        Self {
            enabled: default_validation_enabled(),
        }
    }
}
