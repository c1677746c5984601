//! Configuration values resolved from literals or environment variables.

use crate::error::{HiveError, Result};
use serde::{Deserialize, Serialize};

/// A configuration string that is either given literally or read from the
/// environment at table open time.
///
/// # JSON Formats
///
/// ```json
/// "thrift://metastore:9083"
/// {"env_var": "HIVE_METASTORE_URI"}
/// {"env_var": "HIVE_METASTORE_URI", "default_val": "thrift://localhost:9083"}
/// ```
///
/// # Example
///
/// ```
/// use fluree_db_hive::ConfigValue;
///
/// let literal: ConfigValue = serde_json::from_str(r#""thrift://hms:9083""#).unwrap();
/// assert_eq!(literal.resolve().unwrap(), "thrift://hms:9083");
///
/// let with_default: ConfigValue = serde_json::from_str(
///     r#"{"env_var": "UNSET_HMS_VAR", "default_val": "thrift://localhost:9083"}"#
/// ).unwrap();
/// assert_eq!(with_default.resolve().unwrap(), "thrift://localhost:9083");
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ConfigValue {
    Literal(String),
    Env {
        env_var: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_val: Option<String>,
    },
}

impl ConfigValue {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn from_env(var_name: impl Into<String>) -> Self {
        Self::Env {
            env_var: var_name.into(),
            default_val: None,
        }
    }

    pub fn from_env_with_default(var_name: impl Into<String>, default: impl Into<String>) -> Self {
        Self::Env {
            env_var: var_name.into(),
            default_val: Some(default.into()),
        }
    }

    /// Resolve to a string. An unset variable without a default is a
    /// configuration error naming the variable.
    pub fn resolve(&self) -> Result<String> {
        match self {
            ConfigValue::Literal(value) => Ok(value.clone()),
            ConfigValue::Env {
                env_var,
                default_val,
            } => match std::env::var(env_var) {
                Ok(value) => Ok(value),
                Err(_) => default_val.clone().ok_or_else(|| {
                    HiveError::Config(format!(
                        "Environment variable '{}' not set and no default provided",
                        env_var
                    ))
                }),
            },
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, ConfigValue::Literal(_))
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Literal(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::Literal(s)
    }
}
