//! Hive column types and partition keys.
//!
//! Only the types that can appear in partition and bucketing keys are
//! modelled. Other columns keep their raw metastore type string.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{HiveError, Result};
use crate::scan::LiteralValue;

/// Partition value the metastore uses for NULL.
pub const HIVE_DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Primitive Hive types usable in partition and cluster-by keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiveType {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    String,
    Date,
}

impl HiveType {
    /// Parse a metastore type string (`int`, `varchar(10)`, ...).
    pub fn parse(type_name: &str) -> Result<Self> {
        let lower = type_name.trim().to_ascii_lowercase();
        let base = lower.split('(').next().unwrap_or_default();
        let ty = match base {
            "boolean" => Self::Boolean,
            "tinyint" => Self::TinyInt,
            "smallint" => Self::SmallInt,
            "int" | "integer" => Self::Int,
            "bigint" => Self::BigInt,
            "float" => Self::Float,
            "double" => Self::Double,
            "string" | "varchar" | "char" => Self::String,
            "date" => Self::Date,
            _ => {
                return Err(HiveError::metadata(format!(
                    "Unsupported key column type '{}'",
                    type_name
                )))
            }
        };
        Ok(ty)
    }

    /// Parse a raw partition value string into a typed literal.
    pub fn parse_value(&self, raw: &str) -> Result<LiteralValue> {
        if raw == HIVE_DEFAULT_PARTITION {
            return Ok(LiteralValue::Null);
        }
        let invalid = || {
            HiveError::metadata(format!("Invalid {:?} partition value '{}'", self, raw))
        };
        let value = match self {
            Self::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" => LiteralValue::Boolean(true),
                "false" => LiteralValue::Boolean(false),
                _ => return Err(invalid()),
            },
            Self::TinyInt => LiteralValue::Int64(raw.parse::<i8>().map_err(|_| invalid())? as i64),
            Self::SmallInt => {
                LiteralValue::Int64(raw.parse::<i16>().map_err(|_| invalid())? as i64)
            }
            Self::Int => LiteralValue::Int64(raw.parse::<i32>().map_err(|_| invalid())? as i64),
            Self::BigInt => LiteralValue::Int64(raw.parse::<i64>().map_err(|_| invalid())?),
            Self::Float | Self::Double => {
                LiteralValue::Float64(raw.parse::<f64>().map_err(|_| invalid())?)
            }
            Self::String => LiteralValue::String(raw.to_string()),
            Self::Date => {
                let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())?;
                LiteralValue::Date(LiteralValue::days_from_date(date))
            }
        };
        Ok(value)
    }
}

/// A column as reported by the metastore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiveColumn {
    pub name: String,
    /// Raw metastore type string (e.g. `bigint`, `array<string>`)
    #[serde(rename = "type")]
    pub type_name: String,
}

impl HiveColumn {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    pub fn hive_type(&self) -> Result<HiveType> {
        HiveType::parse(&self.type_name)
    }
}

/// Ordered partition key columns with resolved types.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionKey {
    columns: Vec<(String, HiveType)>,
}

impl PartitionKey {
    pub fn from_columns(columns: &[HiveColumn]) -> Result<Self> {
        let columns = columns
            .iter()
            .map(|c| Ok((c.name.clone(), c.hive_type()?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|(name, _)| name == column)
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|(name, _)| name == column)
    }

    /// Parse raw metastore partition values against the key.
    pub fn parse_values(&self, raw: &[String]) -> Result<Vec<LiteralValue>> {
        if raw.len() != self.columns.len() {
            return Err(HiveError::metadata(format!(
                "Partition has {} values but the partition key has {} columns",
                raw.len(),
                self.columns.len()
            )));
        }
        self.columns
            .iter()
            .zip(raw)
            .map(|((_, ty), value)| ty.parse_value(value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_types() {
        assert_eq!(HiveType::parse("INT").unwrap(), HiveType::Int);
        assert_eq!(HiveType::parse("varchar(32)").unwrap(), HiveType::String);
        assert_eq!(HiveType::parse(" bigint ").unwrap(), HiveType::BigInt);
        assert!(HiveType::parse("array<string>").is_err());
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(
            HiveType::Int.parse_value("42").unwrap(),
            LiteralValue::Int64(42)
        );
        assert!(HiveType::TinyInt.parse_value("300").is_err());
        assert_eq!(
            HiveType::Date.parse_value("1970-01-02").unwrap(),
            LiteralValue::Date(1)
        );
        assert_eq!(
            HiveType::String.parse_value(HIVE_DEFAULT_PARTITION).unwrap(),
            LiteralValue::Null
        );
        assert_eq!(
            HiveType::Boolean.parse_value("TRUE").unwrap(),
            LiteralValue::Boolean(true)
        );
        assert!(HiveType::Date.parse_value("2024/01/01").is_err());
    }

    #[test]
    fn test_partition_key_value_count_mismatch() {
        let key = PartitionKey::from_columns(&[
            HiveColumn::new("dt", "string"),
            HiveColumn::new("hour", "int"),
        ])
        .unwrap();
        assert_eq!(key.len(), 2);
        assert_eq!(key.position("hour"), Some(1));

        let err = key.parse_values(&["2024-01-01".to_string()]).unwrap_err();
        assert!(err.is_retrieval_failure());

        let values = key
            .parse_values(&["2024-01-01".to_string(), "7".to_string()])
            .unwrap();
        assert_eq!(
            values,
            vec![LiteralValue::String("2024-01-01".into()), LiteralValue::Int64(7)]
        );
    }
}
