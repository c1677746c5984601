//! Resolved table partitions.

use chrono::{DateTime, Utc};

use crate::catalog::{RemotePartition, StorageDescriptor};
use crate::error::Result;
use crate::scan::LiteralValue;
use crate::schema::{PartitionKey, HIVE_DEFAULT_PARTITION};

/// Partition id of the synthetic partition of a non-partitioned table.
pub const UNPARTITIONED_ID: &str = "all";

/// One partition of a table, immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct HivePartition {
    /// Hive partition name, e.g. `dt=2024-01-01/hour=7`
    pub partition_id: String,
    /// Typed values in partition key order
    pub values: Vec<LiteralValue>,
    /// Directory URI of the partition's files
    pub location: String,
    pub last_modified: Option<DateTime<Utc>>,
}

impl HivePartition {
    /// Load a metastore partition against the table's partition key.
    pub fn load(remote: &RemotePartition, key: &PartitionKey) -> Result<Self> {
        let values = key.parse_values(&remote.values)?;
        let partition_id = key
            .column_names()
            .zip(&remote.values)
            .map(|(name, raw)| format!("{}={}", escape_path_name(name), escape_path_name(raw)))
            .collect::<Vec<_>>()
            .join("/");

        Ok(Self {
            partition_id,
            values,
            location: remote.storage.location.clone(),
            last_modified: DateTime::from_timestamp(remote.last_access_time, 0)
                .filter(|_| remote.last_access_time > 0),
        })
    }

    /// The single partition covering a non-partitioned table's root.
    pub fn for_table(storage: &StorageDescriptor) -> Self {
        Self {
            partition_id: UNPARTITIONED_ID.to_string(),
            values: Vec::new(),
            location: storage.location.clone(),
            last_modified: None,
        }
    }

    pub fn is_null_partition(&self) -> bool {
        self.values.iter().any(LiteralValue::is_null)
    }
}

/// Escape a partition name component the way Hive does for directory names.
fn escape_path_name(raw: &str) -> String {
    if raw.is_empty() {
        return HIVE_DEFAULT_PARTITION.to_string();
    }
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if needs_escaping(c) {
            escaped.push_str(&format!("%{:02X}", c as u32));
        } else {
            escaped.push(c);
        }
    }
    escaped
}

fn needs_escaping(c: char) -> bool {
    (c as u32) < 0x20
        || matches!(
            c,
            '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '\u{7F}' | '{' | '['
                | ']' | '^'
        )
}
