//! Hive metastore client module.
//!
//! This module provides the [`MetastoreClient`] trait the scan resolver talks
//! to, the descriptor types it returns, and [`MemoryMetastore`], an in-memory
//! implementation for tests and local tooling.
//!
//! The wire protocol (Thrift) is not implemented here; production clients
//! implement the trait on top of whatever transport they use.

mod memory;
mod table_identifier;

pub use memory::MemoryMetastore;
pub use table_identifier::{parse_table_identifier, TableIdentifier};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::HiveColumn;

/// Storage descriptor (`sd`) of a table or partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDescriptor {
    /// Directory URI holding the data files
    pub location: String,
    /// Input format class name, e.g. `org.apache.hadoop.hive.ql.io.orc.OrcInputFormat`
    #[serde(default)]
    pub input_format: String,
    /// Bucketing columns (empty for non-bucketed tables)
    #[serde(default)]
    pub bucket_columns: Vec<String>,
    /// Number of buckets, `-1` or `0` when not bucketed
    #[serde(default)]
    pub num_buckets: i32,
}

/// Table metadata returned by [`MetastoreClient::get_table`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub database: String,
    pub table_name: String,
    /// Data columns (partition columns excluded)
    #[serde(default)]
    pub columns: Vec<HiveColumn>,
    /// Partition columns in key order
    #[serde(default)]
    pub partition_keys: Vec<HiveColumn>,
    pub storage: StorageDescriptor,
}

impl TableDescriptor {
    pub fn identifier(&self) -> TableIdentifier {
        TableIdentifier::new(&self.database, &self.table_name)
    }

    pub fn is_partitioned(&self) -> bool {
        !self.partition_keys.is_empty()
    }

    /// Look up a data or partition column by name.
    pub fn column(&self, name: &str) -> Option<&HiveColumn> {
        self.columns
            .iter()
            .chain(self.partition_keys.iter())
            .find(|c| c.name == name)
    }
}

/// One partition as returned by [`MetastoreClient::get_partitions_by_filter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePartition {
    /// Raw partition values, in partition key order
    pub values: Vec<String>,
    pub storage: StorageDescriptor,
    /// Seconds since epoch
    #[serde(default)]
    pub last_access_time: i64,
}

/// Per-column statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Compressed on-disk size in bytes
    #[serde(default)]
    pub compressed_size: u64,
    #[serde(default)]
    pub null_count: u64,
    #[serde(default)]
    pub distinct_count: Option<u64>,
}

/// Table statistics returned by [`MetastoreClient::get_table_stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStatistics {
    pub row_count: u64,
    #[serde(default)]
    pub columns: HashMap<String, ColumnStatistics>,
}

impl TableStatistics {
    /// Compressed column sizes, or `None` if no column reports one.
    pub fn column_compressed_sizes(&self) -> Option<HashMap<String, u64>> {
        let sizes: HashMap<String, u64> = self
            .columns
            .iter()
            .filter(|(_, stats)| stats.compressed_size > 0)
            .map(|(name, stats)| (name.clone(), stats.compressed_size))
            .collect();
        if sizes.is_empty() {
            None
        } else {
            Some(sizes)
        }
    }
}

/// Hive metastore client.
///
/// Calls block the calling thread. Implementations are shared across
/// scans and must be `Send + Sync`; retries and timeouts are theirs to handle.
pub trait MetastoreClient: std::fmt::Debug + Send + Sync {
    /// Load table metadata.
    fn get_table(&self, database: &str, table: &str) -> Result<TableDescriptor>;

    /// List partitions matching a metastore filter string.
    ///
    /// An empty filter lists every partition. The result may be a superset
    /// of the partitions matching `filter`.
    fn get_partitions_by_filter(
        &self,
        database: &str,
        table: &str,
        filter: &str,
    ) -> Result<Vec<RemotePartition>>;

    /// Load table statistics for `columns`, if the metastore has any.
    fn get_table_stats(
        &self,
        database: &str,
        table: &str,
        columns: &[String],
        merge_partition_stats: bool,
    ) -> Result<Option<TableStatistics>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_descriptor_from_json() {
        let json = r#"{
            "database": "sales",
            "table_name": "orders",
            "columns": [{"name": "id", "type": "bigint"}],
            "partition_keys": [{"name": "dt", "type": "string"}],
            "storage": {
                "location": "hdfs://nn/warehouse/sales.db/orders",
                "input_format": "org.apache.hadoop.hive.ql.io.orc.OrcInputFormat",
                "bucket_columns": ["id"],
                "num_buckets": 8
            }
        }"#;
        let table: TableDescriptor = serde_json::from_str(json).unwrap();
        assert!(table.is_partitioned());
        assert_eq!(table.identifier().to_canonical(), "sales.orders");
        assert_eq!(table.column("dt").unwrap().type_name, "string");
        assert!(table.column("missing").is_none());
        assert_eq!(table.storage.num_buckets, 8);
    }

    #[test]
    fn test_column_compressed_sizes() {
        let mut stats = TableStatistics::default();
        assert!(stats.column_compressed_sizes().is_none());

        stats.columns.insert(
            "a".to_string(),
            ColumnStatistics {
                compressed_size: 100,
                ..Default::default()
            },
        );
        stats.columns.insert("b".to_string(), ColumnStatistics::default());
        let sizes = stats.column_compressed_sizes().unwrap();
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes["a"], 100);
    }
}
