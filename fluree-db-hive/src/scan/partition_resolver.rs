//! Partition resolution against the metastore.
//!
//! 1. Non-partitioned tables resolve to one synthetic partition; the
//!    partition API is not called
//! 2. Partition key conditions become a metastore filter string
//! 3. Returned partitions are loaded against the partition key and pruned
//!    locally
//! 4. The partition ceiling is enforced before anything is listed

use std::sync::Arc;

use crate::catalog::{MetastoreClient, TableDescriptor};
use crate::config::ScanSettings;
use crate::error::{HiveError, Result};
use crate::partition::HivePartition;
use crate::scan::predicate::{metastore_filter, Expression};
use crate::scan::pruning::{KeyConditionPruner, PartitionPruner};
use crate::schema::PartitionKey;

/// How partitions are keyed in [`PartitionResolver::last_modification_times`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartitionKeyEncoding {
    /// Hive partition name (`dt=2024-01-01/hour=7`)
    #[default]
    Id,
    /// JSON array of the typed partition values
    Json,
}

/// Resolves the partitions a scan must read.
#[derive(Debug)]
pub struct PartitionResolver<'a> {
    client: &'a dyn MetastoreClient,
    table: &'a TableDescriptor,
    key: Option<&'a PartitionKey>,
    settings: &'a ScanSettings,
    pruner: Option<Arc<dyn PartitionPruner>>,
}

impl<'a> PartitionResolver<'a> {
    /// `key` is `None` (or empty) for non-partitioned tables.
    pub fn new(
        client: &'a dyn MetastoreClient,
        table: &'a TableDescriptor,
        key: Option<&'a PartitionKey>,
        settings: &'a ScanSettings,
    ) -> Self {
        Self {
            client,
            table,
            key: key.filter(|k| !k.is_empty()),
            settings,
            pruner: None,
        }
    }

    /// Replace the default [`KeyConditionPruner`].
    pub fn with_pruner(mut self, pruner: Arc<dyn PartitionPruner>) -> Self {
        self.pruner = Some(pruner);
        self
    }

    /// Resolve partitions for the given partition key conditions.
    ///
    /// The result is a superset of the partitions that can hold matching
    /// rows. Fails with [`HiveError::TooManyPartitions`] when the survivors
    /// exceed `max_partitions_to_read`.
    pub fn resolve_partitions(
        &self,
        conditions: Option<&Expression>,
    ) -> Result<Vec<Arc<HivePartition>>> {
        let Some(key) = self.key else {
            let partitions = vec![Arc::new(HivePartition::for_table(&self.table.storage))];
            self.check_limit(partitions.len())?;
            return Ok(partitions);
        };

        let filter = match conditions {
            Some(conditions) if self.settings.use_metastore_filter => {
                metastore_filter(conditions).unwrap_or_default()
            }
            _ => String::new(),
        };
        tracing::debug!(
            table = %self.table.identifier(),
            filter = %filter,
            "requesting partitions"
        );

        let remote = self.client.get_partitions_by_filter(
            &self.table.database,
            &self.table.table_name,
            &filter,
        )?;
        let total = remote.len();

        let pruner: Option<Arc<dyn PartitionPruner>> = match conditions {
            Some(conditions) if self.settings.use_partition_filter => Some(match &self.pruner {
                Some(custom) => Arc::clone(custom),
                None => Arc::new(KeyConditionPruner::new(key.clone(), conditions.clone())),
            }),
            _ => None,
        };

        let mut partitions = Vec::with_capacity(total);
        for remote_partition in &remote {
            let partition = HivePartition::load(remote_partition, key)?;
            if let Some(pruner) = &pruner {
                if pruner.can_be_pruned(&partition.partition_id, &partition.values) {
                    continue;
                }
            }
            partitions.push(Arc::new(partition));
        }

        tracing::debug!(
            selected = partitions.len(),
            total,
            "read from {}/{} partitions",
            partitions.len(),
            total
        );
        self.check_limit(partitions.len())?;
        Ok(partitions)
    }

    fn check_limit(&self, count: usize) -> Result<()> {
        let limit = self.settings.max_partitions_to_read;
        if limit > 0 && count as u64 > limit {
            return Err(HiveError::TooManyPartitions { count, limit });
        }
        Ok(())
    }

    /// Last access time of every partition, fetched with an empty filter.
    ///
    /// Non-partitioned tables have no entries.
    pub fn last_modification_times(
        &self,
        encoding: PartitionKeyEncoding,
    ) -> Result<Vec<(String, i64)>> {
        let Some(key) = self.key else {
            return Ok(Vec::new());
        };

        let remote =
            self.client
                .get_partitions_by_filter(&self.table.database, &self.table.table_name, "")?;
        remote
            .iter()
            .map(|remote_partition| {
                let partition = HivePartition::load(remote_partition, key)?;
                let partition_key = match encoding {
                    PartitionKeyEncoding::Id => partition.partition_id,
                    PartitionKeyEncoding::Json => serde_json::to_string(&partition.values)
                        .map_err(|e| HiveError::metadata(e.to_string()))?,
                };
                Ok((partition_key, remote_partition.last_access_time))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemoryMetastore, RemotePartition, StorageDescriptor};
    use crate::scan::predicate::LiteralValue;
    use crate::schema::HiveColumn;

    fn table(partitioned: bool) -> TableDescriptor {
        TableDescriptor {
            database: "db".into(),
            table_name: "events".into(),
            columns: vec![HiveColumn::new("id", "bigint")],
            partition_keys: if partitioned {
                vec![HiveColumn::new("dt", "string"), HiveColumn::new("hour", "int")]
            } else {
                vec![]
            },
            storage: StorageDescriptor {
                location: "/wh/events".into(),
                ..Default::default()
            },
        }
    }

    fn store_with_partitions(hours: &[i64]) -> MemoryMetastore {
        let mut store = MemoryMetastore::new();
        store.add_table(table(true));
        for hour in hours {
            store.add_partition(
                "db",
                "events",
                RemotePartition {
                    values: vec!["2024-01-01".into(), hour.to_string()],
                    storage: StorageDescriptor {
                        location: format!("/wh/events/dt=2024-01-01/hour={}", hour),
                        ..Default::default()
                    },
                    last_access_time: 1_000 + hour,
                },
            );
        }
        store
    }

    fn key() -> PartitionKey {
        PartitionKey::from_columns(&table(true).partition_keys).unwrap()
    }

    #[test]
    fn test_non_partitioned_table_skips_partition_api() {
        let store = MemoryMetastore::new();
        let table = table(false);
        let settings = ScanSettings::default();
        let resolver = PartitionResolver::new(&store, &table, None, &settings);

        let partitions = resolver
            .resolve_partitions(Some(&Expression::eq("id", 1i64)))
            .unwrap();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].partition_id, "all");
        assert_eq!(partitions[0].location, "/wh/events");
        assert_eq!(store.partition_calls(), 0);
    }

    #[test]
    fn test_filter_string_and_local_pruning() {
        let store = store_with_partitions(&[1, 2, 3]);
        let table = table(true);
        let key = key();
        let settings = ScanSettings::default();
        let resolver = PartitionResolver::new(&store, &table, Some(&key), &settings);

        let conditions = Expression::and(vec![
            Expression::eq("dt", "2024-01-01"),
            Expression::in_list("hour", vec![2i64.into(), 3i64.into()]),
        ]);
        let partitions = resolver.resolve_partitions(Some(&conditions)).unwrap();
        let ids: Vec<&str> = partitions.iter().map(|p| p.partition_id.as_str()).collect();
        assert_eq!(ids, vec!["dt=2024-01-01/hour=2", "dt=2024-01-01/hour=3"]);
        assert_eq!(store.last_filter().as_deref(), Some("dt = \"2024-01-01\""));
    }

    #[test]
    fn test_metastore_filter_disabled() {
        let store = store_with_partitions(&[1, 2]);
        let table = table(true);
        let key = key();
        let settings = ScanSettings::default()
            .with_metastore_filter(false)
            .with_partition_filter(false);
        let resolver = PartitionResolver::new(&store, &table, Some(&key), &settings);

        let partitions = resolver
            .resolve_partitions(Some(&Expression::eq("hour", 1i64)))
            .unwrap();
        assert_eq!(partitions.len(), 2);
        assert_eq!(store.last_filter().as_deref(), Some(""));
    }

    #[test]
    fn test_partition_ceiling() {
        let hours: Vec<i64> = (0..150).collect();
        let store = store_with_partitions(&hours);
        let table = table(true);
        let key = key();
        let settings = ScanSettings::default().with_max_partitions_to_read(100);
        let resolver = PartitionResolver::new(&store, &table, Some(&key), &settings);

        let err = resolver.resolve_partitions(None).unwrap_err();
        assert!(matches!(
            err,
            HiveError::TooManyPartitions {
                count: 150,
                limit: 100
            }
        ));

        // Pruning happens before the ceiling check
        let conditions = Expression::lt("hour", 50i64);
        assert_eq!(resolver.resolve_partitions(Some(&conditions)).unwrap().len(), 50);
    }

    #[test]
    fn test_custom_pruner() {
        #[derive(Debug)]
        struct DropAll;
        impl PartitionPruner for DropAll {
            fn can_be_pruned(&self, _: &str, _: &[LiteralValue]) -> bool {
                true
            }
        }

        let store = store_with_partitions(&[1, 2]);
        let table = table(true);
        let key = key();
        let settings = ScanSettings::default();
        let resolver = PartitionResolver::new(&store, &table, Some(&key), &settings)
            .with_pruner(Arc::new(DropAll));

        // No conditions: the pruner is not consulted
        assert_eq!(resolver.resolve_partitions(None).unwrap().len(), 2);
        let conditions = Expression::eq("hour", 1i64);
        assert!(resolver.resolve_partitions(Some(&conditions)).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_partition_is_retrieval_failure() {
        let mut store = store_with_partitions(&[1]);
        store.add_partition(
            "db",
            "events",
            RemotePartition {
                values: vec!["2024-01-01".into(), "not-an-int".into()],
                storage: StorageDescriptor::default(),
                last_access_time: 0,
            },
        );
        let table = table(true);
        let key = key();
        let settings = ScanSettings::default();
        let resolver = PartitionResolver::new(&store, &table, Some(&key), &settings);
        assert!(resolver.resolve_partitions(None).unwrap_err().is_retrieval_failure());
    }

    #[test]
    fn test_metastore_failure_propagates() {
        let mut store = store_with_partitions(&[1]);
        store.set_unavailable("connection reset");
        let table = table(true);
        let key = key();
        let settings = ScanSettings::default();
        let resolver = PartitionResolver::new(&store, &table, Some(&key), &settings);
        assert!(matches!(
            resolver.resolve_partitions(None),
            Err(HiveError::Metastore(_))
        ));
    }

    #[test]
    fn test_last_modification_times() {
        let store = store_with_partitions(&[1, 2]);
        let table = table(true);
        let key = key();
        let settings = ScanSettings::default();
        let resolver = PartitionResolver::new(&store, &table, Some(&key), &settings);

        let by_id = resolver
            .last_modification_times(PartitionKeyEncoding::Id)
            .unwrap();
        assert_eq!(by_id[0], ("dt=2024-01-01/hour=1".to_string(), 1_001));
        assert_eq!(store.last_filter().as_deref(), Some(""));

        let by_json = resolver
            .last_modification_times(PartitionKeyEncoding::Json)
            .unwrap();
        let values: Vec<LiteralValue> = serde_json::from_str(&by_json[1].0).unwrap();
        assert_eq!(values, vec![LiteralValue::from("2024-01-01"), LiteralValue::from(2i64)]);
        assert_eq!(by_json[1].1, 1_002);
    }
}
