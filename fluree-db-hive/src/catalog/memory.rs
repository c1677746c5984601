//! In-memory metastore for tests and local tooling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::catalog::{MetastoreClient, RemotePartition, TableDescriptor, TableStatistics};
use crate::error::{HiveError, Result};

#[derive(Debug, Default)]
struct TableEntry {
    descriptor: Option<TableDescriptor>,
    partitions: Vec<RemotePartition>,
    stats: Option<TableStatistics>,
}

/// In-memory [`MetastoreClient`].
///
/// Filters are recorded but not evaluated: every partition of the table is
/// returned, which is the widest superset the trait contract allows.
#[derive(Debug, Default)]
pub struct MemoryMetastore {
    tables: HashMap<(String, String), TableEntry>,
    unavailable: Option<String>,
    partition_calls: AtomicUsize,
    last_filter: Mutex<Option<String>>,
}

impl MemoryMetastore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, database: &str, table: &str) -> &mut TableEntry {
        self.tables
            .entry((database.to_ascii_lowercase(), table.to_ascii_lowercase()))
            .or_default()
    }

    fn lookup(&self, database: &str, table: &str) -> Result<&TableEntry> {
        if let Some(reason) = &self.unavailable {
            return Err(HiveError::metastore(reason.clone()));
        }
        self.tables
            .get(&(database.to_ascii_lowercase(), table.to_ascii_lowercase()))
            .filter(|entry| entry.descriptor.is_some())
            .ok_or_else(|| HiveError::TableNotFound(format!("{}.{}", database, table)))
    }

    pub fn add_table(&mut self, descriptor: TableDescriptor) {
        let (database, table) = (descriptor.database.clone(), descriptor.table_name.clone());
        self.entry(&database, &table).descriptor = Some(descriptor);
    }

    pub fn add_partition(&mut self, database: &str, table: &str, partition: RemotePartition) {
        self.entry(database, table).partitions.push(partition);
    }

    pub fn set_table_stats(&mut self, database: &str, table: &str, stats: TableStatistics) {
        self.entry(database, table).stats = Some(stats);
    }

    /// Make every call fail as if the metastore were unreachable.
    pub fn set_unavailable(&mut self, reason: impl Into<String>) {
        self.unavailable = Some(reason.into());
    }

    /// Number of `get_partitions_by_filter` calls so far.
    pub fn partition_calls(&self) -> usize {
        self.partition_calls.load(Ordering::SeqCst)
    }

    /// Filter string passed to the most recent `get_partitions_by_filter` call.
    pub fn last_filter(&self) -> Option<String> {
        self.last_filter.lock().clone()
    }
}

impl MetastoreClient for MemoryMetastore {
    fn get_table(&self, database: &str, table: &str) -> Result<TableDescriptor> {
        let entry = self.lookup(database, table)?;
        entry
            .descriptor
            .clone()
            .ok_or_else(|| HiveError::TableNotFound(format!("{}.{}", database, table)))
    }

    fn get_partitions_by_filter(
        &self,
        database: &str,
        table: &str,
        filter: &str,
    ) -> Result<Vec<RemotePartition>> {
        self.partition_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_filter.lock() = Some(filter.to_string());
        Ok(self.lookup(database, table)?.partitions.clone())
    }

    fn get_table_stats(
        &self,
        database: &str,
        table: &str,
        columns: &[String],
        _merge_partition_stats: bool,
    ) -> Result<Option<TableStatistics>> {
        let entry = self.lookup(database, table)?;
        Ok(entry.stats.as_ref().map(|stats| TableStatistics {
            row_count: stats.row_count,
            columns: stats
                .columns
                .iter()
                .filter(|(name, _)| columns.is_empty() || columns.contains(name))
                .map(|(name, col)| (name.clone(), col.clone()))
                .collect(),
        }))
    }
}
