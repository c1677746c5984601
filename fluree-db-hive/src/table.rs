//! Hive table handle.
//!
//! [`HiveTable::open`] never fails: metadata is loaded eagerly, and a load
//! failure is kept and returned by [`HiveTable::startup`] and by every later
//! operation. Callers can register a table whose metastore is temporarily
//! unreachable and surface the error when the table is first used.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::catalog::{MetastoreClient, TableDescriptor, TableStatistics};
use crate::config::{HiveTableConfig, HiveTableSettings, MoveToPrewhereMethod, ScanSettings};
use crate::error::{HiveError, Result};
use crate::io::disk::Disk;
use crate::scan::{
    ClusterByExpression, HiveBucketHash, PartitionKeyEncoding, PartitionResolver, ScanPlanner,
    ScanRequest, ScanResolution,
};
use crate::schema::{HiveColumn, PartitionKey};

/// Virtual column holding a row's file path.
pub const VIRTUAL_PATH_COLUMN: &str = "_path";
/// Virtual column holding a row's file name.
pub const VIRTUAL_FILE_COLUMN: &str = "_file";

#[derive(Debug)]
struct LoadedTable {
    metastore_url: String,
    descriptor: TableDescriptor,
    partition_key: Option<PartitionKey>,
    cluster_by: Option<HiveBucketHash>,
}

#[derive(Debug)]
enum TableState {
    Ready(LoadedTable),
    Failed(HiveError),
}

/// A Hive table backed by a metastore and a disk.
#[derive(Debug)]
pub struct HiveTable {
    config: HiveTableConfig,
    client: Arc<dyn MetastoreClient>,
    disk: Arc<dyn Disk>,
    state: TableState,
}

impl HiveTable {
    /// Open a table, loading its metadata from the metastore.
    pub fn open(
        config: HiveTableConfig,
        client: Arc<dyn MetastoreClient>,
        disk: Arc<dyn Disk>,
    ) -> Self {
        let state = match load(&config, client.as_ref()) {
            Ok(loaded) => {
                tracing::debug!(
                    table = %loaded.descriptor.identifier(),
                    partitioned = loaded.partition_key.is_some(),
                    bucketed = loaded.cluster_by.is_some(),
                    "opened hive table"
                );
                TableState::Ready(loaded)
            }
            Err(e) => {
                tracing::warn!(
                    database = %config.database,
                    table = %config.table,
                    error = %e,
                    "failed to load hive table"
                );
                TableState::Failed(e)
            }
        };
        Self {
            config,
            client,
            disk,
            state,
        }
    }

    /// Returns the failure recorded while opening, if any.
    pub fn startup(&self) -> Result<()> {
        self.loaded().map(|_| ())
    }

    fn loaded(&self) -> Result<&LoadedTable> {
        match &self.state {
            TableState::Ready(loaded) => Ok(loaded),
            TableState::Failed(e) => Err(e.clone()),
        }
    }

    pub fn settings(&self) -> &HiveTableSettings {
        &self.config.settings
    }

    /// Resolved metastore URL.
    pub fn metastore_url(&self) -> Result<&str> {
        Ok(&self.loaded()?.metastore_url)
    }

    pub fn descriptor(&self) -> Result<&TableDescriptor> {
        Ok(&self.loaded()?.descriptor)
    }

    pub fn is_bucket_table(&self) -> Result<bool> {
        Ok(self.loaded()?.cluster_by.is_some())
    }

    pub fn partition_key(&self) -> Result<Option<&PartitionKey>> {
        Ok(self.loaded()?.partition_key.as_ref())
    }

    pub fn cluster_by_key(&self) -> Result<Option<&HiveBucketHash>> {
        Ok(self.loaded()?.cluster_by.as_ref())
    }

    /// Columns every Hive table exposes in addition to its own.
    pub fn virtual_columns() -> Vec<HiveColumn> {
        vec![
            HiveColumn::new(VIRTUAL_PATH_COLUMN, "string"),
            HiveColumn::new(VIRTUAL_FILE_COLUMN, "string"),
        ]
    }

    /// Metastore statistics for `columns`.
    pub fn table_stats(
        &self,
        columns: &[String],
        settings: &ScanSettings,
    ) -> Result<Option<TableStatistics>> {
        let descriptor = self.descriptor()?;
        let stats = self.client.get_table_stats(
            &descriptor.database,
            &descriptor.table_name,
            columns,
            settings.merge_partition_stats,
        )?;
        match &stats {
            Some(stats) => tracing::debug!(
                table = %descriptor.identifier(),
                row_count = stats.row_count,
                columns = stats.columns.len(),
                "loaded table stats"
            ),
            None => tracing::debug!(table = %descriptor.identifier(), "no table stats"),
        }
        Ok(stats)
    }

    /// Last access time per partition.
    pub fn partition_last_modification_times(
        &self,
        encoding: PartitionKeyEncoding,
    ) -> Result<Vec<(String, i64)>> {
        let loaded = self.loaded()?;
        let settings = ScanSettings::default();
        PartitionResolver::new(
            self.client.as_ref(),
            &loaded.descriptor,
            loaded.partition_key.as_ref(),
            &settings,
        )
        .last_modification_times(encoding)
    }

    fn check_columns(&self, descriptor: &TableDescriptor, columns: &[String]) -> Result<()> {
        for column in columns {
            let known = descriptor.column(column).is_some()
                || column == VIRTUAL_PATH_COLUMN
                || column == VIRTUAL_FILE_COLUMN;
            if !known {
                return Err(HiveError::config(format!(
                    "No such column {} in table {}",
                    column,
                    descriptor.identifier()
                )));
            }
        }
        Ok(())
    }

    /// Compressed sizes of the columns a scan touches, when prewhere
    /// selection needs them. Missing statistics only disable that selection.
    fn column_sizes(
        &self,
        request: &ScanRequest,
        settings: &ScanSettings,
    ) -> Option<std::collections::HashMap<String, u64>> {
        if !settings.optimize_move_to_prewhere
            || settings.move_to_prewhere_method != MoveToPrewhereMethod::ColumnSize
            || request.filter.is_none()
        {
            return None;
        }

        let mut columns: BTreeSet<&str> = request.columns.iter().map(String::as_str).collect();
        if let Some(filter) = &request.filter {
            columns.extend(filter.referenced_columns());
        }
        let columns: Vec<String> = columns.into_iter().map(str::to_string).collect();

        match self.table_stats(&columns, settings) {
            Ok(stats) => stats.and_then(|s| s.column_compressed_sizes()),
            Err(e) => {
                tracing::warn!(error = %e, "table stats unavailable, skipping prewhere selection");
                None
            }
        }
    }

    /// Resolve a scan into the data files to read.
    pub fn prepare_read(
        &self,
        request: &ScanRequest,
        settings: &ScanSettings,
    ) -> Result<ScanResolution> {
        let _span = tracing::debug_span!(
            "prepare_read",
            table = %request.table,
            query_id = %request.query_id
        )
        .entered();

        let loaded = self.loaded()?;
        let descriptor = &loaded.descriptor;
        if !request.table.matches(&descriptor.identifier()) {
            return Err(HiveError::config(format!(
                "Scan request for {} sent to table {}",
                request.table,
                descriptor.identifier()
            )));
        }
        self.check_columns(descriptor, &request.columns)?;

        let column_sizes = self.column_sizes(request, settings);
        ScanPlanner::new(
            self.client.as_ref(),
            Arc::clone(&self.disk),
            descriptor,
            settings,
        )
        .with_partition_key(loaded.partition_key.as_ref())
        .with_cluster_by(
            loaded
                .cluster_by
                .as_ref()
                .map(|c| c as &dyn ClusterByExpression),
        )
        .with_column_sizes(column_sizes)
        .plan(request)
    }
}

fn load(config: &HiveTableConfig, client: &dyn MetastoreClient) -> Result<LoadedTable> {
    config.validate()?;
    let metastore_url = config.metastore_url.resolve()?;
    let descriptor = client.get_table(&config.database, &config.table)?;

    let partition_key = if descriptor.is_partitioned() {
        Some(PartitionKey::from_columns(&descriptor.partition_keys)?)
    } else {
        None
    };

    if let Some(expected) = &config.partition_by {
        let actual: Vec<&str> = descriptor.partition_keys.iter().map(|c| c.name.as_str()).collect();
        if !expected.iter().map(String::as_str).eq(actual.iter().copied()) {
            return Err(HiveError::config(format!(
                "Partition columns {:?} do not match metastore partition keys {:?}",
                expected, actual
            )));
        }
    }

    let cluster_by = cluster_by_key(config, &descriptor)?;

    Ok(LoadedTable {
        metastore_url,
        descriptor,
        partition_key,
        cluster_by,
    })
}

/// Bucketing from the table config, falling back to the metastore's.
fn cluster_by_key(
    config: &HiveTableConfig,
    descriptor: &TableDescriptor,
) -> Result<Option<HiveBucketHash>> {
    let (columns, buckets) = match &config.cluster_by {
        Some(cluster_by) => (cluster_by.columns.clone(), cluster_by.buckets),
        None if !descriptor.storage.bucket_columns.is_empty()
            && descriptor.storage.num_buckets > 0 =>
        {
            (
                descriptor.storage.bucket_columns.clone(),
                descriptor.storage.num_buckets as u32,
            )
        }
        None => return Ok(None),
    };

    let typed = columns
        .into_iter()
        .map(|name| {
            let column = descriptor.column(&name).ok_or_else(|| {
                HiveError::metadata(format!(
                    "Cluster by column {} not found in table {}",
                    name,
                    descriptor.identifier()
                ))
            })?;
            Ok((name, column.hive_type()?))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(HiveBucketHash::new(typed, buckets)))
}
