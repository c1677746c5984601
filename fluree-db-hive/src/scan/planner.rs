//! Scan planning for Hive tables.
//!
//! This module provides the `ScanPlanner` which:
//! 1. Splits the query filter into partition / prewhere / where sets
//! 2. Resolves partitions through the metastore and prunes them locally
//! 3. Selects the directory lister for the table's input format
//! 4. Lists the surviving partitions concurrently
//! 5. Prunes files of bucketed tables by the required bucket

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::{MetastoreClient, TableDescriptor, TableIdentifier};
use crate::config::ScanSettings;
use crate::error::Result;
use crate::io::disk::Disk;
use crate::io::file::{HiveFile, SerializedHiveFiles};
use crate::io::lister::{directory_lister, InputFormat};
use crate::scan::bucket::{prune_by_bucket, resolve_required_bucket, ClusterByExpression};
use crate::scan::enumerator::list_files;
use crate::scan::partition_resolver::PartitionResolver;
use crate::scan::predicate::Expression;
use crate::scan::pruning::PartitionPruner;
use crate::scan::pushdown::{FilterSplit, KeyConditions, PredicatePushdown};
use crate::schema::PartitionKey;

/// A logical scan to resolve into data files.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub table: TableIdentifier,
    /// Requested columns (data, partition or virtual)
    pub columns: Vec<String>,
    pub filter: Option<Expression>,
    /// Prewhere given explicitly by the query
    pub prewhere: Option<Expression>,
    /// Upper bound for listing workers (default: 1)
    pub concurrency: usize,
    /// Query or transaction id, used to name the worker-side table
    pub query_id: String,
}

impl ScanRequest {
    pub fn new(table: TableIdentifier, columns: Vec<String>) -> Self {
        Self {
            table,
            columns,
            filter: None,
            prewhere: None,
            concurrency: 1,
            query_id: String::new(),
        }
    }

    pub fn with_filter(mut self, filter: Expression) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_prewhere(mut self, prewhere: Expression) -> Self {
        self.prewhere = Some(prewhere);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_query_id(mut self, query_id: impl Into<String>) -> Self {
        self.query_id = query_id.into();
        self
    }
}

/// Files to read for a scan, plus what the caller needs to plan the read.
#[derive(Debug, Clone)]
pub struct ScanResolution {
    /// Data files after partition and bucket pruning
    pub files: Vec<HiveFile>,
    pub filter: FilterSplit,
    /// Bucket the cluster-key conditions pin the scan to
    pub required_bucket: Option<u64>,
    pub partitions_selected: usize,
    /// Files listed before bucket pruning
    pub files_listed: usize,
    /// Name of the table on workers (`<table>_<query_id>`)
    pub worker_table_name: String,
}

impl ScanResolution {
    /// Check if there is nothing to read.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Serialized file list for shipping to workers.
    pub fn serialize_files(&self) -> SerializedHiveFiles {
        SerializedHiveFiles::from_files(&self.files)
    }
}

/// Worker-side table name for a query.
pub fn worker_table_name(table_name: &str, query_id: &str) -> String {
    if query_id.is_empty() {
        table_name.to_string()
    } else {
        format!("{}_{}", table_name, query_id)
    }
}

/// Scan planner for one table.
#[derive(Debug)]
pub struct ScanPlanner<'a> {
    client: &'a dyn MetastoreClient,
    disk: Arc<dyn Disk>,
    table: &'a TableDescriptor,
    partition_key: Option<&'a PartitionKey>,
    cluster_by: Option<&'a dyn ClusterByExpression>,
    settings: &'a ScanSettings,
    column_sizes: Option<HashMap<String, u64>>,
    pruner: Option<Arc<dyn PartitionPruner>>,
}

impl<'a> ScanPlanner<'a> {
    pub fn new(
        client: &'a dyn MetastoreClient,
        disk: Arc<dyn Disk>,
        table: &'a TableDescriptor,
        settings: &'a ScanSettings,
    ) -> Self {
        Self {
            client,
            disk,
            table,
            partition_key: None,
            cluster_by: None,
            settings,
            column_sizes: None,
            pruner: None,
        }
    }

    pub fn with_partition_key(mut self, key: Option<&'a PartitionKey>) -> Self {
        self.partition_key = key;
        self
    }

    /// Clustering expression of a bucketed table.
    pub fn with_cluster_by(mut self, cluster_by: Option<&'a dyn ClusterByExpression>) -> Self {
        self.cluster_by = cluster_by;
        self
    }

    pub fn with_column_sizes(mut self, sizes: Option<HashMap<String, u64>>) -> Self {
        self.column_sizes = sizes;
        self
    }

    pub fn with_pruner(mut self, pruner: Arc<dyn PartitionPruner>) -> Self {
        self.pruner = Some(pruner);
        self
    }

    fn is_partition_column(&self, column: &str) -> bool {
        self.partition_key.is_some_and(|key| key.contains(column))
    }

    fn is_cluster_column(&self, column: &str) -> bool {
        self.cluster_by
            .is_some_and(|cb| cb.columns().iter().any(|c| c == column))
    }

    /// Resolve `request` into the files to read.
    pub fn plan(&self, request: &ScanRequest) -> Result<ScanResolution> {
        let supports_prewhere = InputFormat::from_class_name(&self.table.storage.input_format)
            .map(|format| format.file_format().supports_prewhere())
            .unwrap_or(false);

        let split = PredicatePushdown::new(self.settings)
            .with_partition_columns(
                self.partition_key
                    .into_iter()
                    .flat_map(|key| key.column_names().map(str::to_string)),
            )
            .with_queried_columns(request.columns.clone())
            .with_column_sizes(self.column_sizes.clone())
            .with_prewhere_support(supports_prewhere)
            .split_filter(request.filter.clone(), request.prewhere.clone());

        let keys = KeyConditions::collect(
            &split,
            |c| self.is_partition_column(c),
            |c| self.is_cluster_column(c),
        );

        let mut resolver =
            PartitionResolver::new(self.client, self.table, self.partition_key, self.settings);
        if let Some(pruner) = &self.pruner {
            resolver = resolver.with_pruner(Arc::clone(pruner));
        }
        let partitions = resolver.resolve_partitions(keys.partition.as_ref())?;

        let lister = directory_lister(
            &self.table.storage.input_format,
            &self.table.storage.location,
            Arc::clone(&self.disk),
        )?;
        let concurrency = request.concurrency.min(self.settings.max_threads).max(1);
        let files = list_files(lister.as_ref(), &partitions, concurrency)?;
        let files_listed = files.len();

        let required_bucket = match (self.cluster_by, &keys.cluster) {
            (Some(cluster_by), Some(conditions)) if self.settings.use_cluster_key_filter => {
                resolve_required_bucket(cluster_by, conditions)
            }
            _ => None,
        };
        let files = prune_by_bucket(files, required_bucket);

        tracing::debug!(
            selected = files.len(),
            total = files_listed,
            "read from {}/{} files",
            files.len(),
            files_listed
        );
        tracing::info!(
            table = %self.table.identifier(),
            partitions_selected = partitions.len(),
            files_selected = files.len(),
            files_listed,
            required_bucket = ?required_bucket,
            "Scan planning complete"
        );

        Ok(ScanResolution {
            files,
            filter: split,
            required_bucket,
            partitions_selected: partitions.len(),
            files_listed,
            worker_table_name: worker_table_name(&self.table.table_name, &request.query_id),
        })
    }
}
