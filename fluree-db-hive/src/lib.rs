//! Hive metastore scan resolution for Fluree DB graph sources.
//!
//! This crate turns a logical scan of a Hive table into the list of data
//! files to read: it selects partitions through the metastore, lists their
//! directories concurrently, prunes bucketed files and splits the query
//! filter into partition, prewhere and where conditions.
//!
//! # Architecture
//!
//! - [`catalog`] - Metastore client trait, table descriptors, in-memory metastore
//! - [`config`] - Table configuration and per-query scan settings
//! - [`partition`] - Partitions as seen by the scan pipeline
//! - [`io`] - Disk abstraction, directory listers (Parquet, ORC, Hudi)
//! - [`scan`] - Filter pushdown, partition resolution, bucket pruning, planning
//! - [`table`] - [`HiveTable`], the entry point tying them together
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fluree_db_hive::{
//!     HiveTable, HiveTableConfig, LocalDisk, ScanRequest, ScanSettings, Expression,
//! };
//!
//! let config = HiveTableConfig::new("thrift://hms:9083", "sales", "orders");
//! let table = HiveTable::open(config, metastore_client, Arc::new(LocalDisk));
//! table.startup()?;
//!
//! let request = ScanRequest::new(table.descriptor()?.identifier(), vec!["id".into()])
//!     .with_filter(Expression::eq("dt", "2024-01-01"))
//!     .with_concurrency(8);
//! let resolution = table.prepare_read(&request, &ScanSettings::default())?;
//! for file in &resolution.files {
//!     println!("{} ({} bytes)", file.file_path, file.size);
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod config_value;
pub mod error;
pub mod io;
pub mod partition;
pub mod scan;
pub mod schema;
pub mod table;

pub use catalog::{
    parse_table_identifier, MemoryMetastore, MetastoreClient, RemotePartition, StorageDescriptor,
    TableDescriptor, TableIdentifier, TableStatistics,
};
pub use config::{
    ClusterByConfig, HiveTableConfig, HiveTableSettings, MoveToPrewhereMethod, ScanSettings,
    VirtualWarehouseType,
};
pub use config_value::ConfigValue;
pub use error::{HiveError, Result};
pub use io::{Disk, FileFormat, HiveFile, LocalDisk, MemoryDisk, SerializedHiveFiles};
pub use partition::HivePartition;
pub use scan::{
    ComparisonOp, Expression, FilterSplit, LiteralValue, PartitionKeyEncoding, ScanPlanner,
    ScanRequest, ScanResolution,
};
pub use schema::{HiveColumn, HiveType, PartitionKey};
pub use table::HiveTable;
