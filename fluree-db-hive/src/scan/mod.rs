//! Scan resolution for Hive tables.
//!
//! This module turns a logical scan into the data files to read:
//! - [`predicate`]: filter expressions and the metastore filter grammar
//! - [`pushdown`]: partition / prewhere / where split
//! - [`partition_resolver`] and [`pruning`]: partition selection
//! - [`enumerator`]: concurrent directory listing
//! - [`bucket`]: bucket resolution and bucket-based file pruning
//! - [`planner`]: the pipeline tying them together

pub mod bucket;
pub mod enumerator;
pub mod partition_resolver;
pub mod planner;
pub mod predicate;
pub mod pruning;
pub mod pushdown;

pub use bucket::{
    extract_bucket_hint, java_string_hash, prune_by_bucket, resolve_required_bucket,
    ClusterByExpression, HiveBucketHash,
};
pub use enumerator::list_files;
pub use partition_resolver::{PartitionKeyEncoding, PartitionResolver};
pub use planner::{worker_table_name, ScanPlanner, ScanRequest, ScanResolution};
pub use predicate::{metastore_filter, ComparisonOp, Expression, LiteralValue};
pub use pruning::{KeyConditionPruner, PartitionPruner};
pub use pushdown::{FilterSplit, KeyConditions, PredicatePushdown};
