//! Table configuration and per-query scan settings.
//!
//! [`HiveTableConfig`] is fixed when a table is opened. [`ScanSettings`] is
//! passed explicitly to every [`crate::HiveTable::prepare_read`] call so
//! concurrent queries can use different knobs.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config_value::ConfigValue;
use crate::error::{HiveError, Result};

/// Fallback worker count when the available parallelism is unknown.
const DEFAULT_MAX_THREADS: usize = 8;

fn default_max_threads() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(DEFAULT_MAX_THREADS)
}

/// How residual where conjuncts are promoted to prewhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MoveToPrewhereMethod {
    /// Promote the whole where filter.
    All,
    /// Cost-based selection from compressed column sizes.
    #[default]
    ColumnSize,
    Never,
}

impl FromStr for MoveToPrewhereMethod {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ALL" => Ok(Self::All),
            "COLUMN_SIZE" => Ok(Self::ColumnSize),
            "NEVER" => Ok(Self::Never),
            _ => Err(HiveError::config(format!(
                "Unsupported move to prewhere method: {}",
                s
            ))),
        }
    }
}

impl TryFrom<String> for MoveToPrewhereMethod {
    type Error = HiveError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MoveToPrewhereMethod> for String {
    fn from(method: MoveToPrewhereMethod) -> Self {
        method.to_string()
    }
}

impl std::fmt::Display for MoveToPrewhereMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "ALL"),
            Self::ColumnSize => write!(f, "COLUMN_SIZE"),
            Self::Never => write!(f, "NEVER"),
        }
    }
}

/// Per-query settings for scan resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Split partition-only conjuncts into the partition filter.
    pub push_partition_filter: bool,
    /// Send a filter string to the metastore partition API.
    pub use_metastore_filter: bool,
    /// Prune retrieved partitions locally.
    pub use_partition_filter: bool,
    /// Maximum partitions a scan may read (0 = unlimited).
    pub max_partitions_to_read: u64,
    /// Prune files of bucketed tables by cluster-key equalities.
    pub use_cluster_key_filter: bool,
    /// Promote where conjuncts to prewhere.
    pub optimize_move_to_prewhere: bool,
    pub move_to_prewhere_method: MoveToPrewhereMethod,
    /// Upper bound for listing workers.
    pub max_threads: usize,
    /// Ask the metastore to merge per-partition statistics.
    pub merge_partition_stats: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            push_partition_filter: true,
            use_metastore_filter: true,
            use_partition_filter: true,
            max_partitions_to_read: 0,
            use_cluster_key_filter: true,
            optimize_move_to_prewhere: true,
            move_to_prewhere_method: MoveToPrewhereMethod::ColumnSize,
            max_threads: default_max_threads(),
            merge_partition_stats: false,
        }
    }
}

impl ScanSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from JSON; absent keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_push_partition_filter(mut self, enabled: bool) -> Self {
        self.push_partition_filter = enabled;
        self
    }

    pub fn with_metastore_filter(mut self, enabled: bool) -> Self {
        self.use_metastore_filter = enabled;
        self
    }

    pub fn with_partition_filter(mut self, enabled: bool) -> Self {
        self.use_partition_filter = enabled;
        self
    }

    pub fn with_max_partitions_to_read(mut self, limit: u64) -> Self {
        self.max_partitions_to_read = limit;
        self
    }

    pub fn with_cluster_key_filter(mut self, enabled: bool) -> Self {
        self.use_cluster_key_filter = enabled;
        self
    }

    pub fn with_move_to_prewhere(mut self, enabled: bool, method: MoveToPrewhereMethod) -> Self {
        self.optimize_move_to_prewhere = enabled;
        self.move_to_prewhere_method = method;
        self
    }

    pub fn with_max_threads(mut self, threads: usize) -> Self {
        self.max_threads = threads;
        self
    }

    pub fn with_merge_partition_stats(mut self, enabled: bool) -> Self {
        self.merge_partition_stats = enabled;
        self
    }
}

/// Which virtual warehouse a caller needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualWarehouseType {
    Default,
    Write,
}

/// Table-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveTableSettings {
    pub vw_default: String,
    /// Deprecated read warehouse; wins over `vw_default` when set.
    pub vw_read: Option<String>,
    pub vw_write: String,
}

impl HiveTableSettings {
    pub fn virtual_warehouse_name(&self, vw_type: VirtualWarehouseType) -> &str {
        match vw_type {
            VirtualWarehouseType::Default => self
                .vw_read
                .as_deref()
                .filter(|name| !name.is_empty())
                .unwrap_or(&self.vw_default),
            VirtualWarehouseType::Write => &self.vw_write,
        }
    }
}

/// Explicit bucketing declared on the table, overriding the metastore's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterByConfig {
    pub columns: Vec<String>,
    pub buckets: u32,
}

/// Configuration for opening a [`crate::HiveTable`].
///
/// # Example (JSON)
///
/// ```json
/// {
///   "metastore_url": {"env_var": "HIVE_METASTORE_URL", "default_val": "thrift://localhost:9083"},
///   "database": "sales",
///   "table": "orders",
///   "cluster_by": {"columns": ["customer_id"], "buckets": 16}
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiveTableConfig {
    pub metastore_url: ConfigValue,
    pub database: String,
    pub table: String,
    /// Partition columns expected by the caller; checked against the metastore.
    #[serde(default)]
    pub partition_by: Option<Vec<String>>,
    #[serde(default)]
    pub cluster_by: Option<ClusterByConfig>,
    #[serde(default)]
    pub settings: HiveTableSettings,
}

impl HiveTableConfig {
    pub fn new(
        metastore_url: impl Into<ConfigValue>,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            metastore_url: metastore_url.into(),
            database: database.into(),
            table: table.into(),
            partition_by: None,
            cluster_by: None,
            settings: HiveTableSettings::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_partition_by(mut self, columns: Vec<String>) -> Self {
        self.partition_by = Some(columns);
        self
    }

    pub fn with_cluster_by(mut self, columns: Vec<String>, buckets: u32) -> Self {
        self.cluster_by = Some(ClusterByConfig { columns, buckets });
        self
    }

    pub fn with_settings(mut self, settings: HiveTableSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.is_empty() || self.table.is_empty() {
            return Err(HiveError::config("database and table must not be empty"));
        }
        if let Some(cluster_by) = &self.cluster_by {
            if cluster_by.columns.is_empty() || cluster_by.buckets == 0 {
                return Err(HiveError::config(
                    "cluster_by needs at least one column and a positive bucket count",
                ));
            }
        }
        Ok(())
    }
}
