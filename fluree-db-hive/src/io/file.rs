//! Data files discovered under partitions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::io::disk::file_name;
use crate::partition::HivePartition;

/// File format for data files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileFormat {
    Parquet,
    Orc,
}

impl FileFormat {
    /// Columnar formats can evaluate a prewhere predicate before reading
    /// the remaining columns.
    pub fn supports_prewhere(&self) -> bool {
        matches!(self, Self::Parquet | Self::Orc)
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parquet => write!(f, "PARQUET"),
            Self::Orc => write!(f, "ORC"),
        }
    }
}

/// One physical data file of a partition.
#[derive(Debug, Clone, PartialEq)]
pub struct HiveFile {
    pub file_path: String,
    pub size: u64,
    pub format: FileFormat,
    /// Owning partition, shared read-only
    pub partition: Arc<HivePartition>,
}

impl HiveFile {
    pub fn new(
        file_path: impl Into<String>,
        size: u64,
        format: FileFormat,
        partition: Arc<HivePartition>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            size,
            format,
            partition,
        }
    }

    /// File name without directories (the `_file` virtual column).
    pub fn file_name(&self) -> &str {
        file_name(&self.file_path)
    }
}

/// Serialized form of a file set, shipped to workers alongside the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedHiveFiles {
    /// Location of the first file's partition
    pub sd_url: Option<String>,
    pub files: Vec<SerializedHiveFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedHiveFile {
    pub file_path: String,
    pub size: u64,
    pub format: FileFormat,
    pub partition_id: String,
}

impl SerializedHiveFiles {
    pub fn from_files(files: &[HiveFile]) -> Self {
        Self {
            sd_url: files.first().map(|f| f.partition.location.clone()),
            files: files
                .iter()
                .map(|f| SerializedHiveFile {
                    file_path: f.file_path.clone(),
                    size: f.size,
                    format: f.format,
                    partition_id: f.partition.partition_id.clone(),
                })
                .collect(),
        }
    }
}
