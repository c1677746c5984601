//! Directory listing strategies, selected by the table's input format.

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{HiveError, Result};
use crate::io::disk::{DirEntry, Disk};
use crate::io::file::{FileFormat, HiveFile};
use crate::io::hudi::HudiCowDirectoryLister;
use crate::partition::HivePartition;

pub const HUDI_PARQUET_INPUT_FORMAT: &str = "org.apache.hudi.hadoop.HoodieParquetInputFormat";
pub const PARQUET_INPUT_FORMAT: &str =
    "org.apache.hadoop.hive.ql.io.parquet.MapredParquetInputFormat";
pub const ORC_INPUT_FORMAT: &str = "org.apache.hadoop.hive.ql.io.orc.OrcInputFormat";

/// Input formats with a known listing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Hudi copy-on-write table (Parquet base files)
    HudiCopyOnWrite,
    Parquet,
    Orc,
}

impl InputFormat {
    /// Map a metastore input format class name.
    pub fn from_class_name(class_name: &str) -> Result<Self> {
        match class_name {
            HUDI_PARQUET_INPUT_FORMAT => Ok(Self::HudiCopyOnWrite),
            PARQUET_INPUT_FORMAT => Ok(Self::Parquet),
            ORC_INPUT_FORMAT => Ok(Self::Orc),
            other => Err(HiveError::unknown_format(other)),
        }
    }

    pub fn file_format(&self) -> FileFormat {
        match self {
            Self::HudiCopyOnWrite | Self::Parquet => FileFormat::Parquet,
            Self::Orc => FileFormat::Orc,
        }
    }
}

/// Lists the data files of one partition.
///
/// Listers are shared by enumeration workers; one `list` call must not
/// depend on state left behind by another.
pub trait DirectoryLister: Debug + Send + Sync {
    /// List the files of `partition`, in a stable order.
    fn list(&self, partition: &Arc<HivePartition>) -> Result<Vec<HiveFile>>;
}

/// Pick the listing strategy for a table's declared input format.
///
/// Fails with [`HiveError::UnknownFormat`] without touching the disk.
pub fn directory_lister(
    input_format: &str,
    table_location: &str,
    disk: Arc<dyn Disk>,
) -> Result<Arc<dyn DirectoryLister>> {
    let lister: Arc<dyn DirectoryLister> = match InputFormat::from_class_name(input_format)? {
        InputFormat::HudiCopyOnWrite => {
            Arc::new(HudiCowDirectoryLister::new(disk, table_location))
        }
        format => Arc::new(DiskDirectoryLister::new(disk, format.file_format())),
    };
    Ok(lister)
}

/// Hidden entries (`.staging`, `_SUCCESS`, ...) are never data files.
pub(crate) fn is_hidden(entry: &DirEntry) -> bool {
    entry.name().starts_with('.') || entry.name().starts_with('_')
}

/// Plain recursive directory walk for Parquet and ORC tables.
#[derive(Debug)]
pub struct DiskDirectoryLister {
    disk: Arc<dyn Disk>,
    format: FileFormat,
}

impl DiskDirectoryLister {
    pub fn new(disk: Arc<dyn Disk>, format: FileFormat) -> Self {
        Self { disk, format }
    }

    fn walk(
        &self,
        dir: &str,
        partition: &Arc<HivePartition>,
        files: &mut Vec<HiveFile>,
    ) -> Result<()> {
        for entry in self.disk.list(dir)? {
            if is_hidden(&entry) {
                continue;
            }
            if entry.is_dir {
                self.walk(&entry.path, partition, files)?;
            } else {
                files.push(HiveFile::new(
                    entry.path,
                    entry.size,
                    self.format,
                    Arc::clone(partition),
                ));
            }
        }
        Ok(())
    }
}

impl DirectoryLister for DiskDirectoryLister {
    fn list(&self, partition: &Arc<HivePartition>) -> Result<Vec<HiveFile>> {
        let mut files = Vec::new();
        self.walk(&partition.location, partition, &mut files)?;
        tracing::trace!(
            partition = %partition.partition_id,
            files = files.len(),
            "listed partition"
        );
        Ok(files)
    }
}
