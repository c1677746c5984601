//! Directory listing and data file types.
//!
//! [`Disk`] is the raw listing backend; a [`DirectoryLister`] turns a
//! partition directory into [`HiveFile`]s following the table's input format.

pub mod disk;
pub mod file;
pub mod hudi;
pub mod lister;

pub use disk::{DirEntry, Disk, LocalDisk, MemoryDisk};
pub use file::{FileFormat, HiveFile, SerializedHiveFile, SerializedHiveFiles};
pub use hudi::HudiCowDirectoryLister;
pub use lister::{
    directory_lister, DirectoryLister, DiskDirectoryLister, InputFormat, HUDI_PARQUET_INPUT_FORMAT,
    ORC_INPUT_FORMAT, PARQUET_INPUT_FORMAT,
};
