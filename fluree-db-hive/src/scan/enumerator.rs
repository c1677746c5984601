//! Concurrent directory enumeration.
//!
//! Partitions are listed by a bounded pool of scoped worker threads that
//! pull work from a shared cursor. Results are appended to one accumulator;
//! the lock is held only for the append. The first listing failure aborts
//! the whole enumeration and no partial result is returned.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::error::{HiveError, Result};
use crate::io::file::HiveFile;
use crate::io::lister::DirectoryLister;
use crate::partition::HivePartition;

/// List the files of every partition.
///
/// Runs on the calling thread when there is one partition or
/// `concurrency <= 1`; otherwise uses `min(concurrency, partitions)` workers.
/// File order within a partition follows the lister; partition order across
/// workers is unspecified.
pub fn list_files(
    lister: &dyn DirectoryLister,
    partitions: &[Arc<HivePartition>],
    concurrency: usize,
) -> Result<Vec<HiveFile>> {
    let start = Instant::now();
    let files = if concurrency <= 1 || partitions.len() <= 1 {
        list_sequential(lister, partitions)?
    } else {
        list_concurrent(lister, partitions, concurrency.min(partitions.len()))?
    };

    tracing::debug!(
        partitions = partitions.len(),
        files = files.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "listed partition directories"
    );
    Ok(files)
}

fn list_partition(
    lister: &dyn DirectoryLister,
    partition: &Arc<HivePartition>,
) -> Result<Vec<HiveFile>> {
    lister
        .list(partition)
        .map_err(|e| HiveError::listing(&partition.partition_id, e))
}

fn list_sequential(
    lister: &dyn DirectoryLister,
    partitions: &[Arc<HivePartition>],
) -> Result<Vec<HiveFile>> {
    let mut files = Vec::new();
    for partition in partitions {
        files.extend(list_partition(lister, partition)?);
    }
    Ok(files)
}

fn list_concurrent(
    lister: &dyn DirectoryLister,
    partitions: &[Arc<HivePartition>],
    workers: usize,
) -> Result<Vec<HiveFile>> {
    let next = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let files: Mutex<Vec<HiveFile>> = Mutex::new(Vec::new());

    let _span =
        tracing::debug_span!("list_files", workers, partitions = partitions.len()).entered();

    std::thread::scope(|s| {
        let (next, failed, files) = (&next, &failed, &files);
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                s.spawn(move || -> Result<()> {
                    while !failed.load(Ordering::Relaxed) {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(partition) = partitions.get(i) else {
                            break;
                        };
                        match list_partition(lister, partition) {
                            Ok(listed) => files.lock().extend(listed),
                            Err(e) => {
                                failed.store(true, Ordering::Relaxed);
                                return Err(e);
                            }
                        }
                    }
                    Ok(())
                })
            })
            .collect();

        let mut first_error = None;
        for handle in handles {
            let outcome = handle.join().unwrap_or_else(|_| {
                Err(HiveError::listing("<worker>", "listing thread panicked"))
            });
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    })?;

    Ok(files.into_inner())
}
