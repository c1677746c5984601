//! Hudi copy-on-write listing.
//!
//! A copy-on-write table rewrites a whole base file on every update, so one
//! file group (`fileId`) accumulates several Parquet files:
//!
//! ```text
//! <partition>/<fileId>_<writeToken>_<instantTime>.parquet
//! ```
//!
//! The current snapshot is the latest committed base file per file group.
//! An instant is committed when the active timeline (`<table>/.hoodie`)
//! holds its `.commit` or `.replacecommit`, or when it predates the active
//! timeline and has since been archived. Files written by pending instants
//! are ignored, as are file groups dropped by a completed replacecommit.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::error::{HiveError, Result};
use crate::io::disk::Disk;
use crate::io::file::{FileFormat, HiveFile};
use crate::io::lister::{is_hidden, DirectoryLister};
use crate::partition::HivePartition;

const TIMELINE_DIR: &str = ".hoodie";
const COMMIT_ACTION: &str = "commit";
const REPLACE_COMMIT_ACTION: &str = "replacecommit";
const PENDING_STATES: &[&str] = &["inflight", "requested"];

/// Parsed base file name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BaseFileName<'a> {
    file_id: &'a str,
    instant: &'a str,
}

fn parse_base_file_name(name: &str) -> Option<BaseFileName<'_>> {
    let stem = name.strip_suffix(".parquet")?;
    // fileId may itself contain '_', so split from the right
    let mut parts = stem.rsplitn(3, '_');
    let instant = parts.next()?;
    let _write_token = parts.next()?;
    let file_id = parts.next()?;
    if file_id.is_empty() || !is_instant_time(instant) {
        return None;
    }
    Some(BaseFileName { file_id, instant })
}

fn is_instant_time(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_data_action(action: &str) -> bool {
    action == COMMIT_ACTION || action == REPLACE_COMMIT_ACTION
}

/// State of one timeline file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstantState {
    Completed,
    Pending,
}

/// Parse a timeline file name into `(instant, action, state)`.
///
/// `<i>.commit`, `<i>.replacecommit`, `<i>.inflight` (legacy commit inflight)
/// and `<i>.<action>.inflight|requested` are recognized.
fn parse_timeline_file(name: &str) -> Option<(&str, &str, InstantState)> {
    let mut parts = name.split('.');
    let instant = parts.next()?;
    if !is_instant_time(instant) {
        return None;
    }
    let parsed = match (parts.next()?, parts.next(), parts.next()) {
        ("inflight", None, None) => (instant, COMMIT_ACTION, InstantState::Pending),
        (action, None, None) => (instant, action, InstantState::Completed),
        (action, Some(state), None) if PENDING_STATES.contains(&state) => {
            (instant, action, InstantState::Pending)
        }
        _ => return None,
    };
    is_data_action(parsed.1).then_some(parsed)
}

/// Replace metadata written into a completed `.replacecommit`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplaceCommitMetadata {
    #[serde(default)]
    partition_to_replace_file_ids: HashMap<String, Vec<String>>,
}

/// Data instants of the active timeline.
#[derive(Debug, Default)]
struct Timeline {
    completed: BTreeSet<String>,
    pending: BTreeSet<String>,
    /// Replaced file groups keyed by partition path relative to the table.
    replaced: HashMap<String, HashSet<String>>,
}

impl Timeline {
    /// Earliest data instant still on the active timeline.
    fn start(&self) -> Option<&str> {
        let completed = self.completed.first();
        let pending = self.pending.first();
        match (completed, pending) {
            (Some(c), Some(p)) => Some(c.min(p).as_str()),
            (c, p) => c.or(p).map(String::as_str),
        }
    }

    fn is_committed(&self, instant: &str) -> bool {
        if self.completed.contains(instant) {
            return true;
        }
        // archived instants are older than anything still active
        !self.pending.contains(instant) && self.start().is_some_and(|start| instant < start)
    }

    /// Whether `file_id` was replaced in the partition at `relative_path`.
    ///
    /// `None` means the partition is outside the table root; any replacement
    /// of the file group then counts.
    fn is_replaced(&self, relative_path: Option<&str>, file_id: &str) -> bool {
        match relative_path {
            Some(path) => self
                .replaced
                .get(path)
                .is_some_and(|ids| ids.contains(file_id)),
            None => self.replaced.values().any(|ids| ids.contains(file_id)),
        }
    }
}

/// Lists the latest committed base file of every file group.
#[derive(Debug)]
pub struct HudiCowDirectoryLister {
    disk: Arc<dyn Disk>,
    table_location: String,
    timeline: Mutex<Option<Arc<Timeline>>>,
}

impl HudiCowDirectoryLister {
    pub fn new(disk: Arc<dyn Disk>, table_location: impl Into<String>) -> Self {
        Self {
            disk,
            table_location: table_location.into().trim_end_matches('/').to_string(),
            timeline: Mutex::new(None),
        }
    }

    /// The active timeline, loaded on first use.
    fn timeline(&self) -> Result<Arc<Timeline>> {
        let mut cached = self.timeline.lock();
        if let Some(timeline) = cached.as_ref() {
            return Ok(Arc::clone(timeline));
        }

        let dir = format!("{}/{}", self.table_location, TIMELINE_DIR);
        let entries = self.disk.list(&dir).map_err(|e| {
            HiveError::storage(format!("Hudi timeline unavailable at {}: {}", dir, e))
        })?;

        let mut timeline = Timeline::default();
        let mut pending = BTreeSet::new();
        let mut replace_commits = Vec::new();
        for entry in entries.iter().filter(|entry| !entry.is_dir) {
            let Some((instant, action, state)) = parse_timeline_file(entry.name()) else {
                continue;
            };
            match state {
                InstantState::Completed => {
                    timeline.completed.insert(instant.to_string());
                    if action == REPLACE_COMMIT_ACTION {
                        replace_commits.push(entry.path.as_str());
                    }
                }
                InstantState::Pending => {
                    pending.insert(instant.to_string());
                }
            }
        }
        // requested and inflight files stay behind once an instant completes
        pending.retain(|instant| !timeline.completed.contains(instant));
        timeline.pending = pending;

        for path in replace_commits {
            let metadata = self.read_replace_commit(path)?;
            for (partition_path, file_ids) in metadata.partition_to_replace_file_ids {
                timeline
                    .replaced
                    .entry(partition_path.trim_matches('/').to_string())
                    .or_default()
                    .extend(file_ids);
            }
        }

        tracing::debug!(
            table = %self.table_location,
            completed = timeline.completed.len(),
            pending = timeline.pending.len(),
            start = ?timeline.start(),
            replaced_partitions = timeline.replaced.len(),
            "loaded hudi timeline"
        );

        let timeline = Arc::new(timeline);
        *cached = Some(Arc::clone(&timeline));
        Ok(timeline)
    }

    fn read_replace_commit(&self, path: &str) -> Result<ReplaceCommitMetadata> {
        let bytes = self.disk.read(path)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ReplaceCommitMetadata::default());
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| HiveError::metadata(format!("Invalid replacecommit {}: {}", path, e)))
    }

    /// Partition path relative to the table root, as the timeline records it.
    fn relative_path<'a>(&self, location: &'a str) -> Option<&'a str> {
        let rest = location.strip_prefix(self.table_location.as_str())?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        Some(rest.trim_matches('/'))
    }
}

impl DirectoryLister for HudiCowDirectoryLister {
    fn list(&self, partition: &Arc<HivePartition>) -> Result<Vec<HiveFile>> {
        let timeline = self.timeline()?;
        let relative_path = self.relative_path(&partition.location);

        // fileId -> (instant, path, size); BTreeMap keeps file groups sorted
        let mut latest: BTreeMap<String, (String, String, u64)> = BTreeMap::new();
        for entry in self.disk.list(&partition.location)? {
            if entry.is_dir || is_hidden(&entry) {
                continue;
            }
            let Some(base) = parse_base_file_name(entry.name()) else {
                continue;
            };
            if !timeline.is_committed(base.instant)
                || timeline.is_replaced(relative_path, base.file_id)
            {
                continue;
            }
            let newer = latest
                .get(base.file_id)
                .map_or(true, |(instant, _, _)| base.instant > instant.as_str());
            if newer {
                latest.insert(
                    base.file_id.to_string(),
                    (base.instant.to_string(), entry.path.clone(), entry.size),
                );
            }
        }

        Ok(latest
            .into_values()
            .map(|(_, path, size)| {
                HiveFile::new(path, size, FileFormat::Parquet, Arc::clone(partition))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StorageDescriptor;
    use crate::io::disk::MemoryDisk;

    fn partition(location: &str) -> Arc<HivePartition> {
        Arc::new(HivePartition::for_table(&StorageDescriptor {
            location: location.to_string(),
            ..Default::default()
        }))
    }

    #[test]
    fn test_parse_base_file_name() {
        let base = parse_base_file_name("a1b2-c3_0-10-20_20240101120000.parquet").unwrap();
        assert_eq!(base.file_id, "a1b2-c3");
        assert_eq!(base.instant, "20240101120000");

        let base = parse_base_file_name("group_with_underscores_1-0-1_001.parquet").unwrap();
        assert_eq!(base.file_id, "group_with_underscores");

        assert!(parse_base_file_name("000000_0").is_none());
        assert!(parse_base_file_name("a_b.parquet").is_none());
        assert!(parse_base_file_name("g1_1-0-1_notatime.parquet").is_none());
    }

    #[test]
    fn test_latest_committed_base_file_per_group() {
        let mut disk = MemoryDisk::new();
        disk.add_file("/t/.hoodie/001.commit", 1);
        disk.add_file("/t/.hoodie/002.replacecommit", 1);
        disk.add_file("/t/.hoodie/003.inflight", 1);
        disk.add_file("/t/.hoodie/hoodie.properties", 1);

        disk.add_file("/t/dt=1/g1_1-0-1_001.parquet", 10);
        disk.add_file("/t/dt=1/g1_1-0-1_002.parquet", 11);
        disk.add_file("/t/dt=1/g1_1-0-1_003.parquet", 12);
        disk.add_file("/t/dt=1/g2_1-0-1_001.parquet", 20);
        disk.add_file("/t/dt=1/.hoodie_partition_metadata", 1);

        let lister = HudiCowDirectoryLister::new(Arc::new(disk), "/t/");
        let files = lister.list(&partition("/t/dt=1")).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.file_path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/t/dt=1/g1_1-0-1_002.parquet", "/t/dt=1/g2_1-0-1_001.parquet"]
        );
        assert_eq!(files[0].size, 11);
        assert!(files.iter().all(|f| f.format == FileFormat::Parquet));
    }

    #[test]
    fn test_timeline_loaded_once() {
        let mut disk = MemoryDisk::new();
        disk.add_file("/t/.hoodie/001.commit", 1);
        disk.add_file("/t/a/g1_1-0-1_001.parquet", 10);
        disk.add_file("/t/b/g2_1-0-1_001.parquet", 10);
        let disk = Arc::new(disk);

        let lister = HudiCowDirectoryLister::new(disk.clone(), "/t");
        assert_eq!(lister.list(&partition("/t/a")).unwrap().len(), 1);
        assert_eq!(lister.list(&partition("/t/b")).unwrap().len(), 1);
        // one timeline listing plus one per partition
        assert_eq!(disk.list_calls(), 3);
    }

    #[test]
    fn test_parse_timeline_file() {
        use super::InstantState::*;
        assert_eq!(parse_timeline_file("001.commit"), Some(("001", "commit", Completed)));
        assert_eq!(
            parse_timeline_file("002.replacecommit"),
            Some(("002", "replacecommit", Completed))
        );
        assert_eq!(parse_timeline_file("003.inflight"), Some(("003", "commit", Pending)));
        assert_eq!(
            parse_timeline_file("004.commit.requested"),
            Some(("004", "commit", Pending))
        );
        assert_eq!(
            parse_timeline_file("005.replacecommit.inflight"),
            Some(("005", "replacecommit", Pending))
        );
        assert_eq!(parse_timeline_file("006.clean"), None);
        assert_eq!(parse_timeline_file("007.rollback.inflight"), None);
        assert_eq!(parse_timeline_file("hoodie.properties"), None);
    }

    #[test]
    fn test_archived_commits_stay_visible() {
        let mut disk = MemoryDisk::new();
        // 001 was archived; 031 is the oldest instant on the active timeline
        disk.add_dir("/t/.hoodie/archived");
        disk.add_file("/t/.hoodie/031.commit", 1);
        disk.add_file("/t/.hoodie/032.commit.requested", 1);
        disk.add_file("/t/.hoodie/032.inflight", 1);

        disk.add_file("/t/dt=1/g1_1-0-1_001.parquet", 10);
        disk.add_file("/t/dt=1/g2_1-0-1_031.parquet", 20);
        disk.add_file("/t/dt=1/g2_1-0-1_032.parquet", 21);
        disk.add_file("/t/dt=1/g3_1-0-1_032.parquet", 30);

        let lister = HudiCowDirectoryLister::new(Arc::new(disk), "/t");
        let files = lister.list(&partition("/t/dt=1")).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.file_path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/t/dt=1/g1_1-0-1_001.parquet", "/t/dt=1/g2_1-0-1_031.parquet"]
        );
    }

    #[test]
    fn test_pending_instant_before_timeline_start_is_excluded() {
        let mut disk = MemoryDisk::new();
        disk.add_file("/t/.hoodie/002.inflight", 1);
        disk.add_file("/t/.hoodie/003.commit", 1);
        disk.add_file("/t/dt=1/g1_1-0-1_001.parquet", 10);
        disk.add_file("/t/dt=1/g1_1-0-1_002.parquet", 11);

        let lister = HudiCowDirectoryLister::new(Arc::new(disk), "/t");
        let files = lister.list(&partition("/t/dt=1")).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_path, "/t/dt=1/g1_1-0-1_001.parquet");
    }

    #[test]
    fn test_empty_timeline_lists_nothing() {
        let mut disk = MemoryDisk::new();
        disk.add_file("/t/.hoodie/hoodie.properties", 1);
        disk.add_file("/t/dt=1/g1_1-0-1_001.parquet", 10);

        let lister = HudiCowDirectoryLister::new(Arc::new(disk), "/t");
        assert!(lister.list(&partition("/t/dt=1")).unwrap().is_empty());
    }

    #[test]
    fn test_replaced_file_groups_are_excluded() {
        let mut disk = MemoryDisk::new();
        disk.add_file("/t/.hoodie/001.commit", 1);
        disk.add_file_with_contents(
            "/t/.hoodie/002.replacecommit",
            r#"{"partitionToReplaceFileIds": {"dt=1": ["g1", "g2"]}, "operationType": "CLUSTER"}"#,
        );
        disk.add_file("/t/dt=1/g1_1-0-1_001.parquet", 10);
        disk.add_file("/t/dt=1/g2_1-0-1_001.parquet", 20);
        disk.add_file("/t/dt=1/g3_1-0-1_002.parquet", 30);
        // same file group name in another partition is untouched
        disk.add_file("/t/dt=2/g1_1-0-1_001.parquet", 40);

        let lister = HudiCowDirectoryLister::new(Arc::new(disk), "/t");
        let files = lister.list(&partition("/t/dt=1")).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.file_path.as_str()).collect();
        assert_eq!(paths, vec!["/t/dt=1/g3_1-0-1_002.parquet"]);

        let files = lister.list(&partition("/t/dt=2/")).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_pending_replacecommit_is_not_applied() {
        let mut disk = MemoryDisk::new();
        disk.add_file("/t/.hoodie/001.commit", 1);
        disk.add_file_with_contents(
            "/t/.hoodie/002.replacecommit.requested",
            r#"{"partitionToReplaceFileIds": {"dt=1": ["g1"]}}"#,
        );
        disk.add_file("/t/dt=1/g1_1-0-1_001.parquet", 10);

        let lister = HudiCowDirectoryLister::new(Arc::new(disk), "/t");
        assert_eq!(lister.list(&partition("/t/dt=1")).unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_replacecommit_is_metadata_error() {
        let mut disk = MemoryDisk::new();
        disk.add_file_with_contents("/t/.hoodie/001.replacecommit", "{not json");
        disk.add_file("/t/dt=1/g1_1-0-1_001.parquet", 10);

        let lister = HudiCowDirectoryLister::new(Arc::new(disk), "/t");
        let err = lister.list(&partition("/t/dt=1")).unwrap_err();
        assert!(matches!(err, HiveError::Metadata(_)));
    }

    #[test]
    fn test_missing_timeline_is_an_error() {
        let mut disk = MemoryDisk::new();
        disk.add_file("/t/dt=1/g1_1-0-1_001.parquet", 10);
        let lister = HudiCowDirectoryLister::new(Arc::new(disk), "/t");
        let err = lister.list(&partition("/t/dt=1")).unwrap_err();
        assert!(err.to_string().contains(".hoodie"));
    }
}
