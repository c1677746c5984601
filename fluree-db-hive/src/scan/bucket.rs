//! Bucket resolution and bucket-based file pruning.
//!
//! Bucketed (clustered) tables hash the cluster-by columns of every row into
//! one of N buckets, and writers name each file after its bucket. When the
//! query pins every cluster-by column to a literal, only files of the one
//! matching bucket can hold rows.
//!
//! The file name convention is not enforced by the metastore, so the bucket
//! of a file is a heuristic: a file whose name yields no bucket number is
//! always kept.

use std::fmt::Debug;

use crate::io::file::HiveFile;
use crate::scan::predicate::{ComparisonOp, Expression, LiteralValue};
use crate::schema::HiveType;

/// Extract the bucket number encoded in a data file path.
///
/// Two naming conventions are tried, first match wins:
/// 1. digits right after the last `_`, e.g. `part-00000-<uuid>_00003.c000`
/// 2. digits starting the file name, e.g. `/000003_0_<uuid>_<date>_<time>`
///
/// Returns `None` when neither applies or the digits overflow.
pub fn extract_bucket_hint(path: &str) -> Option<u64> {
    let after_last = |sep: char| path.rfind(sep).map_or(0, |i| i + sep.len_utf8());
    leading_number(&path[after_last('_')..])
        .or_else(|| leading_number(&path[after_last('/')..]))
}

fn leading_number(s: &str) -> Option<u64> {
    let end = s.bytes().position(|b| !b.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    s[..end].parse().ok()
}

/// The table's clustering expression, evaluated on one bound row.
pub trait ClusterByExpression: Debug + Send + Sync {
    /// Cluster-by columns, in row order.
    fn columns(&self) -> &[String];

    /// Bucket of a row holding one value per column; `None` when the values
    /// do not fit the column types.
    fn evaluate(&self, row: &[LiteralValue]) -> Option<u64>;
}

/// Hive's bucketing function: `(hash(c1, .., cn) & i32::MAX) % buckets`,
/// with Java hash codes per column combined as `31 * h + hash(c)`.
#[derive(Debug, Clone, PartialEq)]
pub struct HiveBucketHash {
    columns: Vec<String>,
    types: Vec<HiveType>,
    bucket_count: u32,
}

impl HiveBucketHash {
    pub fn new(columns: Vec<(String, HiveType)>, bucket_count: u32) -> Self {
        let (columns, types) = columns.into_iter().unzip();
        Self {
            columns,
            types,
            bucket_count,
        }
    }

    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    /// Java hash code of `value` stored as `ty`; NULL hashes to 0.
    fn hash_value(ty: HiveType, value: &LiteralValue) -> Option<i32> {
        if value.is_null() {
            return Some(0);
        }
        let hash = match (ty, value) {
            (HiveType::Boolean, LiteralValue::Boolean(b)) => i32::from(*b),
            (HiveType::TinyInt, LiteralValue::Int64(v)) => i32::from(i8::try_from(*v).ok()?),
            (HiveType::SmallInt, LiteralValue::Int64(v)) => i32::from(i16::try_from(*v).ok()?),
            (HiveType::Int, LiteralValue::Int64(v)) => i32::try_from(*v).ok()?,
            (HiveType::BigInt, LiteralValue::Int64(v)) => fold_long(*v),
            (HiveType::Float, LiteralValue::Float64(v)) => (*v as f32).to_bits() as i32,
            (HiveType::Float, LiteralValue::Int64(v)) => (*v as f32).to_bits() as i32,
            (HiveType::Double, LiteralValue::Float64(v)) => fold_long(v.to_bits() as i64),
            (HiveType::Double, LiteralValue::Int64(v)) => fold_long((*v as f64).to_bits() as i64),
            (HiveType::String, LiteralValue::String(s)) => java_string_hash(s),
            (HiveType::Date, LiteralValue::Date(days)) => *days,
            _ => return None,
        };
        Some(hash)
    }
}

/// `Long.hashCode`: `(int)(v ^ (v >>> 32))`.
fn fold_long(v: i64) -> i32 {
    (v ^ ((v as u64) >> 32) as i64) as i32
}

/// `31 * h + b` over the UTF-8 bytes, read as signed.
pub fn java_string_hash(s: &str) -> i32 {
    s.bytes()
        .fold(0i32, |h, b| h.wrapping_mul(31).wrapping_add(i32::from(b as i8)))
}

impl ClusterByExpression for HiveBucketHash {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn evaluate(&self, row: &[LiteralValue]) -> Option<u64> {
        if self.bucket_count == 0 || row.len() != self.types.len() {
            return None;
        }
        let mut hash = 0i32;
        for (ty, value) in self.types.iter().zip(row) {
            hash = hash
                .wrapping_mul(31)
                .wrapping_add(Self::hash_value(*ty, value)?);
        }
        Some(((hash & i32::MAX) as u32 % self.bucket_count) as u64)
    }
}

/// Resolve the single bucket the cluster-key conditions pin rows to.
///
/// Conjunctions are walked recursively; `column = literal` binds the first
/// literal seen for a cluster column. Any other shape (OR, ranges, IN lists)
/// binds nothing. Returns `None` unless every cluster column is bound.
pub fn resolve_required_bucket(
    cluster_by: &dyn ClusterByExpression,
    conditions: &Expression,
) -> Option<u64> {
    let columns = cluster_by.columns();
    if columns.is_empty() {
        return None;
    }
    let mut row: Vec<Option<LiteralValue>> = vec![None; columns.len()];
    bind_equalities(conditions, columns, &mut row);

    let row: Vec<LiteralValue> = row.into_iter().collect::<Option<_>>()?;
    let bucket = cluster_by.evaluate(&row);
    tracing::debug!(conditions = %conditions, bucket = ?bucket, "resolved required bucket");
    bucket
}

fn bind_equalities(expr: &Expression, columns: &[String], row: &mut [Option<LiteralValue>]) {
    match expr {
        Expression::And(children) => {
            for child in children {
                bind_equalities(child, columns, row);
            }
        }
        Expression::Comparison {
            column,
            op: ComparisonOp::Eq,
            value,
        } if !value.is_null() => {
            if let Some(slot) = columns
                .iter()
                .position(|c| c == column)
                .and_then(|i| row.get_mut(i))
            {
                slot.get_or_insert_with(|| value.clone());
            }
        }
        _ => {}
    }
}

/// Drop files whose name places them in a bucket other than `required`.
///
/// No-op when `required` is `None`; files without a bucket hint are kept.
pub fn prune_by_bucket(files: Vec<HiveFile>, required: Option<u64>) -> Vec<HiveFile> {
    let Some(required) = required else {
        return files;
    };
    files
        .into_iter()
        .filter(|file| extract_bucket_hint(&file.file_path).map_or(true, |hint| hint == required))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StorageDescriptor;
    use crate::io::file::FileFormat;
    use crate::partition::HivePartition;
    use std::sync::Arc;

    fn int_key(buckets: u32) -> HiveBucketHash {
        HiveBucketHash::new(vec![("k".to_string(), HiveType::Int)], buckets)
    }

    #[test]
    fn test_extract_bucket_hint() {
        assert_eq!(extract_bucket_hint("part-00000-uuid_00003.c000"), Some(3));
        assert_eq!(
            extract_bucket_hint("/a/b/000003_0_uuid_20240229_033029_00033_erdcf"),
            Some(3)
        );
        assert_eq!(extract_bucket_hint("no_numbers_here.ext"), None);
        assert_eq!(extract_bucket_hint("/warehouse/t/000012_0"), Some(0));
        assert_eq!(extract_bucket_hint("/warehouse/t/000012"), Some(12));
        assert_eq!(extract_bucket_hint("7"), Some(7));
        assert_eq!(extract_bucket_hint(""), None);
        assert_eq!(extract_bucket_hint("/t/x_99999999999999999999999"), None);
    }

    #[test]
    fn test_java_hash_values() {
        assert_eq!(java_string_hash("abc"), 96354);
        assert_eq!(java_string_hash(""), 0);
        assert_eq!(fold_long(1), 1);
        assert_eq!(fold_long(-1), 0);
        assert_eq!(fold_long(1 << 32), 1);
    }

    #[test]
    fn test_bucket_hash() {
        let key = int_key(4);
        assert_eq!(key.evaluate(&[LiteralValue::Int64(5)]), Some(1));
        assert_eq!(key.evaluate(&[LiteralValue::Int64(-1)]), Some(3));
        assert_eq!(key.evaluate(&[LiteralValue::from("5")]), None);
        assert_eq!(key.evaluate(&[]), None);

        let two = HiveBucketHash::new(
            vec![
                ("a".to_string(), HiveType::Int),
                ("b".to_string(), HiveType::String),
            ],
            8,
        );
        // 31 * 1 + 96354 = 96385; 96385 % 8 = 1
        assert_eq!(
            two.evaluate(&[LiteralValue::Int64(1), LiteralValue::from("abc")]),
            Some(1)
        );
    }

    #[test]
    fn test_resolve_from_conjunction() {
        let key = int_key(4);
        let conditions = Expression::and(vec![
            Expression::eq("k", 5i64),
            Expression::gt("other_col", 1i64),
        ]);
        assert_eq!(
            resolve_required_bucket(&key, &conditions),
            key.evaluate(&[LiteralValue::Int64(5)])
        );
        assert_eq!(resolve_required_bucket(&key, &conditions), Some(1));
    }

    #[test]
    fn test_unresolvable_shapes() {
        let key = int_key(4);
        let or = Expression::or(vec![Expression::eq("k", 5i64), Expression::eq("k", 6i64)]);
        assert_eq!(resolve_required_bucket(&key, &or), None);

        let in_list = Expression::in_list("k", vec![5i64.into()]);
        assert_eq!(resolve_required_bucket(&key, &in_list), None);

        assert_eq!(resolve_required_bucket(&key, &Expression::gt("k", 5i64)), None);
        assert_eq!(resolve_required_bucket(&key, &Expression::eq("other", 5i64)), None);
    }

    #[test]
    fn test_first_binding_wins() {
        let key = int_key(4);
        let conditions =
            Expression::and(vec![Expression::eq("k", 5i64), Expression::eq("k", 6i64)]);
        assert_eq!(resolve_required_bucket(&key, &conditions), Some(1));
    }

    #[test]
    fn test_partial_binding_is_unresolved() {
        let key = HiveBucketHash::new(
            vec![
                ("a".to_string(), HiveType::Int),
                ("b".to_string(), HiveType::Int),
            ],
            4,
        );
        assert_eq!(resolve_required_bucket(&key, &Expression::eq("a", 1i64)), None);
    }

    #[test]
    fn test_prune_by_bucket() {
        let partition = Arc::new(HivePartition::for_table(&StorageDescriptor::default()));
        let file = |path: &str| HiveFile::new(path, 1, FileFormat::Orc, Arc::clone(&partition));
        let files = vec![
            file("/t/000003_0_x_y"),
            file("/t/000001_0_x_y"),
            file("/t/data.orc"),
            file("/t/part-0_00003.c000"),
        ];

        assert_eq!(prune_by_bucket(files.clone(), None).len(), 4);

        let kept: Vec<String> = prune_by_bucket(files, Some(3))
            .into_iter()
            .map(|f| f.file_path)
            .collect();
        assert_eq!(kept, vec!["/t/000003_0_x_y", "/t/data.orc", "/t/part-0_00003.c000"]);
    }
}
