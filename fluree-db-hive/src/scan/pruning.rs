//! Local partition pruning.
//!
//! The metastore filter may be weaker than the query (unexpressible
//! conjuncts are dropped), so retrieved partitions are checked again against
//! the partition key conditions. A partition is dropped only when the
//! conditions are provably false for its values.

use std::fmt::Debug;

use crate::scan::predicate::{Expression, LiteralValue};
use crate::schema::PartitionKey;

/// Decides whether a partition can be skipped.
pub trait PartitionPruner: Debug + Send + Sync {
    /// `values` are the typed partition values in key order.
    ///
    /// Must return `false` unless no row of the partition can match.
    fn can_be_pruned(&self, partition_id: &str, values: &[LiteralValue]) -> bool;
}

/// Default pruner: evaluates the partition key conditions against the
/// partition's values under three-valued logic.
#[derive(Debug, Clone)]
pub struct KeyConditionPruner {
    key: PartitionKey,
    conditions: Expression,
}

impl KeyConditionPruner {
    pub fn new(key: PartitionKey, conditions: Expression) -> Self {
        Self { key, conditions }
    }
}

impl PartitionPruner for KeyConditionPruner {
    fn can_be_pruned(&self, _partition_id: &str, values: &[LiteralValue]) -> bool {
        let lookup = |column: &str| {
            self.key
                .position(column)
                .and_then(|i| values.get(i))
                .cloned()
        };
        self.conditions.evaluate(&lookup) == Some(false)
    }
}
