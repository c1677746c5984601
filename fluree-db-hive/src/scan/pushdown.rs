//! Predicate pushdown: splitting a query filter into the partition filter,
//! the prewhere filter and the residual where filter.
//!
//! The split is conjunct-wise. Every conjunct of the input lands in exactly
//! one of the three sets, so their conjunction is the input filter (plus any
//! prewhere the caller supplied explicitly).

use std::collections::{BTreeSet, HashMap};

use crate::config::{MoveToPrewhereMethod, ScanSettings};
use crate::scan::predicate::{ComparisonOp, Expression};

/// Share of the queried columns' total size that prewhere may read.
const PREWHERE_SIZE_RATIO: f64 = 0.1;

/// Result of [`PredicatePushdown::split_filter`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSplit {
    /// Conjuncts over partition columns only, evaluated by partition pruning
    pub partition_filter: Option<Expression>,
    /// Conjuncts evaluated first while reading files
    pub prewhere: Option<Expression>,
    /// Everything else
    pub where_filter: Option<Expression>,
}

impl FilterSplit {
    /// All conjuncts of the three sets.
    pub fn conjuncts(&self) -> Vec<&Expression> {
        [&self.partition_filter, &self.prewhere, &self.where_filter]
            .into_iter()
            .flatten()
            .flat_map(|expr| match expr {
                Expression::And(children) => children.iter().collect::<Vec<_>>(),
                other => vec![other],
            })
            .collect()
    }

    /// Conjunction of the three sets; `None` when all are empty.
    pub fn combined(&self) -> Option<Expression> {
        Expression::combine_conjuncts(self.conjuncts().into_iter().cloned().collect())
    }
}

/// Conditions on the partition key and on the cluster-by key, gathered
/// from every set of a [`FilterSplit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyConditions {
    pub partition: Option<Expression>,
    pub cluster: Option<Expression>,
}

impl KeyConditions {
    pub fn collect(
        split: &FilterSplit,
        is_partition_column: impl Fn(&str) -> bool,
        is_cluster_column: impl Fn(&str) -> bool,
    ) -> Self {
        let conjuncts = split.conjuncts();
        let only = |pred: &dyn Fn(&str) -> bool| {
            Expression::combine_conjuncts(
                conjuncts
                    .iter()
                    .filter(|c| c.references_only(pred))
                    .map(|c| (*c).clone())
                    .collect(),
            )
        };
        Self {
            partition: only(&is_partition_column),
            cluster: only(&is_cluster_column),
        }
    }
}

/// Splits query filters for one table scan.
#[derive(Debug, Clone)]
pub struct PredicatePushdown<'a> {
    settings: &'a ScanSettings,
    partition_columns: BTreeSet<String>,
    queried_columns: Vec<String>,
    column_sizes: Option<HashMap<String, u64>>,
    supports_prewhere: bool,
}

impl<'a> PredicatePushdown<'a> {
    pub fn new(settings: &'a ScanSettings) -> Self {
        Self {
            settings,
            partition_columns: BTreeSet::new(),
            queried_columns: Vec::new(),
            column_sizes: None,
            supports_prewhere: true,
        }
    }

    pub fn with_partition_columns(mut self, columns: impl IntoIterator<Item = String>) -> Self {
        self.partition_columns = columns.into_iter().collect();
        self
    }

    /// Columns the query reads.
    pub fn with_queried_columns(mut self, columns: Vec<String>) -> Self {
        self.queried_columns = columns;
        self
    }

    /// Compressed column sizes for [`MoveToPrewhereMethod::ColumnSize`].
    pub fn with_column_sizes(mut self, sizes: Option<HashMap<String, u64>>) -> Self {
        self.column_sizes = sizes;
        self
    }

    /// Whether the table's file format can evaluate prewhere.
    pub fn with_prewhere_support(mut self, supported: bool) -> Self {
        self.supports_prewhere = supported;
        self
    }

    fn is_partition_column(&self, column: &str) -> bool {
        self.partition_columns.contains(column)
    }

    /// Split `filter` into partition, prewhere and where sets.
    ///
    /// `explicit_prewhere` is kept as the prewhere and disables promotion.
    pub fn split_filter(
        &self,
        filter: Option<Expression>,
        explicit_prewhere: Option<Expression>,
    ) -> FilterSplit {
        let conjuncts = filter.map(Expression::into_conjuncts).unwrap_or_default();

        let (partition, residual): (Vec<_>, Vec<_>) = if self.settings.push_partition_filter {
            conjuncts
                .into_iter()
                .partition(|c| c.references_only(|col| self.is_partition_column(col)))
        } else {
            (Vec::new(), conjuncts)
        };

        let mut prewhere = explicit_prewhere
            .map(Expression::into_conjuncts)
            .unwrap_or_default();
        let partition = subtract(partition, &prewhere);
        let mut where_conjuncts = subtract(residual, &prewhere);

        if self.supports_prewhere
            && self.settings.optimize_move_to_prewhere
            && !where_conjuncts.is_empty()
            && prewhere.is_empty()
        {
            prewhere = match self.settings.move_to_prewhere_method {
                MoveToPrewhereMethod::All => where_conjuncts.clone(),
                MoveToPrewhereMethod::ColumnSize => match &self.column_sizes {
                    Some(sizes) => self.select_by_column_size(&where_conjuncts, sizes),
                    None => Vec::new(),
                },
                MoveToPrewhereMethod::Never => Vec::new(),
            };
            where_conjuncts = subtract(where_conjuncts, &prewhere);
        }

        let split = FilterSplit {
            partition_filter: Expression::combine_conjuncts(partition),
            prewhere: Expression::combine_conjuncts(prewhere),
            where_filter: Expression::combine_conjuncts(where_conjuncts),
        };
        tracing::debug!(
            partition_filter = ?split.partition_filter.as_ref().map(ToString::to_string),
            prewhere = ?split.prewhere.as_ref().map(ToString::to_string),
            where_filter = ?split.where_filter.as_ref().map(ToString::to_string),
            "split filter"
        );
        split
    }

    /// Pick the conjuncts worth evaluating before reading the other columns.
    fn select_by_column_size(
        &self,
        conjuncts: &[Expression],
        sizes: &HashMap<String, u64>,
    ) -> Vec<Expression> {
        let mut queried: BTreeSet<&str> =
            self.queried_columns.iter().map(String::as_str).collect();
        for conjunct in conjuncts {
            queried.extend(conjunct.referenced_columns());
        }
        let total_size: u64 = queried.iter().filter_map(|c| sizes.get(*c)).sum();

        let mut candidates: Vec<(bool, u64, &Expression)> = conjuncts
            .iter()
            .filter_map(|conjunct| {
                let columns = conjunct.referenced_columns();
                if columns.is_empty() || columns.iter().any(|c| self.is_partition_column(c)) {
                    return None;
                }
                let size = columns
                    .iter()
                    .map(|c| sizes.get(*c).copied())
                    .sum::<Option<u64>>()?;
                Some((is_good_condition(conjunct), size, conjunct))
            })
            .collect();
        // Good conditions first, then cheapest; stable for equal keys
        candidates.sort_by_key(|(good, size, _)| (!good, *size));

        let max_size = (total_size as f64 * PREWHERE_SIZE_RATIO) as u64;
        let mut moved_columns: BTreeSet<&str> = BTreeSet::new();
        let mut moved_size = 0u64;
        let mut selected = Vec::new();
        for (_, _, conjunct) in candidates {
            let new_columns: Vec<&str> = conjunct
                .referenced_columns()
                .into_iter()
                .filter(|c| !moved_columns.contains(c))
                .collect();
            let added: u64 = new_columns.iter().filter_map(|c| sizes.get(*c)).sum();
            if !selected.is_empty() && moved_size + added > max_size {
                break;
            }
            moved_size += added;
            moved_columns.extend(new_columns);
            selected.push(conjunct.clone());
        }

        // Prewhere over every queried column saves nothing
        if queried.iter().all(|c| moved_columns.contains(c)) {
            return Vec::new();
        }
        selected
    }
}

/// Equality-like conditions are selective and cheap to evaluate.
fn is_good_condition(expr: &Expression) -> bool {
    matches!(
        expr,
        Expression::Comparison {
            op: ComparisonOp::Eq,
            ..
        } | Expression::In { .. }
            | Expression::IsNull { .. }
    )
}

fn subtract(conjuncts: Vec<Expression>, remove: &[Expression]) -> Vec<Expression> {
    conjuncts
        .into_iter()
        .filter(|c| !remove.contains(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(method: MoveToPrewhereMethod) -> ScanSettings {
        ScanSettings::default().with_move_to_prewhere(true, method)
    }

    fn sizes(pairs: &[(&str, u64)]) -> Option<HashMap<String, u64>> {
        Some(pairs.iter().map(|(c, s)| (c.to_string(), *s)).collect())
    }

    fn filter() -> Expression {
        Expression::and(vec![
            Expression::eq("dt", "2024-01-01"),
            Expression::eq("id", 7i64),
            Expression::gt("amount", 10i64),
            Expression::or(vec![Expression::eq("dt", "2024-01-02"), Expression::eq("id", 1i64)]),
        ])
    }

    fn assert_partitioned(split: &FilterSplit, original: &Expression, extra: Option<&Expression>) {
        let mut expected: Vec<Expression> = original.clone().into_conjuncts();
        if let Some(extra) = extra {
            for c in extra.clone().into_conjuncts() {
                if !expected.contains(&c) {
                    expected.push(c);
                }
            }
        }
        let got: Vec<&Expression> = split.conjuncts();
        assert_eq!(got.len(), expected.len(), "conjuncts lost or duplicated: {:?}", split);
        for c in &expected {
            assert_eq!(got.iter().filter(|g| **g == c).count(), 1, "{} misplaced", c);
        }
    }

    #[test]
    fn test_partition_conjuncts_are_split_first() {
        let s = settings(MoveToPrewhereMethod::All);
        let pushdown = PredicatePushdown::new(&s).with_partition_columns(vec!["dt".to_string()]);
        let split = pushdown.split_filter(Some(filter()), None);

        assert_eq!(split.partition_filter, Some(Expression::eq("dt", "2024-01-01")));
        // ALL promotes the whole residual, never the partition conjuncts
        assert!(split.where_filter.is_none());
        assert_eq!(split.prewhere.as_ref().unwrap().clone().into_conjuncts().len(), 3);
        assert_partitioned(&split, &filter(), None);
    }

    #[test]
    fn test_partition_filter_not_pushed() {
        let s = settings(MoveToPrewhereMethod::Never).with_push_partition_filter(false);
        let pushdown = PredicatePushdown::new(&s).with_partition_columns(vec!["dt".to_string()]);
        let split = pushdown.split_filter(Some(filter()), None);
        assert!(split.partition_filter.is_none());
        assert!(split.prewhere.is_none());
        assert_eq!(split.where_filter, Some(filter()));
    }

    #[test]
    fn test_explicit_prewhere_disables_promotion() {
        let s = settings(MoveToPrewhereMethod::All);
        let pushdown = PredicatePushdown::new(&s).with_partition_columns(vec!["dt".to_string()]);
        let explicit = Expression::eq("id", 7i64);
        let split = pushdown.split_filter(Some(filter()), Some(explicit.clone()));

        assert_eq!(split.prewhere, Some(explicit.clone()));
        let where_conjuncts = split.where_filter.clone().unwrap().into_conjuncts();
        assert_eq!(where_conjuncts.len(), 2);
        assert!(!where_conjuncts.contains(&explicit));
        assert_partitioned(&split, &filter(), Some(&explicit));
    }

    #[test]
    fn test_no_prewhere_without_format_support() {
        let s = settings(MoveToPrewhereMethod::All);
        let pushdown = PredicatePushdown::new(&s).with_prewhere_support(false);
        let split = pushdown.split_filter(Some(Expression::eq("id", 1i64)), None);
        assert!(split.prewhere.is_none());
        assert_eq!(split.where_filter, Some(Expression::eq("id", 1i64)));
    }

    #[test]
    fn test_column_size_without_stats_moves_nothing() {
        let s = settings(MoveToPrewhereMethod::ColumnSize);
        let pushdown = PredicatePushdown::new(&s);
        let split = pushdown.split_filter(Some(filter()), None);
        assert!(split.prewhere.is_none());
        assert_partitioned(&split, &filter(), None);
    }

    #[test]
    fn test_column_size_prefers_cheap_equalities() {
        let s = settings(MoveToPrewhereMethod::ColumnSize);
        let pushdown = PredicatePushdown::new(&s)
            .with_partition_columns(vec!["dt".to_string()])
            .with_queried_columns(vec!["id".into(), "amount".into(), "payload".into()])
            .with_column_sizes(sizes(&[("id", 10), ("amount", 200), ("payload", 1_000)]));

        let split = pushdown.split_filter(Some(filter()), None);
        // id = 7 first (good, 10 bytes); adding amount would exceed 10% of 1210
        assert_eq!(split.prewhere, Some(Expression::eq("id", 7i64)));
        assert_partitioned(&split, &filter(), None);
    }

    #[test]
    fn test_column_size_skips_conditions_without_sizes() {
        let s = settings(MoveToPrewhereMethod::ColumnSize);
        let pushdown = PredicatePushdown::new(&s)
            .with_queried_columns(vec!["a".into(), "b".into(), "c".into()])
            .with_column_sizes(sizes(&[("b", 5), ("c", 500)]));

        let filter = Expression::and(vec![Expression::eq("a", 1i64), Expression::gt("b", 2i64)]);
        let split = pushdown.split_filter(Some(filter.clone()), None);
        assert_eq!(split.prewhere, Some(Expression::gt("b", 2i64)));
        assert_eq!(split.where_filter, Some(Expression::eq("a", 1i64)));
    }

    #[test]
    fn test_column_size_never_covers_all_columns() {
        let s = settings(MoveToPrewhereMethod::ColumnSize);
        let pushdown = PredicatePushdown::new(&s)
            .with_queried_columns(vec!["id".into()])
            .with_column_sizes(sizes(&[("id", 10)]));
        let split = pushdown.split_filter(Some(Expression::eq("id", 1i64)), None);
        assert!(split.prewhere.is_none());
        assert_eq!(split.where_filter, Some(Expression::eq("id", 1i64)));
    }

    #[test]
    fn test_empty_filter() {
        let s = ScanSettings::default();
        let split = PredicatePushdown::new(&s).split_filter(None, None);
        assert_eq!(split, FilterSplit::default());
        assert!(split.combined().is_none());
    }

    #[test]
    fn test_key_conditions() {
        let s = settings(MoveToPrewhereMethod::All);
        let pushdown = PredicatePushdown::new(&s).with_partition_columns(vec!["dt".to_string()]);
        let split = pushdown.split_filter(Some(filter()), None);

        let keys = KeyConditions::collect(&split, |c| c == "dt", |c| c == "id");
        assert_eq!(keys.partition, Some(Expression::eq("dt", "2024-01-01")));
        // id = 7 sits in prewhere but still feeds bucket resolution
        assert_eq!(keys.cluster, Some(Expression::eq("id", 7i64)));
    }
}
