//! Ranking engine
//!
//! Ranks districts by one measure column, descending, with fractional
//! (average) ranks for ties. Results are memoized per (code, scope) until the
//! engine is invalidated.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::debug;

use crate::error::{RankError, Result};
use crate::state_names;
use crate::table::MeasurementTable;

/// Population a rank is computed over
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub enum RankScope {
    National,
    State(u8),
}

impl fmt::Display for RankScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankScope::National => write!(f, "nationwide"),
            RankScope::State(fips) => {
                write!(f, "within {}", state_names::state_display_name(*fips))
            }
        }
    }
}

/// Fractional ranks for `values`, largest first.
///
/// `rank(x) = 1 + #(greater) + (#(equal) - 1) / 2`. Missing values sort after
/// every present value and tie with each other.
pub fn fractional_ranks(values: &[Option<f64>]) -> Vec<f64> {
    let keyed: Vec<f64> = values.iter().map(|v| v.unwrap_or(f64::NEG_INFINITY)).collect();
    let mut order: Vec<usize> = (0..keyed.len()).collect();
    order.sort_by(|&a, &b| keyed[b].total_cmp(&keyed[a]));

    let mut ranks = vec![0.0; keyed.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && keyed[order[end]] == keyed[order[start]] {
            end += 1;
        }
        // Positions start+1 ..= end share their mean
        let rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

/// One measure ranked over one scope
#[derive(Debug, Clone, Serialize)]
pub struct RankedColumn {
    pub code: String,
    pub scope: RankScope,
    /// (table row, rank), best rank first
    pub entries: Vec<(usize, f64)>,
    #[serde(skip)]
    by_row: HashMap<usize, f64>,
}

impl RankedColumn {
    pub fn rank_of(&self, row: usize) -> Option<f64> {
        self.by_row.get(&row).copied()
    }

    /// Number of districts in scope, the rank denominator
    pub fn population(&self) -> usize {
        self.entries.len()
    }
}

type RankKey = (String, RankScope);

pub struct RankingEngine {
    table: Arc<MeasurementTable>,
    cache: RwLock<HashMap<RankKey, Arc<RankedColumn>>>,
}

impl RankingEngine {
    pub fn new(table: Arc<MeasurementTable>) -> Self {
        Self {
            table,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn table(&self) -> &Arc<MeasurementTable> {
        &self.table
    }

    /// Rank `code` over `scope`, computing it on first use
    pub fn rank_column(&self, code: &str, scope: RankScope) -> Result<Arc<RankedColumn>> {
        let key = (code.to_string(), scope);
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(ranked) = cache.get(&key) {
                return Ok(Arc::clone(ranked));
            }
        }

        let ranked = Arc::new(self.compute(code, scope)?);

        {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            cache.entry(key).or_insert_with(|| Arc::clone(&ranked));
        }
        Ok(ranked)
    }

    /// Rank of one table row; `None` when the row is outside the scope
    pub fn rank_of(&self, code: &str, scope: RankScope, row: usize) -> Result<Option<f64>> {
        Ok(self.rank_column(code, scope)?.rank_of(row))
    }

    /// Drop every memoized ranking
    pub fn invalidate(&self) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn compute(&self, code: &str, scope: RankScope) -> Result<RankedColumn> {
        let column = self
            .table
            .column(code)
            .ok_or_else(|| RankError::VariableNotFound(code.to_string()))?;

        // Scoped copy of the row indices; the table itself is never touched
        let rows: Vec<usize> = match scope {
            RankScope::National => (0..self.table.len()).collect(),
            RankScope::State(fips) => self.table.rows_in_state(fips),
        };
        let values: Vec<Option<f64>> = rows.iter().map(|&r| column[r]).collect();
        let ranks = fractional_ranks(&values);

        let mut entries: Vec<(usize, f64)> = rows.into_iter().zip(ranks).collect();
        entries.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        let by_row = entries.iter().copied().collect();

        debug!("Ranked {} over {} districts ({})", code, entries.len(), scope);
        Ok(RankedColumn {
            code: code.to_string(),
            scope,
            entries,
            by_row,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geography::JoinStrategy;
    use crate::models::{DistrictRecord, GeographyKey};

    fn table(values: &[(u8, u16, Option<f64>)]) -> Arc<MeasurementTable> {
        let records = values
            .iter()
            .map(|&(s, d, _)| {
                let key = GeographyKey::new(s, d);
                DistrictRecord { key: Some(key), label: key.to_string() }
            })
            .collect();
        let column = values.iter().map(|&(_, _, v)| v).collect();
        Arc::new(
            MeasurementTable::from_columns(
                JoinStrategy::FipsPair,
                records,
                vec![("A".to_string(), column)],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_ranks_without_ties_are_a_bijection() {
        let ranks = fractional_ranks(&[Some(3.0), Some(9.0), Some(1.0), Some(5.0)]);
        assert_eq!(ranks, vec![3.0, 1.0, 4.0, 2.0]);
    }

    #[test]
    fn test_ties_share_average_rank() {
        let ranks = fractional_ranks(&[Some(10.0), Some(7.0), Some(7.0), Some(7.0), Some(1.0)]);
        assert_eq!(ranks, vec![1.0, 3.0, 3.0, 3.0, 5.0]);

        let ranks = fractional_ranks(&[Some(2.0), Some(2.0)]);
        assert_eq!(ranks, vec![1.5, 1.5]);
    }

    #[test]
    fn test_sentinel_and_missing_rank_last() {
        let ranks = fractional_ranks(&[Some(-888888888.0), None, Some(0.0), None]);
        assert_eq!(ranks, vec![2.0, 3.5, 1.0, 3.5]);
    }

    #[test]
    fn test_state_scope_does_not_disturb_national_ranks() {
        let engine = RankingEngine::new(table(&[
            (36, 1, Some(50.0)),
            (6, 1, Some(90.0)),
            (36, 2, Some(70.0)),
            (6, 2, Some(10.0)),
        ]));

        let national = engine.rank_column("A", RankScope::National).unwrap();
        assert_eq!(national.population(), 4);
        assert_eq!(national.rank_of(0), Some(3.0));

        let ny = engine.rank_column("A", RankScope::State(36)).unwrap();
        assert_eq!(ny.population(), 2);
        assert_eq!(ny.rank_of(0), Some(2.0));
        assert_eq!(ny.rank_of(2), Some(1.0));
        assert_eq!(ny.rank_of(1), None);

        assert_eq!(engine.rank_of("A", RankScope::National, 0).unwrap(), Some(3.0));
        assert_eq!(national.entries.first(), Some(&(1, 1.0)));
    }

    #[test]
    fn test_unknown_variable_is_reported() {
        let engine = RankingEngine::new(table(&[(36, 1, Some(1.0))]));
        assert!(matches!(
            engine.rank_column("MISSING", RankScope::National),
            Err(RankError::VariableNotFound(code)) if code == "MISSING"
        ));
    }

    #[test]
    fn test_rankings_are_memoized_until_invalidated() {
        let engine = RankingEngine::new(table(&[(36, 1, Some(1.0)), (36, 2, Some(2.0))]));
        let first = engine.rank_column("A", RankScope::National).unwrap();
        let second = engine.rank_column("A", RankScope::National).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        engine.rank_column("A", RankScope::State(36)).unwrap();
        assert_eq!(engine.cached_len(), 2);

        engine.invalidate();
        assert_eq!(engine.cached_len(), 0);
        let third = engine.rank_column("A", RankScope::National).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
