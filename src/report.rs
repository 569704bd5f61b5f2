//! District reports, measure leaderboards and top-measure scans

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::error::{RankError, Result};
use crate::models::{GeographyKey, VariableDefinition};
use crate::ranking::{RankScope, RankingEngine};

/// Value the statistics API uses for suppressed or not-applicable estimates
pub const SUPPRESSED_SENTINEL: f64 = -888888888.0;
/// Ranks within this many places of either end are highlighted
pub const HIGHLIGHT_BAND: i64 = 10;

/// Round for display, ties to even: 54.5 -> 54, 55.5 -> 56
pub fn display_round(value: f64) -> i64 {
    value.round_ties_even() as i64
}

/// A value that may be shown in a report
pub fn is_reportable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan() && *v != SUPPRESSED_SENTINEL)
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Highlight {
    Top,
    Bottom,
    Neutral,
}

impl Highlight {
    /// Top if rank <= 10, else bottom if rank > total - 10
    pub fn classify(rank: i64, total: usize) -> Self {
        if rank <= HIGHLIGHT_BAND {
            Highlight::Top
        } else if rank > total as i64 - HIGHLIGHT_BAND {
            Highlight::Bottom
        } else {
            Highlight::Neutral
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportRow {
    pub code: String,
    pub category: String,
    pub measure: String,
    pub value: i64,
    pub rank: i64,
    pub highlight: Highlight,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistrictReport {
    pub district: String,
    pub key: Option<GeographyKey>,
    pub scope: RankScope,
    /// Denominator used for the bottom highlight band
    pub total_districts: usize,
    /// Measures with a reportable value, in catalog order
    pub rows: Vec<ReportRow>,
    /// Catalog codes with no column in the measurement table
    pub skipped_variables: Vec<String>,
}

impl DistrictReport {
    pub fn processed(&self) -> usize {
        self.rows.len()
    }

    /// Rows shown to the user: the measure label must mention "percent"
    pub fn displayed_rows(&self) -> impl Iterator<Item = &ReportRow> {
        self.rows
            .iter()
            .filter(|r| r.measure.to_lowercase().contains("percent"))
    }
}

pub struct ReportBuilder<'a> {
    catalog: &'a Catalog,
    engine: &'a RankingEngine,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(catalog: &'a Catalog, engine: &'a RankingEngine) -> Self {
        Self { catalog, engine }
    }

    /// Report for one table row, ranked nationally
    pub fn build(&self, row: usize) -> Result<DistrictReport> {
        self.build_scoped(row, RankScope::National)
    }

    /// Report for one table row with ranks computed over `scope`
    pub fn build_scoped(&self, row: usize, scope: RankScope) -> Result<DistrictReport> {
        let table = self.engine.table();
        let record = table
            .record(row)
            .ok_or_else(|| RankError::NoDataForDistrict(format!("row {}", row)))?;
        if let RankScope::State(fips) = scope {
            if record.state_fips() != Some(fips) {
                return Err(RankError::NoDataForDistrict(format!("{} {}", record.label, scope)));
            }
        }

        let total_districts = match scope {
            RankScope::National => table.len(),
            RankScope::State(fips) => table.rows_in_state(fips).len(),
        };

        let mut rows = Vec::new();
        let mut skipped_variables = Vec::new();

        for var in self.catalog.iter() {
            if !table.has_column(&var.code) {
                warn!("Variable {} not found in the measurement table. Skipping...", var.code);
                skipped_variables.push(var.code.clone());
                continue;
            }

            let Some(value) = is_reportable(table.value(&var.code, row)) else {
                continue;
            };

            let rank = match self.engine.rank_of(&var.code, scope, row) {
                Ok(Some(rank)) => rank,
                Ok(None) => continue,
                Err(RankError::VariableNotFound(code)) => {
                    skipped_variables.push(code);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let rank = display_round(rank);
            rows.push(ReportRow {
                code: var.code.clone(),
                category: var.category.clone(),
                measure: var.measure.clone(),
                value: display_round(value),
                rank,
                highlight: Highlight::classify(rank, total_districts),
            });
        }

        info!(
            "Processed {} measures for {} ({} skipped)",
            rows.len(),
            record.label,
            skipped_variables.len()
        );

        Ok(DistrictReport {
            district: record.label.clone(),
            key: record.key,
            scope,
            total_districts,
            rows,
            skipped_variables,
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LeaderboardEntry {
    pub district: String,
    pub district_number: Option<u16>,
    pub state_name: String,
    pub rank: f64,
    pub value: Option<f64>,
}

/// Districts ordered by one measure, best first, truncated to `top_n`
pub fn leaderboard(
    engine: &RankingEngine,
    code: &str,
    scope: RankScope,
    top_n: usize,
) -> Result<Vec<LeaderboardEntry>> {
    let ranked = engine.rank_column(code, scope)?;
    let table = engine.table();

    Ok(ranked
        .entries
        .iter()
        .take(top_n)
        .filter_map(|&(row, rank)| {
            let record = table.record(row)?;
            let state_name = match record.key {
                Some(k) => k.state_name(),
                None => record
                    .label
                    .rsplit(',')
                    .next()
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default(),
            };
            Some(LeaderboardEntry {
                district: record.label.clone(),
                district_number: record.key.map(|k| k.district),
                state_name,
                rank,
                value: is_reportable(table.value(code, row)),
            })
        })
        .collect())
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopMeasure {
    pub code: String,
    pub description: String,
    pub rank: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopMeasures {
    pub district: String,
    pub measures: Vec<TopMeasure>,
    pub skipped_variables: Vec<String>,
}

/// Every catalog measure where `row` ranks in the national top ten.
///
/// Variables are ranked on a pool of at most `workers` blocking tasks.
pub async fn top_measures(
    engine: Arc<RankingEngine>,
    catalog: Arc<Catalog>,
    row: usize,
    workers: usize,
) -> Result<TopMeasures> {
    let district = engine
        .table()
        .record(row)
        .map(|r| r.label.clone())
        .ok_or_else(|| RankError::NoDataForDistrict(format!("row {}", row)))?;

    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();

    for var in catalog.iter().cloned() {
        let engine = Arc::clone(&engine);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            tokio::task::spawn_blocking(move || evaluate_top(&engine, &var, row))
                .await
                .unwrap_or_else(|e| TopOutcome::Failed(e.to_string()))
        });
    }

    let mut measures = Vec::new();
    let mut skipped_variables = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(TopOutcome::Hit(m)) => measures.push(m),
            Ok(TopOutcome::Miss) => {}
            Ok(TopOutcome::Skipped(code)) => skipped_variables.push(code),
            Ok(TopOutcome::Failed(reason)) => warn!("Ranking task failed: {}", reason),
            Err(e) => warn!("Ranking task panicked: {}", e),
        }
    }

    // Completion order is arbitrary
    measures.sort_by(|a, b| a.rank.total_cmp(&b.rank).then_with(|| a.code.cmp(&b.code)));
    skipped_variables.sort();
    info!("{} ranks in the top {} for {} measures", district, HIGHLIGHT_BAND, measures.len());

    Ok(TopMeasures { district, measures, skipped_variables })
}

enum TopOutcome {
    Hit(TopMeasure),
    Miss,
    Skipped(String),
    Failed(String),
}

fn evaluate_top(engine: &RankingEngine, var: &VariableDefinition, row: usize) -> TopOutcome {
    let rank = match engine.rank_of(&var.code, RankScope::National, row) {
        Ok(Some(rank)) => rank,
        Ok(None) => return TopOutcome::Miss,
        Err(RankError::VariableNotFound(code)) => return TopOutcome::Skipped(code),
        Err(e) => return TopOutcome::Failed(e.to_string()),
    };
    match is_reportable(engine.table().value(&var.code, row)) {
        Some(value) if rank <= HIGHLIGHT_BAND as f64 => TopOutcome::Hit(TopMeasure {
            code: var.code.clone(),
            description: var.description.clone(),
            rank,
            value,
        }),
        _ => TopOutcome::Miss,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geography::JoinStrategy;
    use crate::models::DistrictRecord;
    use crate::table::MeasurementTable;

    fn engine_with(columns: Vec<(&str, Vec<Option<f64>>)>, states: &[u8]) -> Arc<RankingEngine> {
        let records = states
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let key = GeographyKey::new(s, i as u16 + 1);
                DistrictRecord { key: Some(key), label: key.to_string() }
            })
            .collect();
        let columns = columns.into_iter().map(|(c, v)| (c.to_string(), v)).collect();
        let table =
            MeasurementTable::from_columns(JoinStrategy::FipsPair, records, columns).unwrap();
        Arc::new(RankingEngine::new(Arc::new(table)))
    }

    #[test]
    fn test_rounding_is_half_to_even() {
        assert_eq!(display_round(54.5), 54);
        assert_eq!(display_round(55.5), 56);
        assert_eq!(display_round(54.4), 54);
        assert_eq!(display_round(54.6), 55);
        assert_eq!(display_round(2.5), 2);
        assert_eq!(display_round(-2.5), -2);
    }

    #[test]
    fn test_highlight_boundary() {
        assert_eq!(Highlight::classify(10, 100), Highlight::Top);
        assert_eq!(Highlight::classify(11, 100), Highlight::Neutral);
        assert_eq!(Highlight::classify(90, 100), Highlight::Neutral);
        assert_eq!(Highlight::classify(91, 100), Highlight::Bottom);
        // Top wins when the bands overlap
        assert_eq!(Highlight::classify(3, 10), Highlight::Top);
    }

    #[test]
    fn test_end_to_end_district_row() {
        // District under test is row 2 with the third-highest value
        let values = vec![
            Some(90000.0), Some(80000.0), Some(45000.0), Some(40000.0), Some(35000.0),
            Some(30000.0), Some(25000.0), Some(20000.0), Some(15000.0), Some(10000.0),
        ];
        let engine = engine_with(vec![("A", values)], &[36; 10]);
        let catalog = Catalog::new(vec![VariableDefinition::percent("A", "x!!Income!!Median")]);

        let report = ReportBuilder::new(&catalog, &engine).build(2).unwrap();
        assert_eq!(report.total_districts, 10);
        assert_eq!(
            report.rows,
            vec![ReportRow {
                code: "A".to_string(),
                category: "Income".to_string(),
                measure: "Median".to_string(),
                value: 45000,
                rank: 3,
                highlight: Highlight::Top,
            }]
        );
        // "Median" does not mention percent, so it is not displayed
        assert_eq!(report.displayed_rows().count(), 0);
    }

    #[test]
    fn test_report_skips_sentinels_and_missing_columns() {
        let engine = engine_with(
            vec![
                ("P1", vec![Some(SUPPRESSED_SENTINEL), Some(5.0), Some(1.0)]),
                ("P2", vec![Some(54.5), Some(60.0), None]),
                ("P3", vec![None, Some(1.0), Some(2.0)]),
            ],
            &[36, 36, 6],
        );
        let catalog = Catalog::new(vec![
            VariableDefinition::percent("P1", "Percent!!AGE!!Percent under 5"),
            VariableDefinition::percent("P2", "Percent!!HOUSING!!Percent owner occupied"),
            VariableDefinition::percent("GONE", "Percent!!X!!Percent gone"),
            VariableDefinition::percent("P3", "Percent!!INCOME!!Median income"),
        ]);

        let report = ReportBuilder::new(&catalog, &engine).build(0).unwrap();
        assert_eq!(report.skipped_variables, vec!["GONE".to_string()]);
        assert_eq!(report.processed(), 1);
        let row = &report.rows[0];
        assert_eq!(row.code, "P2");
        assert_eq!(row.value, 54);
        assert_eq!(row.rank, 2);
        assert!(report.rows.iter().all(|r| r.value != SUPPRESSED_SENTINEL as i64));
        assert_eq!(report.displayed_rows().count(), 1);
    }

    #[test]
    fn test_state_scoped_report() {
        let engine = engine_with(vec![("P", vec![Some(1.0), Some(9.0), Some(5.0)])], &[36, 6, 36]);
        let catalog = Catalog::new(vec![VariableDefinition::percent("P", "Percent!!A!!Percent b")]);
        let builder = ReportBuilder::new(&catalog, &engine);

        let national = builder.build(2).unwrap();
        assert_eq!(national.rows[0].rank, 2);
        let scoped = builder.build_scoped(2, RankScope::State(36)).unwrap();
        assert_eq!(scoped.rows[0].rank, 1);
        assert_eq!(scoped.total_districts, 2);

        // A row outside the requested state is an error, not an empty report
        assert!(matches!(
            builder.build_scoped(1, RankScope::State(36)),
            Err(RankError::NoDataForDistrict(_))
        ));
    }

    #[test]
    fn test_leaderboard_orders_and_truncates() {
        let engine = engine_with(
            vec![("P", vec![Some(1.0), Some(9.0), Some(5.0), Some(SUPPRESSED_SENTINEL)])],
            &[36, 6, 36, 6],
        );
        let board = leaderboard(&engine, "P", RankScope::National, 3).unwrap();
        let ranks: Vec<f64> = board.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1.0, 2.0, 3.0]);
        assert_eq!(board[0].state_name, "California");
        assert_eq!(board[0].value, Some(9.0));

        let full = leaderboard(&engine, "P", RankScope::National, 100).unwrap();
        assert_eq!(full.last().map(|e| e.value), Some(None));

        let ny = leaderboard(&engine, "P", RankScope::State(36), 10).unwrap();
        assert_eq!(ny.len(), 2);
        assert!(matches!(
            leaderboard(&engine, "NOPE", RankScope::National, 10),
            Err(RankError::VariableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_top_measures_fan_out() {
        let n = 12;
        let high: Vec<Option<f64>> = (0..n).map(|i| Some(i as f64)).collect();
        let low: Vec<Option<f64>> = (0..n).map(|i| Some(-(i as f64))).collect();
        let engine = engine_with(vec![("HIGH", high), ("LOW", low)], &[36; 12]);
        let catalog = Arc::new(Catalog::new(vec![
            VariableDefinition::percent("HIGH", "Percent!!A!!Percent high"),
            VariableDefinition::percent("LOW", "Percent!!A!!Percent low"),
            VariableDefinition::percent("ABSENT", "Percent!!A!!Percent absent"),
        ]));

        // Last row has the largest HIGH value and the smallest LOW value
        let top = top_measures(Arc::clone(&engine), Arc::clone(&catalog), n - 1, 2)
            .await
            .unwrap();
        assert_eq!(top.measures.len(), 1);
        assert_eq!(top.measures[0].code, "HIGH");
        assert_eq!(top.measures[0].rank, 1.0);
        assert_eq!(top.skipped_variables, vec!["ABSENT".to_string()]);

        let none = top_measures(engine, catalog, n, 2).await;
        assert!(matches!(none, Err(RankError::NoDataForDistrict(_))));
    }
}
