//! In-memory measurement table
//!
//! One row per district, one numeric column per variable code. Values are
//! stored column-wise so a ranking pass only touches the column it needs.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::{info, warn};

use crate::error::{RankError, Result};
use crate::geography::{contains_label, parse_district_label, parse_district_number, JoinStrategy};
use crate::models::{DistrictRecord, GeographyKey};
use crate::state_names;

/// Parse a measurement cell; blanks, "null" and non-numbers are missing
pub fn parse_value(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| !v.is_nan())
}

#[derive(Debug, Clone)]
pub struct MeasurementTable {
    strategy: JoinStrategy,
    records: Vec<DistrictRecord>,
    codes: Vec<String>,
    columns: HashMap<String, Vec<Option<f64>>>,
}

impl MeasurementTable {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            RankError::Configuration(format!("cannot read measurement file {:?}: {}", path, e))
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

        // Duplicate column names come from joining fetched batches; keep the first
        let mut seen = HashSet::new();
        let kept: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| seen.insert(h.to_string()))
            .map(|(i, h)| (i, h.clone()))
            .collect();
        let dropped_columns = headers.len() - kept.len();
        if dropped_columns > 0 {
            info!("Dropped {} duplicate column(s)", dropped_columns);
        }

        let names: Vec<String> = kept.iter().map(|(_, h)| h.clone()).collect();
        let strategy = JoinStrategy::detect(&names).ok_or_else(|| {
            RankError::Configuration(
                "measurement table has no recognizable geography columns".to_string(),
            )
        })?;
        info!("Measurement table geography strategy: {:?}", strategy);

        let index_of = |name: &str| kept.iter().find(|(_, h)| h == name).map(|(i, _)| *i);
        let state_idx = index_of(JoinStrategy::STATE_COLUMN);
        let number_idx = index_of(JoinStrategy::DISTRICT_NUMBER_COLUMN);
        let name_idx = index_of(JoinStrategy::NAME_COLUMN);
        let district_name_idx = index_of(JoinStrategy::DISTRICT_NAME_COLUMN);

        let measure_cols: Vec<(usize, String)> = kept
            .iter()
            .filter(|(_, h)| !JoinStrategy::is_geography_column(h))
            .cloned()
            .collect();

        let mut records = Vec::new();
        let mut columns: HashMap<String, Vec<Option<f64>>> = measure_cols
            .iter()
            .map(|(_, code)| (code.clone(), Vec::new()))
            .collect();
        let mut seen_keys = HashSet::new();
        let mut seen_labels = HashSet::new();
        let mut duplicate_rows = 0usize;
        let mut unkeyed_rows = 0usize;

        for result in reader.records() {
            let row = result?;
            let cell =
                |idx: Option<usize>| idx.and_then(|i| row.get(i)).map(str::trim).unwrap_or("");

            let (key, label) = match strategy {
                JoinStrategy::FipsPair => {
                    let key = state_names::parse_fips(cell(state_idx))
                        .zip(parse_district_number(cell(number_idx)))
                        .map(|(s, d)| GeographyKey::new(s, d));
                    let label = match (cell(name_idx), key) {
                        ("", Some(k)) => k.to_string(),
                        (name, _) => name.to_string(),
                    };
                    (key, label)
                }
                JoinStrategy::AbbreviationName => {
                    let label = cell(name_idx).to_string();
                    (parse_district_label(&label), label)
                }
                JoinStrategy::FullName => {
                    let label = cell(district_name_idx).to_string();
                    (parse_district_label(&label), label)
                }
            };

            let unique = match key {
                Some(k) => seen_keys.insert(k),
                None => {
                    unkeyed_rows += 1;
                    seen_labels.insert(label.to_lowercase())
                }
            };
            if !unique {
                duplicate_rows += 1;
                continue;
            }

            for (idx, code) in &measure_cols {
                let value = row.get(*idx).and_then(parse_value);
                if let Some(col) = columns.get_mut(code) {
                    col.push(value);
                }
            }
            records.push(DistrictRecord { key, label });
        }

        if records.is_empty() {
            return Err(RankError::Configuration("measurement table is empty".to_string()));
        }
        if duplicate_rows > 0 {
            info!("Dropped {} duplicate district row(s)", duplicate_rows);
        }
        if unkeyed_rows > 0 {
            warn!("{} district row(s) have no parseable state/district", unkeyed_rows);
        }
        info!("Loaded {} districts with {} measures", records.len(), measure_cols.len());

        Ok(Self {
            strategy,
            records,
            codes: measure_cols.into_iter().map(|(_, c)| c).collect(),
            columns,
        })
    }

    /// Build a table directly from records and named columns
    pub fn from_columns(
        strategy: JoinStrategy,
        records: Vec<DistrictRecord>,
        columns: Vec<(String, Vec<Option<f64>>)>,
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(RankError::Configuration("measurement table is empty".to_string()));
        }
        if let Some((code, _)) = columns.iter().find(|(_, v)| v.len() != records.len()) {
            return Err(RankError::Configuration(format!(
                "column {} has a different length than the district list",
                code
            )));
        }
        let codes = columns.iter().map(|(c, _)| c.clone()).collect();
        Ok(Self {
            strategy,
            records,
            codes,
            columns: columns.into_iter().collect(),
        })
    }

    pub fn strategy(&self) -> JoinStrategy {
        self.strategy
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[DistrictRecord] {
        &self.records
    }

    pub fn record(&self, row: usize) -> Option<&DistrictRecord> {
        self.records.get(row)
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn has_column(&self, code: &str) -> bool {
        self.columns.contains_key(code)
    }

    pub fn column(&self, code: &str) -> Option<&[Option<f64>]> {
        self.columns.get(code).map(Vec::as_slice)
    }

    pub fn value(&self, code: &str, row: usize) -> Option<f64> {
        self.columns.get(code).and_then(|c| c.get(row).copied().flatten())
    }

    /// Rows belonging to one state
    pub fn rows_in_state(&self, state_fips: u8) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state_fips() == Some(state_fips))
            .map(|(i, _)| i)
            .collect()
    }

    fn position_by_key(&self, key: &GeographyKey) -> Option<usize> {
        self.records.iter().position(|r| r.key.as_ref() == Some(key))
    }

    /// Find the row for a key using this table's join strategy.
    ///
    /// Label strategies fall back to the key parsed from each label, so a
    /// `NAME` column holding descriptive names still joins.
    pub fn find_row(&self, key: &GeographyKey, congress: u16) -> Option<usize> {
        match self.strategy.label_needle(key, congress) {
            None => self.position_by_key(key),
            Some(needle) => self
                .records
                .iter()
                .position(|r| r.label.eq_ignore_ascii_case(&needle))
                .or_else(|| self.records.iter().position(|r| contains_label(&r.label, &needle)))
                .or_else(|| self.position_by_key(key)),
        }
    }
}
