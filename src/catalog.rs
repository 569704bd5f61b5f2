//! Variable catalog loading
//!
//! Filters the variable definitions table down to percent-estimate codes and
//! derives a (category, measure) pair from each description.

use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::info;

use crate::error::{RankError, Result};
use crate::models::{VariableDefinition, VariableKind, VariableRow};

/// Code suffix marking a percent estimate
pub const PERCENT_SUFFIX: &str = "PE";
/// `P_or_E` marker for percent estimates
pub const PERCENT_MARKER: &str = "Percent";
/// Category with no cross-district comparability
pub const EXCLUDED_CATEGORY: &str = "SELECTED SOCIAL CHARACTERISTICS IN PUERTO RICO";
/// Segment delimiter in descriptions
pub const DESCRIPTION_DELIMITER: &str = "!!";

/// Split a description into (category, measure)
pub fn parse_description(description: &str) -> (String, String) {
    let parts: Vec<&str> = description.split(DESCRIPTION_DELIMITER).collect();
    if parts.len() > 2 {
        (parts[1].to_string(), parts[2..].join(": "))
    } else {
        ("Unknown".to_string(), description.to_string())
    }
}

/// Ordered, read-only set of percent variables
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    variables: Vec<VariableDefinition>,
}

impl Catalog {
    /// Wrap already-built definitions, keeping their order
    pub fn new(variables: Vec<VariableDefinition>) -> Self {
        Self { variables }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            RankError::Configuration(format!("cannot read variables file {:?}: {}", path, e))
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);
        let rows = reader
            .deserialize()
            .collect::<std::result::Result<Vec<VariableRow>, csv::Error>>()?;
        Self::from_rows(rows)
    }

    /// Apply the suffix, marker and category filters, then parse descriptions
    pub fn from_rows(rows: Vec<VariableRow>) -> Result<Self> {
        info!("Initial number of variables: {}", rows.len());

        let rows: Vec<VariableRow> = rows
            .into_iter()
            .filter(|r| r.variable.trim().ends_with(PERCENT_SUFFIX))
            .collect();
        info!("After filtering for '{}' suffix: {}", PERCENT_SUFFIX, rows.len());

        let rows: Vec<VariableRow> = rows
            .into_iter()
            .filter(|r| r.p_or_e.as_deref().map(str::trim) == Some(PERCENT_MARKER))
            .collect();
        info!("After filtering for '{}' marker: {}", PERCENT_MARKER, rows.len());

        let rows: Vec<VariableRow> = rows
            .into_iter()
            .filter(|r| r.category.as_deref() != Some(EXCLUDED_CATEGORY))
            .collect();
        info!("After excluding Puerto Rico measures: {}", rows.len());

        if rows.is_empty() {
            return Err(RankError::Configuration(
                "variable catalog is empty after filtering".to_string(),
            ));
        }

        let variables = rows
            .into_iter()
            .map(|r| {
                let (category, measure) = parse_description(&r.description);
                VariableDefinition {
                    code: r.variable.trim().to_string(),
                    description: r.description,
                    category,
                    measure,
                    kind: VariableKind::Percent,
                }
            })
            .collect();

        Ok(Self { variables })
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableDefinition> {
        self.variables.iter()
    }

    pub fn get(&self, code: &str) -> Option<&VariableDefinition> {
        self.variables.iter().find(|v| v.code.eq_ignore_ascii_case(code))
    }

    /// Case-insensitive substring search over descriptions
    pub fn search(&self, term: &str) -> Vec<&VariableDefinition> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.variables
            .iter()
            .filter(|v| v.description.to_lowercase().contains(&needle))
            .collect()
    }
}
