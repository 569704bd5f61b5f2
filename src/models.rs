use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state_names;

/// Raw row from the variable definitions CSV
#[derive(Debug, Clone, Deserialize)]
pub struct VariableRow {
    #[serde(rename = "Variable")]
    pub variable: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "P_or_E", default)]
    pub p_or_e: Option<String>,
    #[serde(rename = "Category", default)]
    pub category: Option<String>,
}

/// Raw row from the ZIP to congressional district CSV
#[derive(Debug, Clone, Deserialize)]
pub struct ZipRow {
    pub zip: String,
    #[serde(default)]
    pub state_fips: Option<String>,
    #[serde(default)]
    pub state_abbr: Option<String>,
    pub district: String,
}

/// Whether a variable is a raw count or a percent estimate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VariableKind {
    Percent,
    Estimate,
}

/// One demographic measure from the catalog
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VariableDefinition {
    pub code: String,
    pub description: String,
    pub category: String,
    pub measure: String,
    pub kind: VariableKind,
}

impl VariableDefinition {
    /// Build a percent variable, deriving category and measure from the description
    pub fn percent(code: &str, description: &str) -> Self {
        let (category, measure) = crate::catalog::parse_description(description);
        Self {
            code: code.to_string(),
            description: description.to_string(),
            category,
            measure,
            kind: VariableKind::Percent,
        }
    }
}

/// Canonical (state, district) pair
///
/// District 0 is an at-large seat; 98 is the non-voting delegate seat the
/// statistics API uses for DC and Puerto Rico.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeographyKey {
    pub state_fips: u8,
    pub district: u16,
}

impl GeographyKey {
    pub fn new(state_fips: u8, district: u16) -> Self {
        Self { state_fips, district }
    }

    pub fn is_at_large(&self) -> bool {
        self.district == 0 || self.district == 98
    }

    pub fn state_abbr(&self) -> String {
        state_names::by_fips(self.state_fips)
            .map(|s| s.abbr.to_string())
            .unwrap_or_else(|| state_names::format_fips(self.state_fips))
    }

    pub fn state_name(&self) -> String {
        state_names::state_display_name(self.state_fips)
    }
}

impl fmt::Display for GeographyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_at_large() {
            write!(f, "{}-AL", self.state_abbr())
        } else {
            write!(f, "{}-{}", self.state_abbr(), self.district)
        }
    }
}

/// One row of the measurement table (geography only; values live column-wise)
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DistrictRecord {
    pub key: Option<GeographyKey>,
    pub label: String,
}

impl DistrictRecord {
    pub fn state_fips(&self) -> Option<u8> {
        self.key.map(|k| k.state_fips)
    }
}

/// A resolved ZIP code
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ZipDistrictMapping {
    pub zip: String,
    pub key: GeographyKey,
    pub state_abbr: String,
    pub state_name: String,
}
