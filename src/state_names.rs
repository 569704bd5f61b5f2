//! Canonical state lookup table
//! Maps state FIPS codes to postal abbreviations and full names, and back

use std::collections::HashMap;
use std::sync::LazyLock;

/// One state or state-equivalent: (fips, abbreviation, full name)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateInfo {
    pub fips: u8,
    pub abbr: &'static str,
    pub name: &'static str,
}

const STATES: &[(u8, &str, &str)] = &[
    (1, "AL", "Alabama"),
    (2, "AK", "Alaska"),
    (4, "AZ", "Arizona"),
    (5, "AR", "Arkansas"),
    (6, "CA", "California"),
    (8, "CO", "Colorado"),
    (9, "CT", "Connecticut"),
    (10, "DE", "Delaware"),
    (11, "DC", "District of Columbia"),
    (12, "FL", "Florida"),
    (13, "GA", "Georgia"),
    (15, "HI", "Hawaii"),
    (16, "ID", "Idaho"),
    (17, "IL", "Illinois"),
    (18, "IN", "Indiana"),
    (19, "IA", "Iowa"),
    (20, "KS", "Kansas"),
    (21, "KY", "Kentucky"),
    (22, "LA", "Louisiana"),
    (23, "ME", "Maine"),
    (24, "MD", "Maryland"),
    (25, "MA", "Massachusetts"),
    (26, "MI", "Michigan"),
    (27, "MN", "Minnesota"),
    (28, "MS", "Mississippi"),
    (29, "MO", "Missouri"),
    (30, "MT", "Montana"),
    (31, "NE", "Nebraska"),
    (32, "NV", "Nevada"),
    (33, "NH", "New Hampshire"),
    (34, "NJ", "New Jersey"),
    (35, "NM", "New Mexico"),
    (36, "NY", "New York"),
    (37, "NC", "North Carolina"),
    (38, "ND", "North Dakota"),
    (39, "OH", "Ohio"),
    (40, "OK", "Oklahoma"),
    (41, "OR", "Oregon"),
    (42, "PA", "Pennsylvania"),
    (44, "RI", "Rhode Island"),
    (45, "SC", "South Carolina"),
    (46, "SD", "South Dakota"),
    (47, "TN", "Tennessee"),
    (48, "TX", "Texas"),
    (49, "UT", "Utah"),
    (50, "VT", "Vermont"),
    (51, "VA", "Virginia"),
    (53, "WA", "Washington"),
    (54, "WV", "West Virginia"),
    (55, "WI", "Wisconsin"),
    (56, "WY", "Wyoming"),
    (72, "PR", "Puerto Rico"),
];

static BY_FIPS: LazyLock<HashMap<u8, StateInfo>> = LazyLock::new(|| {
    STATES
        .iter()
        .map(|&(fips, abbr, name)| (fips, StateInfo { fips, abbr, name }))
        .collect()
});

// Keyed by upper-cased abbreviation and lower-cased name
static BY_LABEL: LazyLock<HashMap<String, StateInfo>> = LazyLock::new(|| {
    let mut m = HashMap::new();
    for info in BY_FIPS.values() {
        m.insert(info.abbr.to_string(), *info);
        m.insert(info.name.to_lowercase(), *info);
    }
    m
});

/// Look up a state by numeric FIPS code
pub fn by_fips(fips: u8) -> Option<StateInfo> {
    BY_FIPS.get(&fips).copied()
}

/// Look up a state by FIPS text ("6", "06", "06.0"), abbreviation, or full name
pub fn lookup(label: &str) -> Option<StateInfo> {
    let label = label.trim();
    if label.is_empty() {
        return None;
    }
    if let Some(fips) = parse_fips(label) {
        return by_fips(fips);
    }
    BY_LABEL
        .get(&label.to_uppercase())
        .or_else(|| BY_LABEL.get(&label.to_lowercase()))
        .copied()
}

/// Parse a FIPS code written as text, tolerating float renderings from CSV exports
pub fn parse_fips(text: &str) -> Option<u8> {
    let text = text.trim();
    if let Ok(code) = text.parse::<u8>() {
        return Some(code);
    }
    let value = text.parse::<f64>().ok()?;
    if value.fract() == 0.0 && (0.0..=255.0).contains(&value) {
        Some(value as u8)
    } else {
        None
    }
}

/// Render a FIPS code the way the measurement table stores it ("06")
pub fn format_fips(fips: u8) -> String {
    format!("{:02}", fips)
}

/// Full state name for display, falling back to the padded code
pub fn state_display_name(fips: u8) -> String {
    by_fips(fips)
        .map(|s| s.name.to_string())
        .unwrap_or_else(|| format!("State {}", format_fips(fips)))
}
