//! Geography resolution
//!
//! Maps ZIP codes and free-text district labels onto a canonical
//! [`GeographyKey`], then onto a row of the measurement table using whichever
//! join strategy the table's columns support.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{RankError, Result};
use crate::models::{GeographyKey, ZipDistrictMapping, ZipRow};
use crate::state_names;
use crate::table::MeasurementTable;

/// How measurement rows are matched to a geography key
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum JoinStrategy {
    /// `state` + `congressional district` columns, exact equality
    FipsPair,
    /// `NAME` column holding labels such as "NY-12"
    AbbreviationName,
    /// `district` column holding "Congressional District 12 (115th Congress), New York"
    FullName,
}

impl JoinStrategy {
    pub const STATE_COLUMN: &'static str = "state";
    pub const DISTRICT_NUMBER_COLUMN: &'static str = "congressional district";
    pub const NAME_COLUMN: &'static str = "NAME";
    pub const DISTRICT_NAME_COLUMN: &'static str = "district";

    /// Pick the strategy supported by a header row
    pub fn detect(headers: &[String]) -> Option<Self> {
        let has = |name: &str| headers.iter().any(|h| h == name);
        if has(Self::STATE_COLUMN) && has(Self::DISTRICT_NUMBER_COLUMN) {
            Some(JoinStrategy::FipsPair)
        } else if has(Self::NAME_COLUMN) {
            Some(JoinStrategy::AbbreviationName)
        } else if has(Self::DISTRICT_NAME_COLUMN) {
            Some(JoinStrategy::FullName)
        } else {
            None
        }
    }

    /// Columns that carry geography rather than measures
    pub fn is_geography_column(name: &str) -> bool {
        matches!(
            name,
            Self::STATE_COLUMN
                | Self::DISTRICT_NUMBER_COLUMN
                | Self::NAME_COLUMN
                | Self::DISTRICT_NAME_COLUMN
        )
    }

    /// Text searched for in the label column; `None` for the FIPS strategy
    pub fn label_needle(&self, key: &GeographyKey, congress: u16) -> Option<String> {
        match self {
            JoinStrategy::FipsPair => None,
            JoinStrategy::AbbreviationName => Some(key.to_string()),
            JoinStrategy::FullName => Some(descriptive_name(key, congress)),
        }
    }
}

/// Parse and zero-pad a ZIP code. Returns the numeric key and the display form.
pub fn parse_zip(input: &str) -> Result<(u32, String)> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.len() > 5 || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(RankError::InvalidZipFormat(input.to_string()));
    }
    let zip: u32 = trimmed
        .parse()
        .map_err(|_| RankError::InvalidZipFormat(input.to_string()))?;
    Ok((zip, format!("{:05}", zip)))
}

/// Parse a district number; "AL" and "00" mean at-large
pub fn parse_district_number(text: &str) -> Option<u16> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("AL") {
        return Some(0);
    }
    if let Ok(n) = text.parse::<u16>() {
        return Some(n);
    }
    let value = text.parse::<f64>().ok()?;
    if value.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(&value) {
        Some(value as u16)
    } else {
        None
    }
}

/// English ordinal for a congress number ("115th", "101st", "112th")
pub fn ordinal(n: u16) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

/// Descriptive district name in the statistics API's format
pub fn descriptive_name(key: &GeographyKey, congress: u16) -> String {
    let seat = match key.district {
        0 => "Congressional District (at Large)".to_string(),
        98 if key.state_fips == 72 => "Resident Commissioner District (at Large)".to_string(),
        98 => "Delegate District (at Large)".to_string(),
        n => format!("Congressional District {}", n),
    };
    format!("{} ({} Congress), {}", seat, ordinal(congress), key.state_name())
}

/// Parse a district label written as "NY-12" / "AK-AL" or as a descriptive name
pub fn parse_district_label(label: &str) -> Option<GeographyKey> {
    parse_abbreviation_label(label).or_else(|| parse_descriptive_label(label))
}

fn parse_abbreviation_label(label: &str) -> Option<GeographyKey> {
    let (state, district) = label.trim().split_once('-')?;
    let state = state.trim();
    if state.len() != 2 {
        return None;
    }
    let info = state_names::lookup(state)?;
    // Labels may carry trailing text, as in "NY-12 (Manhattan)"
    let token: String = district
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    let district = parse_district_number(&token)?;
    Some(GeographyKey::new(info.fips, district))
}

fn parse_descriptive_label(label: &str) -> Option<GeographyKey> {
    let (head, state) = label.rsplit_once(',')?;
    let info = state_names::lookup(state)?;
    if !head.contains("District") {
        return None;
    }
    if head.to_lowercase().contains("(at large)") {
        let district = if head.contains("Delegate") || head.contains("Resident Commissioner") {
            98
        } else {
            0
        };
        return Some(GeographyKey::new(info.fips, district));
    }
    let after = &head[head.find("District")? + "District".len()..];
    let digits: String = after
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let district = digits.parse::<u16>().ok()?;
    Some(GeographyKey::new(info.fips, district))
}

/// Case-insensitive containment where the match is not followed by another digit,
/// so "NY-1" does not match inside "NY-12"
pub fn contains_label(haystack: &str, needle: &str) -> bool {
    let haystack = haystack.to_lowercase();
    let needle = needle.to_lowercase();
    if needle.is_empty() {
        return false;
    }
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(&needle) {
        let end = start + pos + needle.len();
        let next_is_digit = haystack[end..].chars().next().is_some_and(|c| c.is_ascii_digit());
        if !next_is_digit {
            return true;
        }
        start += pos + 1;
        while !haystack.is_char_boundary(start) {
            start += 1;
        }
    }
    false
}

/// ZIP code lookup table
#[derive(Debug, Clone, Default)]
pub struct ZipDirectory {
    by_zip: HashMap<u32, ZipDistrictMapping>,
}

impl ZipDirectory {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            RankError::Configuration(format!("cannot read ZIP mapping file {:?}: {}", path, e))
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);
        let rows = reader
            .deserialize()
            .collect::<std::result::Result<Vec<ZipRow>, csv::Error>>()?;
        Self::from_rows(rows)
    }

    /// Build the directory, keeping the first mapping seen for each ZIP
    pub fn from_rows(rows: Vec<ZipRow>) -> Result<Self> {
        let total = rows.len();
        let mut by_zip = HashMap::new();
        let mut rejected = 0usize;
        let mut duplicates = 0usize;

        for row in rows {
            match Self::map_row(&row) {
                Some((zip, mapping)) => {
                    if by_zip.contains_key(&zip) {
                        duplicates += 1;
                    } else {
                        by_zip.insert(zip, mapping);
                    }
                }
                None => {
                    if rejected < 5 {
                        warn!("Skipping unusable ZIP mapping row: {:?}", row);
                    }
                    rejected += 1;
                }
            }
        }

        if by_zip.is_empty() {
            return Err(RankError::Configuration("ZIP mapping table is empty".to_string()));
        }
        info!(
            "Loaded {} ZIP codes ({} rows, {} duplicates, {} rejected)",
            by_zip.len(),
            total,
            duplicates,
            rejected
        );
        Ok(Self { by_zip })
    }

    fn map_row(row: &ZipRow) -> Option<(u32, ZipDistrictMapping)> {
        let (zip, padded) = parse_zip(&row.zip).ok()?;
        let state = row
            .state_fips
            .as_deref()
            .and_then(state_names::lookup)
            .or_else(|| row.state_abbr.as_deref().and_then(state_names::lookup))?;
        let district = parse_district_number(&row.district)?;
        Some((
            zip,
            ZipDistrictMapping {
                zip: padded,
                key: GeographyKey::new(state.fips, district),
                state_abbr: state.abbr.to_string(),
                state_name: state.name.to_string(),
            },
        ))
    }

    pub fn len(&self) -> usize {
        self.by_zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_zip.is_empty()
    }

    /// Look up a ZIP typed by the user
    pub fn lookup(&self, input: &str) -> Result<&ZipDistrictMapping> {
        let (zip, padded) = parse_zip(input)?;
        self.by_zip
            .get(&zip)
            .ok_or_else(|| RankError::NotFound(format!("ZIP code {}", padded)))
    }
}

/// A ZIP code resolved all the way to a measurement row
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedDistrict {
    pub mapping: ZipDistrictMapping,
    pub row: usize,
}

/// Joins the ZIP directory against the measurement table
pub struct GeographyResolver<'a> {
    zips: &'a ZipDirectory,
    table: &'a MeasurementTable,
    congress: u16,
}

impl<'a> GeographyResolver<'a> {
    pub fn new(zips: &'a ZipDirectory, table: &'a MeasurementTable, congress: u16) -> Self {
        Self { zips, table, congress }
    }

    pub fn resolve_zip(&self, input: &str) -> Result<ResolvedDistrict> {
        let mapping = self.zips.lookup(input)?;
        debug!("ZIP {} mapped to {}", mapping.zip, mapping.key);
        let row = self
            .table
            .find_row(&mapping.key, self.congress)
            .ok_or_else(|| RankError::NoDataForDistrict(mapping.key.to_string()))?;
        Ok(ResolvedDistrict { mapping: mapping.clone(), row })
    }

    /// Resolve a district label typed or selected by the user
    pub fn resolve_label(&self, label: &str) -> Result<usize> {
        let label = label.trim();
        if label.is_empty() {
            return Err(RankError::NotFound("empty district label".to_string()));
        }
        if let Some(key) = parse_district_label(label) {
            return self
                .table
                .find_row(&key, self.congress)
                .ok_or_else(|| RankError::NoDataForDistrict(key.to_string()));
        }
        self.table
            .records()
            .iter()
            .position(|r| contains_label(&r.label, label))
            .ok_or_else(|| RankError::NotFound(format!("district '{}'", label)))
    }
}
