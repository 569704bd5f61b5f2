//! Statistics API client
//!
//! Fetches profile variables for every congressional district (or those of
//! one state) in batches, retrying transient failures with exponential
//! backoff, and merges the batches into one table keyed by geography.

use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{RankError, Result};
use crate::geography::JoinStrategy;
use crate::state_names;
use crate::table::parse_value;

pub const DEFAULT_BASE_URL: &str = "https://api.census.gov/data";

/// Bounded retry schedule: `base_delay * 2^(attempt - 1)` plus up to 25% jitter
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.saturating_sub(1).min(16));
        let jitter_ms = (exp.as_millis() as u64) / 4;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        exp + Duration::from_millis(jitter)
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
/// `op` receives the 1-based attempt number.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, String>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_error = e;
                if attempt < attempts {
                    warn!(
                        "{} failed: {}. Retrying... ({}/{})",
                        what, last_error, attempt, attempts
                    );
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }
    Err(RankError::RemoteFetch { attempts, reason: last_error })
}

/// Header row plus data rows, as returned by the API
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchedTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Decode an array-of-arrays response body
pub fn parse_response(body: &str) -> Result<FetchedTable> {
    let raw: Vec<Vec<Value>> = serde_json::from_str(body)?;
    let mut iter = raw.into_iter();
    let header = iter
        .next()
        .ok_or_else(|| RankError::RemoteFetch {
            attempts: 1,
            reason: "empty response".to_string(),
        })?
        .into_iter()
        .map(cell_text)
        .collect();
    let rows = iter.map(|r| r.into_iter().map(cell_text).collect()).collect();
    Ok(FetchedTable { header, rows })
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Join batches on (state, congressional district), keeping each code once.
/// Values that do not parse as numbers become blank.
pub fn merge_batches(batches: &[FetchedTable]) -> FetchedTable {
    let geo = [
        JoinStrategy::NAME_COLUMN,
        JoinStrategy::STATE_COLUMN,
        JoinStrategy::DISTRICT_NUMBER_COLUMN,
    ];
    let mut codes: Vec<String> = Vec::new();
    let mut order: Vec<(String, String)> = Vec::new();
    let mut merged: HashMap<(String, String), (String, HashMap<String, String>)> = HashMap::new();

    for batch in batches {
        let idx = |name: &str| batch.header.iter().position(|h| h == name);
        let (Some(state_i), Some(cd_i)) = (idx(geo[1]), idx(geo[2])) else {
            warn!("Skipping batch without geography columns");
            continue;
        };
        let name_i = idx(geo[0]);
        let batch_codes: Vec<(usize, &String)> = batch
            .header
            .iter()
            .enumerate()
            .filter(|(_, h)| !geo.contains(&h.as_str()))
            .collect();
        for (_, code) in &batch_codes {
            if !codes.contains(code) {
                codes.push((*code).clone());
            }
        }

        for row in &batch.rows {
            let get = |i: usize| row.get(i).cloned().unwrap_or_default();
            let key = (get(state_i), get(cd_i));
            let entry = merged.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                (name_i.map(get).unwrap_or_default(), HashMap::new())
            });
            for (i, code) in &batch_codes {
                let value = row.get(*i).and_then(|v| parse_value(v)).map(|v| v.to_string());
                entry.1.entry((*code).clone()).or_insert_with(|| value.unwrap_or_default());
            }
        }
    }

    let mut header: Vec<String> = geo.iter().map(|s| s.to_string()).collect();
    header.extend(codes.iter().cloned());
    let rows = order
        .into_iter()
        .filter_map(|key| {
            let (name, values) = merged.remove(&key)?;
            let mut row = vec![name, key.0, key.1];
            row.extend(codes.iter().map(|c| values.get(c).cloned().unwrap_or_default()));
            Some(row)
        })
        .collect();
    FetchedTable { header, rows }
}

/// Write a merged table as the measurement CSV
pub fn write_csv<W: Write>(table: &FetchedTable, writer: W) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(&table.header)?;
    for row in &table.rows {
        out.write_record(row)?;
    }
    out.flush()?;
    Ok(())
}

pub struct CensusClient {
    client: reqwest::Client,
    base_url: String,
    year: u16,
    api_key: Option<String>,
    batch_size: usize,
    policy: RetryPolicy,
}

impl CensusClient {
    pub fn new(
        base_url: &str,
        year: u16,
        api_key: Option<String>,
        batch_size: usize,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RankError::Configuration(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            year,
            api_key,
            batch_size: batch_size.max(1),
            policy,
        })
    }

    /// Request URL for one batch of codes
    pub fn batch_url(&self, codes: &[String], state: Option<u8>) -> String {
        let state = state.map(state_names::format_fips).unwrap_or_else(|| "*".to_string());
        let mut url = format!(
            "{}/{}/acs/acs5/profile?get=NAME,{}&for=congressional%20district:*&in=state:{}",
            self.base_url,
            self.year,
            codes.join(","),
            state
        );
        if let Some(key) = &self.api_key {
            url.push_str("&key=");
            url.push_str(key);
        }
        url
    }

    async fn fetch_batch(&self, codes: &[String], state: Option<u8>) -> Result<FetchedTable> {
        let url = self.batch_url(codes, state);
        let body = with_retry(self.policy, "Census request", |_| {
            let request = self.client.get(&url);
            async move {
                let response = request.send().await.map_err(|e| e.to_string())?;
                if !response.status().is_success() {
                    return Err(format!("status {}", response.status()));
                }
                response.text().await.map_err(|e| e.to_string())
            }
        })
        .await?;
        parse_response(&body)
    }

    /// Fetch every code for all districts (or one state's), merged by geography
    pub async fn fetch(&self, codes: &[String], state: Option<u8>) -> Result<FetchedTable> {
        let mut batches = Vec::new();
        for (i, chunk) in codes.chunks(self.batch_size).enumerate() {
            info!("Fetching batch {} ({} variables)", i + 1, chunk.len());
            batches.push(self.fetch_batch(chunk, state).await?);
        }
        let merged = merge_batches(&batches);
        info!("Fetched {} districts, {} columns", merged.rows.len(), merged.header.len());
        Ok(merged)
    }
}
