//! Download the catalog's measures for every congressional district
//!
//! Run: ./target/release/fetch_census --year 2017 [--state NY]
//!
//! Environment variables:
//!   CENSUS_API_KEY         - Statistics API access key
//!   DISTRICT_RANK_DATA_DIR - Directory holding Variables.csv; output lands here too

use anyhow::{Context, Result};
use clap::Parser;
use district_rank::{
    catalog::Catalog,
    census_api::{self, CensusClient, DEFAULT_BASE_URL},
    config::{init_logging, DataArgs, RemoteArgs},
    state_names,
};
use std::fs::File;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "fetch_census")]
#[command(about = "Fetch ACS profile measures by congressional district into a CSV")]
struct Args {
    #[command(flatten)]
    data: DataArgs,

    #[command(flatten)]
    remote: RemoteArgs,

    /// Survey year
    #[arg(long, default_value = "2017")]
    year: u16,

    /// Restrict to one state (FIPS, abbreviation, or name)
    #[arg(long)]
    state: Option<String>,

    /// Variable codes per request
    #[arg(long, default_value = "10")]
    batch_size: usize,

    #[arg(long, env = "CENSUS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let state = match args.state.as_deref() {
        None => None,
        Some(label) => Some(
            state_names::lookup(label)
                .with_context(|| format!("unknown state '{}'", label))?
                .fips,
        ),
    };

    let catalog = Catalog::from_path(args.data.variables_path())?;
    let codes: Vec<String> = catalog.iter().map(|v| v.code.clone()).collect();
    let scope = state
        .map(state_names::state_display_name)
        .unwrap_or_else(|| "all states".to_string());
    info!("Fetching {} variables for {}", codes.len(), scope);

    let client = CensusClient::new(
        &args.base_url,
        args.year,
        args.api_key.clone(),
        args.batch_size,
        args.remote.timeout(),
        args.remote.policy(),
    )?;
    let table = client.fetch(&codes, state).await?;

    let out_path = args.data.measurements_path();
    let file = File::create(&out_path).with_context(|| format!("cannot create {:?}", out_path))?;
    census_api::write_csv(&table, file)?;
    info!("Wrote {} districts to {:?}", table.rows.len(), out_path);

    Ok(())
}
