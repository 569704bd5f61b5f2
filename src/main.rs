//! District lookup CLI
//!
//! Run: ./target/release/district_rank zip 10001
//!      ./target/release/district_rank measure "unemployed" --state NY --top 20
//!      ./target/release/district_rank top "NY-12"
//!      ./target/release/district_rank narrate 10001
//!
//! Environment variables:
//!   DISTRICT_RANK_DATA_DIR - Directory holding the input CSV files
//!   DISTRICT_RANK_CONGRESS - Congress number used in district names
//!   DISTRICT_RANK_WORKERS  - Concurrency bound for the top-measures scan
//!   OPENAI_API_KEY         - Key for the narrative endpoint
//!   RUST_LOG               - Log filter (default: info)

use anyhow::Result;
use clap::{Parser, Subcommand};
use district_rank::{
    config::{init_logging, DataArgs, RemoteArgs},
    dataset::Dataset,
    narrative::{NarrativeClient, DEFAULT_LLM_URL, DEFAULT_MODEL},
    ranking::RankScope,
    render,
    report::{leaderboard, top_measures},
    state_names, RankError,
};
use serde::Serialize;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "district_rank")]
#[command(about = "Rank congressional districts by ACS profile measures")]
struct Args {
    #[command(flatten)]
    data: DataArgs,

    /// Print JSON instead of a table
    #[arg(long, global = true)]
    json: bool,

    /// Disable ANSI colors in tables
    #[arg(long, global = true)]
    no_color: bool,

    /// Maximum number of variables ranked concurrently
    #[arg(long, env = "DISTRICT_RANK_WORKERS", default_value = "8", global = true)]
    workers: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the measures for the district containing a ZIP code
    Zip {
        zip: String,
        /// Rank against districts of the same state instead of nationwide
        #[arg(long)]
        state_scope: bool,
    },
    /// Search variable descriptions
    Search { term: String },
    /// Rank all districts by one measure
    Measure {
        /// Variable code, or a search term matching exactly one description
        variable: String,
        /// Restrict the ranking to one state (FIPS, abbreviation, or name)
        #[arg(long)]
        state: Option<String>,
        /// Number of districts to show
        #[arg(long, default_value = "10", value_parser = clap::value_parser!(u16).range(1..=100))]
        top: u16,
    },
    /// List the measures where a district ranks in the national top 10
    Top {
        /// District label such as "NY-12" or a descriptive district name
        district: String,
    },
    /// Ask a language model for a narrative about a ZIP code's district
    Narrate {
        zip: String,
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: String,
        #[arg(long, default_value = DEFAULT_LLM_URL)]
        llm_url: String,
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
        #[command(flatten)]
        remote: RemoteArgs,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let dataset = match Dataset::load(&args.data) {
        Ok(d) => d,
        Err(e) => {
            error!("Data could not be loaded: {}", e);
            anyhow::bail!("Data could not be loaded. Please check the data files.");
        }
    };

    match run(&args, &dataset).await {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast_ref::<RankError>() {
            Some(rank_error) if rank_error.is_recoverable() => {
                println!("{}", user_message(rank_error));
                Ok(())
            }
            _ => Err(e),
        },
    }
}

fn user_message(e: &RankError) -> String {
    match e {
        RankError::InvalidZipFormat(_) => {
            "Invalid ZIP code format. Please enter a valid ZIP code.".to_string()
        }
        RankError::NotFound(what) => format!("{} not found. Please try another.", what),
        RankError::NoDataForDistrict(d) => {
            format!("No data found for district {}. Please try another.", d)
        }
        other => other.to_string(),
    }
}

async fn run(args: &Args, dataset: &Dataset) -> Result<()> {
    let color = !args.no_color;

    match &args.command {
        Command::Zip { zip, state_scope } => {
            let (resolved, report) = dataset.report_for_zip(zip, *state_scope)?;
            if args.json {
                return print_json(&report);
            }
            println!(
                "ZIP {} -> {} ({}, district {})",
                resolved.mapping.zip,
                resolved.mapping.key,
                resolved.mapping.state_name,
                resolved.mapping.key.district
            );
            print!("{}", render::district_report(&report, color));
        }
        Command::Search { term } => {
            let hits = dataset.catalog().search(term);
            if args.json {
                return print_json(&hits);
            }
            if hits.is_empty() {
                println!("No variables found matching your search term.");
            }
            for v in hits {
                println!("  {:<14} {}", v.code, v.description);
            }
        }
        Command::Measure { variable, state, top } => {
            let catalog = dataset.catalog();
            let var = match catalog.get(variable) {
                Some(v) => v,
                None => {
                    let hits = catalog.search(variable);
                    match hits.as_slice() {
                        [] => {
                            println!("No variables found matching your search term.");
                            return Ok(());
                        }
                        [only] => *only,
                        many => {
                            println!("{} variables match; pick one by code:", many.len());
                            for v in many {
                                println!("  {:<14} {}", v.code, v.description);
                            }
                            return Ok(());
                        }
                    }
                }
            };

            let scope = match state.as_deref() {
                None => RankScope::National,
                Some(label) => match state_names::lookup(label) {
                    Some(info) => RankScope::State(info.fips),
                    None => {
                        println!("Unknown state '{}'.", label);
                        return Ok(());
                    }
                },
            };

            let entries = leaderboard(dataset.engine(), &var.code, scope, *top as usize)?;
            if args.json {
                return print_json(&entries);
            }
            let title = format!("Top {} districts by {} ({})", top, var.description, scope);
            print!("{}", render::leaderboard(&title, &entries));
        }
        Command::Top { district } => {
            let row = dataset.resolver().resolve_label(district)?;
            let engine = dataset.engine().clone();
            let top = top_measures(engine, dataset.catalog().clone(), row, args.workers).await?;
            if args.json {
                return print_json(&top);
            }
            print!("{}", render::top_measures(&top));
        }
        Command::Narrate { zip, api_key, llm_url, model, remote } => {
            let (_, report) = dataset.report_for_zip(zip, false)?;
            let client = NarrativeClient::new(
                llm_url,
                api_key.clone(),
                model,
                remote.timeout(),
                remote.policy(),
            )?;
            let text = client.narrate(&report).await?;
            if args.json {
                return print_json(&serde_json::json!({
                    "district": report.district,
                    "narrative": text,
                }));
            }
            print!("{}", render::section_header(&format!("Narrative for {}", report.district)));
            println!("{}", text);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workers_is_a_global_option() {
        let args = Args::parse_from(["district_rank", "top", "NY-12", "--workers", "3"]);
        assert_eq!(args.workers, 3);
        let args = Args::parse_from(["district_rank", "--workers", "2", "zip", "10001"]);
        assert_eq!(args.workers, 2);
        assert!(matches!(args.command, Command::Zip { .. }));
    }
}
