//! Congressional district lookup and ranking over ACS profile measures

pub mod catalog;
pub mod census_api;
pub mod config;
pub mod dataset;
pub mod error;
pub mod geography;
pub mod models;
pub mod narrative;
pub mod ranking;
pub mod render;
pub mod report;
pub mod state_names;
pub mod table;

pub use error::{RankError, Result};
