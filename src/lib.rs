//! Common functionality for gridplan.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod cli;
pub mod error;
pub mod finance;
pub mod graph;
pub mod id;
pub mod input;
pub mod log;
pub mod model;
pub mod network;
pub mod optimisation;
pub mod output;
pub mod run;
pub mod scenario;
pub mod settings;
pub mod snapshot;
pub mod solution;
pub mod statistics;
pub mod sweep;
pub mod technology;
pub mod topology;
pub mod units;

#[cfg(test)]
mod fixture;

/// Get the path to the directory where gridplan's program settings live
pub fn get_gridplan_config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("gridplan");

    path
}
