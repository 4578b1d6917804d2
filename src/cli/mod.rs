//! Command-line interface for tripwright.

pub mod commands;
pub mod display;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::check::CheckArgs;
use commands::config::ConfigArgs;
use commands::plan::PlanArgs;

#[derive(Parser, Debug)]
#[command(name = "tripwright", version, about = "Plan group trips from collected intake facts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file replacing the .tripwright/ lookup
    #[arg(long, global = true, env = "TRIPWRIGHT_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Report which intake fields are still missing
    Check(CheckArgs),
    /// Run every planning domain and print the trip summary
    Plan(PlanArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

/// Print an error in the selected output mode and exit non-zero.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({ "error": format!("{err:#}") });
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );
    } else {
        eprintln!("{}", display::action_failure(&format!("{err:#}")));
    }
    std::process::exit(1);
}
