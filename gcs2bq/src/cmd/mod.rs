//! Command parsing.

use clap::{Parser, Subcommand};

use crate::common::*;
use crate::config::Configuration;
use crate::logging::LogFormat;

pub(crate) mod load;

/// Command-line options, parsed using `clap`.
#[derive(Debug, Parser)]
#[command(
    name = "gcs2bq",
    version,
    about = "Copy a CSV object from Google Cloud Storage into a BigQuery table."
)]
pub(crate) struct Opt {
    /// Log format (indented, flat, json). Set the level with RUST_LOG.
    #[arg(long = "log-format", global = true, default_value = "indented")]
    pub(crate) log_format: LogFormat,

    /// The command to run.
    #[command(subcommand)]
    pub(crate) cmd: Command,
}

/// The command to run.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Replace a BigQuery table with the contents of a CSV object.
    #[command(after_help = r#"EXAMPLE:
    gcs2bq load --bucket my-bucket --path exports/users.csv \
        --project my-project --dataset staging --table users
"#)]
    Load {
        #[command(flatten)]
        command: load::Opt,
    },
}

pub(crate) async fn run(config: Configuration, opt: Opt) -> Result<()> {
    match opt.cmd {
        Command::Load { command } => load::run(config, command).await,
    }
}
