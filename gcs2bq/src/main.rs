//! A CLI tool for copying a CSV object from Cloud Storage into BigQuery.

#![warn(rust_2018_idioms, unused_extern_crates, clippy::all)]

use clap::Parser;
use std::process;

mod clouds;
mod cmd;
mod config;
mod errors;
mod loader;
mod logging;
mod table;
mod table_name;
mod tls;

/// Definitions included by all the files in this crate.
#[allow(unused_imports)]
pub(crate) mod common {
    pub(crate) use anyhow::{format_err, Context, Error, Result};
    pub(crate) use async_trait::async_trait;
    pub(crate) use bytes::Bytes;
    pub(crate) use tracing::{debug, error, info, instrument, trace, warn};
    pub(crate) use url::Url;

    pub(crate) use crate::{errors::LoadError, table::Table, table_name::TableName};
}

use crate::common::*;
use crate::config::Configuration;

fn main() {
    let opt = cmd::Opt::parse();
    if let Err(err) = run(opt) {
        eprintln!("Error: {:?}", err);
        process::exit(1);
    }
}

fn run(opt: cmd::Opt) -> Result<()> {
    opt.log_format.install()?;
    tls::install_crypto_provider()?;
    debug!("{:?}", opt);

    let config = Configuration::try_default()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("could not start tokio runtime")?;
    runtime.block_on(cmd::run(config, opt))
}
