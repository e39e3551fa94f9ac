//! The `load` subcommand.

use clap::Args;
use std::io;

use crate::clouds::gcloud::{bigquery::BigQueryTableLoader, storage::GcsBlobReader, Client};
use crate::common::*;
use crate::config::Configuration;
use crate::loader::{self, LoadOptions, LoadRequest};

/// Copy a CSV object into a BigQuery table.
#[derive(Debug, Args)]
pub(crate) struct Opt {
    /// The Cloud Storage bucket containing the CSV object.
    #[arg(long = "bucket")]
    bucket: String,

    /// The path of the CSV object within the bucket.
    #[arg(long = "path")]
    path: String,

    /// The Google Cloud project owning the dataset. Defaults to `project` in
    /// gcs2bq.toml.
    #[arg(long = "project")]
    project: Option<String>,

    /// The BigQuery dataset. Defaults to `dataset` in gcs2bq.toml.
    #[arg(long = "dataset")]
    dataset: Option<String>,

    /// The BigQuery table to create or overwrite.
    #[arg(long = "table")]
    table: String,

    /// Where to run the load job, such as `US` or `EU`. Defaults to
    /// `location` in gcs2bq.toml.
    #[arg(long = "location")]
    location: Option<String>,

    /// A label to attach to the load job. May be repeated.
    #[arg(long = "job-label", value_name = "KEY=VALUE", value_parser = parse_job_label)]
    job_labels: Vec<(String, String)>,
}

/// Parse a `KEY=VALUE` job label.
fn parse_job_label(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format_err!("expected KEY=VALUE, found {:?}", s)),
    }
}

/// Pick the command-line value if present, otherwise the configured one.
fn resolve(
    arg: Option<String>,
    configured: Option<&str>,
    name: &str,
) -> Result<String> {
    arg.or_else(|| configured.map(str::to_owned)).ok_or_else(|| {
        format_err!("no {} given: pass --{} or set `{}` in gcs2bq.toml", name, name, name)
    })
}

/// Run our load.
pub(crate) async fn run(config: Configuration, opt: Opt) -> Result<()> {
    let project = resolve(opt.project, config.project()?, "project")?;
    let dataset = resolve(opt.dataset, config.dataset()?, "dataset")?;
    let location = opt.location.or(config.location()?.map(str::to_owned));

    let request = LoadRequest {
        bucket: opt.bucket,
        path: opt.path,
        dest: TableName::new(project, dataset, opt.table),
    };
    let options = LoadOptions {
        labels: opt.job_labels.into_iter().collect(),
        location,
    };
    debug!("loading with {:?}", options);

    let client = Client::new().await?;
    let blobs = GcsBlobReader::new(client.clone());
    let warehouse = BigQueryTableLoader::new(client);
    let mut stdout = io::stdout();
    loader::load(&blobs, &warehouse, &request, &options, &mut stdout).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_labels_are_parsed() {
        assert_eq!(
            parse_job_label("team=data").unwrap(),
            ("team".to_owned(), "data".to_owned()),
        );
        assert_eq!(
            parse_job_label("empty=").unwrap(),
            ("empty".to_owned(), "".to_owned()),
        );
        assert!(parse_job_label("team").is_err());
        assert!(parse_job_label("=data").is_err());
    }

    #[test]
    fn arguments_win_over_configuration() {
        assert_eq!(
            resolve(Some("cli".to_owned()), Some("file"), "project").unwrap(),
            "cli",
        );
        assert_eq!(resolve(None, Some("file"), "project").unwrap(), "file");
        let err = resolve(None, None, "dataset").unwrap_err().to_string();
        assert!(err.contains("--dataset"), "{}", err);
    }
}
