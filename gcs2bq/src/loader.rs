//! Copy one CSV object into one warehouse table.
//!
//! The procedure only talks to the outside world through [`BlobReader`] and
//! [`TableLoader`], so it runs the same against Google Cloud and against the
//! in-memory fakes in the tests below.

use std::{io::Write, str};

use crate::clouds::gcloud::bigquery::Labels;
use crate::common::*;

/// Something that can fetch the complete contents of an object.
#[async_trait]
pub(crate) trait BlobReader: Send + Sync {
    /// Read all of `path` in `bucket`. Fails with [`LoadError::NotFound`] if
    /// there is no such object.
    async fn read_blob(&self, bucket: &str, path: &str) -> Result<Bytes, LoadError>;
}

/// Something that can replace the contents of a warehouse table.
#[async_trait]
pub(crate) trait TableLoader: Send + Sync {
    /// Replace all rows of `dest` with `table`, creating `dest` if needed, and
    /// wait until the warehouse is done. Returns the number of rows written.
    async fn load_table(
        &self,
        dest: &TableName,
        table: &Table,
        options: &LoadOptions,
    ) -> Result<u64, LoadError>;
}

/// Extra settings for the warehouse load job.
#[derive(Clone, Debug, Default)]
pub(crate) struct LoadOptions {
    /// Labels to attach to the load job.
    pub(crate) labels: Labels,
    /// Where to run the load job. `None` lets the warehouse decide.
    pub(crate) location: Option<String>,
}

/// What to copy, and where.
#[derive(Clone, Debug)]
pub(crate) struct LoadRequest {
    /// The bucket containing our CSV object.
    pub(crate) bucket: String,
    /// The path of our CSV object in `bucket`.
    pub(crate) path: String,
    /// The table to overwrite.
    pub(crate) dest: TableName,
}

/// Copy `request.bucket`/`request.path` into `request.dest`, replacing whatever
/// was there, and return the number of rows written.
///
/// Progress lines go to `out`. The warehouse is not contacted unless the object
/// was read and parsed successfully.
#[instrument(
    level = "debug",
    skip_all,
    fields(bucket = %request.bucket, path = %request.path, dest = %request.dest)
)]
pub(crate) async fn load(
    blobs: &dyn BlobReader,
    warehouse: &dyn TableLoader,
    request: &LoadRequest,
    options: &LoadOptions,
    out: &mut (dyn Write + Send),
) -> Result<u64, LoadError> {
    let bytes = blobs.read_blob(&request.bucket, &request.path).await?;
    debug!("read {} bytes", bytes.len());
    let text = str::from_utf8(&bytes)?;
    let table = Table::from_csv_str(text)?;

    writeln!(out, "Columns found: {}", quoted_list(&table.column_names()))
        .context("cannot write output")?;
    writeln!(out, "Rows: {}", table.row_count()).context("cannot write output")?;

    let rows_loaded = warehouse
        .load_table(&request.dest, &table, options)
        .await?;
    writeln!(out, "Loaded {} rows to {}", rows_loaded, request.dest)
        .context("cannot write output")?;
    Ok(rows_loaded)
}

/// Format `names` as `['a', 'b']`, escaping backslashes and single quotes.
fn quoted_list(names: &[&str]) -> String {
    let quoted = names
        .iter()
        .map(|name| {
            let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
            format!("'{}'", escaped)
        })
        .collect::<Vec<_>>();
    format!("[{}]", quoted.join(", "))
}
