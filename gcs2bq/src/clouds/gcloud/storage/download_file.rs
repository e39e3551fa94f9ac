//! Download a file from Google Cloud storage.

use serde::Serialize;

use super::super::{percent_encode, Alt, Client, ClientError};
use crate::common::*;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadQuery {
    /// What format should we return?
    alt: Alt,
}

/// The JSON API URL of `object` in `bucket`.
fn object_url(bucket: &str, object: &str) -> String {
    format!(
        "https://storage.googleapis.com/storage/v1/b/{}/o/{}",
        percent_encode(bucket),
        percent_encode(object),
    )
}

/// Download the entire contents of `gs://{bucket}/{object}` into memory.
#[instrument(level = "trace", skip(client))]
pub(crate) async fn download_file(
    client: &Client,
    bucket: &str,
    object: &str,
) -> Result<Bytes, ClientError> {
    debug!("downloading gs://{}/{}", bucket, object);
    let url = object_url(bucket, object);
    let query = DownloadQuery { alt: Alt::Media };
    client.get_bytes(&url, query).await
}

#[test]
fn object_urls_escape_slashes() {
    assert_eq!(
        object_url("my-bucket", "path/to/file.csv"),
        "https://storage.googleapis.com/storage/v1/b/my%2Dbucket/o/path%2Fto%2Ffile%2Ecsv",
    );
}
