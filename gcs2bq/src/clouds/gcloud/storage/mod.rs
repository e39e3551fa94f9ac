//! Interfaces to Google Cloud Storage.

use crate::common::*;
use crate::loader::BlobReader;

use super::{Client, ClientError};

mod download_file;

pub(crate) use download_file::download_file;

/// Reads whole objects out of Cloud Storage.
#[derive(Clone, Debug)]
pub(crate) struct GcsBlobReader {
    client: Client,
}

impl GcsBlobReader {
    /// Read blobs using `client`.
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlobReader for GcsBlobReader {
    async fn read_blob(&self, bucket: &str, path: &str) -> Result<Bytes, LoadError> {
        match download_file(&self.client, bucket, path).await {
            Ok(bytes) => Ok(bytes),
            Err(ClientError::NotFound { .. }) => Err(LoadError::NotFound {
                bucket: bucket.to_owned(),
                path: path.to_owned(),
            }),
            Err(err) => Err(LoadError::Other(
                Error::new(err).context(format!("could not read gs://{}/{}", bucket, path)),
            )),
        }
    }
}
