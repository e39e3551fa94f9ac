//! Ways a load can fail.

use std::{error, fmt, str::Utf8Error};

use crate::clouds::gcloud::bigquery::BigQueryError;
use crate::common::*;
use crate::table::ParseError;

/// An error from the load procedure.
///
/// Every variant aborts the load. Nothing is retried.
#[derive(Debug)]
pub(crate) enum LoadError {
    /// The source object does not exist.
    NotFound { bucket: String, path: String },
    /// The source object is not valid UTF-8.
    Decode(Utf8Error),
    /// The source object is not valid CSV.
    Parse(ParseError),
    /// BigQuery ran the load job, and the job failed.
    LoadJob { table: TableName, error: BigQueryError },
    /// Anything else, such as an authentication or network failure.
    Other(Error),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::NotFound { bucket, path } => {
                write!(f, "gs://{}/{} does not exist", bucket, path)
            }
            LoadError::Decode(err) => {
                write!(f, "CSV data is not valid UTF-8: {}", err)
            }
            LoadError::Parse(err) => write!(f, "could not parse CSV data: {}", err),
            LoadError::LoadJob { table, error } => {
                write!(f, "BigQuery load job for {} failed: {}", table, error)
            }
            LoadError::Other(err) => write!(f, "{:#}", err),
        }
    }
}

impl error::Error for LoadError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            LoadError::NotFound { .. } => None,
            LoadError::Decode(err) => Some(err),
            LoadError::Parse(err) => Some(err),
            LoadError::LoadJob { error, .. } => Some(error),
            LoadError::Other(err) => err.source(),
        }
    }
}

impl From<Utf8Error> for LoadError {
    fn from(err: Utf8Error) -> Self {
        LoadError::Decode(err)
    }
}

impl From<ParseError> for LoadError {
    fn from(err: ParseError) -> Self {
        LoadError::Parse(err)
    }
}

impl From<Error> for LoadError {
    fn from(err: Error) -> Self {
        LoadError::Other(err)
    }
}
