//! Interfaces to BigQuery.

use serde::{Deserialize, Serialize};
use std::{error, fmt};

use super::GCloudError;

pub(crate) mod jobs;
mod load;

pub(crate) use jobs::Labels;
pub(crate) use load::*;

/// A BigQuery error.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BigQueryError {
    /// The reason for this error.
    reason: String,

    /// If present, where this error occurred.
    location: Option<String>,

    /// Internal Google information about this error.
    debug_info: Option<String>,

    /// A human-readable description of this error.
    message: String,
}

impl BigQueryError {
    /// Build an error by hand. Used by fakes which stand in for BigQuery.
    #[cfg(test)]
    pub(crate) fn new(reason: &str, message: &str) -> Self {
        BigQueryError {
            reason: reason.to_owned(),
            location: None,
            debug_info: None,
            message: message.to_owned(),
        }
    }

    /// Is this an "access denied" error?
    pub(crate) fn is_access_denied(&self) -> bool {
        self.reason.starts_with("accessDenied")
    }
}

impl fmt::Display for BigQueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)?;
        if let Some(location) = &self.location {
            write!(f, " at {}", location)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl error::Error for BigQueryError {}

impl From<&GCloudError> for BigQueryError {
    /// Describe a rejected request using its first error detail, which is where
    /// BigQuery puts the reason code.
    fn from(err: &GCloudError) -> Self {
        match err.errors.first() {
            Some(detail) => BigQueryError {
                reason: detail.reason.clone(),
                location: detail.location.clone(),
                debug_info: None,
                message: detail.message.clone(),
            },
            None => BigQueryError {
                reason: err.code.to_string(),
                location: None,
                debug_info: None,
                message: err.message.clone(),
            },
        }
    }
}

/// The schema of a BigQuery table.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TableSchema {
    /// The fields in the table.
    pub(crate) fields: Vec<TableFieldSchema>,
}

/// A single column in a [`TableSchema`].
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TableFieldSchema {
    /// The column name.
    pub(crate) name: String,
    /// The GoogleSQL type name, such as `INT64`.
    #[serde(rename = "type")]
    pub(crate) ty: String,
    /// `NULLABLE`, `REQUIRED` or `REPEATED`.
    pub(crate) mode: String,
}

#[test]
fn bigquery_errors_display_reason_location_and_message() {
    let err = serde_json::from_str::<BigQueryError>(
        r#"{"reason": "invalid", "location": "gs://b/p.csv", "message": "bad row"}"#,
    )
    .unwrap();
    assert_eq!(err.to_string(), "invalid at gs://b/p.csv: bad row");
    assert!(!err.is_access_denied());

    let denied = BigQueryError::new("accessDenied", "no");
    assert!(denied.is_access_denied());
    assert_eq!(denied.to_string(), "accessDenied: no");
}

#[test]
fn rejected_requests_become_bigquery_errors() {
    let detailed = serde_json::from_str::<GCloudError>(
        r#"{"code": 400, "message": "Invalid table ID", "errors": [
            {"domain": "global", "reason": "invalid", "message": "Invalid table ID \"a b\".", "location": "tableId"}
        ]}"#,
    )
    .unwrap();
    let err = BigQueryError::from(&detailed);
    assert_eq!(err.to_string(), "invalid at tableId: Invalid table ID \"a b\".");

    let bare = serde_json::from_str::<GCloudError>(
        r#"{"code": 403, "message": "Permission denied"}"#,
    )
    .unwrap();
    assert_eq!(BigQueryError::from(&bare).to_string(), "403: Permission denied");
}
