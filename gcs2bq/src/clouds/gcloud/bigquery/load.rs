//! Load an in-memory table into BigQuery.

use serde::Serialize;
use serde_json::{Map, Number, Value as JsonValue};

use super::{
    super::{Client, ClientError},
    jobs::{
        wait_for_job, CreateDisposition, Job, JobConfigurationLoad, JobError,
        SourceFormat, TableReference, WriteDisposition,
    },
    BigQueryError, TableFieldSchema, TableSchema,
};
use crate::common::*;
use crate::loader::{LoadOptions, TableLoader};
use crate::table::{DataType, Value};

/// Parameters for an upload query.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadQuery {
    /// The type of the upload we're performing.
    upload_type: &'static str,
}

/// Loads tables into BigQuery by uploading them with a load job.
#[derive(Clone, Debug)]
pub(crate) struct BigQueryTableLoader {
    client: Client,
}

impl BigQueryTableLoader {
    /// Load tables using `client`.
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TableLoader for BigQueryTableLoader {
    async fn load_table(
        &self,
        dest: &TableName,
        table: &Table,
        options: &LoadOptions,
    ) -> Result<u64, LoadError> {
        load(&self.client, dest, table, options).await
    }
}

/// Replace the contents of `dest` with `table`, and return the number of rows
/// BigQuery says it wrote.
#[instrument(level = "debug", skip_all, fields(dest = %dest))]
pub(crate) async fn load(
    client: &Client,
    dest: &TableName,
    table: &Table,
    options: &LoadOptions,
) -> Result<u64, LoadError> {
    let data = table_to_ndjson(table)?;
    let job = Job::new_load(
        dest.project(),
        options.location.as_deref(),
        load_config(dest, table),
        options.labels.clone(),
    );
    debug!(
        "uploading {} bytes to {} as job {}",
        data.len(),
        dest,
        job.reference()?.job_id,
    );

    let url = format!(
        "https://bigquery.googleapis.com/upload/bigquery/v2/projects/{}/jobs",
        dest.project(),
    );
    let query = UploadQuery {
        upload_type: "multipart",
    };
    let job = client
        .post_multipart_related::<Job, _, _, _>(
            &url,
            query,
            &job,
            &mime::APPLICATION_OCTET_STREAM,
            Bytes::from(data),
        )
        .await
        .map_err(|err| submit_error(dest, err))?;

    let job = wait_for_job(client, job)
        .await
        .map_err(|err| job_error(dest, err))?;
    Ok(job.output_rows()?)
}

/// Describe a failed job submission. If BigQuery refused the job itself, the
/// load job failed.
fn submit_error(dest: &TableName, err: ClientError) -> LoadError {
    match err {
        ClientError::Api { error, .. } => rejected(dest, BigQueryError::from(&error)),
        err => client_error(dest, err),
    }
}

/// Describe a failure while waiting for a submitted job.
fn job_error(dest: &TableName, err: JobError) -> LoadError {
    match err {
        JobError::Failed(error) => rejected(dest, error),
        JobError::Client(err) => client_error(dest, err),
    }
}

/// BigQuery refused to load `dest`.
fn rejected(dest: &TableName, error: BigQueryError) -> LoadError {
    if error.is_access_denied() {
        warn!(
            "access denied loading {}; the caller needs bigquery.jobs.create and write access to the dataset",
            dest,
        );
    }
    LoadError::LoadJob {
        table: dest.to_owned(),
        error,
    }
}

/// Describe a failed request to BigQuery.
fn client_error(dest: &TableName, err: ClientError) -> LoadError {
    LoadError::Other(Error::new(err).context(format!("could not load {}", dest)))
}

/// Build our load configuration: replace the table's contents, creating it if
/// needed.
///
/// The schema always lists every column in header order with its inferred
/// type. Columns which are entirely `NULL` never appear in the uploaded rows,
/// so schema detection alone would drop them.
fn load_config(dest: &TableName, table: &Table) -> JobConfigurationLoad {
    let schema = TableSchema {
        fields: table
            .columns()
            .iter()
            .map(|column| TableFieldSchema {
                name: column.name().to_owned(),
                ty: bigquery_type(column.data_type()).to_owned(),
                mode: "NULLABLE".to_owned(),
            })
            .collect(),
    };
    JobConfigurationLoad {
        source_format: SourceFormat::NewlineDelimitedJson,
        autodetect: true,
        schema: Some(schema),
        destination_table: TableReference::from(dest),
        create_disposition: Some(CreateDisposition::CreateIfNeeded),
        write_disposition: Some(WriteDisposition::WriteTruncate),
    }
}

/// The GoogleSQL name of `data_type`.
fn bigquery_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Bool => "BOOL",
        DataType::Int64 => "INT64",
        DataType::Float64 => "FLOAT64",
        DataType::String => "STRING",
    }
}

/// Serialize `table` as newline-delimited JSON, one object per row, with keys
/// in header order. `NULL` cells are left out of their row's object.
fn table_to_ndjson(table: &Table) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for row_idx in 0..table.row_count() {
        let mut row = Map::with_capacity(table.columns().len());
        for column in table.columns() {
            let json = match &column.values()[row_idx] {
                Value::Null => continue,
                Value::Bool(b) => JsonValue::Bool(*b),
                Value::Int64(i) => JsonValue::Number(Number::from(*i)),
                Value::Float64(f) => JsonValue::Number(
                    Number::from_f64(*f)
                        .ok_or_else(|| format_err!("cannot represent {} in JSON", f))?,
                ),
                Value::String(s) => JsonValue::String(s.clone()),
            };
            row.insert(column.name().to_owned(), json);
        }
        serde_json::to_writer(&mut out, &row)?;
        out.push(b'\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clouds::gcloud::error_from_body;
    use pretty_assertions::assert_eq;
    use reqwest::StatusCode;
    use serde_json::json;

    #[test]
    fn rows_become_typed_json_lines() {
        let table = Table::from_csv_str("id,name,score,ok\n1,ann,1.5,true\n2,,NA,False\n")
            .unwrap();
        let ndjson = String::from_utf8(table_to_ndjson(&table).unwrap()).unwrap();
        let rows = ndjson
            .lines()
            .map(|line| serde_json::from_str::<JsonValue>(line).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(
            rows,
            vec![
                json!({ "id": 1, "name": "ann", "score": 1.5, "ok": true }),
                json!({ "id": 2, "ok": false }),
            ],
        );
        assert!(ndjson.ends_with('\n'));
    }

    #[test]
    fn json_keys_follow_header_order() {
        let table = Table::from_csv_str("z,a,m\n1,2,x\n").unwrap();
        let ndjson = String::from_utf8(table_to_ndjson(&table).unwrap()).unwrap();
        assert_eq!(ndjson, "{\"z\":1,\"a\":2,\"m\":\"x\"}\n");
    }

    #[test]
    fn load_config_truncates_and_autodetects() {
        let dest = TableName::new("p", "d", "t");
        let table = Table::from_csv_str("b,a,ok\n1,x,true\n3,y,false\n").unwrap();
        let config = serde_json::to_value(load_config(&dest, &table)).unwrap();
        assert_eq!(
            config,
            json!({
                "sourceFormat": "NEWLINE_DELIMITED_JSON",
                "autodetect": true,
                "schema": { "fields": [
                    { "name": "b", "type": "INT64", "mode": "NULLABLE" },
                    { "name": "a", "type": "STRING", "mode": "NULLABLE" },
                    { "name": "ok", "type": "BOOL", "mode": "NULLABLE" },
                ]},
                "destinationTable": { "projectId": "p", "datasetId": "d", "tableId": "t" },
                "createDisposition": "CREATE_IF_NEEDED",
                "writeDisposition": "WRITE_TRUNCATE",
            }),
        );
    }

    #[test]
    fn all_null_columns_stay_in_the_schema() {
        let dest = TableName::new("p", "d", "t");
        let table = Table::from_csv_str("a,b\n1,\n2,\n").unwrap();
        let config = serde_json::to_value(load_config(&dest, &table)).unwrap();
        assert_eq!(
            config["schema"],
            json!({ "fields": [
                { "name": "a", "type": "INT64", "mode": "NULLABLE" },
                { "name": "b", "type": "STRING", "mode": "NULLABLE" },
            ]}),
        );
        let ndjson = String::from_utf8(table_to_ndjson(&table).unwrap()).unwrap();
        assert_eq!(ndjson, "{\"a\":1}\n{\"a\":2}\n");
    }

    #[test]
    fn refused_submissions_are_load_job_errors() {
        let dest = TableName::new("p", "d", "t");
        let url = "https://bigquery.googleapis.com/upload/bigquery/v2/projects/p/jobs"
            .parse::<Url>()
            .unwrap();
        let body = br#"{"error": {"code": 403, "message": "Access Denied", "errors": [
            {"domain": "global", "reason": "accessDenied", "message": "Access Denied: Project p"}
        ]}}"#;
        let client_err = error_from_body("POST", &url, StatusCode::FORBIDDEN, true, body);
        match submit_error(&dest, client_err) {
            LoadError::LoadJob { table, error } => {
                assert_eq!(table, dest);
                assert!(error.is_access_denied());
                assert_eq!(error.to_string(), "accessDenied: Access Denied: Project p");
            }
            other => panic!("expected a load job error, found {:?}", other),
        }

        let client_err = error_from_body(
            "POST",
            &url,
            StatusCode::BAD_GATEWAY,
            false,
            b"<html>bad gateway</html>",
        );
        assert!(matches!(
            submit_error(&dest, client_err),
            LoadError::Other(_),
        ));
    }

    #[test]
    fn failed_jobs_are_load_job_errors() {
        let dest = TableName::new("p", "d", "t");
        for reason in ["invalid", "accessDenied"] {
            let failed = JobError::Failed(BigQueryError::new(reason, "no"));
            match job_error(&dest, failed) {
                LoadError::LoadJob { table, error } => {
                    assert_eq!(table, dest);
                    assert_eq!(error, BigQueryError::new(reason, "no"));
                }
                other => panic!("expected a load job error, found {:?}", other),
            }
        }

        let poll_failed = JobError::Client(ClientError::Other(format_err!("timed out")));
        let err = job_error(&dest, poll_failed);
        assert!(matches!(err, LoadError::Other(_)), "{:?}", err);
        assert!(err.to_string().contains("could not load p.d.t"), "{}", err);
    }

    #[test]
    fn empty_tables_carry_a_header_schema() {
        let dest = TableName::new("p", "d", "t");
        let table = Table::from_csv_str("a,b\n").unwrap();
        let config = serde_json::to_value(load_config(&dest, &table)).unwrap();
        assert_eq!(
            config["schema"],
            json!({ "fields": [
                { "name": "a", "type": "STRING", "mode": "NULLABLE" },
                { "name": "b", "type": "STRING", "mode": "NULLABLE" },
            ]}),
        );
        assert!(table_to_ndjson(&table).unwrap().is_empty());
    }
}
