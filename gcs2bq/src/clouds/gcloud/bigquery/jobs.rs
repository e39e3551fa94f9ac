//! BigQuery batch jobs.
//!
//! These use a number of closely-related types.

use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::time::{sleep, Duration};

use super::{
    super::{Client, ClientError, NoQuery},
    BigQueryError, TableSchema,
};
use crate::common::*;

/// Key/value pairs. See [JobConfiguration][config].
///
/// [config]: https://cloud.google.com/bigquery/docs/reference/rest/v2/Job#jobconfiguration
pub(crate) type Labels = HashMap<String, String>;

/// A BigQuery job.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Job {
    /// Output only. The ID of this job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,

    /// Output only. A link which can be used to access this job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) self_link: Option<String>,

    /// The configuration for this job.
    pub(crate) configuration: JobConfiguration,

    /// A reference to this job. We fill this in ourselves so that the job ID
    /// is known before we submit it.
    pub(crate) job_reference: Option<JobReference>,

    /// Output only. The status of this job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) status: Option<JobStatus>,

    /// Output only. Statistics about this job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) statistics: Option<JobStatistics>,
}

impl Job {
    /// Create a new load job in `project_id`.
    pub(crate) fn new_load(
        project_id: &str,
        location: Option<&str>,
        load_config: JobConfigurationLoad,
        labels: Labels,
    ) -> Self {
        let configuration = JobConfiguration {
            load: Some(load_config),
            labels,
            ..JobConfiguration::default()
        };
        Job {
            id: None,
            self_link: None,
            configuration,
            job_reference: Some(JobReference::new(project_id, location)),
            status: None,
            statistics: None,
        }
    }

    /// Get the job reference, which must be present on any job returned by
    /// BigQuery.
    pub(crate) fn reference(&self) -> Result<&JobReference> {
        self.job_reference
            .as_ref()
            .ok_or_else(|| format_err!("newly created job has no jobReference"))
    }

    /// Get a URL which can be used for this job.
    pub(crate) fn url(&self) -> Result<Url> {
        self.self_link
            .as_ref()
            .ok_or_else(|| format_err!("newly created job has no selfLink"))?
            .parse::<Url>()
            .context("BigQuery returned invalid selfLink")
    }

    /// Has this job stopped running?
    pub(crate) fn is_done(&self) -> bool {
        self.status.as_ref().map(|s| s.state) == Some(JobState::Done)
    }

    /// The number of rows written by a finished load job.
    ///
    /// BigQuery encodes `int64` values as JSON strings. A finished load job
    /// which wrote nothing may omit the statistic entirely.
    pub(crate) fn output_rows(&self) -> Result<u64> {
        let output_rows = self
            .statistics
            .as_ref()
            .and_then(|s| s.load.as_ref())
            .and_then(|l| l.output_rows.as_deref());
        match output_rows {
            Some(rows) => rows
                .parse::<u64>()
                .with_context(|| format!("could not parse outputRows {:?}", rows)),
            None => Ok(0),
        }
    }
}

/// A compound job ID containing project and region information.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobReference {
    /// The project containing this job.
    pub(crate) project_id: String,

    /// The bare ID, suitable for use in URL.
    pub(crate) job_id: String,

    /// The location of this job. If we don't specify one, BigQuery picks one
    /// based on the destination dataset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) location: Option<String>,
}

impl JobReference {
    /// Create a reference with a fresh, random job ID.
    fn new(project_id: &str, location: Option<&str>) -> Self {
        JobReference {
            project_id: project_id.to_owned(),
            job_id: format!("{}_{}", env!("CARGO_PKG_NAME"), random_tag()),
            location: location.map(str::to_owned),
        }
    }
}

/// A random alphanumeric tag, used to make job IDs unique.
fn random_tag() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// Configuration for a job.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobConfiguration {
    /// Configuration information load jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) load: Option<JobConfigurationLoad>,

    /// Labels to attach to jobs.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub(crate) labels: Labels,
}

/// Configuration for data load jobs.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobConfigurationLoad {
    /// The format of the uploaded data.
    pub(crate) source_format: SourceFormat,
    /// Let BigQuery infer the schema from the data.
    pub(crate) autodetect: bool,
    /// An explicit schema. Only needed when there's no data to infer from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) schema: Option<TableSchema>,
    pub(crate) destination_table: TableReference,
    pub(crate) create_disposition: Option<CreateDisposition>,
    pub(crate) write_disposition: Option<WriteDisposition>,
}

/// Formats of data that we can load.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Serialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum SourceFormat {
    NewlineDelimitedJson,
}

/// The status of a job.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobStatus {
    /// The state of this job.
    state: JobState,

    /// If present, indicates that the job failed.
    error_result: Option<BigQueryError>,

    /// Errors encountered while running the job. These do not necessarily
    /// indicate that the job has finished or was unsuccessful.
    #[serde(default)]
    errors: Vec<BigQueryError>,
}

impl JobStatus {
    /// Check to see if we've encountered an error.
    pub(crate) fn check_for_error(&self) -> Result<(), BigQueryError> {
        if let Some(err) = &self.error_result {
            for detail in &self.errors {
                debug!("job error detail: {}", detail);
            }
            Err(err.clone())
        } else {
            Ok(())
        }
    }
}

/// The state of a job.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Serialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum JobState {
    /// This job is waiting to run.
    Pending,
    /// This job is currently running.
    Running,
    /// This job has finished.
    Done,
}

/// Statistics reported for a job.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobStatistics {
    /// Statistics for load jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) load: Option<JobStatisticsLoad>,
}

/// Statistics for a load job.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobStatisticsLoad {
    /// Number of rows imported, as a decimal string.
    pub(crate) output_rows: Option<String>,
}

/// The name of a table.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TableReference {
    pub(crate) project_id: String,
    pub(crate) dataset_id: String,
    pub(crate) table_id: String,
}

impl From<&TableName> for TableReference {
    fn from(name: &TableName) -> Self {
        Self {
            project_id: name.project().to_owned(),
            dataset_id: name.dataset().to_owned(),
            table_id: name.table().to_owned(),
        }
    }
}

/// Should this job create new tables?
#[derive(Clone, Copy, Debug, Deserialize, Eq, Serialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum CreateDisposition {
    CreateIfNeeded,
}

/// What should this job do with existing rows?
#[derive(Clone, Copy, Debug, Deserialize, Eq, Serialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum WriteDisposition {
    WriteTruncate,
}

/// Why waiting on a job failed.
#[derive(Debug)]
pub(crate) enum JobError {
    /// The job ran, and BigQuery says it failed.
    Failed(BigQueryError),
    /// We couldn't find out how the job went.
    Client(ClientError),
}

impl From<ClientError> for JobError {
    fn from(err: ClientError) -> Self {
        JobError::Client(err)
    }
}

impl From<Error> for JobError {
    fn from(err: Error) -> Self {
        JobError::Client(ClientError::Other(err))
    }
}

/// Poll `job` until it is done, and return the finished job.
///
/// The first check happens after 2 seconds, and the interval doubles up to 16
/// seconds. A failed poll is returned immediately.
#[instrument(level = "debug", skip(client, job), fields(job_id = ?job.job_reference.as_ref().map(|r| &r.job_id)))]
pub(crate) async fn wait_for_job(client: &Client, mut job: Job) -> Result<Job, JobError> {
    let job_url = job.url()?;
    let mut sleep_duration = Duration::from_secs(2);
    while !job.is_done() {
        trace!("job not done yet, sleeping {:?}", sleep_duration);
        sleep(sleep_duration).await;
        if sleep_duration < Duration::from_secs(16) {
            sleep_duration *= 2;
        }
        job = client.get::<Job, _, _>(job_url.as_str(), NoQuery).await?;
    }

    // Return either an error or a finished job.
    if let Some(status) = &job.status {
        status.check_for_error().map_err(JobError::Failed)?;
    }
    debug!("job {} finished", job.reference()?.job_id);
    Ok(job)
}
