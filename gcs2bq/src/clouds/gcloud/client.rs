//! A Google Cloud REST client.

use mime::{self, Mime};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use rand::{distr::Alphanumeric, Rng};
use reqwest::{
    self,
    header::{HeaderValue, CONTENT_TYPE},
    IntoUrl, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{error, fmt, sync::Arc};

use super::auth::{authenticator, Authenticator};
use crate::common::*;

/// The OAuth2 scopes that we'll need. We only ever read from Cloud Storage.
static SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/devstorage.read_only",
    "https://www.googleapis.com/auth/bigquery",
];

/// An empty `GET` query.
#[derive(Debug, Serialize)]
pub(crate) struct NoQuery;

/// Alternative media types for Google Cloud REST APIs.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Alt {
    /// Return the underlying media data.
    Media,
}

/// An HTTP client error. We break out a few specified statuses our caller might
/// care about.
#[derive(Debug)]
pub(crate) enum ClientError {
    /// The resource at URL was not found.
    NotFound { method: String, url: Url },
    /// Google answered with a JSON error describing what it refused to do.
    Api {
        method: String,
        url: Url,
        error: GCloudError,
    },
    /// Another error occured. We don't currently care about the details.
    Other(Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::NotFound { method, url } => {
                write!(f, "cannot {} {}: Not Found", method, url)
            }
            ClientError::Api { method, url, error } => {
                write!(f, "{} error {}: {}", method, url, error)
            }
            ClientError::Other(err) => write!(f, "{:#}", err),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ClientError::NotFound { .. } => None,
            ClientError::Api { error, .. } => Some(error),
            ClientError::Other(err) => err.source(),
        }
    }
}

impl From<Error> for ClientError {
    fn from(err: Error) -> Self {
        ClientError::Other(err)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Other(err.into())
    }
}

/// A Google Cloud REST client using OAuth2.
///
/// Requests are sent exactly once. A failed request is reported to the caller
/// as-is.
#[derive(Clone)]
pub(crate) struct Client {
    /// Supplies OAuth2 tokens from the ambient Google credentials.
    authenticator: Authenticator,

    /// Our HTTP client.
    client: reqwest::Client,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Create a new Google Cloud client.
    #[instrument(level = "trace")]
    pub(crate) async fn new() -> Result<Client> {
        let authenticator = authenticator().await?;
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .context("could not build HTTP client")?;
        Ok(Client {
            authenticator,
            client,
        })
    }

    /// Make an HTTP GET request with the specified URL and query parameters,
    /// and deserialize the result.
    #[instrument(level = "trace", skip(self))]
    pub(crate) async fn get<Output, U, Query>(
        &self,
        url: U,
        query: Query,
    ) -> Result<Output, ClientError>
    where
        Output: fmt::Debug + DeserializeOwned,
        U: IntoUrl + fmt::Debug,
        Query: fmt::Debug + Serialize,
    {
        let url = build_url(url, query)?;
        let http_resp = self.get_helper(&url).await?;
        self.handle_response("GET", &url, http_resp).await
    }

    /// Make an HTTP GET request with the specified URL and query parameters,
    /// and return the raw response body.
    #[instrument(level = "trace", skip(self))]
    pub(crate) async fn get_bytes<U, Query>(
        &self,
        url: U,
        query: Query,
    ) -> Result<Bytes, ClientError>
    where
        U: IntoUrl + fmt::Debug,
        Query: fmt::Debug + Serialize,
    {
        let url = build_url(url, query)?;
        let http_resp = self.get_helper(&url).await?;
        if http_resp.status().is_success() {
            let body = http_resp
                .bytes()
                .await
                .with_context(|| format!("error downloading body of {}", url))?;
            trace!("GET {} returned {} bytes", url, body.len());
            Ok(body)
        } else {
            Err(self.handle_error("GET", &url, http_resp).await)
        }
    }

    /// Make an HTTP GET request and return the response.
    async fn get_helper(&self, url: &Url) -> Result<reqwest::Response, ClientError> {
        trace!("GET {}", url);
        let token = self.token().await?;
        let http_resp = self
            .client
            .get(url.as_str())
            .bearer_auth(token.as_str())
            .send()
            .await
            .with_context(|| format!("could not GET {}", url))?;
        Ok(http_resp)
    }

    /// POST `metadata` and `data` together as a `multipart/related` upload, and
    /// deserialize the result.
    ///
    /// This is the "multipart upload" protocol shared by the Google Cloud
    /// upload endpoints: the first part is the JSON resource being created, the
    /// second part is the media itself.
    #[instrument(level = "trace", skip(self, metadata, data), fields(data_len = data.len()))]
    pub(crate) async fn post_multipart_related<Output, U, Query, Metadata>(
        &self,
        url: U,
        query: Query,
        metadata: &Metadata,
        data_type: &Mime,
        data: Bytes,
    ) -> Result<Output, ClientError>
    where
        Output: fmt::Debug + DeserializeOwned,
        U: IntoUrl + fmt::Debug,
        Query: fmt::Debug + Serialize,
        Metadata: fmt::Debug + Serialize,
    {
        let url = build_url(url, query)?;
        trace!("POST {} {:?}", url, metadata);
        let metadata_json = serde_json::to_vec(metadata)?;
        let boundary = multipart_boundary();
        let body = multipart_related_body(&boundary, &metadata_json, data_type, &data);
        let content_type =
            HeaderValue::from_str(&format!("multipart/related; boundary={}", boundary))
                .context("could not build multipart Content-Type")?;

        let token = self.token().await?;
        let http_resp = self
            .client
            .post(url.as_str())
            .bearer_auth(token.as_str())
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .with_context(|| format!("could not POST {}", url))?;
        self.handle_response("POST", &url, http_resp).await
    }

    /// Get an access token.
    #[instrument(level = "trace", skip(self))]
    async fn token(&self) -> Result<Arc<gcp_auth::Token>> {
        self.authenticator
            .token(SCOPES)
            .await
            .context("could not get Google Cloud OAuth2 token")
    }

    /// Handle an HTTP response.
    async fn handle_response<Output>(
        &self,
        method: &str,
        url: &Url,
        http_resp: reqwest::Response,
    ) -> Result<Output, ClientError>
    where
        Output: fmt::Debug + DeserializeOwned,
    {
        if http_resp.status().is_success() {
            let resp = http_resp.json::<Output>().await.with_context(|| {
                format!("error fetching JSON response from {}", url)
            })?;
            trace!("{} returned {:?}", method, resp);
            Ok(resp)
        } else {
            Err(self.handle_error(method, url, http_resp).await)
        }
    }

    /// Handle an HTTP error response.
    async fn handle_error(
        &self,
        method: &str,
        url: &Url,
        http_resp: reqwest::Response,
    ) -> ClientError {
        // Return 404 Not Found as a special case.
        if http_resp.status() == StatusCode::NOT_FOUND {
            return ClientError::NotFound {
                method: method.to_owned(),
                url: url.to_owned(),
            };
        }

        // Decide if we should even try to parse this response as JSON before we
        // consume our http_resp.
        let should_parse_as_json = response_claims_to_be_json(&http_resp);
        let status = http_resp.status();

        // Fetch the error body.
        let err_body_result = http_resp
            .bytes()
            .await
            .with_context(|| format!("error fetching error response from {}", url));
        let err_body = match err_body_result {
            Ok(err_body) => err_body,
            Err(err) => return err.into(),
        };
        error_from_body(method, url, status, should_parse_as_json, &err_body)
    }
}

/// Turn the body of a failed request into a `ClientError`, using Google's JSON
/// error format when we can.
pub(crate) fn error_from_body(
    method: &str,
    url: &Url,
    status: StatusCode,
    should_parse_as_json: bool,
    err_body: &[u8],
) -> ClientError {
    if should_parse_as_json {
        if let Ok(resp) = serde_json::from_slice::<ErrorResponse>(err_body) {
            trace!("{} error {:?}", method, resp);
            return ClientError::Api {
                method: method.to_owned(),
                url: url.to_owned(),
                error: resp.error,
            };
        }
    }

    let raw_err = String::from_utf8_lossy(err_body);
    trace!(
        "{} {}: expected JSON describing error, but got {:?}",
        method,
        url,
        raw_err,
    );
    let err = format_err!(
        "HTTP {}: expected JSON describing error, but got {:?}",
        status,
        raw_err
    );
    err.context(format!("{} error {}", method, url)).into()
}

/// Construct a URL from something we can convert to URL, and something that we
/// can serialize as a query string.
fn build_url<U, Query>(url: U, query: Query) -> Result<Url>
where
    U: IntoUrl,
    Query: fmt::Debug + Serialize,
{
    let mut url = url.into_url().context("could not parse URL")?;
    let query_str = serde_urlencoded::to_string(&query)?;
    if !query_str.is_empty() {
        url.set_query(Some(&query_str));
    }
    Ok(url)
}

/// Pick a random 32-character boundary for a multipart body.
fn multipart_boundary() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Assemble a two-part `multipart/related` body.
fn multipart_related_body(
    boundary: &str,
    metadata_json: &[u8],
    data_type: &Mime,
    data: &[u8],
) -> Bytes {
    let mut body = Vec::with_capacity(metadata_json.len() + data.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata_json);
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", data_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    Bytes::from(body)
}

/// A Google Cloud error response.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    /// The actual error.
    error: GCloudError,
}

/// Information about a GCloud error.
#[derive(Debug, Deserialize)]
pub(crate) struct GCloudError {
    pub(crate) code: i32,
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) errors: Vec<ErrorDetail>,
}

impl fmt::Display for GCloudError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Google Cloud error: {} {}", self.code, self.message)
    }
}

impl error::Error for GCloudError {}

/// Details about an individial GCloud error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub(crate) struct ErrorDetail {
    pub(crate) domain: String,
    pub(crate) reason: String,
    pub(crate) message: String,
    pub(crate) location_type: Option<String>,
    pub(crate) location: Option<String>,
}

/// Percent-encode a string for use as a URL path component.
pub(crate) fn percent_encode(s: &str) -> impl fmt::Display + '_ {
    utf8_percent_encode(s, NON_ALPHANUMERIC)
}

/// Returns `true` if `http_response` claims to be a JSON response.
pub(crate) fn response_claims_to_be_json(http_resp: &reqwest::Response) -> bool {
    let content_type = match http_resp.headers().get(CONTENT_TYPE) {
        Some(content_type) => content_type,
        None => return false,
    };
    let content_type_str = match content_type.to_str() {
        Ok(content_type_str) => content_type_str,
        Err(err) => {
            error!("Non-ASCII content type {:?}: {}", content_type, err);
            return false;
        }
    };
    let content_type_mime = match content_type_str.parse::<Mime>() {
        Ok(content_type_mime) => content_type_mime,
        Err(err) => {
            error!(
                "Could not parse content type {:?}: {}",
                content_type_str, err,
            );
            return false;
        }
    };
    content_type_mime.type_() == mime::APPLICATION
        && content_type_mime.subtype() == mime::JSON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct ExampleQuery {
        upload_type: &'static str,
    }

    #[test]
    fn build_url_appends_query() {
        let url = build_url(
            "https://example.com/upload",
            ExampleQuery {
                upload_type: "multipart",
            },
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://example.com/upload?uploadType=multipart");

        let url = build_url("https://example.com/plain", NoQuery).unwrap();
        assert_eq!(url.as_str(), "https://example.com/plain");
    }

    #[test]
    fn percent_encode_escapes_object_paths() {
        assert_eq!(
            percent_encode("path/to/file.csv").to_string(),
            "path%2Fto%2Ffile%2Ecsv",
        );
    }

    #[test]
    fn multipart_body_has_both_parts() {
        let data_type: Mime = "application/octet-stream".parse().unwrap();
        let body = multipart_related_body("XYZ", br#"{"a":1}"#, &data_type, b"row\n");
        let expected = "--XYZ\r\n\
            Content-Type: application/json; charset=UTF-8\r\n\r\n\
            {\"a\":1}\r\n\
            --XYZ\r\n\
            Content-Type: application/octet-stream\r\n\r\n\
            row\n\r\n\
            --XYZ--\r\n";
        assert_eq!(String::from_utf8(body.to_vec()).unwrap(), expected);
    }

    #[test]
    fn boundaries_are_alphanumeric() {
        let boundary = multipart_boundary();
        assert_eq!(boundary.len(), 32);
        assert!(boundary.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn google_json_errors_are_decoded() {
        let url = "https://bigquery.googleapis.com/x".parse::<Url>().unwrap();
        let body = br#"{"error": {"code": 403, "message": "Access Denied", "errors": [
            {"domain": "global", "reason": "accessDenied", "message": "Access Denied"}
        ]}}"#;
        let err = error_from_body("POST", &url, StatusCode::FORBIDDEN, true, body);
        match &err {
            ClientError::Api { error, .. } => {
                assert_eq!(error.code, 403);
                assert_eq!(error.errors[0].reason, "accessDenied");
            }
            other => panic!("expected an API error, found {:?}", other),
        }
        let msg = err.to_string();
        assert!(msg.contains("POST error"), "{}", msg);
        assert!(msg.contains("403 Access Denied"), "{}", msg);
    }

    #[test]
    fn non_json_errors_keep_raw_body() {
        let url = "https://storage.googleapis.com/x".parse::<Url>().unwrap();
        let err = error_from_body(
            "GET",
            &url,
            StatusCode::BAD_GATEWAY,
            false,
            b"upstream exploded",
        );
        let msg = err.to_string();
        assert!(msg.contains("upstream exploded"), "{}", msg);
        assert!(msg.contains("502"), "{}", msg);
    }
}
