//! Authentication support for Google Cloud.
//!
//! We never take credentials as arguments. `gcp_auth` walks the usual chain:
//! `GOOGLE_APPLICATION_CREDENTIALS`, the `gcloud` user's application default
//! credentials, and finally the metadata server when running on Google Cloud.

use std::sync::Arc;

use crate::common::*;

/// Something which can hand out OAuth2 tokens.
pub(crate) type Authenticator = Arc<dyn gcp_auth::TokenProvider>;

/// Find an authenticator using the ambient Google Cloud credentials.
#[instrument(level = "trace")]
pub(crate) async fn authenticator() -> Result<Authenticator> {
    let provider = gcp_auth::provider().await.context(
        "could not find Google Cloud credentials (try `gcloud auth application-default login`)",
    )?;
    debug!("found ambient Google Cloud credentials");
    Ok(provider)
}
