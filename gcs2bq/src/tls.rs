//! Support for setting up RusTLS in a consistent fashion.

use crate::common::*;

/// Install `aws-lc-rs` as the process-wide RusTLS crypto provider.
///
/// `reqwest` and `gcp_auth` are built without a provider of their own, so this
/// must run before either opens a connection.
pub(crate) fn install_crypto_provider() -> Result<()> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| format_err!("a RusTLS crypto provider was already installed"))
}
