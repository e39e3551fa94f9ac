//! Cloud service clients.

pub(crate) mod gcloud;
