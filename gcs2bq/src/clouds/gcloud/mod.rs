//! Interfaces to Google Cloud.

mod auth;
pub(crate) mod bigquery;
mod client;
pub(crate) mod storage;

pub(crate) use client::*;
