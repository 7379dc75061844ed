// src/error.rs
//! Error taxonomy shared across layers. Binaries and HTTP handlers wrap these in `anyhow`.

use thiserror::Error;

use crate::types::DataType;

/// Failure talking to an upstream data source.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Missing credentials. Raised at call time, never at startup.
    #[error("{0} API key is not configured")]
    Configuration(&'static str),

    /// Timeout or connection failure; the gateway already retried.
    #[error("{upstream} request failed after {attempts} attempt(s): {message}")]
    Transient {
        upstream: &'static str,
        attempts: u32,
        message: String,
    },

    /// Non-2xx answer. Not retried.
    #[error("{upstream} rejected the request with status {status}")]
    Rejected { upstream: &'static str, status: u16 },

    /// Any other request failure (bad URL, TLS, body read).
    #[error("{upstream} request failed: {message}")]
    Request {
        upstream: &'static str,
        message: String,
    },

    #[error("{upstream} returned an unexpected payload: {message}")]
    Decode {
        upstream: &'static str,
        message: String,
    },
}

impl UpstreamError {
    pub fn is_transient(&self) -> bool {
        matches!(self, UpstreamError::Transient { .. })
    }
}

/// Failure of one classifier call. Always handled by a per-item fallback.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier transport error: {0}")]
    Transport(String),
    /// The model answered but the answer did not match the expected shape.
    #[error("classifier returned malformed output: {0}")]
    Malformed(String),
    #[error("classifier is disabled")]
    Disabled,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not configured: {0}")]
    Configuration(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store payload error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0} not found")]
    NotFound(String),
}

/// Failure of one data type inside a collection run.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no news available to derive a brief from")]
    NoSource,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TypeFailure {
    pub kind: DataType,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("city name is empty")]
    EmptyCity,
    /// Every fetched data type failed for the city.
    #[error("all data types failed for {city}")]
    Total {
        city: String,
        failures: Vec<TypeFailure>,
    },
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery is not configured: {0}")]
    Configuration(String),
    #[error("invalid address '{0}'")]
    Address(String),
    #[error("delivery transport error: {0}")]
    Transport(String),
    #[error("delivery rejected with status {0}")]
    Rejected(u16),
}
