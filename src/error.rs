//! Error taxonomy for the remote storage layer.
//!
//! Every backend failure collapses into [`StorageError`]; callers must treat
//! any variant as "draw outcome unknown" and never assume the token was or
//! was not consumed on the remote side.

use thiserror::Error;

/// Failure talking to (or making sense of) the remote spreadsheet store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Network-level failure: connect, timeout, TLS, or body decode.
    #[error("storage transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote store answered with a non-success status.
    /// Covers authentication failures (401/403) and server errors.
    #[error("remote store rejected request (HTTP {status}): {body}")]
    Remote { status: u16, body: String },

    /// A worksheet, table, or workbook object is missing.
    #[error("missing worksheet or table: {0}")]
    Schema(String),

    /// Remote data was present but structurally unusable.
    #[error("malformed remote payload: {0}")]
    Payload(String),

    /// The prize had no remaining quota at commit time.
    /// Only raised by the blob variant, which re-checks under its lock.
    #[error("prize quota exhausted at commit time: {0}")]
    QuotaExceeded(String),
}
