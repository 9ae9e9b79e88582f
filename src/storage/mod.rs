//! Storage abstraction over the remote spreadsheet store.
//!
//! Two backends implement [`StorageBackend`]:
//!
//! - [`sheets::SheetsBackend`] — row-oriented client for a Sheets-style
//!   values REST API. One round trip per operation, no mutual exclusion;
//!   concurrent read-then-write races are an accepted limitation.
//! - [`workbook::WorkbookBackend`] — the whole dataset is one JSON workbook
//!   blob. Every operation is download → mutate → upload under a
//!   process-wide async mutex, which makes the file the transaction unit.
//!
//! The variant is chosen once at startup ([`select_backend`]) and injected
//! as `Arc<dyn StorageBackend>`; it never changes at runtime.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, DataSource};
use crate::error::StorageError;

pub mod sheets;
pub mod workbook;

/// The requester of a redemption, as reported to the winners log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: i64,
    pub username: Option<String>,
}

impl UserInfo {
    /// Display handle for the winners log, `@name` or a placeholder.
    pub fn handle(&self) -> String {
        match &self.username {
            Some(name) => format!("@{name}"),
            None => "NoUsername".to_string(),
        }
    }
}

/// Lifecycle status of a stored token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Active,
    Used,
}

/// Location metadata for a token row, captured at lookup time so the later
/// status update does not need a second scan.
///
/// The row coordinate is meaningful for the row-oriented backend; the blob
/// backend relocates by token key on every cycle.
#[derive(Debug, Clone)]
pub struct TokenLocation {
    pub token: String,
    pub row: Option<usize>,
}

/// A token found in the store: its status plus where it lives.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub status: TokenStatus,
    pub location: TokenLocation,
}

/// One prize row: display name, quota limit, and issued count.
///
/// Available iff `limit - issued > 0`. `row` is the backend coordinate of
/// the row (1-based sheet row for the sheets variant, vector index for the
/// blob variant).
#[derive(Debug, Clone)]
pub struct Prize {
    pub name: String,
    pub limit: u32,
    pub issued: u32,
    pub row: usize,
}

impl Prize {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.issued)
    }
}

/// Append-only audit entry for one award. Never mutated or deleted.
#[derive(Debug, Clone)]
pub struct WinnerRecord {
    pub awarded_at: String,
    pub user_id: i64,
    pub handle: String,
    pub prize_name: String,
}

impl WinnerRecord {
    pub fn new(winner: &UserInfo, prize_name: &str) -> Self {
        Self {
            awarded_at: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            user_id: winner.user_id,
            handle: winner.handle(),
            prize_name: prize_name.to_string(),
        }
    }
}

/// Uniform capability interface over both storage variants.
///
/// Backends own no in-memory state between calls; every operation re-fetches
/// from the remote store.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Append all given tokens with status `active`. Partial writes on
    /// failure are acceptable only if the failure is surfaced.
    async fn add_tokens(&self, tokens: &[String]) -> Result<(), StorageError>;

    /// Case-sensitive lookup. Returns the token's status and location, or
    /// `None` if the token does not exist.
    async fn find_token(&self, token: &str) -> Result<Option<TokenRecord>, StorageError>;

    /// Flip a token to `used`. Idempotent: marking an already-used token
    /// succeeds without effect.
    async fn mark_token_used(&self, location: &TokenLocation) -> Result<(), StorageError>;

    /// All prize rows with remaining quota. Rows whose quota cells do not
    /// parse as integers are silently skipped (tolerates human-edited
    /// placeholder cells).
    async fn list_available_prizes(&self) -> Result<Vec<Prize>, StorageError>;

    /// Increment the prize's issued counter by exactly 1 and append one
    /// winner row, as one logical unit relative to the backend's
    /// consistency model.
    async fn award_prize(&self, prize: &Prize, winner: &UserInfo) -> Result<(), StorageError>;

    /// Short variant label for logs and the status endpoint.
    fn kind(&self) -> &'static str;
}

/// Construct the backend selected by configuration. Called once at startup.
pub fn select_backend(config: &AppConfig) -> Arc<dyn StorageBackend> {
    match config.data_source {
        DataSource::Sheets => Arc::new(sheets::SheetsBackend::new(config)),
        DataSource::Workbook => Arc::new(workbook::WorkbookBackend::new(config)),
    }
}

/// Lenient quota-cell parser shared by both variants.
///
/// Spreadsheet cells arrive as JSON numbers or strings depending on how the
/// row was edited; anything else (blank, placeholder text) is `None`.
pub(crate) fn cell_to_u32(cell: Option<&serde_json::Value>) -> Option<u32> {
    match cell? {
        serde_json::Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
