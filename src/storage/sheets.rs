//! Row-oriented client for a Sheets-style values REST API (variant A).
//!
//! Three worksheets back the three logical tables:
//!
//! - `Tokens!A:B` — token, status (no header row)
//! - `Prizes!A:C` — name, limit, issued (header row at row 1)
//! - `Winners!A:D` — timestamp, user id, handle, prize name (append-only)
//!
//! Every operation is one (or for awards, two) independent round trips.
//! Reads and writes are not mutually exclusive across concurrent callers:
//! two callers can read-then-write with stale data. That window is an
//! accepted limitation of this variant; the in-process per-token guard in
//! the coordinator narrows it but does not close it.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::error::StorageError;

use super::{
    cell_to_u32, Prize, StorageBackend, TokenLocation, TokenRecord, TokenStatus, UserInfo,
    WinnerRecord,
};

/// HTTP request timeout for values API calls.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const TOKENS_RANGE: &str = "Tokens!A:B";
const PRIZES_RANGE: &str = "Prizes!A2:C";
const WINNERS_RANGE: &str = "Winners!A:D";

/// First data row of the prizes worksheet (row 1 is the header).
const PRIZES_FIRST_ROW: usize = 2;

/// Client for the spreadsheet values REST API.
pub struct SheetsBackend {
    base_url: String,
    sheet_id: String,
    api_token: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Serialize)]
struct WriteBody {
    values: Vec<Vec<Value>>,
}

impl SheetsBackend {
    pub fn new(config: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: config.sheets_api_url.trim_end_matches('/').to_string(),
            sheet_id: config.sheet_id.clone(),
            api_token: config.sheets_api_token.clone(),
            http,
        }
    }

    fn values_url(&self, range: &str) -> String {
        format!("{}/{}/values/{range}", self.base_url, self.sheet_id)
    }

    /// Map a non-success response into the storage error taxonomy.
    async fn check(resp: reqwest::Response, range: &str) -> Result<reqwest::Response, StorageError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::Schema(range.to_string()));
        }
        let body = resp.text().await.unwrap_or_default();
        Err(StorageError::Remote {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<Value>>, StorageError> {
        let resp = self
            .http
            .get(self.values_url(range))
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        let range_data: ValueRange = Self::check(resp, range).await?.json().await?;
        Ok(range_data.values)
    }

    /// Targeted in-place update of a cell range.
    async fn update_values(&self, range: &str, values: Vec<Vec<Value>>) -> Result<(), StorageError> {
        let resp = self
            .http
            .put(self.values_url(range))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(&self.api_token)
            .json(&WriteBody { values })
            .send()
            .await?;
        Self::check(resp, range).await?;
        Ok(())
    }

    /// Append rows after the last populated row of a range. One call per
    /// batch, so a batch either lands or the error is surfaced.
    async fn append_values(&self, range: &str, values: Vec<Vec<Value>>) -> Result<(), StorageError> {
        let url = format!("{}:append", self.values_url(range));
        let resp = self
            .http
            .post(url)
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(&self.api_token)
            .json(&WriteBody { values })
            .send()
            .await?;
        Self::check(resp, range).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for SheetsBackend {
    async fn add_tokens(&self, tokens: &[String]) -> Result<(), StorageError> {
        let rows = tokens
            .iter()
            .map(|token| vec![json!(token), json!("active")])
            .collect();
        self.append_values(TOKENS_RANGE, rows).await
    }

    async fn find_token(&self, token: &str) -> Result<Option<TokenRecord>, StorageError> {
        // One round-trip column scan; the row coordinate lets the later
        // status update target a single cell without re-scanning.
        let rows = self.get_values(TOKENS_RANGE).await?;
        for (idx, row) in rows.iter().enumerate() {
            let Some(stored) = row.first().and_then(Value::as_str) else {
                continue;
            };
            if stored != token {
                continue;
            }
            let status = match row.get(1).and_then(Value::as_str) {
                Some("used") => TokenStatus::Used,
                _ => TokenStatus::Active,
            };
            return Ok(Some(TokenRecord {
                status,
                location: TokenLocation {
                    token: token.to_string(),
                    row: Some(idx + 1),
                },
            }));
        }
        Ok(None)
    }

    async fn mark_token_used(&self, location: &TokenLocation) -> Result<(), StorageError> {
        let row = location
            .row
            .ok_or_else(|| StorageError::Payload("token location has no row coordinate".into()))?;
        // Overwriting "used" with "used" is a no-op, so repeat calls are safe.
        self.update_values(&format!("Tokens!B{row}"), vec![vec![json!("used")]])
            .await
    }

    async fn list_available_prizes(&self) -> Result<Vec<Prize>, StorageError> {
        let rows = self.get_values(PRIZES_RANGE).await?;
        let mut available = Vec::new();
        for (idx, row) in rows.iter().enumerate() {
            if let Some(prize) = parse_prize_row(row, PRIZES_FIRST_ROW + idx) {
                if prize.remaining() > 0 {
                    available.push(prize);
                }
            }
        }
        Ok(available)
    }

    async fn award_prize(&self, prize: &Prize, winner: &UserInfo) -> Result<(), StorageError> {
        // Two independent remote calls. If the append fails after the
        // counter update landed, the increment is not rolled back; the
        // caller surfaces the failure.
        self.update_values(
            &format!("Prizes!C{}", prize.row),
            vec![vec![json!(prize.issued + 1)]],
        )
        .await?;

        let record = WinnerRecord::new(winner, &prize.name);
        self.append_values(
            WINNERS_RANGE,
            vec![vec![
                json!(record.awarded_at),
                json!(record.user_id),
                json!(record.handle),
                json!(record.prize_name),
            ]],
        )
        .await
    }

    fn kind(&self) -> &'static str {
        "sheets"
    }
}

/// Parse one prizes row into a [`Prize`], or `None` when the name is blank
/// or either quota cell fails integer parsing.
fn parse_prize_row(row: &[Value], sheet_row: usize) -> Option<Prize> {
    let name = row.first().and_then(Value::as_str)?.trim();
    if name.is_empty() {
        return None;
    }
    let limit = cell_to_u32(row.get(1))?;
    let issued = cell_to_u32(row.get(2))?;
    Some(Prize {
        name: name.to_string(),
        limit,
        issued,
        row: sheet_row,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, limit: Value, issued: Value) -> Vec<Value> {
        vec![json!(name), limit, issued]
    }

    #[test]
    fn prize_rows_parse_with_sheet_coordinates() {
        let prize = parse_prize_row(&row("Mug", json!("5"), json!(2)), 4).unwrap();
        assert_eq!(prize.name, "Mug");
        assert_eq!(prize.limit, 5);
        assert_eq!(prize.issued, 2);
        assert_eq!(prize.row, 4);
        assert_eq!(prize.remaining(), 3);
    }

    #[test]
    fn human_edited_rows_are_skipped_not_errors() {
        assert!(parse_prize_row(&row("Sticker", json!(""), json!(0)), 2).is_none());
        assert!(parse_prize_row(&row("Sticker", json!(10), json!("soon")), 2).is_none());
        assert!(parse_prize_row(&row("", json!(10), json!(0)), 2).is_none());
        assert!(parse_prize_row(&[json!("Sticker")], 2).is_none());
    }
}
