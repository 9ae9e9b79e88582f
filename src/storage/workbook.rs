//! Blob-of-spreadsheet backend (variant B).
//!
//! The entire dataset lives in one JSON workbook object at a single URL.
//! Every operation downloads the whole file, mutates it in memory, and
//! uploads it back, so the "transaction" unit is the file itself. A
//! process-wide async mutex guards every operation — reads included, since
//! a download concurrent with another caller's in-flight upload can observe
//! a half-written or stale file. The guard is held for the full
//! download→mutate→upload cycle and released on all exit paths.
//!
//! Because mutations are serialized here, this variant can enforce what the
//! row-oriented one cannot: `issued` never exceeds `limit`. `award_prize`
//! re-reads the fresh blob under the lock and refuses to increment a prize
//! that is already at its limit.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::error::StorageError;

use super::{
    cell_to_u32, Prize, StorageBackend, TokenLocation, TokenRecord, TokenStatus, UserInfo,
    WinnerRecord,
};

/// HTTP request timeout for blob downloads and uploads.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Whole-file backend over a single remote JSON workbook.
pub struct WorkbookBackend {
    url: String,
    auth_token: Option<String>,
    http: reqwest::Client,
    /// The single process-wide serialization point for this variant.
    guard: Mutex<()>,
}

/// In-memory image of the remote workbook: three sheets, one struct each.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Workbook {
    #[serde(default)]
    tokens: Vec<TokenRow>,
    #[serde(default)]
    prizes: Vec<PrizeRow>,
    #[serde(default)]
    winners: Vec<WinnerRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenRow {
    token: String,
    status: String,
}

/// Quota cells stay loosely typed: humans edit this file, and a blank or
/// placeholder cell must make the row unavailable rather than an error.
#[derive(Debug, Serialize, Deserialize)]
struct PrizeRow {
    name: String,
    #[serde(default)]
    limit: Value,
    #[serde(default)]
    issued: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WinnerRow {
    awarded_at: String,
    user_id: i64,
    handle: String,
    prize: String,
}

impl Workbook {
    fn available_prizes(&self) -> Vec<Prize> {
        self.prizes
            .iter()
            .enumerate()
            .filter_map(|(idx, row)| row.parse(idx))
            .filter(|prize| prize.remaining() > 0)
            .collect()
    }

    fn find_token(&self, token: &str) -> Option<(usize, &TokenRow)> {
        self.tokens
            .iter()
            .enumerate()
            .find(|(_, row)| row.token == token)
    }

    /// Flip a token to used. Already-used tokens are left untouched, which
    /// is what makes repeat calls safe.
    fn mark_used(&mut self, token: &str) -> Result<(), StorageError> {
        let row = self
            .tokens
            .iter_mut()
            .find(|row| row.token == token)
            .ok_or_else(|| StorageError::Payload(format!("token row vanished: {token}")))?;
        row.status = "used".to_string();
        Ok(())
    }

    /// Increment the prize's issued count and append the winner row, both
    /// against the fresh blob. Fails without mutating if the prize is gone
    /// or already at its limit.
    fn award(&mut self, prize_name: &str, record: WinnerRecord) -> Result<(), StorageError> {
        let row = self
            .prizes
            .iter_mut()
            .find(|row| row.name == prize_name)
            .ok_or_else(|| StorageError::Payload(format!("prize row vanished: {prize_name}")))?;

        let limit = cell_to_u32(Some(&row.limit))
            .ok_or_else(|| StorageError::Payload(format!("unparseable limit for {prize_name}")))?;
        let issued = cell_to_u32(Some(&row.issued))
            .ok_or_else(|| StorageError::Payload(format!("unparseable issued for {prize_name}")))?;

        if issued >= limit {
            return Err(StorageError::QuotaExceeded(prize_name.to_string()));
        }

        row.issued = Value::from(issued + 1);
        self.winners.push(WinnerRow {
            awarded_at: record.awarded_at,
            user_id: record.user_id,
            handle: record.handle,
            prize: record.prize_name,
        });
        Ok(())
    }
}

impl PrizeRow {
    fn parse(&self, idx: usize) -> Option<Prize> {
        if self.name.trim().is_empty() {
            return None;
        }
        Some(Prize {
            name: self.name.clone(),
            limit: cell_to_u32(Some(&self.limit))?,
            issued: cell_to_u32(Some(&self.issued))?,
            row: idx,
        })
    }
}

impl WorkbookBackend {
    pub fn new(config: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            url: config.workbook_url.clone(),
            auth_token: config.workbook_auth_token.clone(),
            http,
            guard: Mutex::new(()),
        }
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn download(&self) -> Result<Workbook, StorageError> {
        let resp = self.authorized(self.http.get(&self.url)).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::Schema("workbook".into()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Remote {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }

    async fn upload(&self, workbook: &Workbook) -> Result<(), StorageError> {
        let resp = self
            .authorized(self.http.put(&self.url))
            .json(workbook)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Remote {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for WorkbookBackend {
    async fn add_tokens(&self, tokens: &[String]) -> Result<(), StorageError> {
        let _guard = self.guard.lock().await;
        let mut workbook = self.download().await?;
        for token in tokens {
            workbook.tokens.push(TokenRow {
                token: token.clone(),
                status: "active".to_string(),
            });
        }
        self.upload(&workbook).await
    }

    async fn find_token(&self, token: &str) -> Result<Option<TokenRecord>, StorageError> {
        let _guard = self.guard.lock().await;
        let workbook = self.download().await?;
        Ok(workbook.find_token(token).map(|(idx, row)| TokenRecord {
            status: if row.status == "used" {
                TokenStatus::Used
            } else {
                TokenStatus::Active
            },
            location: TokenLocation {
                token: token.to_string(),
                row: Some(idx),
            },
        }))
    }

    async fn mark_token_used(&self, location: &TokenLocation) -> Result<(), StorageError> {
        let _guard = self.guard.lock().await;
        let mut workbook = self.download().await?;
        // Relocate by token key: the blob may have been rewritten since the
        // lookup, so the captured index is advisory only.
        workbook.mark_used(&location.token)?;
        self.upload(&workbook).await
    }

    async fn list_available_prizes(&self) -> Result<Vec<Prize>, StorageError> {
        let _guard = self.guard.lock().await;
        let workbook = self.download().await?;
        Ok(workbook.available_prizes())
    }

    async fn award_prize(&self, prize: &Prize, winner: &UserInfo) -> Result<(), StorageError> {
        let _guard = self.guard.lock().await;
        let mut workbook = self.download().await?;
        workbook.award(&prize.name, WinnerRecord::new(winner, &prize.name))?;
        self.upload(&workbook).await
    }

    fn kind(&self) -> &'static str {
        "workbook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Workbook {
        serde_json::from_value(json!({
            "tokens": [
                {"token": "aaaa1111", "status": "active"},
                {"token": "bbbb2222", "status": "used"}
            ],
            "prizes": [
                {"name": "Mug", "limit": 2, "issued": 1},
                {"name": "Sticker", "limit": "10", "issued": "10"},
                {"name": "Mystery", "limit": "", "issued": 0}
            ],
            "winners": []
        }))
        .unwrap()
    }

    fn winner() -> WinnerRecord {
        WinnerRecord::new(
            &UserInfo {
                user_id: 42,
                username: Some("alice".into()),
            },
            "Mug",
        )
    }

    #[test]
    fn only_prizes_with_quota_and_clean_cells_are_available() {
        let workbook = sample();
        let available = workbook.available_prizes();
        // Sticker is exhausted, Mystery has a blank limit cell.
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].name, "Mug");
        assert_eq!(available[0].remaining(), 1);
    }

    #[test]
    fn mark_used_is_idempotent() {
        let mut workbook = sample();
        workbook.mark_used("aaaa1111").unwrap();
        workbook.mark_used("aaaa1111").unwrap();
        assert_eq!(workbook.tokens[0].status, "used");
    }

    #[test]
    fn award_increments_and_appends_one_winner_row() {
        let mut workbook = sample();
        workbook.award("Mug", winner()).unwrap();
        assert_eq!(workbook.prizes[0].issued, json!(2));
        assert_eq!(workbook.winners.len(), 1);
        assert_eq!(workbook.winners[0].prize, "Mug");
        assert_eq!(workbook.winners[0].handle, "@alice");
    }

    #[test]
    fn award_never_pushes_issued_past_limit() {
        let mut workbook = sample();
        workbook.award("Mug", winner()).unwrap();
        let err = workbook.award("Mug", winner()).unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded(_)));
        // The failed attempt must not leave a winner row behind.
        assert_eq!(workbook.prizes[0].issued, json!(2));
        assert_eq!(workbook.winners.len(), 1);
    }

    #[test]
    fn awarding_a_vanished_prize_fails_cleanly() {
        let mut workbook = sample();
        let err = workbook.award("Gone", winner()).unwrap_err();
        assert!(matches!(err, StorageError::Payload(_)));
        assert!(workbook.winners.is_empty());
    }
}
