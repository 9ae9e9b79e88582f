//! Application configuration loaded from environment variables.
//!
//! Required: `ADMIN_KEY`, plus per data source:
//!   sheets   — `SHEET_ID`, `SHEETS_API_TOKEN`
//!   workbook — `WORKBOOK_URL`
//! Optional: `DATA_SOURCE`, `SHEETS_API_URL`, `WORKBOOK_AUTH_TOKEN`,
//!           `LINK_BASE`, `HTTP_PORT`, `MAX_TOKEN_BATCH`

use anyhow::{Context, Result};
use std::str::FromStr;

/// Which storage variant this process talks to. Fixed for the process
/// lifetime; switching requires a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Row-oriented spreadsheet values API.
    Sheets,
    /// Whole-file JSON workbook blob.
    Workbook,
}

impl FromStr for DataSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sheets" => Ok(DataSource::Sheets),
            "workbook" => Ok(DataSource::Workbook),
            other => anyhow::bail!("unknown DATA_SOURCE: {other} (expected sheets or workbook)"),
        }
    }
}

/// Application configuration for the prize-draw backend.
#[derive(Clone)]
pub struct AppConfig {
    /// Storage variant selected at startup.
    pub data_source: DataSource,
    /// Base URL of the spreadsheet values API.
    pub sheets_api_url: String,
    /// Spreadsheet document ID (sheets variant).
    pub sheet_id: String,
    /// Bearer token for the values API (sheets variant).
    pub sheets_api_token: String,
    /// Location of the workbook blob (workbook variant).
    pub workbook_url: String,
    /// Optional bearer token for the blob store.
    pub workbook_auth_token: Option<String>,
    /// Deep-link prefix redemption URLs are built from.
    pub link_base: String,
    /// Shared secret guarding the admin token-minting route.
    pub admin_key: String,
    /// HTTP server port.
    pub http_port: u16,
    /// Upper bound on tokens minted per admin request.
    pub max_token_batch: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let data_source: DataSource = std::env::var("DATA_SOURCE")
            .unwrap_or_else(|_| "sheets".into())
            .parse()?;

        let sheets_api_url = std::env::var("SHEETS_API_URL")
            .unwrap_or_else(|_| "https://sheets.googleapis.com/v4/spreadsheets".into());

        let (sheet_id, sheets_api_token) = if data_source == DataSource::Sheets {
            (
                std::env::var("SHEET_ID").context("SHEET_ID env var must be set")?,
                std::env::var("SHEETS_API_TOKEN")
                    .context("SHEETS_API_TOKEN env var must be set")?,
            )
        } else {
            (String::new(), String::new())
        };

        let workbook_url = if data_source == DataSource::Workbook {
            std::env::var("WORKBOOK_URL").context("WORKBOOK_URL env var must be set")?
        } else {
            String::new()
        };

        let workbook_auth_token = std::env::var("WORKBOOK_AUTH_TOKEN").ok();

        let link_base = std::env::var("LINK_BASE")
            .unwrap_or_else(|_| "https://t.me/LuckyRouletteBot?start=".into());

        let admin_key = std::env::var("ADMIN_KEY").context("ADMIN_KEY env var must be set")?;

        let http_port = std::env::var("HTTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        let max_token_batch = std::env::var("MAX_TOKEN_BATCH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);

        Ok(Self {
            data_source,
            sheets_api_url,
            sheet_id,
            sheets_api_token,
            workbook_url,
            workbook_auth_token,
            link_base,
            admin_key,
            http_port,
            max_token_batch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_source_parses_case_insensitively() {
        assert_eq!("sheets".parse::<DataSource>().unwrap(), DataSource::Sheets);
        assert_eq!(
            " Workbook ".parse::<DataSource>().unwrap(),
            DataSource::Workbook
        );
        assert!("postgres".parse::<DataSource>().is_err());
    }
}
