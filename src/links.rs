//! Token minting and redemption link formatting.

use uuid::Uuid;

/// Length of a minted token: the leading hex of a v4 UUID.
const TOKEN_LEN: usize = 8;

/// Mint one short opaque token.
pub fn mint_token() -> String {
    Uuid::new_v4().simple().to_string()[..TOKEN_LEN].to_string()
}

/// Mint a batch of fresh tokens.
pub fn mint_batch(count: usize) -> Vec<String> {
    (0..count).map(|_| mint_token()).collect()
}

/// Embed a token into the configured deep-link base,
/// e.g. `https://t.me/SomeBot?start=` + token.
pub fn redemption_url(link_base: &str, token: &str) -> String {
    format!("{link_base}{token}")
}
