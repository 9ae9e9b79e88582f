//! Token lifecycle: active → used, exactly once.
//!
//! The ledger is a thin layer over the storage backend. `check_status`
//! followed by `consume` is not atomic against other callers on the same
//! token; the coordinator's per-token guard supplies that exclusion.

use std::sync::Arc;

use crate::error::StorageError;
use crate::storage::{StorageBackend, TokenLocation, TokenStatus};

/// Result of a token status check.
#[derive(Debug, Clone)]
pub enum TokenCheck {
    /// Token exists and is spendable; the location feeds the later consume.
    Active(TokenLocation),
    /// Token exists but was already spent.
    Used,
    /// No such token.
    Invalid,
}

pub struct TokenLedger {
    backend: Arc<dyn StorageBackend>,
}

impl TokenLedger {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub async fn check_status(&self, token: &str) -> Result<TokenCheck, StorageError> {
        Ok(match self.backend.find_token(token).await? {
            Some(record) if record.status == TokenStatus::Active => {
                TokenCheck::Active(record.location)
            }
            Some(_) => TokenCheck::Used,
            None => TokenCheck::Invalid,
        })
    }

    /// Spend the token. Safe to call more than once for the same location.
    pub async fn consume(&self, location: &TokenLocation) -> Result<(), StorageError> {
        self.backend.mark_token_used(location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mock::MockBackend;

    #[tokio::test]
    async fn added_tokens_all_check_out_active() {
        let backend = Arc::new(MockBackend::default());
        let tokens: Vec<String> = (0..4).map(|i| format!("tok-{i}")).collect();
        backend.add_tokens(&tokens).await.unwrap();

        let ledger = TokenLedger::new(backend);
        for token in &tokens {
            assert!(matches!(
                ledger.check_status(token).await.unwrap(),
                TokenCheck::Active(_)
            ));
        }
    }

    #[tokio::test]
    async fn minted_batch_round_trips_through_the_store() {
        let backend = Arc::new(MockBackend::default());
        let tokens = crate::links::mint_batch(5);
        backend.add_tokens(&tokens).await.unwrap();

        let ledger = TokenLedger::new(backend);
        for token in &tokens {
            assert!(matches!(
                ledger.check_status(token).await.unwrap(),
                TokenCheck::Active(_)
            ));
        }
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let ledger = TokenLedger::new(Arc::new(MockBackend::default()));
        assert!(matches!(
            ledger.check_status("nope").await.unwrap(),
            TokenCheck::Invalid
        ));
    }

    #[tokio::test]
    async fn consume_twice_is_a_no_op_not_an_error() {
        let backend = Arc::new(MockBackend::default());
        backend.add_tokens(&["tok-0".to_string()]).await.unwrap();

        let ledger = TokenLedger::new(backend.clone());
        let TokenCheck::Active(location) = ledger.check_status("tok-0").await.unwrap() else {
            panic!("expected active token");
        };

        ledger.consume(&location).await.unwrap();
        ledger.consume(&location).await.unwrap();
        assert_eq!(backend.token_status("tok-0"), Some(TokenStatus::Used));
        assert!(matches!(
            ledger.check_status("tok-0").await.unwrap(),
            TokenCheck::Used
        ));
    }
}
