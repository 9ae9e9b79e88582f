//! Prize inventory and random selection.
//!
//! Selection is a uniform-random choice among currently-available prize
//! rows: equal probability per eligible row, deliberately not weighted by
//! remaining quota. An empty pool is a normal outcome (`Ok(None)`), not an
//! error — the caller still spends the token.

use std::sync::Arc;

use rand::seq::IndexedRandom;

use crate::error::StorageError;
use crate::storage::{Prize, StorageBackend, UserInfo};

pub struct PrizePool {
    backend: Arc<dyn StorageBackend>,
}

impl PrizePool {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Pick one available prize at random, or `None` if the pool is empty.
    pub async fn draw(&self) -> Result<Option<Prize>, StorageError> {
        let available = self.backend.list_available_prizes().await?;
        Ok(available.choose(&mut rand::rng()).cloned())
    }

    /// Record the issuance: counter increment plus winner-log append.
    pub async fn award(&self, prize: &Prize, winner: &UserInfo) -> Result<(), StorageError> {
        self.backend.award_prize(prize, winner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mock::MockBackend;

    fn prize(name: &str, limit: u32, issued: u32, row: usize) -> Prize {
        Prize {
            name: name.to_string(),
            limit,
            issued,
            row,
        }
    }

    fn winner() -> UserInfo {
        UserInfo {
            user_id: 7,
            username: Some("bob".into()),
        }
    }

    #[tokio::test]
    async fn single_available_prize_is_always_drawn() {
        let backend = Arc::new(MockBackend::with_prizes(vec![prize("Mug", 1, 0, 2)]));
        let pool = PrizePool::new(backend);
        let drawn = pool.draw().await.unwrap().unwrap();
        assert_eq!(drawn.name, "Mug");
    }

    #[tokio::test]
    async fn exhausted_rows_never_come_up() {
        let backend = Arc::new(MockBackend::with_prizes(vec![
            prize("Mug", 1, 1, 2),
            prize("Sticker", 3, 0, 3),
        ]));
        let pool = PrizePool::new(backend);
        for _ in 0..10 {
            let drawn = pool.draw().await.unwrap().unwrap();
            assert_eq!(drawn.name, "Sticker");
        }
    }

    #[tokio::test]
    async fn empty_pool_draws_nothing() {
        let backend = Arc::new(MockBackend::with_prizes(vec![prize("Mug", 1, 1, 2)]));
        let pool = PrizePool::new(backend);
        assert!(pool.draw().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn awarding_the_last_unit_exhausts_the_pool() {
        let backend = Arc::new(MockBackend::with_prizes(vec![prize("Mug", 1, 0, 2)]));
        let pool = PrizePool::new(backend.clone());

        let drawn = pool.draw().await.unwrap().unwrap();
        pool.award(&drawn, &winner()).await.unwrap();

        assert_eq!(backend.winner_count(), 1);
        assert!(pool.draw().await.unwrap().is_none());
    }
}
