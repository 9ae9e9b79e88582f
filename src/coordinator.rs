//! Redemption orchestration: one token in, one outcome out.
//!
//! Each redemption walks an explicit state machine:
//!
//! ```text
//! Idle -> Validating -> (Rejected | Drawing) -> (Awarding | Exhausting)
//!      -> Finalizing -> Done
//! ```
//!
//! A per-token in-flight map rejects a second request for a token whose
//! draw has not finished yet, without touching the backend. This closes
//! the same-token race inside one process; two independent processes
//! sharing a row-oriented store can still both pass validation, which is
//! an accepted limitation of that variant.
//!
//! Policy carried end to end: one redemption attempt spends one token,
//! independent of draw outcome. An empty pool still consumes the token,
//! and an award failure still attempts consumption (best effort, no
//! rollback across the two remote tables).

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::ledger::{TokenCheck, TokenLedger};
use crate::metrics::Metrics;
use crate::notify::Notifier;
use crate::pool::PrizePool;
use crate::storage::{StorageBackend, TokenLocation, UserInfo};

/// Terminal outcome of one redemption attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOutcome {
    /// Token does not exist (or the request carried no token).
    Invalid,
    /// Token was already spent, or is mid-spend right now.
    AlreadyUsed,
    /// Pool empty; the token was still consumed.
    Exhausted,
    /// Prize awarded and logged.
    Awarded(String),
    /// Storage failure left the draw outcome unknown.
    Failed(String),
}

impl DrawOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DrawOutcome::Invalid => "invalid",
            DrawOutcome::AlreadyUsed => "already_used",
            DrawOutcome::Exhausted => "exhausted",
            DrawOutcome::Awarded(_) => "awarded",
            DrawOutcome::Failed(_) => "failed",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DrawOutcome::Awarded(prize) => json!({"outcome": "awarded", "prize": prize}),
            DrawOutcome::Failed(reason) => json!({"outcome": "failed", "reason": reason}),
            other => json!({"outcome": other.label()}),
        }
    }
}

/// Phases of an in-flight draw, logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawState {
    Validating,
    Drawing,
    Awarding,
    Exhausting,
    Finalizing,
}

pub struct DrawCoordinator {
    ledger: TokenLedger,
    pool: PrizePool,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    /// Tokens with a draw currently in flight. Entries are removed on every
    /// exit path by the RAII guard.
    in_flight: DashMap<String, ()>,
}

/// Lease on a token's in-flight slot; dropping it frees the slot.
struct InFlightGuard<'a> {
    map: &'a DashMap<String, ()>,
    token: String,
}

impl<'a> InFlightGuard<'a> {
    fn try_acquire(map: &'a DashMap<String, ()>, token: &str) -> Option<Self> {
        match map.entry(token.to_string()) {
            dashmap::Entry::Occupied(_) => None,
            dashmap::Entry::Vacant(slot) => {
                slot.insert(());
                Some(Self {
                    map,
                    token: token.to_string(),
                })
            }
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.token);
    }
}

impl DrawCoordinator {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            ledger: TokenLedger::new(backend.clone()),
            pool: PrizePool::new(backend),
            notifier,
            metrics,
            in_flight: DashMap::new(),
        }
    }

    /// Number of draws currently in flight, for the status endpoint.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Run one redemption end to end. Always reports exactly one outcome
    /// to the notifier, on every path.
    pub async fn redeem(&self, token: &str, user: &UserInfo) -> DrawOutcome {
        self.metrics.record_redemption();

        if token.is_empty() {
            let outcome = DrawOutcome::Invalid;
            self.metrics.record_invalid();
            self.notifier.report(user, &outcome).await;
            return outcome;
        }

        let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight, token) else {
            // Duplicate trigger while the first draw is still running.
            // Rejected before any backend call.
            warn!(token, user_id = user.user_id, "Duplicate redemption while in flight");
            let outcome = DrawOutcome::AlreadyUsed;
            self.metrics.record_duplicate();
            self.notifier.report(user, &outcome).await;
            return outcome;
        };

        let start = Instant::now();
        let outcome = self.run_draw(token, user).await;

        match &outcome {
            DrawOutcome::Awarded(prize) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                self.metrics.record_award(latency_ms);
                info!(token, user_id = user.user_id, prize = %prize, latency_ms, "Prize awarded");
            }
            DrawOutcome::Exhausted => {
                self.metrics.record_exhausted();
                info!(token, user_id = user.user_id, "Pool exhausted, token spent");
            }
            DrawOutcome::Invalid => self.metrics.record_invalid(),
            DrawOutcome::AlreadyUsed => self.metrics.record_already_used(),
            DrawOutcome::Failed(reason) => {
                self.metrics.record_failure();
                error!(token, user_id = user.user_id, reason = %reason, "Redemption failed");
            }
        }

        self.notifier.report(user, &outcome).await;
        outcome
    }

    async fn run_draw(&self, token: &str, user: &UserInfo) -> DrawOutcome {
        let mut state = DrawState::Validating;
        debug!(token, state = ?state, "Draw state");

        let location = match self.ledger.check_status(token).await {
            Ok(TokenCheck::Active(location)) => location,
            Ok(TokenCheck::Used) => return DrawOutcome::AlreadyUsed,
            Ok(TokenCheck::Invalid) => return DrawOutcome::Invalid,
            Err(err) => {
                error!(token, error = %err, "Token validation hit storage");
                return DrawOutcome::Failed("storage unavailable".into());
            }
        };

        state = DrawState::Drawing;
        debug!(token, state = ?state, "Draw state");
        self.notifier.draw_started(user).await;

        let prize = match self.pool.draw().await {
            Ok(Some(prize)) => prize,
            Ok(None) => {
                state = DrawState::Exhausting;
                debug!(token, state = ?state, "Draw state");
                // Attempt spent even without a prize.
                self.finalize(token, &location).await;
                return DrawOutcome::Exhausted;
            }
            Err(err) => {
                // Nothing was mutated yet; the token stays active.
                error!(token, error = %err, "Prize listing hit storage");
                return DrawOutcome::Failed("storage unavailable".into());
            }
        };

        state = DrawState::Awarding;
        debug!(token, state = ?state, prize = %prize.name, "Draw state");

        match self.pool.award(&prize, user).await {
            Ok(()) => {
                self.finalize(token, &location).await;
                DrawOutcome::Awarded(prize.name)
            }
            Err(err) => {
                // Quota bookkeeping may have partially mutated remote
                // state; consume the token anyway as a best-effort
                // compensating step.
                error!(token, prize = %prize.name, error = %err, "Award hit storage");
                self.finalize(token, &location).await;
                DrawOutcome::Failed("could not record the award".into())
            }
        }
    }

    /// Terminal token consumption. A failure here is logged and reported
    /// nowhere else: it never reopens the token for retry.
    async fn finalize(&self, token: &str, location: &TokenLocation) {
        debug!(token, state = ?DrawState::Finalizing, "Draw state");
        if let Err(err) = self.ledger.consume(location).await {
            error!(
                token,
                error = %err,
                "Token consumption failed; token remains active remotely"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::notify::Notifier;
    use crate::storage::mock::MockBackend;
    use crate::storage::{Prize, TokenStatus};

    /// Notifier double that records every callback.
    #[derive(Default)]
    struct RecordingNotifier {
        started: AtomicU32,
        reports: Mutex<Vec<DrawOutcome>>,
    }

    impl RecordingNotifier {
        fn report_count(&self) -> usize {
            self.reports.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn draw_started(&self, _user: &UserInfo) {
            self.started.fetch_add(1, Ordering::Relaxed);
        }

        async fn report(&self, _user: &UserInfo, outcome: &DrawOutcome) {
            self.reports.lock().unwrap().push(outcome.clone());
        }
    }

    fn prize(name: &str, limit: u32, issued: u32) -> Prize {
        Prize {
            name: name.to_string(),
            limit,
            issued,
            row: 2,
        }
    }

    fn user(id: i64) -> UserInfo {
        UserInfo {
            user_id: id,
            username: Some(format!("user{id}")),
        }
    }

    struct Harness {
        backend: Arc<MockBackend>,
        notifier: Arc<RecordingNotifier>,
        metrics: Arc<Metrics>,
        coordinator: DrawCoordinator,
    }

    fn harness(backend: MockBackend) -> Harness {
        let backend = Arc::new(backend);
        let notifier = Arc::new(RecordingNotifier::default());
        let metrics = Arc::new(Metrics::new());
        let coordinator = DrawCoordinator::new(
            backend.clone(),
            notifier.clone(),
            metrics.clone(),
        );
        Harness {
            backend,
            notifier,
            metrics,
            coordinator,
        }
    }

    #[tokio::test]
    async fn happy_path_awards_consumes_and_notifies_once() {
        let h = harness(MockBackend::with_prizes(vec![prize("Mug", 1, 0)]));
        h.backend.seed_token("tok-a", TokenStatus::Active);

        let outcome = h.coordinator.redeem("tok-a", &user(1)).await;

        assert_eq!(outcome, DrawOutcome::Awarded("Mug".into()));
        assert_eq!(h.backend.token_status("tok-a"), Some(TokenStatus::Used));
        assert_eq!(h.backend.winner_count(), 1);
        assert_eq!(h.notifier.started.load(Ordering::Relaxed), 1);
        assert_eq!(h.notifier.report_count(), 1);
        assert_eq!(h.metrics.prizes_awarded.load(Ordering::Relaxed), 1);
        assert_eq!(h.coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn second_token_after_last_prize_is_exhausted_but_spent() {
        let h = harness(MockBackend::with_prizes(vec![prize("Mug", 1, 0)]));
        h.backend.seed_token("tok-a", TokenStatus::Active);
        h.backend.seed_token("tok-b", TokenStatus::Active);

        let first = h.coordinator.redeem("tok-a", &user(1)).await;
        let second = h.coordinator.redeem("tok-b", &user(2)).await;

        assert_eq!(first, DrawOutcome::Awarded("Mug".into()));
        assert_eq!(second, DrawOutcome::Exhausted);
        // The losing attempt is still a spent token.
        assert_eq!(h.backend.token_status("tok-b"), Some(TokenStatus::Used));
        assert_eq!(h.backend.winner_count(), 1);
    }

    #[tokio::test]
    async fn used_token_is_rejected_without_backend_mutations() {
        let h = harness(MockBackend::with_prizes(vec![prize("Mug", 1, 0)]));
        h.backend.seed_token("tok-a", TokenStatus::Used);

        let outcome = h.coordinator.redeem("tok-a", &user(1)).await;

        assert_eq!(outcome, DrawOutcome::AlreadyUsed);
        assert_eq!(h.backend.mutations(), 0);
        assert_eq!(h.notifier.started.load(Ordering::Relaxed), 0);
        assert_eq!(h.notifier.report_count(), 1);
    }

    #[tokio::test]
    async fn unknown_and_empty_tokens_are_invalid() {
        let h = harness(MockBackend::default());

        assert_eq!(h.coordinator.redeem("ghost", &user(1)).await, DrawOutcome::Invalid);
        assert_eq!(h.coordinator.redeem("", &user(1)).await, DrawOutcome::Invalid);
        assert_eq!(h.backend.mutations(), 0);
        assert_eq!(h.notifier.report_count(), 2);
    }

    #[tokio::test]
    async fn award_failure_still_consumes_the_token() {
        let h = harness(MockBackend::with_prizes(vec![prize("Mug", 1, 0)]));
        h.backend.seed_token("tok-a", TokenStatus::Active);
        h.backend.fail_award.store(true, Ordering::Relaxed);

        let outcome = h.coordinator.redeem("tok-a", &user(1)).await;

        assert!(matches!(outcome, DrawOutcome::Failed(_)));
        assert_eq!(h.backend.token_status("tok-a"), Some(TokenStatus::Used));
        assert_eq!(h.backend.winner_count(), 0);
        assert_eq!(h.notifier.report_count(), 1);
    }

    #[tokio::test]
    async fn finalize_failure_does_not_retract_the_award() {
        let h = harness(MockBackend::with_prizes(vec![prize("Mug", 1, 0)]));
        h.backend.seed_token("tok-a", TokenStatus::Active);
        h.backend.fail_consume.store(true, Ordering::Relaxed);

        let outcome = h.coordinator.redeem("tok-a", &user(1)).await;

        // The user did win; the stuck-active token is logged, not surfaced.
        assert_eq!(outcome, DrawOutcome::Awarded("Mug".into()));
        assert_eq!(h.backend.winner_count(), 1);
        assert_eq!(h.backend.token_status("tok-a"), Some(TokenStatus::Active));
    }

    #[tokio::test]
    async fn concurrent_same_token_redemptions_award_exactly_once() {
        let h = harness(MockBackend::with_prizes(vec![prize("Mug", 5, 0)]));
        h.backend.seed_token("tok-a", TokenStatus::Active);
        // Suspend inside validation so the second call arrives mid-draw.
        h.backend.lookup_delay_ms.store(20, Ordering::Relaxed);

        let (user_a, user_b) = (user(1), user(2));
        let (first, second) = tokio::join!(
            h.coordinator.redeem("tok-a", &user_a),
            h.coordinator.redeem("tok-a", &user_b),
        );

        let outcomes = [first, second];
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, DrawOutcome::Awarded(_)))
                .count(),
            1
        );
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == DrawOutcome::AlreadyUsed)
                .count(),
            1
        );
        assert_eq!(h.backend.winner_count(), 1);
        assert_eq!(h.metrics.rejected_duplicate.load(Ordering::Relaxed), 1);
        assert_eq!(h.coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn different_tokens_draw_in_parallel() {
        let h = harness(MockBackend::with_prizes(vec![prize("Mug", 2, 0)]));
        h.backend.seed_token("tok-a", TokenStatus::Active);
        h.backend.seed_token("tok-b", TokenStatus::Active);
        h.backend.lookup_delay_ms.store(5, Ordering::Relaxed);

        let (user_a, user_b) = (user(1), user(2));
        let (first, second) = tokio::join!(
            h.coordinator.redeem("tok-a", &user_a),
            h.coordinator.redeem("tok-b", &user_b),
        );

        assert_eq!(first, DrawOutcome::Awarded("Mug".into()));
        assert_eq!(second, DrawOutcome::Awarded("Mug".into()));
        assert_eq!(h.backend.winner_count(), 2);
    }
}
