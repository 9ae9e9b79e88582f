//! Presentation boundary: how the requester hears about their draw.
//!
//! The coordinator calls `draw_started` once when the draw animation should
//! begin and `report` exactly once per redemption with the terminal
//! outcome. The production implementation only logs; a real chat transport
//! plugs in behind this trait.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::coordinator::DrawOutcome;
use crate::storage::UserInfo;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// The token validated and the wheel is about to spin.
    async fn draw_started(&self, user: &UserInfo);

    /// Terminal outcome of the redemption. Called exactly once per attempt.
    async fn report(&self, user: &UserInfo, outcome: &DrawOutcome);
}

/// Default notifier: structured log lines in place of chat messages.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn draw_started(&self, user: &UserInfo) {
        info!(user_id = user.user_id, "Spinning the wheel");
    }

    async fn report(&self, user: &UserInfo, outcome: &DrawOutcome) {
        match outcome {
            DrawOutcome::Awarded(prize) => {
                info!(user_id = user.user_id, prize = %prize, "You won a prize!");
            }
            DrawOutcome::Exhausted => {
                info!(user_id = user.user_id, "All prizes are gone");
            }
            DrawOutcome::Invalid => {
                warn!(user_id = user.user_id, "Link is not valid");
            }
            DrawOutcome::AlreadyUsed => {
                warn!(user_id = user.user_id, "Link was already used");
            }
            DrawOutcome::Failed(reason) => {
                warn!(user_id = user.user_id, reason = %reason, "Draw failed");
            }
        }
    }
}
