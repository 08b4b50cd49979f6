use std::sync::Arc;

use chrono::Utc;

use crate::error::ChatResult;
use crate::models::ChatSession;
use crate::notify::Notifications;
use crate::store::ChatStore;

/// Atomic-per-session balance mutation. The balance never goes below zero;
/// every change is persisted and then pushed to both the session channel and
/// the balance-only channel.
///
/// Callers must hold the session's lock across the whole read-modify-write.
pub struct BalanceLedger {
    store: Arc<dyn ChatStore>,
    notify: Arc<Notifications>,
}

impl BalanceLedger {
    pub fn new(store: Arc<dyn ChatStore>, notify: Arc<Notifications>) -> Self {
        Self { store, notify }
    }

    pub async fn credit(&self, session: &mut ChatSession, amount: i64) -> ChatResult<()> {
        self.apply(session, amount).await
    }

    pub async fn debit(&self, session: &mut ChatSession, amount: i64) -> ChatResult<()> {
        self.apply(session, -amount).await
    }

    async fn apply(&self, session: &mut ChatSession, delta: i64) -> ChatResult<()> {
        session.balance = (session.balance + delta).max(0);
        session.updated_at = Utc::now();
        self.store.update_session(session).await?;
        self.notify
            .broadcast_balance(&session.id, session.balance)
            .await;
        Ok(())
    }
}
