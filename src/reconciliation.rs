use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::claims::ClaimService;
use crate::error::{ChatError, ChatResult};
use crate::ledger::BalanceLedger;
use crate::messages::append_message;
use crate::models::{short_id, ChatMessage, MessageKind, PaymentKind};
use crate::notify::Notifications;
use crate::sessions::SessionLocks;
use crate::store::ChatStore;
use crate::wallet::SettlementEvent;

/// What a settlement event did once processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Not tagged for this domain.
    Ignored,
    /// State was mutated: balance credited or a deferred message delivered.
    Applied,
    /// The pending payment was already settled; redelivery, nothing to do.
    AlreadySettled,
}

/// key: chat-reconciliation -> applies confirmed payments exactly once
pub struct ReconciliationService {
    store: Arc<dyn ChatStore>,
    notify: Arc<Notifications>,
    ledger: Arc<BalanceLedger>,
    claims: Arc<ClaimService>,
    locks: Arc<SessionLocks>,
}

impl ReconciliationService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        notify: Arc<Notifications>,
        ledger: Arc<BalanceLedger>,
        claims: Arc<ClaimService>,
        locks: Arc<SessionLocks>,
    ) -> Self {
        Self {
            store,
            notify,
            ledger,
            claims,
            locks,
        }
    }

    /// Applies a confirmed payment. Safe to call more than once per
    /// reference: the pending payment's `paid` flag guards message and tip
    /// settlements. Balance top-ups carry no such record; the feed's own
    /// event de-duplication is what keeps a redelivered top-up from
    /// crediting twice.
    pub async fn settle(&self, event: &SettlementEvent) -> ChatResult<SettleOutcome> {
        if !event.is_chat() {
            return Ok(SettleOutcome::Ignored);
        }

        if event.payment_type() == Some(PaymentKind::Balance.as_str()) {
            return self.apply_balance_topup(event).await;
        }

        let reference = event.reference.as_str();
        let pending = self
            .store
            .get_pending_payment(reference)
            .await?
            .ok_or(ChatError::NotFound("Chat payment not found."))?;

        let _guard = self.locks.acquire(&pending.session_id).await;
        // re-read under the session lock; a concurrent delivery of the same
        // event may have won the race
        let mut pending = self
            .store
            .get_pending_payment(reference)
            .await?
            .ok_or(ChatError::NotFound("Chat payment not found."))?;
        if pending.paid {
            return Ok(SettleOutcome::AlreadySettled);
        }
        pending.paid = true;
        self.store.update_pending_payment(&pending).await?;

        let mut session = self
            .store
            .get_session(&pending.session_id)
            .await?
            .ok_or(ChatError::NotFound("Chat not found for payment."))?;
        let policy = self.store.get_policy(&pending.policy_id).await?;

        if pending.kind == PaymentKind::Message {
            if let Some(policy) = &policy {
                self.claims
                    .maybe_pay_claim_split(policy, &session, pending.amount)
                    .await;
            }
        }

        let kind = match pending.kind {
            PaymentKind::Tip => MessageKind::Tip,
            _ => MessageKind::Message,
        };
        let message = ChatMessage {
            id: short_id(),
            sender_id: pending.sender_id.clone(),
            sender_name: pending.sender_name.clone(),
            sender_role: pending.sender_role,
            message: pending.message.clone(),
            created_at: Utc::now(),
            amount: Some(pending.amount),
            kind,
        };
        let first_message = session.messages.is_empty();
        append_message(&*self.store, &self.notify, &mut session, message, true).await?;
        if first_message {
            if let Some(policy) = &policy {
                self.notify
                    .notify_new_chat(policy, &session, None, Some(&pending.message))
                    .await;
            }
        }
        Ok(SettleOutcome::Applied)
    }

    async fn apply_balance_topup(&self, event: &SettlementEvent) -> ChatResult<SettleOutcome> {
        let Some(session_id) = event.tag("session_id") else {
            return Err(ChatError::BadRequest(
                "Chat balance payment missing session id.".to_string(),
            ));
        };
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(ChatError::NotFound("Chat not found for balance payment."))?;
        self.ledger.credit(&mut session, event.amount).await?;
        Ok(SettleOutcome::Applied)
    }
}

/// Consumes the settlement feed for the process lifetime. A failing event is
/// logged and never stalls the feed; the loop stops when `shutdown` flips or
/// the feed closes.
pub fn spawn_settlement_worker(
    service: Arc<ReconciliationService>,
    mut events: mpsc::Receiver<SettlementEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    match service.settle(&event).await {
                        Ok(SettleOutcome::Ignored) => {}
                        Ok(outcome) => {
                            info!(reference = %event.reference, ?outcome, "chat settlement processed");
                        }
                        Err(err) => {
                            error!(?err, reference = %event.reference, "error processing chat settlement");
                        }
                    }
                }
            }
        }
    })
}
