use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::warn;

use crate::error::{ChatError, ChatResult};
use crate::models::{ChatSession, Policy};
use crate::notify::Notifications;
use crate::pubsub::ChatEvent;
use crate::sessions::SessionLocks;
use crate::store::ChatStore;
use crate::wallet::{resolve_policy_wallet, AccountsDirectory, InvoiceIssuer, CHAT_TAG};

/// Share of a gated payment routed to the claim owner, floored to whole
/// units.
fn split_amount(amount: i64, percent: f64) -> i64 {
    let percent = percent.clamp(0.0, 100.0);
    (amount as f64 * (percent / 100.0)).floor() as i64
}

/// key: chat-claims -> exclusive session ownership and claim-split payouts
pub struct ClaimService {
    store: Arc<dyn ChatStore>,
    notify: Arc<Notifications>,
    accounts: Arc<dyn AccountsDirectory>,
    invoices: Arc<dyn InvoiceIssuer>,
    locks: Arc<SessionLocks>,
}

impl ClaimService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        notify: Arc<Notifications>,
        accounts: Arc<dyn AccountsDirectory>,
        invoices: Arc<dyn InvoiceIssuer>,
        locks: Arc<SessionLocks>,
    ) -> Self {
        Self {
            store,
            notify,
            accounts,
            invoices,
            locks,
        }
    }

    /// Claims the session for `user_id`, or releases it when that same user
    /// already holds the claim.
    pub async fn toggle_claim(&self, session_id: &str, user_id: &str) -> ChatResult<ChatSession> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(ChatError::NotFound("Chat not found."))?;

        let account = self
            .accounts
            .get_account(user_id)
            .await
            .map_err(|err| ChatError::BadGateway(format!("account lookup failed: {err}")))?
            .ok_or(ChatError::NotFound("User not found."))?;

        match session.claimed_by_id.as_deref() {
            Some(owner) if owner == user_id => {
                session.claimed_by_id = None;
                session.claimed_by_name = None;
            }
            Some(_) => {
                let claimed_name = session
                    .claimed_by_name
                    .clone()
                    .unwrap_or_else(|| "another user".to_string());
                return Err(ChatError::BadRequest(format!(
                    "this chat has been claimed by {claimed_name}"
                )));
            }
            None => {
                session.claimed_by_id = Some(user_id.to_string());
                session.claimed_by_name =
                    Some(account.username.unwrap_or_else(|| "user".to_string()));
            }
        }

        session.updated_at = Utc::now();
        self.store.update_session(&session).await?;
        self.notify
            .broadcast(
                &session.id,
                &ChatEvent::Claim {
                    claimed_by_id: session.claimed_by_id.clone(),
                    claimed_by_name: session.claimed_by_name.clone(),
                },
            )
            .await;
        Ok(session)
    }

    /// Routes the configured share of `amount` to the current claim owner.
    /// No-op when the session is unclaimed, the share is zero, or either side
    /// has no wallet. Never fails the surrounding message flow.
    pub async fn maybe_pay_claim_split(
        &self,
        policy: &Policy,
        session: &ChatSession,
        amount: i64,
    ) {
        let Some(claimed_by_id) = session.claimed_by_id.clone() else {
            return;
        };
        if policy.claim_split <= 0.0 {
            return;
        }
        let payout = split_amount(amount, policy.claim_split);
        if payout <= 0 {
            return;
        }
        if let Err(err) = self
            .pay_claim_split(policy, session, &claimed_by_id, payout)
            .await
        {
            warn!(?err, session_id = %session.id, "Chat claim split payment failed");
        }
    }

    async fn pay_claim_split(
        &self,
        policy: &Policy,
        session: &ChatSession,
        claimed_by_id: &str,
        payout: i64,
    ) -> anyhow::Result<()> {
        let claimer_wallets = self.accounts.wallets_for(claimed_by_id).await?;
        let Some(claimer_wallet) = claimer_wallets.first() else {
            return Ok(());
        };
        let Some(policy_wallet) = resolve_policy_wallet(&*self.accounts, policy).await? else {
            return Ok(());
        };
        let tags = json!({
            "tag": CHAT_TAG,
            "payment_type": "claim_split",
            "session_id": session.id,
            "policy_id": session.policy_id,
            "claimed_by_id": claimed_by_id,
        });
        let invoice = self
            .invoices
            .issue(
                claimer_wallet,
                payout,
                &format!("Chat claim split for {}", policy.name),
                tags,
            )
            .await?;
        self.invoices
            .pay(
                &policy_wallet,
                &invoice.payment_request,
                payout,
                "Chat claim split",
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::split_amount;

    #[test]
    fn split_is_floored() {
        assert_eq!(split_amount(100, 10.0), 10);
        assert_eq!(split_amount(99, 10.0), 9);
        assert_eq!(split_amount(7, 33.0), 2);
    }

    #[test]
    fn split_percentage_is_clamped() {
        assert_eq!(split_amount(100, 150.0), 100);
        assert_eq!(split_amount(100, -5.0), 0);
    }
}
