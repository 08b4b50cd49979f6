use std::sync::Arc;

use chrono::Utc;

use crate::error::{ChatError, ChatResult};
use crate::models::{short_id, NewPolicy, Policy, PublicPolicy};
use crate::pricing::NATIVE_DENOMINATION;
use crate::store::ChatStore;

/// Brings a submitted policy into a consistent shape: chats that are not
/// payment-gated cannot run in balance mode or split claims, and the claim
/// split is capped at 90%.
fn normalize(data: &mut NewPolicy) {
    if !data.requires_payment {
        data.balance_mode = false;
        data.claim_split = 0.0;
    }
    data.claim_split = data.claim_split.clamp(0.0, 90.0);
}

/// key: chat-policies -> monetization configuration lifecycle
pub struct PolicyService {
    store: Arc<dyn ChatStore>,
}

impl PolicyService {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, user_id: &str, mut data: NewPolicy) -> ChatResult<Policy> {
        normalize(&mut data);
        let now = Utc::now();
        let policy = Policy {
            id: short_id(),
            user_id: user_id.to_string(),
            name: data.name,
            wallet: data.wallet,
            requires_payment: data.requires_payment,
            balance_mode: data.balance_mode,
            tips_enabled: data.tips_enabled,
            max_chars: data.max_chars,
            price_per_char: data.price_per_char,
            denomination: data
                .denomination
                .unwrap_or_else(|| NATIVE_DENOMINATION.to_string()),
            claim_split: data.claim_split,
            notify_telegram: data.notify_telegram,
            notify_nostr: data.notify_nostr,
            notify_email: data.notify_email,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_policy(&policy).await?;
        Ok(policy)
    }

    pub async fn update(
        &self,
        user_id: &str,
        policy_id: &str,
        mut data: NewPolicy,
    ) -> ChatResult<Policy> {
        let mut policy = self
            .store
            .get_policy_for_user(user_id, policy_id)
            .await?
            .ok_or(ChatError::NotFound("Policy not found."))?;
        normalize(&mut data);
        policy.name = data.name;
        policy.wallet = data.wallet;
        policy.requires_payment = data.requires_payment;
        policy.balance_mode = data.balance_mode;
        policy.tips_enabled = data.tips_enabled;
        policy.max_chars = data.max_chars;
        policy.price_per_char = data.price_per_char;
        if let Some(denomination) = data.denomination {
            policy.denomination = denomination;
        }
        policy.claim_split = data.claim_split;
        policy.notify_telegram = data.notify_telegram;
        policy.notify_nostr = data.notify_nostr;
        policy.notify_email = data.notify_email;
        policy.updated_at = Utc::now();
        self.store.update_policy(&policy).await?;
        Ok(policy)
    }

    pub async fn get(&self, user_id: &str, policy_id: &str) -> ChatResult<Policy> {
        self.store
            .get_policy_for_user(user_id, policy_id)
            .await?
            .ok_or(ChatError::NotFound("Policy not found."))
    }

    pub async fn get_public(&self, policy_id: &str) -> ChatResult<PublicPolicy> {
        let policy = self
            .store
            .get_policy(policy_id)
            .await?
            .ok_or(ChatError::NotFound("Policy not found."))?;
        Ok(PublicPolicy::from(&policy))
    }

    /// Deletion does not cascade: sessions under the policy stay behind and
    /// keep working read-only through their stored ids.
    pub async fn delete(&self, user_id: &str, policy_id: &str) -> ChatResult<()> {
        self.store.delete_policy(user_id, policy_id).await?;
        Ok(())
    }
}
