use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{ChatStore, StoreError};
use crate::models::{ChatSession, PendingPayment, Policy};

/// In-memory record store, used by tests and embedders that do not need
/// durability.
#[derive(Default)]
pub struct MemoryStore {
    policies: DashMap<String, Policy>,
    sessions: DashMap<String, ChatSession>,
    payments: DashMap<String, PendingPayment>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn insert_policy(&self, policy: &Policy) -> Result<(), StoreError> {
        self.policies.insert(policy.id.clone(), policy.clone());
        Ok(())
    }

    async fn update_policy(&self, policy: &Policy) -> Result<(), StoreError> {
        self.policies.insert(policy.id.clone(), policy.clone());
        Ok(())
    }

    async fn get_policy(&self, policy_id: &str) -> Result<Option<Policy>, StoreError> {
        Ok(self.policies.get(policy_id).map(|entry| entry.value().clone()))
    }

    async fn get_policy_for_user(
        &self,
        user_id: &str,
        policy_id: &str,
    ) -> Result<Option<Policy>, StoreError> {
        Ok(self
            .policies
            .get(policy_id)
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone()))
    }

    async fn policy_ids_for_user(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .policies
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.id.clone())
            .collect())
    }

    async fn delete_policy(&self, user_id: &str, policy_id: &str) -> Result<(), StoreError> {
        self.policies
            .remove_if(policy_id, |_, policy| policy.user_id == user_id);
        Ok(())
    }

    async fn insert_session(&self, session: &ChatSession) -> Result<(), StoreError> {
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn update_session(&self, session: &ChatSession) -> Result<(), StoreError> {
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>, StoreError> {
        Ok(self.sessions.get(session_id).map(|entry| entry.value().clone()))
    }

    async fn get_session_for_policy(
        &self,
        policy_id: &str,
        session_id: &str,
    ) -> Result<Option<ChatSession>, StoreError> {
        Ok(self
            .sessions
            .get(session_id)
            .filter(|entry| entry.policy_id == policy_id)
            .map(|entry| entry.value().clone()))
    }

    async fn sessions_for_policies(
        &self,
        policy_ids: &[String],
    ) -> Result<Vec<ChatSession>, StoreError> {
        let mut sessions: Vec<ChatSession> = self
            .sessions
            .iter()
            .filter(|entry| policy_ids.contains(&entry.policy_id))
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by_key(|session| {
            std::cmp::Reverse(session.last_message_at.unwrap_or(session.created_at))
        });
        Ok(sessions)
    }

    async fn delete_session(&self, policy_id: &str, session_id: &str) -> Result<(), StoreError> {
        self.sessions
            .remove_if(session_id, |_, session| session.policy_id == policy_id);
        Ok(())
    }

    async fn delete_empty_sessions_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            if session.messages.is_empty() && session.created_at < cutoff {
                removed += 1;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn insert_pending_payment(&self, payment: &PendingPayment) -> Result<(), StoreError> {
        self.payments.insert(payment.reference.clone(), payment.clone());
        Ok(())
    }

    async fn update_pending_payment(&self, payment: &PendingPayment) -> Result<(), StoreError> {
        self.payments.insert(payment.reference.clone(), payment.clone());
        Ok(())
    }

    async fn get_pending_payment(
        &self,
        reference: &str,
    ) -> Result<Option<PendingPayment>, StoreError> {
        Ok(self.payments.get(reference).map(|entry| entry.value().clone()))
    }
}
