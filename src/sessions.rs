use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{ChatError, ChatResult};
use crate::models::{
    clean_name, short_id, ChatSession, NewSession, Participant, Role,
};
use crate::notify::{build_chat_link, Notifications};
use crate::pubsub::ChatEvent;
use crate::store::ChatStore;

/// Per-session mutual exclusion. Every read-modify-write of one session
/// (admission, balance changes, claim toggles, reconciliation) runs under the
/// session's lock; different sessions never contend.
#[derive(Default)]
pub struct SessionLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        lock.lock_owned().await
    }
}

/// key: chat-sessions -> session lifecycle
pub struct SessionService {
    store: Arc<dyn ChatStore>,
    notify: Arc<Notifications>,
    locks: Arc<SessionLocks>,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        notify: Arc<Notifications>,
        locks: Arc<SessionLocks>,
    ) -> Self {
        Self {
            store,
            notify,
            locks,
        }
    }

    /// Opens a new public chat under a policy, seeding the opening visitor as
    /// its first participant.
    pub async fn create_public_session(
        &self,
        policy_id: &str,
        data: &NewSession,
        base_url: &str,
    ) -> ChatResult<ChatSession> {
        let policy = self
            .store
            .get_policy(policy_id)
            .await?
            .ok_or(ChatError::NotFound("Invalid policy ID."))?;

        let participant = Participant {
            id: clean_name(data.participant_id.as_deref(), &short_id()),
            name: clean_name(data.participant_name.as_deref(), "anon"),
            role: Role::Public,
            joined_at: Utc::now(),
        };

        let now = Utc::now();
        let mut session = ChatSession {
            id: short_id(),
            policy_id: policy.id.clone(),
            title: None,
            resolved: false,
            unread: true,
            public_url: None,
            balance: 0,
            claimed_by_id: None,
            claimed_by_name: None,
            participants: vec![participant],
            messages: vec![],
            last_message_at: None,
            created_at: now,
            updated_at: now,
        };
        session.public_url = Some(build_chat_link(Some(base_url), &session));
        self.store.insert_session(&session).await?;
        Ok(session)
    }

    pub async fn get_public_session(
        &self,
        policy_id: &str,
        session_id: &str,
    ) -> ChatResult<ChatSession> {
        self.store
            .get_session_for_policy(policy_id, session_id)
            .await?
            .ok_or(ChatError::NotFound("Chat not found."))
    }

    /// Admin-side fetch: the caller must own the session's policy.
    pub async fn get_session_for_owner(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> ChatResult<ChatSession> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(ChatError::NotFound("Chat not found."))?;
        self.store
            .get_policy_for_user(user_id, &session.policy_id)
            .await?
            .ok_or(ChatError::NotFound("Policy deleted for this chat."))?;
        Ok(session)
    }

    /// All sessions under the caller's policies, most recently active first.
    pub async fn list_for_owner(
        &self,
        user_id: &str,
        policy_id: Option<&str>,
    ) -> ChatResult<Vec<ChatSession>> {
        let mut policy_ids = self.store.policy_ids_for_user(user_id).await?;
        if let Some(policy_id) = policy_id {
            if !policy_ids.iter().any(|id| id == policy_id) {
                return Err(ChatError::Forbidden);
            }
            policy_ids = vec![policy_id.to_string()];
        }
        if policy_ids.is_empty() {
            return Ok(vec![]);
        }
        Ok(self.store.sessions_for_policies(&policy_ids).await?)
    }

    pub async fn mark_resolved(&self, session_id: &str, resolved: bool) -> ChatResult<ChatSession> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(ChatError::NotFound("Chat not found."))?;
        session.resolved = resolved;
        session.updated_at = Utc::now();
        self.store.update_session(&session).await?;
        self.notify
            .broadcast(&session.id, &ChatEvent::Resolved { resolved })
            .await;
        Ok(session)
    }

    /// Clears the unread flag. Already-seen sessions are left untouched.
    pub async fn mark_seen(&self, session_id: &str) -> ChatResult<ChatSession> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(ChatError::NotFound("Chat not found."))?;
        if session.unread {
            session.unread = false;
            session.updated_at = Utc::now();
            self.store.update_session(&session).await?;
            self.notify.broadcast(&session.id, &ChatEvent::Seen).await;
        }
        Ok(session)
    }
}
