mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{ChatSession, PendingPayment, Policy};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Keyed record store for policies, chat sessions and pending payments.
///
/// Single-record reads and writes only; serialization of read-modify-write
/// sequences on one session is the caller's job (see `SessionLocks`).
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn insert_policy(&self, policy: &Policy) -> Result<(), StoreError>;
    async fn update_policy(&self, policy: &Policy) -> Result<(), StoreError>;
    async fn get_policy(&self, policy_id: &str) -> Result<Option<Policy>, StoreError>;
    async fn get_policy_for_user(
        &self,
        user_id: &str,
        policy_id: &str,
    ) -> Result<Option<Policy>, StoreError>;
    async fn policy_ids_for_user(&self, user_id: &str) -> Result<Vec<String>, StoreError>;
    async fn delete_policy(&self, user_id: &str, policy_id: &str) -> Result<(), StoreError>;

    async fn insert_session(&self, session: &ChatSession) -> Result<(), StoreError>;
    async fn update_session(&self, session: &ChatSession) -> Result<(), StoreError>;
    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>, StoreError>;
    async fn get_session_for_policy(
        &self,
        policy_id: &str,
        session_id: &str,
    ) -> Result<Option<ChatSession>, StoreError>;
    async fn sessions_for_policies(
        &self,
        policy_ids: &[String],
    ) -> Result<Vec<ChatSession>, StoreError>;
    async fn delete_session(&self, policy_id: &str, session_id: &str) -> Result<(), StoreError>;
    /// Deletes sessions with no messages created before `cutoff`, returning
    /// how many were removed.
    async fn delete_empty_sessions_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn insert_pending_payment(&self, payment: &PendingPayment) -> Result<(), StoreError>;
    async fn update_pending_payment(&self, payment: &PendingPayment) -> Result<(), StoreError>;
    async fn get_pending_payment(
        &self,
        reference: &str,
    ) -> Result<Option<PendingPayment>, StoreError>;
}
