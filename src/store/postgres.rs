use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use super::{ChatStore, StoreError};
use crate::models::{ChatSession, PendingPayment, Policy};

/// Postgres-backed record store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn policy_from_row(row: &PgRow) -> Result<Policy, StoreError> {
    Ok(Policy {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        wallet: row.try_get("wallet")?,
        requires_payment: row.try_get("requires_payment")?,
        balance_mode: row.try_get("balance_mode")?,
        tips_enabled: row.try_get("tips_enabled")?,
        max_chars: row.try_get("max_chars")?,
        price_per_char: row.try_get("price_per_char")?,
        denomination: row.try_get("denomination")?,
        claim_split: row.try_get("claim_split")?,
        notify_telegram: row.try_get("notify_telegram")?,
        notify_nostr: row.try_get("notify_nostr")?,
        notify_email: row.try_get("notify_email")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<ChatSession, StoreError> {
    let participants: Value = row.try_get("participants")?;
    let messages: Value = row.try_get("messages")?;
    Ok(ChatSession {
        id: row.try_get("id")?,
        policy_id: row.try_get("policy_id")?,
        title: row.try_get("title")?,
        resolved: row.try_get("resolved")?,
        unread: row.try_get("unread")?,
        public_url: row.try_get("public_url")?,
        balance: row.try_get("balance")?,
        claimed_by_id: row.try_get("claimed_by_id")?,
        claimed_by_name: row.try_get("claimed_by_name")?,
        participants: serde_json::from_value(participants)?,
        messages: serde_json::from_value(messages)?,
        last_message_at: row.try_get("last_message_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<PendingPayment, StoreError> {
    let sender_role: String = row.try_get("sender_role")?;
    let kind: String = row.try_get("kind")?;
    Ok(PendingPayment {
        reference: row.try_get("reference")?,
        session_id: row.try_get("session_id")?,
        policy_id: row.try_get("policy_id")?,
        sender_id: row.try_get("sender_id")?,
        sender_name: row.try_get("sender_name")?,
        sender_role: serde_json::from_value(Value::String(sender_role))?,
        message: row.try_get("message")?,
        amount: row.try_get("amount")?,
        kind: serde_json::from_value(Value::String(kind))?,
        paid: row.try_get("paid")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ChatStore for PgStore {
    async fn insert_policy(&self, policy: &Policy) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO chat_policies (
                id, user_id, name, wallet, requires_payment, balance_mode,
                tips_enabled, max_chars, price_per_char, denomination,
                claim_split, notify_telegram, notify_nostr, notify_email,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(&policy.id)
        .bind(&policy.user_id)
        .bind(&policy.name)
        .bind(&policy.wallet)
        .bind(policy.requires_payment)
        .bind(policy.balance_mode)
        .bind(policy.tips_enabled)
        .bind(policy.max_chars)
        .bind(policy.price_per_char)
        .bind(&policy.denomination)
        .bind(policy.claim_split)
        .bind(&policy.notify_telegram)
        .bind(&policy.notify_nostr)
        .bind(&policy.notify_email)
        .bind(policy.created_at)
        .bind(policy.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_policy(&self, policy: &Policy) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE chat_policies SET
                name = $2, wallet = $3, requires_payment = $4, balance_mode = $5,
                tips_enabled = $6, max_chars = $7, price_per_char = $8,
                denomination = $9, claim_split = $10, notify_telegram = $11,
                notify_nostr = $12, notify_email = $13, updated_at = $14
            WHERE id = $1
            "#,
        )
        .bind(&policy.id)
        .bind(&policy.name)
        .bind(&policy.wallet)
        .bind(policy.requires_payment)
        .bind(policy.balance_mode)
        .bind(policy.tips_enabled)
        .bind(policy.max_chars)
        .bind(policy.price_per_char)
        .bind(&policy.denomination)
        .bind(policy.claim_split)
        .bind(&policy.notify_telegram)
        .bind(&policy.notify_nostr)
        .bind(&policy.notify_email)
        .bind(policy.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_policy(&self, policy_id: &str) -> Result<Option<Policy>, StoreError> {
        let row = sqlx::query("SELECT * FROM chat_policies WHERE id = $1")
            .bind(policy_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(policy_from_row).transpose()
    }

    async fn get_policy_for_user(
        &self,
        user_id: &str,
        policy_id: &str,
    ) -> Result<Option<Policy>, StoreError> {
        let row = sqlx::query("SELECT * FROM chat_policies WHERE id = $1 AND user_id = $2")
            .bind(policy_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(policy_from_row).transpose()
    }

    async fn policy_ids_for_user(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let ids = sqlx::query_scalar("SELECT DISTINCT id FROM chat_policies WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn delete_policy(&self, user_id: &str, policy_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM chat_policies WHERE id = $1 AND user_id = $2")
            .bind(policy_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_session(&self, session: &ChatSession) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO chat_sessions (
                id, policy_id, title, resolved, unread, public_url, balance,
                claimed_by_id, claimed_by_name, participants, messages,
                last_message_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&session.id)
        .bind(&session.policy_id)
        .bind(&session.title)
        .bind(session.resolved)
        .bind(session.unread)
        .bind(&session.public_url)
        .bind(session.balance)
        .bind(&session.claimed_by_id)
        .bind(&session.claimed_by_name)
        .bind(serde_json::to_value(&session.participants)?)
        .bind(serde_json::to_value(&session.messages)?)
        .bind(session.last_message_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_session(&self, session: &ChatSession) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE chat_sessions SET
                title = $2, resolved = $3, unread = $4, public_url = $5,
                balance = $6, claimed_by_id = $7, claimed_by_name = $8,
                participants = $9, messages = $10, last_message_at = $11,
                updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(&session.id)
        .bind(&session.title)
        .bind(session.resolved)
        .bind(session.unread)
        .bind(&session.public_url)
        .bind(session.balance)
        .bind(&session.claimed_by_id)
        .bind(&session.claimed_by_name)
        .bind(serde_json::to_value(&session.participants)?)
        .bind(serde_json::to_value(&session.messages)?)
        .bind(session.last_message_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>, StoreError> {
        let row = sqlx::query("SELECT * FROM chat_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn get_session_for_policy(
        &self,
        policy_id: &str,
        session_id: &str,
    ) -> Result<Option<ChatSession>, StoreError> {
        let row = sqlx::query("SELECT * FROM chat_sessions WHERE id = $1 AND policy_id = $2")
            .bind(session_id)
            .bind(policy_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn sessions_for_policies(
        &self,
        policy_ids: &[String],
    ) -> Result<Vec<ChatSession>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM chat_sessions
            WHERE policy_id = ANY($1)
            ORDER BY COALESCE(last_message_at, created_at) DESC
            "#,
        )
        .bind(policy_ids)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(session_from_row).collect()
    }

    async fn delete_session(&self, policy_id: &str, session_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM chat_sessions WHERE id = $1 AND policy_id = $2")
            .bind(session_id)
            .bind(policy_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_empty_sessions_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM chat_sessions
            WHERE (messages IS NULL OR messages = '[]'::jsonb)
              AND created_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_pending_payment(&self, payment: &PendingPayment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO chat_pending_payments (
                reference, session_id, policy_id, sender_id, sender_name,
                sender_role, message, amount, kind, paid, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&payment.reference)
        .bind(&payment.session_id)
        .bind(&payment.policy_id)
        .bind(&payment.sender_id)
        .bind(&payment.sender_name)
        .bind(payment.sender_role.as_str())
        .bind(&payment.message)
        .bind(payment.amount)
        .bind(payment.kind.as_str())
        .bind(payment.paid)
        .bind(payment.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_pending_payment(&self, payment: &PendingPayment) -> Result<(), StoreError> {
        sqlx::query("UPDATE chat_pending_payments SET paid = $2 WHERE reference = $1")
            .bind(&payment.reference)
            .bind(payment.paid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_pending_payment(
        &self,
        reference: &str,
    ) -> Result<Option<PendingPayment>, StoreError> {
        let row = sqlx::query("SELECT * FROM chat_pending_payments WHERE reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(payment_from_row).transpose()
    }
}
