use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Random 32-char hex identifier, URL-safe.
pub fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Trimmed display name, falling back when empty or missing.
pub fn clean_name(value: Option<&str>, fallback: &str) -> String {
    match value {
        Some(raw) => {
            let cleaned = raw.trim();
            if cleaned.is_empty() {
                fallback.to_string()
            } else {
                cleaned.to_string()
            }
        }
        None => fallback.to_string(),
    }
}

/// Comparison key for participant display names. Two participants whose names
/// agree under this key are treated as the same person.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Public,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Public => "public",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Message,
    Tip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Message,
    Tip,
    Balance,
}

impl PaymentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentKind::Message => "message",
            PaymentKind::Tip => "tip",
            PaymentKind::Balance => "balance",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: Role,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub amount: Option<i64>,
    pub kind: MessageKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub policy_id: String,
    pub title: Option<String>,
    pub resolved: bool,
    pub unread: bool,
    pub public_url: Option<String>,
    pub balance: i64,
    pub claimed_by_id: Option<String>,
    pub claimed_by_name: Option<String>,
    pub participants: Vec<Participant>,
    pub messages: Vec<ChatMessage>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Appends a message and updates the read/ordering bookkeeping. The caller
    /// persists the session afterwards.
    pub fn record_message(&mut self, message: ChatMessage, unread: bool) {
        self.last_message_at = Some(message.created_at);
        self.messages.push(message);
        self.unread = unread;
        self.updated_at = Utc::now();
    }
}

/// Durable record of an invoice awaiting settlement. `paid` flips false→true
/// exactly once; rows are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPayment {
    pub reference: String,
    pub session_id: String,
    pub policy_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: Role,
    pub message: String,
    pub amount: i64,
    pub kind: PaymentKind,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub wallet: Option<String>,
    pub requires_payment: bool,
    pub balance_mode: bool,
    pub tips_enabled: bool,
    pub max_chars: Option<i64>,
    pub price_per_char: Option<f64>,
    pub denomination: String,
    pub claim_split: f64,
    pub notify_telegram: Option<String>,
    pub notify_nostr: Option<String>,
    pub notify_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Projection of a policy safe to show to unauthenticated visitors.
#[derive(Debug, Clone, Serialize)]
pub struct PublicPolicy {
    pub id: String,
    pub name: String,
    pub requires_payment: bool,
    pub balance_mode: bool,
    pub tips_enabled: bool,
    pub max_chars: Option<i64>,
    pub price_per_char: Option<f64>,
    pub denomination: String,
    pub claim_split: f64,
}

impl From<&Policy> for PublicPolicy {
    fn from(policy: &Policy) -> Self {
        PublicPolicy {
            id: policy.id.clone(),
            name: policy.name.clone(),
            requires_payment: policy.requires_payment,
            balance_mode: policy.balance_mode,
            tips_enabled: policy.tips_enabled,
            max_chars: policy.max_chars,
            price_per_char: policy.price_per_char,
            denomination: policy.denomination.clone(),
            claim_split: policy.claim_split,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPolicy {
    pub name: String,
    pub wallet: Option<String>,
    #[serde(default)]
    pub requires_payment: bool,
    #[serde(default)]
    pub balance_mode: bool,
    #[serde(default)]
    pub tips_enabled: bool,
    pub max_chars: Option<i64>,
    pub price_per_char: Option<f64>,
    pub denomination: Option<String>,
    #[serde(default)]
    pub claim_split: f64,
    pub notify_telegram: Option<String>,
    pub notify_nostr: Option<String>,
    pub notify_email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSession {
    pub participant_id: Option<String>,
    pub participant_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub sender_role: Role,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TipRequest {
    pub amount: i64,
    pub sender_id: String,
    pub sender_name: Option<String>,
}

/// Result of submitting a message: either delivered straight away, or parked
/// behind an invoice that the sender still has to pay.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Delivered {
        message_id: String,
    },
    PaymentPending {
        reference: String,
        payment_request: String,
        amount: i64,
    },
}
