use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::claims::ClaimService;
use crate::config;
use crate::error::{ChatError, ChatResult};
use crate::ledger::BalanceLedger;
use crate::models::{
    clean_name, name_key, short_id, ChatMessage, ChatSession, MessageKind, NewMessage,
    Participant, PaymentKind, PendingPayment, Policy, Role, SubmitOutcome, TipRequest,
};
use crate::notify::Notifications;
use crate::pricing::{message_cost, RateProvider};
use crate::pubsub::ChatEvent;
use crate::sessions::SessionLocks;
use crate::store::ChatStore;
use crate::wallet::{resolve_policy_wallet, AccountsDirectory, Invoice, InvoiceIssuer, CHAT_TAG};

pub const MAX_PARTICIPANTS: usize = 10;

/// Appends a message to the session, persists it and pushes it to watchers.
pub(crate) async fn append_message(
    store: &dyn ChatStore,
    notify: &Notifications,
    session: &mut ChatSession,
    message: ChatMessage,
    unread: bool,
) -> ChatResult<()> {
    let event = ChatEvent::Message {
        message: message.clone(),
    };
    session.record_message(message, unread);
    store.update_session(session).await?;
    notify.broadcast(&session.id, &event).await;
    Ok(())
}

/// Registers the sender as a participant. A sender with a known id, or a
/// display name matching an existing participant's (trimmed,
/// case-insensitive), is treated as already present.
pub(crate) fn ensure_participant(
    session: &mut ChatSession,
    sender_id: &str,
    sender_name: &str,
    role: Role,
) -> ChatResult<()> {
    let key = name_key(sender_name);
    for participant in &session.participants {
        if participant.id == sender_id {
            return Ok(());
        }
        if !key.is_empty() && name_key(&participant.name) == key {
            return Ok(());
        }
    }
    if session.participants.len() >= MAX_PARTICIPANTS {
        return Err(ChatError::BadRequest("Chat is full.".to_string()));
    }
    session.participants.push(Participant {
        id: sender_id.to_string(),
        name: sender_name.to_string(),
        role,
        joined_at: Utc::now(),
    });
    Ok(())
}

/// key: chat-admission -> decides free / drawdown / invoice-pending per message
pub struct MessageService {
    store: Arc<dyn ChatStore>,
    notify: Arc<Notifications>,
    ledger: Arc<BalanceLedger>,
    claims: Arc<ClaimService>,
    rates: Arc<dyn RateProvider>,
    invoices: Arc<dyn InvoiceIssuer>,
    accounts: Arc<dyn AccountsDirectory>,
    locks: Arc<SessionLocks>,
}

impl MessageService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ChatStore>,
        notify: Arc<Notifications>,
        ledger: Arc<BalanceLedger>,
        claims: Arc<ClaimService>,
        rates: Arc<dyn RateProvider>,
        invoices: Arc<dyn InvoiceIssuer>,
        accounts: Arc<dyn AccountsDirectory>,
        locks: Arc<SessionLocks>,
    ) -> Self {
        Self {
            store,
            notify,
            ledger,
            claims,
            rates,
            invoices,
            accounts,
            locks,
        }
    }

    /// Submits a visitor message. Depending on the policy the message is
    /// delivered immediately (free or paid from the session balance) or
    /// parked behind an invoice until the settlement feed confirms payment.
    ///
    /// `user_id` is the authenticated principal, if any; authenticated
    /// senders always take the free path.
    pub async fn send_public_message(
        &self,
        policy_id: &str,
        session_id: &str,
        data: &NewMessage,
        user_id: Option<&str>,
        base_url: Option<&str>,
    ) -> ChatResult<SubmitOutcome> {
        let policy = self
            .store
            .get_policy(policy_id)
            .await?
            .ok_or(ChatError::NotFound("Invalid policy ID."))?;

        let _guard = self.locks.acquire(session_id).await;
        let mut session = self
            .store
            .get_session_for_policy(policy_id, session_id)
            .await?
            .ok_or(ChatError::NotFound("Chat not found."))?;

        if let Some(max_chars) = policy.max_chars {
            if data.message.chars().count() as i64 > max_chars {
                return Err(ChatError::BadRequest("Message too long.".to_string()));
            }
        }

        let sender_name = clean_name(data.sender_name.as_deref(), "anon");
        ensure_participant(&mut session, &data.sender_id, &sender_name, data.sender_role)?;

        if let (Some(user_id), Some(claimed_by_id)) = (user_id, &session.claimed_by_id) {
            if claimed_by_id != user_id {
                let claimed_name = session
                    .claimed_by_name
                    .clone()
                    .unwrap_or_else(|| "another user".to_string());
                return Err(ChatError::BadRequest(format!(
                    "this chat has been claimed by {claimed_name}"
                )));
            }
        }

        let mut amount = 0;
        if policy.requires_payment && user_id.is_none() {
            amount = message_cost(&*self.rates, &policy, &data.message).await?;
        }

        if policy.requires_payment && policy.balance_mode && amount > 0 && user_id.is_none() {
            return self
                .drawdown(&policy, &mut session, amount, data, &sender_name, base_url)
                .await;
        }

        if policy.requires_payment && amount > 0 && user_id.is_none() {
            return self
                .defer_behind_invoice(&policy, &mut session, amount, data, &sender_name)
                .await;
        }

        self.deliver_free(&policy, &mut session, data, &sender_name, base_url)
            .await
    }

    /// Support-side reply: always free, always admin role, marks the session
    /// read instead of unread.
    pub async fn send_admin_message(
        &self,
        session_id: &str,
        data: &NewMessage,
    ) -> ChatResult<ChatMessage> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(ChatError::NotFound("Chat not found."))?;

        let sender_name = clean_name(data.sender_name.as_deref(), "support");
        ensure_participant(&mut session, &data.sender_id, &sender_name, Role::Admin)?;

        let message = ChatMessage {
            id: short_id(),
            sender_id: data.sender_id.clone(),
            sender_name,
            sender_role: Role::Admin,
            message: data.message.clone(),
            created_at: Utc::now(),
            amount: None,
            kind: MessageKind::Message,
        };
        append_message(
            &*self.store,
            &self.notify,
            &mut session,
            message.clone(),
            false,
        )
        .await?;
        Ok(message)
    }

    /// Creates a tip invoice. The tip becomes a message of kind `tip` once
    /// the settlement feed confirms it.
    pub async fn request_tip(
        &self,
        policy_id: &str,
        session_id: &str,
        data: &TipRequest,
    ) -> ChatResult<SubmitOutcome> {
        if data.amount <= 0 {
            return Err(ChatError::BadRequest(
                "Tip amount must be positive.".to_string(),
            ));
        }
        let policy = self
            .store
            .get_policy(policy_id)
            .await?
            .ok_or(ChatError::NotFound("Invalid policy ID."))?;
        let session = self
            .store
            .get_session_for_policy(policy_id, session_id)
            .await?
            .ok_or(ChatError::NotFound("Chat not found."))?;
        let wallet = self.require_policy_wallet(&policy).await?;

        let sender_name = clean_name(data.sender_name.as_deref(), "anon");
        let text = format!("Tip: {} sats", data.amount);
        let tags = json!({
            "tag": CHAT_TAG,
            "payment_type": PaymentKind::Tip.as_str(),
            "session_id": session.id,
            "policy_id": policy.id,
            "sender_id": data.sender_id,
            "sender_name": sender_name,
            "sender_role": Role::Public.as_str(),
            "message": text,
        });
        let invoice = self
            .invoices
            .issue(
                &wallet,
                data.amount,
                &format!("Tip for {}", policy.name),
                tags,
            )
            .await
            .map_err(|err| ChatError::BadGateway(format!("invoice creation failed: {err}")))?;

        self.store
            .insert_pending_payment(&PendingPayment {
                reference: invoice.reference.clone(),
                session_id: session.id.clone(),
                policy_id: policy.id.clone(),
                sender_id: data.sender_id.clone(),
                sender_name,
                sender_role: Role::Public,
                message: text,
                amount: data.amount,
                kind: PaymentKind::Tip,
                paid: false,
                created_at: Utc::now(),
            })
            .await?;

        Ok(SubmitOutcome::PaymentPending {
            reference: invoice.reference,
            payment_request: invoice.payment_request,
            amount: data.amount,
        })
    }

    /// Creates a balance top-up invoice for a drawdown-mode chat. Top-ups
    /// have no pending-payment record; the settlement feed credits them
    /// directly.
    pub async fn request_balance_topup(
        &self,
        policy_id: &str,
        session_id: &str,
        amount: i64,
    ) -> ChatResult<Invoice> {
        let session = self
            .store
            .get_session_for_policy(policy_id, session_id)
            .await?
            .ok_or(ChatError::NotFound("Chat not found."))?;
        let policy = self
            .store
            .get_policy(policy_id)
            .await?
            .filter(|policy| policy.requires_payment && policy.balance_mode)
            .ok_or(ChatError::NotFound("Chat does not accept balance."))?;

        let minimum = *config::MIN_TOPUP_SAT;
        let maximum = *config::MAX_TOPUP_SAT;
        if amount < minimum {
            return Err(ChatError::BadRequest(format!(
                "Amount {amount} is smaller than minimum {minimum}."
            )));
        }
        if amount > maximum {
            return Err(ChatError::BadRequest(format!(
                "Amount {amount} is greater than maximum {maximum}."
            )));
        }

        let wallet = self.require_policy_wallet(&policy).await?;
        let tags = json!({
            "tag": CHAT_TAG,
            "payment_type": PaymentKind::Balance.as_str(),
            "session_id": session.id,
            "policy_id": policy.id,
        });
        self.invoices
            .issue(
                &wallet,
                amount,
                &format!("Chat balance for {}", policy.name),
                tags,
            )
            .await
            .map_err(|err| ChatError::BadGateway(format!("invoice creation failed: {err}")))
    }

    async fn require_policy_wallet(&self, policy: &Policy) -> ChatResult<String> {
        resolve_policy_wallet(&*self.accounts, policy)
            .await
            .map_err(|err| ChatError::BadGateway(format!("wallet lookup failed: {err}")))?
            .ok_or_else(|| ChatError::BadRequest("Policy wallet not configured.".to_string()))
    }

    async fn drawdown(
        &self,
        policy: &Policy,
        session: &mut ChatSession,
        amount: i64,
        data: &NewMessage,
        sender_name: &str,
        base_url: Option<&str>,
    ) -> ChatResult<SubmitOutcome> {
        if session.balance < amount {
            return Err(ChatError::InsufficientBalance);
        }
        self.ledger.debit(session, amount).await?;
        self.claims.maybe_pay_claim_split(policy, session, amount).await;

        let message = ChatMessage {
            id: short_id(),
            sender_id: data.sender_id.clone(),
            sender_name: sender_name.to_string(),
            sender_role: data.sender_role,
            message: data.message.clone(),
            created_at: Utc::now(),
            amount: Some(amount),
            kind: MessageKind::Message,
        };
        let message_id = message.id.clone();
        let first_message = session.messages.is_empty();
        append_message(&*self.store, &self.notify, session, message, true).await?;
        if first_message {
            self.notify
                .notify_new_chat(policy, session, base_url, Some(&data.message))
                .await;
        }
        Ok(SubmitOutcome::Delivered { message_id })
    }

    async fn defer_behind_invoice(
        &self,
        policy: &Policy,
        session: &mut ChatSession,
        amount: i64,
        data: &NewMessage,
        sender_name: &str,
    ) -> ChatResult<SubmitOutcome> {
        // the message itself waits for settlement, but the participant
        // registration must not get lost with it
        self.store.update_session(session).await?;

        let wallet = self.require_policy_wallet(policy).await?;
        let tags = json!({
            "tag": CHAT_TAG,
            "payment_type": PaymentKind::Message.as_str(),
            "session_id": session.id,
            "policy_id": policy.id,
            "sender_id": data.sender_id,
            "sender_name": sender_name,
            "sender_role": data.sender_role.as_str(),
            "message": data.message,
        });
        let invoice = self
            .invoices
            .issue(
                &wallet,
                amount,
                &format!("Chat message for {}", policy.name),
                tags,
            )
            .await
            .map_err(|err| ChatError::BadGateway(format!("invoice creation failed: {err}")))?;

        self.store
            .insert_pending_payment(&PendingPayment {
                reference: invoice.reference.clone(),
                session_id: session.id.clone(),
                policy_id: policy.id.clone(),
                sender_id: data.sender_id.clone(),
                sender_name: sender_name.to_string(),
                sender_role: data.sender_role,
                message: data.message.clone(),
                amount,
                kind: PaymentKind::Message,
                paid: false,
                created_at: Utc::now(),
            })
            .await?;

        Ok(SubmitOutcome::PaymentPending {
            reference: invoice.reference,
            payment_request: invoice.payment_request,
            amount,
        })
    }

    async fn deliver_free(
        &self,
        policy: &Policy,
        session: &mut ChatSession,
        data: &NewMessage,
        sender_name: &str,
        base_url: Option<&str>,
    ) -> ChatResult<SubmitOutcome> {
        let message = ChatMessage {
            id: short_id(),
            sender_id: data.sender_id.clone(),
            sender_name: sender_name.to_string(),
            sender_role: data.sender_role,
            message: data.message.clone(),
            created_at: Utc::now(),
            amount: None,
            kind: MessageKind::Message,
        };
        let message_id = message.id.clone();
        let first_message = session.messages.is_empty();
        append_message(&*self.store, &self.notify, session, message, true).await?;
        if first_message {
            self.notify
                .notify_new_chat(policy, session, base_url, Some(&data.message))
                .await;
        }
        Ok(SubmitOutcome::Delivered { message_id })
    }
}
