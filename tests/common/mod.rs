#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use paychat::models::{ChatSession, NewMessage, NewSession, Policy, Role};
use paychat::notify::{ContactChannels, Notifier};
use paychat::pricing::RateProvider;
use paychat::pubsub::Broadcaster;
use paychat::store::MemoryStore;
use paychat::wallet::{Account, AccountsDirectory, Invoice, InvoiceIssuer, SettlementEvent};
use paychat::ChatCore;

/// Broadcaster that records every publish instead of pushing anywhere.
#[derive(Default)]
pub struct RecordingBroadcaster {
    published: Mutex<Vec<(String, String)>>,
}

impl RecordingBroadcaster {
    pub fn payloads_for(&self, channel: &str) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == channel)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn publish(&self, channel: &str, payload: String) -> anyhow::Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((channel.to_string(), payload));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notified: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.notified.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        _channels: &ContactChannels,
        message: &str,
        category: &str,
    ) -> anyhow::Result<()> {
        self.notified
            .lock()
            .unwrap()
            .push((message.to_string(), category.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct IssuedInvoice {
    pub wallet_id: String,
    pub amount: i64,
    pub memo: String,
    pub tags: Value,
}

#[derive(Debug, Clone)]
pub struct PaidInvoice {
    pub wallet_id: String,
    pub payment_request: String,
    pub max_amount: i64,
}

/// Invoice backend double: mints predictable references and remembers every
/// issue/pay call. Failure flags let tests exercise best-effort paths.
#[derive(Default)]
pub struct FakeInvoiceIssuer {
    counter: AtomicUsize,
    pub fail_issue: AtomicBool,
    pub fail_pay: AtomicBool,
    issued: Mutex<Vec<IssuedInvoice>>,
    paid: Mutex<Vec<PaidInvoice>>,
}

impl FakeInvoiceIssuer {
    pub fn issued(&self) -> Vec<IssuedInvoice> {
        self.issued.lock().unwrap().clone()
    }

    pub fn paid(&self) -> Vec<PaidInvoice> {
        self.paid.lock().unwrap().clone()
    }
}

#[async_trait]
impl InvoiceIssuer for FakeInvoiceIssuer {
    async fn issue(
        &self,
        wallet_id: &str,
        amount: i64,
        memo: &str,
        tags: Value,
    ) -> anyhow::Result<Invoice> {
        if self.fail_issue.load(Ordering::SeqCst) {
            anyhow::bail!("invoice backend down");
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.issued.lock().unwrap().push(IssuedInvoice {
            wallet_id: wallet_id.to_string(),
            amount,
            memo: memo.to_string(),
            tags,
        });
        Ok(Invoice {
            reference: format!("ref-{n}"),
            payment_request: format!("lnbc-{n}"),
        })
    }

    async fn pay(
        &self,
        wallet_id: &str,
        payment_request: &str,
        max_amount: i64,
        _memo: &str,
    ) -> anyhow::Result<()> {
        if self.fail_pay.load(Ordering::SeqCst) {
            anyhow::bail!("payment failed");
        }
        self.paid.lock().unwrap().push(PaidInvoice {
            wallet_id: wallet_id.to_string(),
            payment_request: payment_request.to_string(),
            max_amount,
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct StaticAccounts {
    users: Mutex<HashMap<String, (Option<String>, Vec<String>)>>,
}

impl StaticAccounts {
    pub fn insert(&self, user_id: &str, username: Option<&str>, wallets: &[&str]) {
        self.users.lock().unwrap().insert(
            user_id.to_string(),
            (
                username.map(str::to_string),
                wallets.iter().map(|w| w.to_string()).collect(),
            ),
        );
    }
}

#[async_trait]
impl AccountsDirectory for StaticAccounts {
    async fn get_account(&self, user_id: &str) -> anyhow::Result<Option<Account>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .get(user_id)
            .map(|(username, _)| Account {
                id: user_id.to_string(),
                username: username.clone(),
            }))
    }

    async fn wallets_for(&self, user_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .get(user_id)
            .map(|(_, wallets)| wallets.clone())
            .unwrap_or_default())
    }
}

pub struct FixedRate(pub f64);

#[async_trait]
impl RateProvider for FixedRate {
    async fn to_native_units(&self, amount: f64, _denomination: &str) -> anyhow::Result<f64> {
        Ok(amount * self.0)
    }
}

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

pub struct Harness {
    pub core: ChatCore,
    pub store: Arc<MemoryStore>,
    pub broadcaster: Arc<RecordingBroadcaster>,
    pub notifier: Arc<RecordingNotifier>,
    pub invoices: Arc<FakeInvoiceIssuer>,
    pub accounts: Arc<StaticAccounts>,
}

pub fn harness() -> Harness {
    harness_with_rate(1.0)
}

pub fn harness_with_rate(rate: f64) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let invoices = Arc::new(FakeInvoiceIssuer::default());
    let accounts = Arc::new(StaticAccounts::default());
    let core = ChatCore::new(
        store.clone(),
        broadcaster.clone(),
        notifier.clone(),
        invoices.clone(),
        accounts.clone(),
        Arc::new(FixedRate(rate)),
    );
    Harness {
        core,
        store,
        broadcaster,
        notifier,
        invoices,
        accounts,
    }
}

/// A free policy owned by `user_id`, with an email notify target so new-chat
/// notifications fire. Tests tweak fields before inserting.
pub fn base_policy(user_id: &str) -> Policy {
    Policy {
        id: paychat::models::short_id(),
        user_id: user_id.to_string(),
        name: "Support".to_string(),
        wallet: Some("policy-wallet".to_string()),
        requires_payment: false,
        balance_mode: false,
        tips_enabled: false,
        max_chars: None,
        price_per_char: None,
        denomination: "sat".to_string(),
        claim_split: 0.0,
        notify_telegram: None,
        notify_nostr: None,
        notify_email: Some("owner@example.com".to_string()),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub async fn insert_policy(h: &Harness, policy: &Policy) {
    use paychat::store::ChatStore;
    h.store.insert_policy(policy).await.unwrap();
}

pub async fn open_session(h: &Harness, policy_id: &str) -> ChatSession {
    h.core
        .sessions
        .create_public_session(policy_id, &NewSession::default(), "https://chat.example.com")
        .await
        .unwrap()
}

pub fn visitor_message(text: &str) -> NewMessage {
    NewMessage {
        sender_id: "visitor-1".to_string(),
        sender_name: Some("Visitor".to_string()),
        sender_role: Role::Public,
        message: text.to_string(),
    }
}

pub fn settlement(reference: &str, amount: i64, tags: Value) -> SettlementEvent {
    SettlementEvent {
        reference: reference.to_string(),
        amount,
        tags,
    }
}
