use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Policy;

/// Tag carried by every payment this crate issues, so that settlement events
/// from unrelated parts of the host can be told apart.
pub const CHAT_TAG: &str = "chat";

#[derive(Debug, Clone)]
pub struct Invoice {
    pub reference: String,
    pub payment_request: String,
}

/// Payment backend: issues invoices and pays them out of a funding wallet.
#[async_trait]
pub trait InvoiceIssuer: Send + Sync {
    async fn issue(
        &self,
        wallet_id: &str,
        amount: i64,
        memo: &str,
        tags: Value,
    ) -> anyhow::Result<Invoice>;

    async fn pay(
        &self,
        wallet_id: &str,
        payment_request: &str,
        max_amount: i64,
        memo: &str,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub username: Option<String>,
}

/// Host account system: display names and funding wallets per principal.
#[async_trait]
pub trait AccountsDirectory: Send + Sync {
    async fn get_account(&self, user_id: &str) -> anyhow::Result<Option<Account>>;
    async fn wallets_for(&self, user_id: &str) -> anyhow::Result<Vec<String>>;
}

/// The wallet that funds a policy: its configured wallet if set, otherwise
/// the owner's first wallet.
pub async fn resolve_policy_wallet(
    accounts: &dyn AccountsDirectory,
    policy: &Policy,
) -> anyhow::Result<Option<String>> {
    if let Some(wallet) = &policy.wallet {
        return Ok(Some(wallet.clone()));
    }
    let wallets = accounts.wallets_for(&policy.user_id).await?;
    Ok(wallets.into_iter().next())
}

/// A confirmed payment, as delivered by the settlement feed. Delivery is
/// at-least-once; `tags` is whatever the issuing side attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementEvent {
    pub reference: String,
    pub amount: i64,
    #[serde(default)]
    pub tags: Value,
}

impl SettlementEvent {
    pub fn is_chat(&self) -> bool {
        self.tag("tag") == Some(CHAT_TAG)
    }

    pub fn payment_type(&self) -> Option<&str> {
        self.tag("payment_type")
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).and_then(|value| value.as_str())
    }
}
