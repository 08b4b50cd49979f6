use async_trait::async_trait;
use serde::Deserialize;

use crate::config;
use crate::error::{ChatError, ChatResult};
use crate::models::Policy;

/// Denomination amounts are settled in. Prices configured in anything else go
/// through the rate collaborator first.
pub const NATIVE_DENOMINATION: &str = "sat";

/// Currency conversion into native units. Returns a fractional amount; the
/// caller decides the rounding.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn to_native_units(&self, amount: f64, denomination: &str) -> anyhow::Result<f64>;
}

/// Cost of a message under a policy, in native units. Zero when the policy
/// has no per-character price. Rounding is always up so the receiving side is
/// never underpaid.
pub async fn message_cost(
    rates: &dyn RateProvider,
    policy: &Policy,
    message: &str,
) -> ChatResult<i64> {
    let Some(price_per_char) = policy.price_per_char else {
        return Ok(0);
    };
    let raw = message.chars().count() as f64 * price_per_char;
    if raw <= 0.0 {
        return Ok(0);
    }
    if policy.denomination != NATIVE_DENOMINATION {
        let native = rates
            .to_native_units(raw, &policy.denomination)
            .await
            .map_err(|err| ChatError::BadGateway(format!("exchange rate lookup failed: {err}")))?;
        return Ok(native.ceil() as i64);
    }
    Ok(raw.ceil() as i64)
}

#[derive(Deserialize)]
struct RateResponse {
    rate: f64,
}

/// Rate provider backed by an HTTP rate service exposing
/// `GET {base}/rates/{denomination}` → `{"rate": <native units per unit>}`.
pub struct HttpRateProvider {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRateProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Option<Self> {
        config::RATE_API_URL.as_ref().map(Self::new)
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn to_native_units(&self, amount: f64, denomination: &str) -> anyhow::Result<f64> {
        let url = format!("{}/rates/{}", self.base_url.trim_end_matches('/'), denomination);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: RateResponse = response.json().await?;
        Ok(amount * body.rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct FixedRate(f64);

    #[async_trait]
    impl RateProvider for FixedRate {
        async fn to_native_units(&self, amount: f64, _denomination: &str) -> anyhow::Result<f64> {
            Ok(amount * self.0)
        }
    }

    fn policy(price_per_char: Option<f64>, denomination: &str) -> Policy {
        Policy {
            id: "p".into(),
            user_id: "u".into(),
            name: "Support".into(),
            wallet: None,
            requires_payment: true,
            balance_mode: false,
            tips_enabled: false,
            max_chars: None,
            price_per_char,
            denomination: denomination.into(),
            claim_split: 0.0,
            notify_telegram: None,
            notify_nostr: None,
            notify_email: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unpriced_policy_costs_nothing() {
        let cost = message_cost(&FixedRate(1.0), &policy(None, "sat"), "hello")
            .await
            .unwrap();
        assert_eq!(cost, 0);
    }

    #[tokio::test]
    async fn native_cost_rounds_up() {
        let cost = message_cost(&FixedRate(1.0), &policy(Some(0.3), "sat"), "hello")
            .await
            .unwrap();
        // 5 chars * 0.3 = 1.5, ceiled
        assert_eq!(cost, 2);
    }

    #[tokio::test]
    async fn fiat_cost_converts_then_rounds_up() {
        let cost = message_cost(&FixedRate(950.5), &policy(Some(0.01), "EUR"), "hello")
            .await
            .unwrap();
        // 0.05 EUR * 950.5 = 47.525 sat, ceiled
        assert_eq!(cost, 48);
    }

    #[tokio::test]
    async fn nonpositive_price_costs_nothing() {
        let cost = message_cost(&FixedRate(1.0), &policy(Some(-2.0), "sat"), "hello")
            .await
            .unwrap();
        assert_eq!(cost, 0);
    }
}
