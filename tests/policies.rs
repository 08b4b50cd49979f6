mod common;

use common::*;

use paychat::error::ChatError;
use paychat::models::NewPolicy;

// key: chat-policies-tests -> configuration normalization and ownership

#[tokio::test]
async fn created_policies_are_normalized() {
    let h = harness();

    let free = h
        .core
        .policies
        .create(
            "owner",
            NewPolicy {
                name: "Free chat".to_string(),
                balance_mode: true,
                claim_split: 50.0,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!free.balance_mode);
    assert_eq!(free.claim_split, 0.0);
    assert_eq!(free.denomination, "sat");

    let paid = h
        .core
        .policies
        .create(
            "owner",
            NewPolicy {
                name: "Paid chat".to_string(),
                requires_payment: true,
                balance_mode: true,
                claim_split: 97.0,
                denomination: Some("EUR".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(paid.balance_mode);
    assert_eq!(paid.claim_split, 90.0);
    assert_eq!(paid.denomination, "EUR");
}

#[tokio::test]
async fn updates_are_scoped_to_the_owner() {
    let h = harness();
    let policy = h
        .core
        .policies
        .create(
            "owner",
            NewPolicy {
                name: "Support".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = h
        .core
        .policies
        .update(
            "intruder",
            &policy.id,
            NewPolicy {
                name: "Hijacked".to_string(),
                ..Default::default()
            },
        )
        .await
        .expect_err("not the owner");
    assert!(matches!(err, ChatError::NotFound(_)));

    let updated = h
        .core
        .policies
        .update(
            "owner",
            &policy.id,
            NewPolicy {
                name: "Renamed".to_string(),
                requires_payment: true,
                price_per_char: Some(1.5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.price_per_char, Some(1.5));
}

#[tokio::test]
async fn public_view_exists_for_everyone() {
    let h = harness();
    let policy = h
        .core
        .policies
        .create(
            "owner",
            NewPolicy {
                name: "Support".to_string(),
                requires_payment: true,
                price_per_char: Some(2.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let public = h.core.policies.get_public(&policy.id).await.unwrap();
    assert_eq!(public.id, policy.id);
    assert_eq!(public.price_per_char, Some(2.0));

    let err = h
        .core
        .policies
        .get_public("missing")
        .await
        .expect_err("unknown policy");
    assert!(matches!(err, ChatError::NotFound(_)));
}
