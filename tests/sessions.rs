mod common;

use common::*;

use paychat::error::ChatError;
use paychat::models::{NewSession, Role};
use paychat::pubsub::session_channel;
use paychat::store::ChatStore;

// key: chat-sessions-tests -> lifecycle and read/resolved flags

#[tokio::test]
async fn new_session_seeds_participant_and_share_url() {
    let h = harness();
    let policy = base_policy("owner");
    insert_policy(&h, &policy).await;

    let session = h
        .core
        .sessions
        .create_public_session(
            &policy.id,
            &NewSession {
                participant_id: Some("visitor-1".to_string()),
                participant_name: Some("  Visitor  ".to_string()),
            },
            "https://chat.example.com/",
        )
        .await
        .unwrap();

    assert_eq!(session.participants.len(), 1);
    assert_eq!(session.participants[0].name, "Visitor");
    assert_eq!(session.participants[0].role, Role::Public);
    assert_eq!(
        session.public_url.as_deref(),
        Some(
            format!(
                "https://chat.example.com/chat/{}/{}",
                policy.id, session.id
            )
            .as_str()
        )
    );
    assert!(session.unread);
    assert_eq!(session.balance, 0);
}

#[tokio::test]
async fn creating_a_session_under_an_unknown_policy_fails() {
    let h = harness();
    let err = h
        .core
        .sessions
        .create_public_session("missing", &NewSession::default(), "https://x.example")
        .await
        .expect_err("should fail");
    assert!(matches!(err, ChatError::NotFound(_)));
}

#[tokio::test]
async fn mark_resolved_persists_and_broadcasts() {
    let h = harness();
    let policy = base_policy("owner");
    insert_policy(&h, &policy).await;
    let session = open_session(&h, &policy.id).await;

    let resolved = h.core.sessions.mark_resolved(&session.id, true).await.unwrap();
    assert!(resolved.resolved);

    let pushed = h.broadcaster.payloads_for(&session_channel(&session.id));
    assert!(pushed.iter().any(|p| p.contains("\"type\":\"resolved\"")));
}

#[tokio::test]
async fn mark_seen_only_acts_on_unread_sessions() {
    let h = harness();
    let policy = base_policy("owner");
    insert_policy(&h, &policy).await;
    let session = open_session(&h, &policy.id).await;

    let seen = h.core.sessions.mark_seen(&session.id).await.unwrap();
    assert!(!seen.unread);
    let pushed = h.broadcaster.payloads_for(&session_channel(&session.id));
    assert_eq!(
        pushed.iter().filter(|p| p.contains("\"type\":\"seen\"")).count(),
        1
    );

    // already seen: no second broadcast
    h.core.sessions.mark_seen(&session.id).await.unwrap();
    let pushed = h.broadcaster.payloads_for(&session_channel(&session.id));
    assert_eq!(
        pushed.iter().filter(|p| p.contains("\"type\":\"seen\"")).count(),
        1
    );
}

#[tokio::test]
async fn owner_listing_is_scoped_to_owned_policies() {
    let h = harness();
    let mine = base_policy("owner");
    insert_policy(&h, &mine).await;
    let theirs = base_policy("someone-else");
    insert_policy(&h, &theirs).await;
    let mine_session = open_session(&h, &mine.id).await;
    open_session(&h, &theirs.id).await;

    let sessions = h.core.sessions.list_for_owner("owner", None).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, mine_session.id);

    let err = h
        .core
        .sessions
        .list_for_owner("owner", Some(&theirs.id))
        .await
        .expect_err("not their policy");
    assert!(matches!(err, ChatError::Forbidden));
}

#[tokio::test]
async fn owner_fetch_requires_a_surviving_policy() {
    let h = harness();
    let policy = base_policy("owner");
    insert_policy(&h, &policy).await;
    let session = open_session(&h, &policy.id).await;

    let fetched = h
        .core
        .sessions
        .get_session_for_owner("owner", &session.id)
        .await
        .unwrap();
    assert_eq!(fetched.id, session.id);

    h.store.delete_policy("owner", &policy.id).await.unwrap();
    let err = h
        .core
        .sessions
        .get_session_for_owner("owner", &session.id)
        .await
        .expect_err("policy gone");
    assert!(matches!(err, ChatError::NotFound(_)));
}
