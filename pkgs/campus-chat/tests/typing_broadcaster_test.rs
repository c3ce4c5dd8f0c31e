// Copyright 2025 Campus Team.
//
// Tests for TypingBroadcaster against a real store

use campus_chat::{ConversationKey, Participant, Role, TypingBroadcaster, TypingState};
use campus_store::{CampusStore, ChangeRow, StoreConfig, TypingRecord};
use std::time::Duration;
use tempfile::NamedTempFile;

const TENANT: &str = "school-1";
const TTL: Duration = Duration::from_millis(200);

async fn open_store(temp_file: &NamedTempFile) -> CampusStore {
    CampusStore::open(StoreConfig {
        db_path: temp_file.path().to_path_buf(),
        ..Default::default()
    })
    .await
    .expect("Failed to open store")
}

/// The teacher's stored flag in `conversation_id`
async fn stored_flag(store: &CampusStore, conversation_id: &str) -> TypingRecord {
    store
        .typing
        .get(TENANT, conversation_id, "t1")
        .await
        .unwrap()
        .expect("Typing row should exist")
}

fn teacher() -> Participant {
    Participant::new("t1", TENANT, Role::Teacher)
}

#[tokio::test]
async fn test_keystrokes_write_once_per_typing_period() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = open_store(&temp_file).await;
    let mut feed = store.hub.subscribe(TENANT);
    let typing = TypingBroadcaster::new(store.typing.clone(), teacher(), TTL);
    let key = ConversationKey::Direct("s1".to_string());

    assert_eq!(typing.state(&key), TypingState::Idle);
    assert_eq!(typing.keystroke(&key).await, TypingState::Typing);
    assert_eq!(typing.keystroke(&key).await, TypingState::Typing);
    assert_eq!(typing.keystroke(&key).await, TypingState::Typing);

    let first = feed.next().await.unwrap();
    match first.row {
        ChangeRow::Typing(signal) => {
            assert!(signal.is_typing);
            assert_eq!(signal.conversation_id, "s1");
            assert!(!signal.is_group);
        }
        other => panic!("Wrong row: {:?}", other),
    }

    // Only the expiry write follows
    let second = tokio::time::timeout(Duration::from_secs(2), feed.next())
        .await
        .expect("Typing should lapse")
        .unwrap();
    match second.row {
        ChangeRow::Typing(signal) => assert!(!signal.is_typing),
        other => panic!("Wrong row: {:?}", other),
    }
    assert_eq!(typing.state(&key), TypingState::Idle);
}

#[tokio::test]
async fn test_keystrokes_push_the_deadline_back() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = open_store(&temp_file).await;
    let typing = TypingBroadcaster::new(store.typing.clone(), teacher(), TTL);
    let key = ConversationKey::Group("class-7b".to_string());

    typing.keystroke(&key).await;
    for _ in 0..4 {
        tokio::time::sleep(TTL / 2).await;
        typing.keystroke(&key).await;
    }
    assert_eq!(typing.state(&key), TypingState::Typing);
    let signal = stored_flag(&store, "class-7b").await;
    assert!(signal.is_typing && signal.is_group);

    tokio::time::sleep(TTL * 3).await;
    assert_eq!(typing.state(&key), TypingState::Idle);
    assert!(!stored_flag(&store, "class-7b").await.is_typing);
}

#[tokio::test]
async fn test_stop_clears_immediately() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = open_store(&temp_file).await;
    let typing = TypingBroadcaster::new(store.typing.clone(), teacher(), Duration::from_secs(30));
    let a = ConversationKey::Direct("s1".to_string());
    let b = ConversationKey::Direct("s2".to_string());

    typing.keystroke(&a).await;
    typing.keystroke(&b).await;

    typing.stop(&a).await;
    assert_eq!(typing.state(&a), TypingState::Idle);
    assert!(!stored_flag(&store, "s1").await.is_typing);
    assert!(stored_flag(&store, "s2").await.is_typing);

    typing.stop_all().await;
    assert!(!stored_flag(&store, "s2").await.is_typing);
    assert!(store.typing.list_typing(TENANT).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_period_shorter_than_write_still_ends_idle() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = open_store(&temp_file).await;
    // Every period is over before its opening write returns
    let typing = TypingBroadcaster::new(store.typing.clone(), teacher(), Duration::ZERO);

    for n in 0..10 {
        let conversation_id = format!("s{}", n);
        let key = ConversationKey::Direct(conversation_id.clone());
        typing.keystroke(&key).await;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while stored_flag(&store, &conversation_id).await.is_typing
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(
            !stored_flag(&store, &conversation_id).await.is_typing,
            "Typing flag in {} was left on",
            conversation_id
        );
        assert_eq!(typing.state(&key), TypingState::Idle);
    }
}
