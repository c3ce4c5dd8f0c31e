// Copyright 2025 Campus Team.
//
// Tests for MessageStore

use campus_store::{
    Attachment, CampusStore, ChangeKind, ChangeRow, ConversationKey, NewMessage, StoreConfig,
    ThreadScope,
};
use chrono::{Duration, Utc};
use tempfile::NamedTempFile;

const TENANT: &str = "school-1";

async fn open_store(temp_file: &NamedTempFile) -> CampusStore {
    CampusStore::open(StoreConfig {
        db_path: temp_file.path().to_path_buf(),
        ..Default::default()
    })
    .await
    .expect("Failed to open store")
}

fn direct(sender: &str, receiver: &str, text: &str) -> NewMessage {
    NewMessage {
        tenant_id: TENANT.to_string(),
        sender_id: sender.to_string(),
        receiver_id: receiver.to_string(),
        conversation_id: None,
        text: Some(text.to_string()),
        attachment: None,
    }
}

#[tokio::test]
async fn test_insert_assigns_id_and_sent_at() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = open_store(&temp_file).await;

    let before = Utc::now() - Duration::seconds(1);
    let msg = store
        .messages
        .insert(direct("teacher-1", "student-1", "Homework due Friday"))
        .await
        .expect("Failed to insert message");

    assert!(!msg.id.is_empty());
    assert!(msg.sent_at >= before);
    assert!(msg.read_at.is_none());

    let retrieved = store.messages.get(&msg.id).await.unwrap().unwrap();
    assert_eq!(retrieved, msg);
}

#[tokio::test]
async fn test_attachment_round_trips() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = open_store(&temp_file).await;

    let mut new = direct("teacher-1", "student-1", "");
    new.text = None;
    new.attachment = Some(Attachment {
        url: "https://files.example/worksheet.pdf".to_string(),
        name: "worksheet.pdf".to_string(),
        mime_type: "application/pdf".to_string(),
    });

    let msg = store.messages.insert(new).await.unwrap();
    let retrieved = store.messages.get(&msg.id).await.unwrap().unwrap();

    assert!(retrieved.text.is_none());
    assert_eq!(retrieved.attachment.unwrap().name, "worksheet.pdf");
}

#[tokio::test]
async fn test_insert_is_published_on_feed() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = open_store(&temp_file).await;
    let mut feed = store.hub.subscribe(TENANT);

    let msg = store
        .messages
        .insert(direct("teacher-1", "student-1", "Hello"))
        .await
        .unwrap();

    let event = feed.next().await.unwrap();
    assert_eq!(event.kind, ChangeKind::Insert);
    match event.row {
        ChangeRow::Message(m) => assert_eq!(m.id, msg.id),
        other => panic!("Wrong row: {:?}", other),
    }
}

#[tokio::test]
async fn test_direct_thread_is_oldest_first_and_excludes_others() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = open_store(&temp_file).await;

    for (sender, receiver, text) in [
        ("alice", "bob", "one"),
        ("bob", "alice", "two"),
        ("alice", "carol", "elsewhere"),
        ("alice", "bob", "three"),
    ] {
        store
            .messages
            .insert(direct(sender, receiver, text))
            .await
            .unwrap();
    }

    let scope = ThreadScope::for_key("alice", &ConversationKey::Direct("bob".to_string()));
    let thread = store.messages.list_thread(TENANT, &scope).await.unwrap();

    assert_eq!(thread.len(), 3);
    for pair in thread.windows(2) {
        assert!(pair[0].sent_at <= pair[1].sent_at);
    }
    assert!(thread.iter().all(|m| m.text.as_deref() != Some("elsewhere")));

    // Bob sees the same thread under his own key
    let bob_scope = ThreadScope::for_key("bob", &ConversationKey::Direct("alice".to_string()));
    let bob_thread = store.messages.list_thread(TENANT, &bob_scope).await.unwrap();
    assert_eq!(bob_thread.len(), 3);
}

#[tokio::test]
async fn test_group_thread_and_participant_listing() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = open_store(&temp_file).await;

    let mut group_msg = direct("teacher-1", "class-7b", "Field trip tomorrow");
    group_msg.conversation_id = Some("class-7b".to_string());
    store.messages.insert(group_msg).await.unwrap();
    store
        .messages
        .insert(direct("teacher-1", "student-2", "See me after class"))
        .await
        .unwrap();

    let group = store
        .messages
        .list_thread(TENANT, &ThreadScope::Group("class-7b".to_string()))
        .await
        .unwrap();
    assert_eq!(group.len(), 1);

    let visible = store
        .messages
        .list_for_participant(TENANT, "student-1", &["class-7b".to_string()])
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].conversation_id.as_deref(), Some("class-7b"));

    let none = store
        .messages
        .list_for_participant(TENANT, "student-1", &[])
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_mark_read_is_idempotent_and_receiver_only() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = open_store(&temp_file).await;

    store
        .messages
        .insert(direct("teacher-1", "student-1", "first"))
        .await
        .unwrap();
    store
        .messages
        .insert(direct("teacher-1", "student-1", "second"))
        .await
        .unwrap();
    let reply = store
        .messages
        .insert(direct("student-1", "teacher-1", "ok"))
        .await
        .unwrap();

    let scope = ThreadScope::for_key("student-1", &ConversationKey::Direct("teacher-1".to_string()));
    let marked = store
        .messages
        .mark_read(TENANT, "student-1", &scope, Utc::now())
        .await
        .unwrap();
    assert_eq!(marked.len(), 2);
    for m in &marked {
        let read_at = m.read_at.expect("read_at set");
        assert!(read_at >= m.sent_at);
    }

    let again = store
        .messages
        .mark_read(TENANT, "student-1", &scope, Utc::now() + Duration::seconds(5))
        .await
        .unwrap();
    assert!(again.is_empty());

    // read_at did not move on the second call
    let first = store.messages.get(&marked[0].id).await.unwrap().unwrap();
    assert_eq!(first.read_at, marked[0].read_at);

    // The student's own message stays unread; only the teacher may read it
    let reply = store.messages.get(&reply.id).await.unwrap().unwrap();
    assert!(reply.read_at.is_none());
}

#[tokio::test]
async fn test_mark_read_skips_messages_sent_after_cutoff() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = open_store(&temp_file).await;

    store
        .messages
        .insert(direct("teacher-1", "student-1", "late"))
        .await
        .unwrap();

    let scope = ThreadScope::for_key("student-1", &ConversationKey::Direct("teacher-1".to_string()));
    let marked = store
        .messages
        .mark_read(TENANT, "student-1", &scope, Utc::now() - Duration::minutes(5))
        .await
        .unwrap();

    assert!(marked.is_empty());
}

#[tokio::test]
async fn test_mark_read_publishes_updates() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = open_store(&temp_file).await;

    let msg = store
        .messages
        .insert(direct("teacher-1", "student-1", "hello"))
        .await
        .unwrap();

    let mut feed = store.hub.subscribe(TENANT);
    let scope = ThreadScope::for_key("student-1", &ConversationKey::Direct("teacher-1".to_string()));
    store
        .messages
        .mark_read(TENANT, "student-1", &scope, Utc::now())
        .await
        .unwrap();

    let event = feed.next().await.unwrap();
    assert_eq!(event.kind, ChangeKind::Update);
    match event.row {
        ChangeRow::Message(m) => {
            assert_eq!(m.id, msg.id);
            assert!(m.read_at.is_some());
        }
        other => panic!("Wrong row: {:?}", other),
    }
}
