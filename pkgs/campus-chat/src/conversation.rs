//! Conversation list derivation
//!
//! There is no conversation table. The list is recomputed from the local
//! message log, presence, typing and directory data every time one of them
//! changes.

use campus_store::{ConversationKey, MessageRecord};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::participant::{DirectoryEntry, GroupInfo};
use crate::presence::PresenceState;

/// One row of the conversation list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub key: ConversationKey,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_group: bool,
    pub last_message_preview: String,
    pub last_sender_id: String,
    pub last_activity: DateTime<Utc>,
    pub unread_count: usize,
    pub is_online: bool,
    pub is_typing: bool,
}

/// Everything the derivation reads
pub struct IndexInputs<'a> {
    pub viewer: &'a str,
    pub messages: &'a [MessageRecord],
    pub presence: &'a HashMap<String, PresenceState>,
    /// Conversations with an unexpired typist
    pub typing: &'a HashSet<ConversationKey>,
    pub participants: &'a HashMap<String, DirectoryEntry>,
    pub groups: &'a [GroupInfo],
}

/// Preview line for a message
pub fn preview(message: &MessageRecord) -> String {
    match (&message.text, &message.attachment) {
        (Some(text), _) => text.clone(),
        (None, Some(attachment)) => format!("📎 {}", attachment.name),
        (None, None) => String::new(),
    }
}

/// Derive the conversation list, most recent activity first
pub fn derive_conversations(inputs: &IndexInputs<'_>) -> Vec<ConversationSummary> {
    let mut seen = HashSet::new();
    let mut threads: BTreeMap<ConversationKey, Vec<&MessageRecord>> = BTreeMap::new();

    for message in inputs.messages {
        if !seen.insert(message.id.as_str()) {
            continue;
        }
        threads
            .entry(message.conversation_key(inputs.viewer))
            .or_default()
            .push(message);
    }

    let mut summaries: Vec<ConversationSummary> = threads
        .into_iter()
        .filter_map(|(key, messages)| {
            let last = messages
                .iter()
                .max_by(|a, b| a.sent_at.cmp(&b.sent_at).then_with(|| a.id.cmp(&b.id)))?;

            let unread_count = messages
                .iter()
                .filter(|m| m.is_unread_for(inputs.viewer))
                .count();

            let (display_name, avatar_url, is_online) = match &key {
                ConversationKey::Direct(id) => {
                    let entry = inputs.participants.get(id);
                    (
                        entry
                            .map(|e| e.display_name.clone())
                            .unwrap_or_else(|| id.clone()),
                        entry.and_then(|e| e.avatar_url.clone()),
                        inputs
                            .presence
                            .get(id)
                            .map(|p| p.is_online)
                            .unwrap_or(false),
                    )
                }
                ConversationKey::Group(id) => (
                    inputs
                        .groups
                        .iter()
                        .find(|g| &g.group_id == id)
                        .map(|g| g.name.clone())
                        .unwrap_or_else(|| id.clone()),
                    None,
                    false,
                ),
            };

            Some(ConversationSummary {
                is_group: key.is_group(),
                is_typing: inputs.typing.contains(&key),
                last_message_preview: preview(last),
                last_sender_id: last.sender_id.clone(),
                last_activity: last.sent_at,
                key,
                display_name,
                avatar_url,
                unread_count,
                is_online,
            })
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.last_activity
            .cmp(&a.last_activity)
            .then_with(|| a.key.cmp(&b.key))
    });
    summaries
}

/// Latest derived conversation list
#[derive(Default)]
pub struct ConversationIndex {
    latest: RwLock<Vec<ConversationSummary>>,
}

impl ConversationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list; returns whether it differs from the previous one
    pub fn replace(&self, summaries: Vec<ConversationSummary>) -> bool {
        let mut latest = self.latest.write();
        if *latest == summaries {
            return false;
        }
        *latest = summaries;
        true
    }

    pub fn snapshot(&self) -> Vec<ConversationSummary> {
        self.latest.read().clone()
    }

    pub fn get(&self, key: &ConversationKey) -> Option<ConversationSummary> {
        self.latest.read().iter().find(|s| &s.key == key).cloned()
    }

    pub fn total_unread(&self) -> usize {
        self.latest.read().iter().map(|s| s.unread_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::{Participant, Role};
    use campus_store::Attachment;
    use chrono::TimeZone;

    fn message(id: &str, from: &str, to: &str, secs: i64, text: Option<&str>) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            tenant_id: "school".to_string(),
            sender_id: from.to_string(),
            receiver_id: to.to_string(),
            conversation_id: None,
            text: text.map(str::to_string),
            attachment: None,
            sent_at: Utc.timestamp_opt(secs, 0).unwrap(),
            read_at: None,
        }
    }

    fn directory() -> HashMap<String, DirectoryEntry> {
        let teacher = DirectoryEntry::new(
            Participant::new("t1", "school", Role::Teacher),
            "Ms. Rivera",
        )
        .with_avatar("https://avatars/t1.png");
        HashMap::from([("t1".to_string(), teacher)])
    }

    fn derive(
        viewer: &str,
        messages: &[MessageRecord],
        typing: &HashSet<ConversationKey>,
    ) -> Vec<ConversationSummary> {
        let participants = directory();
        let presence = HashMap::new();
        let groups = vec![GroupInfo::new("class-7b", "Class 7B")];
        derive_conversations(&IndexInputs {
            viewer,
            messages,
            presence: &presence,
            typing,
            participants: &participants,
            groups: &groups,
        })
    }

    #[test]
    fn test_direct_messages_group_by_counterpart() {
        let messages = vec![
            message("m1", "t1", "s1", 1, Some("Homework due Friday")),
            message("m2", "s1", "t1", 2, Some("Thanks")),
            message("m3", "t1", "s1", 3, Some("See you")),
        ];

        let list = derive("s1", &messages, &HashSet::new());
        assert_eq!(list.len(), 1);
        let entry = &list[0];
        assert_eq!(entry.key, ConversationKey::Direct("t1".to_string()));
        assert_eq!(entry.display_name, "Ms. Rivera");
        assert_eq!(entry.avatar_url.as_deref(), Some("https://avatars/t1.png"));
        assert_eq!(entry.last_message_preview, "See you");
        assert_eq!(entry.unread_count, 2);
    }

    #[test]
    fn test_duplicates_do_not_change_the_result() {
        let messages = vec![
            message("m1", "t1", "s1", 1, Some("Homework due Friday")),
            message("m2", "s2", "s1", 5, Some("hey")),
        ];
        let mut doubled = messages.clone();
        doubled.extend(messages.clone());

        let once = derive("s1", &messages, &HashSet::new());
        assert_eq!(once, derive("s1", &doubled, &HashSet::new()));
        assert_eq!(once, derive("s1", &messages, &HashSet::new()));
        assert_eq!(once[0].unread_count, 1);
    }

    #[test]
    fn test_sorted_by_activity_then_key() {
        let messages = vec![
            message("m1", "a", "me", 10, Some("a")),
            message("m2", "b", "me", 10, Some("b")),
            message("m3", "c", "me", 20, Some("c")),
        ];

        let keys: Vec<String> = derive("me", &messages, &HashSet::new())
            .into_iter()
            .map(|s| s.key.id().to_string())
            .collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_attachment_preview_and_fallback_names() {
        let mut file = message("m1", "s9", "s1", 1, None);
        file.attachment = Some(Attachment {
            url: "https://files/1".to_string(),
            name: "worksheet.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
        });
        let mut group = message("m2", "t1", "class-7b", 2, Some("Quiz tomorrow"));
        group.conversation_id = Some("class-7b".to_string());
        let mut unnamed = message("m3", "t1", "class-9", 3, Some("hi"));
        unnamed.conversation_id = Some("class-9".to_string());

        let typing = HashSet::from([ConversationKey::Group("class-7b".to_string())]);
        let list = derive("s1", &[file, group, unnamed], &typing);

        let by_key: HashMap<ConversationKey, ConversationSummary> =
            list.into_iter().map(|s| (s.key.clone(), s)).collect();

        let direct = &by_key[&ConversationKey::Direct("s9".to_string())];
        assert_eq!(direct.last_message_preview, "📎 worksheet.pdf");
        assert_eq!(direct.display_name, "s9");

        let class = &by_key[&ConversationKey::Group("class-7b".to_string())];
        assert_eq!(class.display_name, "Class 7B");
        assert!(class.is_group && class.is_typing);
        assert_eq!(class.unread_count, 0);

        assert_eq!(
            by_key[&ConversationKey::Group("class-9".to_string())].display_name,
            "class-9"
        );
    }

    #[test]
    fn test_index_reports_changes_only() {
        let index = ConversationIndex::new();
        let list = derive("s1", &[message("m1", "t1", "s1", 1, Some("x"))], &HashSet::new());

        assert!(index.replace(list.clone()));
        assert!(!index.replace(list));
        assert_eq!(index.total_unread(), 1);
        assert!(index.get(&ConversationKey::Direct("t1".to_string())).is_some());
    }
}
