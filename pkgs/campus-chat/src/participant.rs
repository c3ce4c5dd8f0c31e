//! Participants, roles and the participant directory
//!
//! The directory itself lives outside this crate (it is backed by the school
//! administration tables). The chat core only consumes it through
//! [`ParticipantDirectory`]; [`StaticDirectory`] is an in-memory version for
//! tests and demos.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{ChatError, Result};

/// Role of a participant within a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Parent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::Parent => "parent",
        };
        f.write_str(name)
    }
}

/// Whether a direct conversation needs consent first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagingPolicy {
    Open,
    ConsentRequired,
}

/// A role-scoped actor in one tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub tenant_id: String,
    pub role: Role,
}

impl Participant {
    pub fn new(id: impl Into<String>, tenant_id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            role,
        }
    }

    /// Policy for `self` starting a direct conversation with `other`.
    ///
    /// Staff and parents are unrestricted, students may always reach staff
    /// and parents, and only student-to-student messaging needs consent.
    pub fn messaging_policy(&self, other: &Participant) -> MessagingPolicy {
        match (self.role, other.role) {
            (Role::Admin | Role::Teacher | Role::Parent, _) => MessagingPolicy::Open,
            (Role::Student, Role::Admin | Role::Teacher | Role::Parent) => MessagingPolicy::Open,
            (Role::Student, Role::Student) => MessagingPolicy::ConsentRequired,
        }
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.role)
    }
}

/// Directory listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub participant: Participant,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl DirectoryEntry {
    pub fn new(participant: Participant, display_name: impl Into<String>) -> Self {
        Self {
            participant,
            display_name: display_name.into(),
            avatar_url: None,
        }
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }
}

/// A group conversation the participant belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub group_id: String,
    pub name: String,
}

impl GroupInfo {
    pub fn new(group_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            name: name.into(),
        }
    }
}

/// Resolves accounts to participants; implemented by the host application
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    /// The signed-in participant
    async fn resolve_current_participant(&self) -> Result<Participant>;

    /// Everyone in the tenant
    async fn list_participants_in_tenant(&self, tenant_id: &str) -> Result<Vec<DirectoryEntry>>;

    /// Group conversations `participant` belongs to
    async fn list_groups_for(&self, participant: &Participant) -> Result<Vec<GroupInfo>>;
}

/// In-memory directory
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: Vec<DirectoryEntry>,
    groups: Vec<(GroupInfo, Vec<String>)>,
    current: Option<String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_participant(mut self, entry: DirectoryEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn with_group(mut self, group: GroupInfo, members: &[&str]) -> Self {
        self.groups
            .push((group, members.iter().map(|m| m.to_string()).collect()));
        self
    }

    /// Copy of this directory with `participant_id` signed in
    pub fn signed_in_as(&self, participant_id: &str) -> Self {
        Self {
            current: Some(participant_id.to_string()),
            ..self.clone()
        }
    }

    /// Entries keyed by participant id
    pub fn by_id(&self) -> HashMap<String, DirectoryEntry> {
        self.entries
            .iter()
            .map(|e| (e.participant.id.clone(), e.clone()))
            .collect()
    }
}

#[async_trait]
impl ParticipantDirectory for StaticDirectory {
    async fn resolve_current_participant(&self) -> Result<Participant> {
        let current = self
            .current
            .as_deref()
            .ok_or_else(|| ChatError::Directory("no participant is signed in".to_string()))?;

        self.entries
            .iter()
            .find(|e| e.participant.id == current)
            .map(|e| e.participant.clone())
            .ok_or_else(|| ChatError::UnknownParticipant(current.to_string()))
    }

    async fn list_participants_in_tenant(&self, tenant_id: &str) -> Result<Vec<DirectoryEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.participant.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn list_groups_for(&self, participant: &Participant) -> Result<Vec<GroupInfo>> {
        Ok(self
            .groups
            .iter()
            .filter(|(_, members)| members.iter().any(|m| m == &participant.id))
            .map(|(group, _)| group.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str, role: Role) -> Participant {
        Participant::new(id, "school", role)
    }

    #[test]
    fn test_staff_and_parents_are_unrestricted() {
        let student = p("s1", Role::Student);
        for role in [Role::Admin, Role::Teacher, Role::Parent] {
            assert_eq!(
                p("x", role).messaging_policy(&student),
                MessagingPolicy::Open
            );
        }
    }

    #[test]
    fn test_students_reach_staff_and_parents_freely() {
        let student = p("s1", Role::Student);
        for role in [Role::Admin, Role::Teacher, Role::Parent] {
            assert_eq!(
                student.messaging_policy(&p("x", role)),
                MessagingPolicy::Open
            );
        }
    }

    #[test]
    fn test_student_pairs_need_consent_both_ways() {
        let s1 = p("s1", Role::Student);
        let s2 = p("s2", Role::Student);
        assert_eq!(s1.messaging_policy(&s2), MessagingPolicy::ConsentRequired);
        assert_eq!(s2.messaging_policy(&s1), MessagingPolicy::ConsentRequired);
    }

    #[tokio::test]
    async fn test_static_directory_resolution() {
        let directory = StaticDirectory::new()
            .with_participant(DirectoryEntry::new(p("t1", Role::Teacher), "Ms. Rivera"))
            .with_participant(DirectoryEntry::new(p("s1", Role::Student), "Sam"))
            .with_group(GroupInfo::new("class-7b", "Class 7B"), &["t1", "s1"]);

        assert!(directory.resolve_current_participant().await.is_err());

        let as_sam = directory.signed_in_as("s1");
        let me = as_sam.resolve_current_participant().await.unwrap();
        assert_eq!(me.role, Role::Student);

        let groups = as_sam.list_groups_for(&me).await.unwrap();
        assert_eq!(groups, vec![GroupInfo::new("class-7b", "Class 7B")]);

        let unknown = directory.signed_in_as("ghost");
        assert!(matches!(
            unknown.resolve_current_participant().await,
            Err(ChatError::UnknownParticipant(_))
        ));
    }
}
