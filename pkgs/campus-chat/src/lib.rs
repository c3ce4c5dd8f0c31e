//! Campus Chat - realtime messaging core for the Campus school platform
//!
//! Direct and group messaging with read receipts, presence, typing
//! indicators and a consent workflow for student-to-student chats, built on
//! the [`campus_store`] persistence layer and its change feed.
//!
//! # Overview
//!
//! - [`ChatClient`]: one participant's session; the entry point for UIs
//! - [`MessageService`]: sending, listing and read receipts
//! - [`PresenceTracker`]: online/last-seen of everyone in the tenant
//! - [`TypingBroadcaster`] / [`TypingBoard`]: outgoing and observed typing
//! - [`ChatRequestWorkflow`]: who may message whom
//! - [`derive_conversations`]: the conversation list as a pure function
//!
//! # Example
//!
//! ```rust,no_run
//! use campus_chat::{
//!     ChatClient, ChatConfig, DirectoryEntry, MessageContent, Participant, Role, SendTarget,
//!     StaticDirectory,
//! };
//! use campus_store::{CampusStore, StoreConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = CampusStore::open(StoreConfig::default()).await?;
//! let directory = StaticDirectory::new()
//!     .with_participant(DirectoryEntry::new(
//!         Participant::new("t1", "school-1", Role::Teacher),
//!         "Ms. Rivera",
//!     ))
//!     .with_participant(DirectoryEntry::new(
//!         Participant::new("s1", "school-1", Role::Student),
//!         "Sam",
//!     ));
//!
//! let teacher = ChatClient::connect(
//!     &store,
//!     Arc::new(directory.signed_in_as("t1")),
//!     ChatConfig::default(),
//! )
//! .await?;
//!
//! teacher
//!     .send_message(
//!         SendTarget::Direct("s1".into()),
//!         MessageContent::text("Homework due Friday"),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod messages;
pub mod participant;
pub mod presence;
pub mod requests;
mod state;
pub mod typing;

pub use client::{ChatClient, FileUploader, UploadFile};
pub use config::ChatConfig;
pub use conversation::{derive_conversations, ConversationIndex, ConversationSummary, IndexInputs};
pub use dispatcher::RealtimeSource;
pub use error::{ChatError, Result};
pub use events::{ChatUpdate, RealtimeEvent};
pub use messages::{MessageContent, MessageLog, MessageService, SendTarget};
pub use participant::{
    DirectoryEntry, GroupInfo, MessagingPolicy, Participant, ParticipantDirectory, Role,
    StaticDirectory,
};
pub use presence::{PresenceState, PresenceTracker};
pub use requests::{ChatRequestWorkflow, RequestOutcome};
pub use typing::{TypingBoard, TypingBroadcaster, TypingState};

pub use campus_store::{
    Attachment, ChatRequestRecord, ConversationKey, MessageRecord, PresenceRecord, RequestStatus,
    TypingRecord,
};
