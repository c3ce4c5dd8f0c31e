//! Campus Store - persistent storage for the Campus chat subsystem
//!
//! This crate provides SQLite-based storage for messaging data using Sea-ORM,
//! together with an in-process change feed that stands in for the hosted
//! backend's realtime channel.
//!
//! # Architecture
//!
//! The storage layer is organized into one store per table:
//!
//! - **MessageStore**: Append-only message log; `read_at` is the only mutable field
//! - **PresenceStore**: One online/last-seen row per participant
//! - **TypingStore**: Ephemeral typing flags keyed by (conversation, participant)
//! - **ChatRequestStore**: Consent requests for student-to-student messaging
//!
//! Every successful write is published on the [`ChangeHub`] as a
//! [`ChangeEvent`], so subscribers in the same tenant observe it.
//!
//! # Database Schema
//!
//! - `messages`: Message text/attachment, sender/receiver, timestamps
//! - `presence`: Online flag and last-seen time
//! - `typing_signals`: Typing flag per conversation and participant
//! - `chat_requests`: Request status with a partial unique index on pending pairs
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use campus_store::{CampusStore, NewMessage, StoreConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = CampusStore::open(StoreConfig {
//!     db_path: "campus.db".into(),
//!     ..Default::default()
//! })
//! .await?;
//!
//! let mut feed = store.hub.subscribe("school-1");
//! store
//!     .messages
//!     .insert(NewMessage {
//!         tenant_id: "school-1".to_string(),
//!         sender_id: "teacher-1".to_string(),
//!         receiver_id: "student-1".to_string(),
//!         conversation_id: None,
//!         text: Some("Homework due Friday".to_string()),
//!         attachment: None,
//!     })
//!     .await?;
//! let event = feed.next().await?;
//! # let _ = event;
//! # Ok(())
//! # }
//! ```

pub mod chat_request_store;
pub mod entities;
pub mod feed;
pub mod message_store;
pub mod migration;
pub mod presence_store;
pub mod records;
pub mod typing_store;

pub use chat_request_store::{is_unique_violation, ChatRequestStore, Transition};
pub use feed::{ChangeEvent, ChangeHub, ChangeKind, ChangeRow, FeedError, Subscription};
pub use message_store::{MessageStore, ThreadScope};
pub use presence_store::PresenceStore;
pub use records::{
    Attachment, ChatRequestRecord, ConversationKey, MessageRecord, NewMessage, PresenceRecord,
    RequestStatus, TypingRecord, TypingUpdate,
};
pub use typing_store::TypingStore;

use anyhow::{Context, Result};
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::info;

/// Configuration for the persistence layer
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub db_path: std::path::PathBuf,

    /// Number of change events buffered per subscriber before it lags (default: 256)
    pub feed_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: std::path::PathBuf::from("campus-chat.db"),
            feed_capacity: 256,
        }
    }
}

/// All chat stores sharing one connection and one change feed
#[derive(Clone)]
pub struct CampusStore {
    pub messages: MessageStore,
    pub presence: PresenceStore,
    pub typing: TypingStore,
    pub requests: ChatRequestStore,
    pub hub: ChangeHub,
    db: DatabaseConnection,
}

impl CampusStore {
    /// Open (or create) the database at `config.db_path` and run migrations
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let db_path_str = config
            .db_path
            .to_str()
            .context("Invalid database path")?
            .replace("\\", "/");

        let db_url = format!("sqlite:{}?mode=rwc", db_path_str);

        let db: DatabaseConnection = Database::connect(db_url.as_str())
            .await
            .context("Failed to connect to database")?;

        migration::Migrator::up(&db, None)
            .await
            .context("Failed to run migrations")?;

        info!("Campus store initialized at {}", config.db_path.display());

        Ok(Self::with_connection(db, ChangeHub::new(config.feed_capacity)))
    }

    /// Build the stores over an already-migrated connection
    pub fn with_connection(db: DatabaseConnection, hub: ChangeHub) -> Self {
        Self {
            messages: MessageStore::new(db.clone(), hub.clone()),
            presence: PresenceStore::new(db.clone(), hub.clone()),
            typing: TypingStore::new(db.clone(), hub.clone()),
            requests: ChatRequestStore::new(db.clone(), hub.clone()),
            hub,
            db,
        }
    }

    /// Underlying connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}
