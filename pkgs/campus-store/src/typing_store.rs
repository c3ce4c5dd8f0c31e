//! Typing store - ephemeral typing flags
//!
//! Rows are never cleaned up; a stored `is_typing = true` means nothing once
//! it is older than the reader's TTL.

use chrono::Utc;
use sea_orm::{
    sea_query::OnConflict, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter,
};
use tracing::trace;

use crate::entities::typing_signals;
use crate::feed::{ChangeEvent, ChangeHub, ChangeRow};
use crate::records::{TypingRecord, TypingUpdate};

/// Typing store
#[derive(Clone)]
pub struct TypingStore {
    db: DatabaseConnection,
    hub: ChangeHub,
}

impl TypingStore {
    /// Create a new typing store
    pub fn new(db: DatabaseConnection, hub: ChangeHub) -> Self {
        Self { db, hub }
    }

    /// Write the typist's flag for one conversation
    pub async fn upsert(&self, update: TypingUpdate) -> Result<TypingRecord, DbErr> {
        let now = Utc::now().timestamp_millis();

        let model = typing_signals::Model {
            conversation_id: update.conversation_id,
            participant_id: update.participant_id,
            tenant_id: update.tenant_id,
            is_group: update.is_group,
            is_typing: update.is_typing,
            updated_at: now,
        };

        let row = typing_signals::ActiveModel {
            conversation_id: Set(model.conversation_id.clone()),
            participant_id: Set(model.participant_id.clone()),
            tenant_id: Set(model.tenant_id.clone()),
            is_group: Set(model.is_group),
            is_typing: Set(model.is_typing),
            updated_at: Set(now),
        };

        typing_signals::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    typing_signals::Column::TenantId,
                    typing_signals::Column::ConversationId,
                    typing_signals::Column::ParticipantId,
                ])
                .update_columns([
                    typing_signals::Column::IsGroup,
                    typing_signals::Column::IsTyping,
                    typing_signals::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        let record = TypingRecord::from(model);
        trace!(
            "{} typing={} in {}",
            record.participant_id,
            record.is_typing,
            record.conversation_id
        );
        self.hub
            .publish(ChangeEvent::update(ChangeRow::Typing(record.clone())));

        Ok(record)
    }

    /// Stored flag of one participant in one conversation
    pub async fn get(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        participant_id: &str,
    ) -> Result<Option<TypingRecord>, DbErr> {
        let model = typing_signals::Entity::find_by_id((
            tenant_id.to_string(),
            conversation_id.to_string(),
            participant_id.to_string(),
        ))
        .one(&self.db)
        .await?;

        Ok(model.map(TypingRecord::from))
    }

    /// Rows of a tenant that still claim `is_typing = true`
    pub async fn list_typing(&self, tenant_id: &str) -> Result<Vec<TypingRecord>, DbErr> {
        let models = typing_signals::Entity::find()
            .filter(typing_signals::Column::TenantId.eq(tenant_id))
            .filter(typing_signals::Column::IsTyping.eq(true))
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(TypingRecord::from).collect())
    }
}
