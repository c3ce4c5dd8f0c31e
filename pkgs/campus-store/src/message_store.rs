//! Message store - append-only message log with read receipts

use chrono::{DateTime, Utc};
use sea_orm::{
    prelude::Expr, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder,
};
use tracing::{debug, info};

use crate::entities::messages;
use crate::feed::{ChangeEvent, ChangeHub, ChangeRow};
use crate::records::{ConversationKey, MessageRecord, NewMessage};

/// Which thread a query targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadScope {
    /// Messages between `viewer` and `counterpart` that carry no conversation id
    Direct { viewer: String, counterpart: String },
    /// Messages carrying this conversation id
    Group(String),
}

impl ThreadScope {
    /// Scope of `key` as seen by `viewer`
    pub fn for_key(viewer: &str, key: &ConversationKey) -> Self {
        match key {
            ConversationKey::Direct(counterpart) => ThreadScope::Direct {
                viewer: viewer.to_string(),
                counterpart: counterpart.clone(),
            },
            ConversationKey::Group(id) => ThreadScope::Group(id.clone()),
        }
    }

    fn condition(&self) -> Condition {
        match self {
            ThreadScope::Direct {
                viewer,
                counterpart,
            } => Condition::all()
                .add(messages::Column::ConversationId.is_null())
                .add(
                    Condition::any()
                        .add(
                            Condition::all()
                                .add(messages::Column::SenderId.eq(viewer.as_str()))
                                .add(messages::Column::ReceiverId.eq(counterpart.as_str())),
                        )
                        .add(
                            Condition::all()
                                .add(messages::Column::SenderId.eq(counterpart.as_str()))
                                .add(messages::Column::ReceiverId.eq(viewer.as_str())),
                        ),
                ),
            ThreadScope::Group(id) => {
                Condition::all().add(messages::Column::ConversationId.eq(id.as_str()))
            }
        }
    }
}

/// Message store
#[derive(Clone)]
pub struct MessageStore {
    db: DatabaseConnection,
    hub: ChangeHub,
}

impl MessageStore {
    /// Create a new message store
    pub fn new(db: DatabaseConnection, hub: ChangeHub) -> Self {
        Self { db, hub }
    }

    /// Append a message. The id and `sent_at` are assigned here.
    pub async fn insert(&self, new: NewMessage) -> Result<MessageRecord, DbErr> {
        let id = uuid::Uuid::new_v4().to_string();
        let sent_at = Utc::now().timestamp_millis();

        let (attachment_url, attachment_name, attachment_mime) = match new.attachment {
            Some(a) => (Some(a.url), Some(a.name), Some(a.mime_type)),
            None => (None, None, None),
        };

        let model = messages::Model {
            id,
            tenant_id: new.tenant_id,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            conversation_id: new.conversation_id,
            text: new.text,
            attachment_url,
            attachment_name,
            attachment_mime,
            sent_at,
            read_at: None,
        };

        let active = messages::ActiveModel {
            id: Set(model.id.clone()),
            tenant_id: Set(model.tenant_id.clone()),
            sender_id: Set(model.sender_id.clone()),
            receiver_id: Set(model.receiver_id.clone()),
            conversation_id: Set(model.conversation_id.clone()),
            text: Set(model.text.clone()),
            attachment_url: Set(model.attachment_url.clone()),
            attachment_name: Set(model.attachment_name.clone()),
            attachment_mime: Set(model.attachment_mime.clone()),
            sent_at: Set(model.sent_at),
            read_at: Set(None),
        };

        messages::Entity::insert(active)
            .exec_without_returning(&self.db)
            .await?;

        let record = MessageRecord::from(model);
        debug!("Stored message: {}", record.id);
        self.hub
            .publish(ChangeEvent::insert(ChangeRow::Message(record.clone())));

        Ok(record)
    }

    /// Get message by ID
    pub async fn get(&self, message_id: &str) -> Result<Option<MessageRecord>, DbErr> {
        let model = messages::Entity::find_by_id(message_id.to_string())
            .one(&self.db)
            .await?;

        Ok(model.map(MessageRecord::from))
    }

    /// Messages of one thread, oldest first
    pub async fn list_thread(
        &self,
        tenant_id: &str,
        scope: &ThreadScope,
    ) -> Result<Vec<MessageRecord>, DbErr> {
        let models = messages::Entity::find()
            .filter(messages::Column::TenantId.eq(tenant_id))
            .filter(scope.condition())
            .order_by_asc(messages::Column::SentAt)
            .order_by_asc(messages::Column::Id)
            .all(&self.db)
            .await?;

        debug!("Retrieved {} messages for {:?}", models.len(), scope);
        Ok(models.into_iter().map(MessageRecord::from).collect())
    }

    /// Every message `participant` can see: sent by them, addressed to them,
    /// or posted in one of `group_ids`. Oldest first.
    pub async fn list_for_participant(
        &self,
        tenant_id: &str,
        participant_id: &str,
        group_ids: &[String],
    ) -> Result<Vec<MessageRecord>, DbErr> {
        let mut visible = Condition::any()
            .add(messages::Column::SenderId.eq(participant_id))
            .add(messages::Column::ReceiverId.eq(participant_id));
        if !group_ids.is_empty() {
            visible = visible.add(messages::Column::ConversationId.is_in(group_ids.to_vec()));
        }

        let models = messages::Entity::find()
            .filter(messages::Column::TenantId.eq(tenant_id))
            .filter(visible)
            .order_by_asc(messages::Column::SentAt)
            .order_by_asc(messages::Column::Id)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(MessageRecord::from).collect())
    }

    /// Set `read_at = up_to` on every unread message addressed to `receiver_id`
    /// in `scope` that was sent no later than `up_to`.
    ///
    /// Returns the messages this call marked. Messages that already carry a
    /// `read_at` are never touched, so repeating the call is a no-op.
    pub async fn mark_read(
        &self,
        tenant_id: &str,
        receiver_id: &str,
        scope: &ThreadScope,
        up_to: DateTime<Utc>,
    ) -> Result<Vec<MessageRecord>, DbErr> {
        let up_to_ms = up_to.timestamp_millis();

        let unread = messages::Entity::find()
            .filter(messages::Column::TenantId.eq(tenant_id))
            .filter(messages::Column::ReceiverId.eq(receiver_id))
            .filter(messages::Column::ReadAt.is_null())
            .filter(messages::Column::SentAt.lte(up_to_ms))
            .filter(scope.condition())
            .all(&self.db)
            .await?;

        if unread.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = unread.into_iter().map(|m| m.id).collect();

        let result = messages::Entity::update_many()
            .col_expr(messages::Column::ReadAt, Expr::value(up_to_ms))
            .filter(messages::Column::Id.is_in(ids.clone()))
            .filter(messages::Column::ReadAt.is_null())
            .exec(&self.db)
            .await?;

        // A concurrent receipt may have claimed some rows first; report only ours
        let marked: Vec<MessageRecord> = messages::Entity::find()
            .filter(messages::Column::Id.is_in(ids))
            .filter(messages::Column::ReadAt.eq(up_to_ms))
            .order_by_asc(messages::Column::SentAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(MessageRecord::from)
            .collect();

        info!(
            "Marked {} messages as read for {} in {:?}",
            result.rows_affected, receiver_id, scope
        );

        for record in &marked {
            self.hub
                .publish(ChangeEvent::update(ChangeRow::Message(record.clone())));
        }

        Ok(marked)
    }
}
