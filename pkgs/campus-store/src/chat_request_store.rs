//! Chat request store - consent records for student-to-student messaging

use chrono::Utc;
use sea_orm::{
    prelude::Expr, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, SqlErr,
};
use tracing::{debug, info};

use crate::entities::chat_requests;
use crate::feed::{ChangeEvent, ChangeHub, ChangeRow};
use crate::records::{ChatRequestRecord, RequestStatus};

/// Outcome of answering a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The request was pending and now carries the new status
    Applied(ChatRequestRecord),
    /// The request had already left `pending`; nothing was written
    AlreadyFinal(ChatRequestRecord),
    /// No request with that id
    Missing,
}

/// Whether `err` is a uniqueness conflict, i.e. a racing duplicate insert
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        || err.to_string().contains("UNIQUE constraint failed")
}

/// Chat request store
#[derive(Clone)]
pub struct ChatRequestStore {
    db: DatabaseConnection,
    hub: ChangeHub,
}

impl ChatRequestStore {
    /// Create a new chat request store
    pub fn new(db: DatabaseConnection, hub: ChangeHub) -> Self {
        Self { db, hub }
    }

    /// Insert a pending request.
    ///
    /// Fails with a unique-constraint error when a pending request for the
    /// same ordered pair already exists (see [`is_unique_violation`]).
    pub async fn insert_pending(
        &self,
        tenant_id: &str,
        sender_id: &str,
        receiver_id: &str,
    ) -> Result<ChatRequestRecord, DbErr> {
        let model = chat_requests::Model {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            status: RequestStatus::Pending.as_str().to_string(),
            created_at: Utc::now().timestamp_millis(),
            responded_at: None,
        };

        let row = chat_requests::ActiveModel {
            id: Set(model.id.clone()),
            tenant_id: Set(model.tenant_id.clone()),
            sender_id: Set(model.sender_id.clone()),
            receiver_id: Set(model.receiver_id.clone()),
            status: Set(model.status.clone()),
            created_at: Set(model.created_at),
            responded_at: Set(None),
        };

        chat_requests::Entity::insert(row)
            .exec_without_returning(&self.db)
            .await?;

        let record = ChatRequestRecord::from(model);
        info!(
            "Chat request {} created: {} -> {}",
            record.id, sender_id, receiver_id
        );
        self.hub
            .publish(ChangeEvent::insert(ChangeRow::ChatRequest(record.clone())));

        Ok(record)
    }

    /// Get request by ID
    pub async fn get(&self, request_id: &str) -> Result<Option<ChatRequestRecord>, DbErr> {
        let model = chat_requests::Entity::find_by_id(request_id.to_string())
            .one(&self.db)
            .await?;

        Ok(model.map(ChatRequestRecord::from))
    }

    /// Most recent request with `status` between `a` and `b`, in either direction
    pub async fn find_between(
        &self,
        tenant_id: &str,
        a: &str,
        b: &str,
        status: RequestStatus,
    ) -> Result<Option<ChatRequestRecord>, DbErr> {
        let pair = Condition::any()
            .add(
                Condition::all()
                    .add(chat_requests::Column::SenderId.eq(a))
                    .add(chat_requests::Column::ReceiverId.eq(b)),
            )
            .add(
                Condition::all()
                    .add(chat_requests::Column::SenderId.eq(b))
                    .add(chat_requests::Column::ReceiverId.eq(a)),
            );

        let model = chat_requests::Entity::find()
            .filter(chat_requests::Column::TenantId.eq(tenant_id))
            .filter(chat_requests::Column::Status.eq(status.as_str()))
            .filter(pair)
            .order_by_desc(chat_requests::Column::CreatedAt)
            .one(&self.db)
            .await?;

        Ok(model.map(ChatRequestRecord::from))
    }

    /// Requests addressed to `participant_id` with `status`, newest first
    pub async fn incoming(
        &self,
        tenant_id: &str,
        participant_id: &str,
        status: RequestStatus,
    ) -> Result<Vec<ChatRequestRecord>, DbErr> {
        let models = chat_requests::Entity::find()
            .filter(chat_requests::Column::TenantId.eq(tenant_id))
            .filter(chat_requests::Column::ReceiverId.eq(participant_id))
            .filter(chat_requests::Column::Status.eq(status.as_str()))
            .order_by_desc(chat_requests::Column::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(ChatRequestRecord::from).collect())
    }

    /// Requests sent by `participant_id` with `status`, newest first
    pub async fn outgoing(
        &self,
        tenant_id: &str,
        participant_id: &str,
        status: RequestStatus,
    ) -> Result<Vec<ChatRequestRecord>, DbErr> {
        let models = chat_requests::Entity::find()
            .filter(chat_requests::Column::TenantId.eq(tenant_id))
            .filter(chat_requests::Column::SenderId.eq(participant_id))
            .filter(chat_requests::Column::Status.eq(status.as_str()))
            .order_by_desc(chat_requests::Column::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(ChatRequestRecord::from).collect())
    }

    /// Every request `participant_id` sent or received
    pub async fn list_for(
        &self,
        tenant_id: &str,
        participant_id: &str,
    ) -> Result<Vec<ChatRequestRecord>, DbErr> {
        let models = chat_requests::Entity::find()
            .filter(chat_requests::Column::TenantId.eq(tenant_id))
            .filter(
                Condition::any()
                    .add(chat_requests::Column::SenderId.eq(participant_id))
                    .add(chat_requests::Column::ReceiverId.eq(participant_id)),
            )
            .order_by_asc(chat_requests::Column::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(ChatRequestRecord::from).collect())
    }

    /// Move a pending request to `accepted`
    pub async fn accept(&self, request_id: &str) -> Result<Transition, DbErr> {
        self.finish(request_id, RequestStatus::Accepted).await
    }

    /// Move a pending request to `rejected`
    pub async fn reject(&self, request_id: &str) -> Result<Transition, DbErr> {
        self.finish(request_id, RequestStatus::Rejected).await
    }

    async fn finish(&self, request_id: &str, status: RequestStatus) -> Result<Transition, DbErr> {
        let now = Utc::now().timestamp_millis();

        // Conditional on `pending` so that two answers cannot both win
        let result = chat_requests::Entity::update_many()
            .col_expr(chat_requests::Column::Status, Expr::value(status.as_str()))
            .col_expr(chat_requests::Column::RespondedAt, Expr::value(now))
            .filter(chat_requests::Column::Id.eq(request_id))
            .filter(chat_requests::Column::Status.eq(RequestStatus::Pending.as_str()))
            .exec(&self.db)
            .await?;

        let current = match self.get(request_id).await? {
            Some(record) => record,
            None => return Ok(Transition::Missing),
        };

        if result.rows_affected == 0 {
            debug!(
                "Chat request {} is already {}, not moving to {}",
                request_id, current.status, status
            );
            return Ok(Transition::AlreadyFinal(current));
        }

        info!("Chat request {} is now {}", request_id, status);
        self.hub
            .publish(ChangeEvent::update(ChangeRow::ChatRequest(current.clone())));

        Ok(Transition::Applied(current))
    }
}
