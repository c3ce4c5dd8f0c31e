//! Presence store - one online/last-seen row per participant and tenant

use chrono::Utc;
use sea_orm::{
    sea_query::OnConflict, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter,
};
use tracing::debug;

use crate::entities::presence;
use crate::feed::{ChangeEvent, ChangeHub, ChangeRow};
use crate::records::PresenceRecord;

/// Presence store
#[derive(Clone)]
pub struct PresenceStore {
    db: DatabaseConnection,
    hub: ChangeHub,
}

impl PresenceStore {
    /// Create a new presence store
    pub fn new(db: DatabaseConnection, hub: ChangeHub) -> Self {
        Self { db, hub }
    }

    /// Create or refresh the participant's row; `last_seen` becomes now
    pub async fn upsert(
        &self,
        participant_id: &str,
        tenant_id: &str,
        is_online: bool,
    ) -> Result<PresenceRecord, DbErr> {
        let now = Utc::now().timestamp_millis();

        let key = (tenant_id.to_string(), participant_id.to_string());
        let existed = presence::Entity::find_by_id(key)
            .one(&self.db)
            .await?
            .is_some();

        let row = presence::ActiveModel {
            participant_id: Set(participant_id.to_string()),
            tenant_id: Set(tenant_id.to_string()),
            is_online: Set(is_online),
            last_seen: Set(now),
        };

        presence::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([presence::Column::TenantId, presence::Column::ParticipantId])
                    .update_columns([presence::Column::IsOnline, presence::Column::LastSeen])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        let record = PresenceRecord::from(presence::Model {
            participant_id: participant_id.to_string(),
            tenant_id: tenant_id.to_string(),
            is_online,
            last_seen: now,
        });

        debug!(
            "Presence for {}: {}",
            participant_id,
            if is_online { "online" } else { "offline" }
        );

        let row = ChangeRow::Presence(record.clone());
        self.hub.publish(if existed {
            ChangeEvent::update(row)
        } else {
            ChangeEvent::insert(row)
        });

        Ok(record)
    }

    /// Get a participant's presence row
    pub async fn get(
        &self,
        tenant_id: &str,
        participant_id: &str,
    ) -> Result<Option<PresenceRecord>, DbErr> {
        let key = (tenant_id.to_string(), participant_id.to_string());
        let model = presence::Entity::find_by_id(key).one(&self.db).await?;

        Ok(model.map(PresenceRecord::from))
    }

    /// All presence rows of a tenant
    pub async fn list(&self, tenant_id: &str) -> Result<Vec<PresenceRecord>, DbErr> {
        let models = presence::Entity::find()
            .filter(presence::Column::TenantId.eq(tenant_id))
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(PresenceRecord::from).collect())
    }
}
