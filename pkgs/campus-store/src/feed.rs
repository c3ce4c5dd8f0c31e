//! Change feed - row-level INSERT/UPDATE notifications for subscribers
//!
//! Every store publishes the rows it writes here. Subscribers only see rows
//! from the tenant they subscribed with. Delivery is best-effort: a slow
//! subscriber that falls more than `capacity` events behind is told how many
//! it missed and is expected to reload from the stores.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::trace;

use crate::records::{ChatRequestRecord, MessageRecord, PresenceRecord, TypingRecord};

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Insert,
    Update,
}

/// Changed row, tagged by table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "row")]
pub enum ChangeRow {
    Message(MessageRecord),
    Presence(PresenceRecord),
    Typing(TypingRecord),
    ChatRequest(ChatRequestRecord),
}

impl ChangeRow {
    pub fn tenant_id(&self) -> &str {
        match self {
            ChangeRow::Message(r) => &r.tenant_id,
            ChangeRow::Presence(r) => &r.tenant_id,
            ChangeRow::Typing(r) => &r.tenant_id,
            ChangeRow::ChatRequest(r) => &r.tenant_id,
        }
    }
}

/// One row change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub row: ChangeRow,
}

impl ChangeEvent {
    pub fn insert(row: ChangeRow) -> Self {
        Self {
            kind: ChangeKind::Insert,
            row,
        }
    }

    pub fn update(row: ChangeRow) -> Self {
        Self {
            kind: ChangeKind::Update,
            row,
        }
    }
}

/// Errors surfaced to feed subscribers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Subscriber lagged behind and missed {0} events")]
    Lagged(u64),
    #[error("Change feed closed")]
    Closed,
}

/// Fan-out hub for row changes
#[derive(Clone)]
pub struct ChangeHub {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to changes of one tenant
    pub fn subscribe(&self, tenant_id: &str) -> Subscription {
        Subscription {
            tenant_id: tenant_id.to_string(),
            rx: self.tx.subscribe(),
        }
    }

    pub fn publish(&self, event: ChangeEvent) {
        trace!("Publishing {:?} change", event.kind);
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Tenant-filtered receiving end of the hub
pub struct Subscription {
    tenant_id: String,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Wait for the next change in this subscription's tenant
    pub async fn next(&mut self) -> Result<ChangeEvent, FeedError> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.row.tenant_id() == self.tenant_id => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => return Err(FeedError::Lagged(n)),
                Err(broadcast::error::RecvError::Closed) => return Err(FeedError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn presence(tenant: &str, id: &str) -> ChangeEvent {
        ChangeEvent::update(ChangeRow::Presence(PresenceRecord {
            participant_id: id.to_string(),
            tenant_id: tenant.to_string(),
            is_online: true,
            last_seen: Utc::now(),
        }))
    }

    #[tokio::test]
    async fn test_subscription_filters_by_tenant() {
        let hub = ChangeHub::new(16);
        let mut sub = hub.subscribe("school-a");

        hub.publish(presence("school-b", "intruder"));
        hub.publish(presence("school-a", "alice"));

        let event = sub.next().await.unwrap();
        match event.row {
            ChangeRow::Presence(p) => assert_eq!(p.participant_id, "alice"),
            other => panic!("Wrong row: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lagged_subscriber_is_told() {
        let hub = ChangeHub::new(2);
        let mut sub = hub.subscribe("school-a");

        for i in 0..5 {
            hub.publish(presence("school-a", &format!("p{}", i)));
        }

        assert!(matches!(sub.next().await, Err(FeedError::Lagged(_))));
        assert!(sub.next().await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_when_hub_dropped() {
        let hub = ChangeHub::new(4);
        let mut sub = hub.subscribe("school-a");
        drop(hub);

        assert_eq!(sub.next().await, Err(FeedError::Closed));
    }

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(presence("school-a", "alice")).unwrap();

        assert_eq!(json["kind"], "Update");
        assert_eq!(json["row"]["table"], "Presence");
        assert_eq!(json["row"]["row"]["participant_id"], "alice");
    }
}
