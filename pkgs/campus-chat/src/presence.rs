//! Presence tracking

use campus_store::{PresenceRecord, PresenceStore};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::participant::Participant;

/// Last known state of one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceState {
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

/// Presence rows of a tenant plus the deltas applied since
pub struct PresenceTracker {
    store: PresenceStore,
    states: RwLock<HashMap<String, PresenceState>>,
}

impl PresenceTracker {
    pub fn new(store: PresenceStore) -> Self {
        Self {
            store,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Bulk load every presence row of `tenant_id`
    pub async fn load(&self, tenant_id: &str) -> Result<()> {
        let records = self.store.list(tenant_id).await?;
        debug!("Loaded {} presence rows for {}", records.len(), tenant_id);
        for record in &records {
            self.apply(record);
        }
        Ok(())
    }

    /// Apply a presence row. Rows older than what is already known are
    /// ignored. Returns whether the snapshot changed.
    pub fn apply(&self, record: &PresenceRecord) -> bool {
        let next = PresenceState {
            is_online: record.is_online,
            last_seen: record.last_seen,
        };

        let mut states = self.states.write();
        match states.get(&record.participant_id) {
            Some(current) if record.last_seen < current.last_seen => false,
            Some(current) if *current == next => false,
            _ => {
                states.insert(record.participant_id.clone(), next);
                true
            }
        }
    }

    /// Write `participant`'s own presence. Failures are logged and dropped.
    pub async fn publish(
        &self,
        participant: &Participant,
        is_online: bool,
    ) -> Option<PresenceRecord> {
        match self
            .store
            .upsert(&participant.id, &participant.tenant_id, is_online)
            .await
        {
            Ok(record) => {
                self.apply(&record);
                Some(record)
            }
            Err(e) => {
                warn!("Failed to publish presence for {}: {}", participant.id, e);
                None
            }
        }
    }

    pub fn snapshot(&self) -> HashMap<String, PresenceState> {
        self.states.read().clone()
    }

    pub fn is_online(&self, participant_id: &str) -> bool {
        self.states
            .read()
            .get(participant_id)
            .map(|s| s.is_online)
            .unwrap_or(false)
    }

    /// Re-publish `online` every `interval` until `shutdown` flips to true
    pub fn spawn_heartbeat(
        self: &Arc<Self>,
        participant: Participant,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; the initial publish already happened
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tracker.publish(&participant, true).await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Presence heartbeat for {} stopped", participant.id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_store::{CampusStore, StoreConfig};
    use chrono::Duration as ChronoDuration;
    use tempfile::NamedTempFile;

    async fn tracker() -> (PresenceTracker, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let store = CampusStore::open(StoreConfig {
            db_path: file.path().to_path_buf(),
            ..Default::default()
        })
        .await
        .unwrap();
        (PresenceTracker::new(store.presence.clone()), file)
    }

    fn row(id: &str, online: bool, last_seen: DateTime<Utc>) -> PresenceRecord {
        PresenceRecord {
            participant_id: id.to_string(),
            tenant_id: "school".to_string(),
            is_online: online,
            last_seen,
        }
    }

    #[tokio::test]
    async fn test_out_of_order_delta_is_ignored() {
        let (tracker, _file) = tracker().await;
        let now = Utc::now();

        assert!(tracker.apply(&row("s1", false, now)));
        assert!(!tracker.apply(&row("s1", true, now - ChronoDuration::seconds(10))));
        assert!(!tracker.is_online("s1"));

        assert!(tracker.apply(&row("s1", true, now + ChronoDuration::seconds(1))));
        assert!(tracker.is_online("s1"));
    }

    #[tokio::test]
    async fn test_publish_updates_snapshot_and_load_sees_it() {
        let (tracker, file) = tracker().await;
        let me = Participant::new("t1", "school", crate::participant::Role::Teacher);

        let record = tracker.publish(&me, true).await.unwrap();
        assert!(record.is_online);
        assert!(tracker.is_online("t1"));

        let store = CampusStore::open(StoreConfig {
            db_path: file.path().to_path_buf(),
            ..Default::default()
        })
        .await
        .unwrap();
        let fresh = PresenceTracker::new(store.presence.clone());
        fresh.load("school").await.unwrap();
        assert_eq!(fresh.snapshot().get("t1").map(|s| s.is_online), Some(true));
        assert!(!fresh.is_online("nobody"));
    }
}
