//! Typing indicators
//!
//! The local side is [`TypingBroadcaster`]: each keystroke either starts a
//! typing period (one `is_typing = true` write) or pushes its deadline back.
//! When the deadline passes without another keystroke the flag is cleared.
//!
//! The remote side is [`TypingBoard`]: a signal counts as typing for
//! `ttl` after this client observed it, whether or not a stop ever arrives.

use campus_store::{ConversationKey, TypingRecord, TypingStore, TypingUpdate};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::participant::Participant;

/// Local typing state for one conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingState {
    Idle,
    Typing,
}

struct TypingTimer {
    deadline: Instant,
    task: Option<JoinHandle<()>>,
}

type TimerArena = Arc<Mutex<HashMap<ConversationKey, TypingTimer>>>;

#[derive(Clone)]
struct TypingWriter {
    store: TypingStore,
    me: Participant,
}

impl TypingWriter {
    async fn write(&self, key: &ConversationKey, is_typing: bool) {
        let update = TypingUpdate {
            conversation_id: key.id().to_string(),
            is_group: key.is_group(),
            participant_id: self.me.id.clone(),
            tenant_id: self.me.tenant_id.clone(),
            is_typing,
        };

        if let Err(e) = self.store.upsert(update).await {
            warn!("Failed to write typing={} for {}: {}", is_typing, key, e);
        }
    }
}

/// Debounced typing flag writer for the local participant
pub struct TypingBroadcaster {
    writer: TypingWriter,
    ttl: Duration,
    timers: TimerArena,
}

impl TypingBroadcaster {
    pub fn new(store: TypingStore, me: Participant, ttl: Duration) -> Self {
        Self {
            writer: TypingWriter { store, me },
            ttl,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a keystroke in `key`
    pub async fn keystroke(&self, key: &ConversationKey) -> TypingState {
        let deadline = Instant::now() + self.ttl;

        {
            let mut timers = self.timers.lock();
            if let Some(timer) = timers.get_mut(key) {
                timer.deadline = deadline;
                return TypingState::Typing;
            }
            timers.insert(
                key.clone(),
                TypingTimer {
                    deadline,
                    task: None,
                },
            );
        }

        debug!("Started typing in {}", key);
        self.writer.write(key, true).await;

        let task = tokio::spawn(expire_when_idle(
            Arc::clone(&self.timers),
            self.writer.clone(),
            key.clone(),
        ));

        let mut timers = self.timers.lock();
        match timers.get_mut(key) {
            Some(timer) => {
                timer.task = Some(task);
                TypingState::Typing
            }
            // Gone while the write was in flight: either `stop` took it, and
            // the task returns on its own, or the task already expired it
            // and must be left to finish its `false` write
            None => TypingState::Idle,
        }
    }

    /// End the typing period in `key` now, if there is one
    pub async fn stop(&self, key: &ConversationKey) {
        let timer = self.timers.lock().remove(key);
        if let Some(timer) = timer {
            if let Some(task) = timer.task {
                task.abort();
            }
            debug!("Stopped typing in {}", key);
            self.writer.write(key, false).await;
        }
    }

    /// End every typing period
    pub async fn stop_all(&self) {
        let drained: Vec<(ConversationKey, TypingTimer)> = self.timers.lock().drain().collect();
        for (key, timer) in drained {
            if let Some(task) = timer.task {
                task.abort();
            }
            self.writer.write(&key, false).await;
        }
    }

    pub fn state(&self, key: &ConversationKey) -> TypingState {
        if self.timers.lock().contains_key(key) {
            TypingState::Typing
        } else {
            TypingState::Idle
        }
    }
}

impl Drop for TypingBroadcaster {
    fn drop(&mut self) {
        for (_, timer) in self.timers.lock().drain() {
            if let Some(task) = timer.task {
                task.abort();
            }
        }
    }
}

async fn expire_when_idle(timers: TimerArena, writer: TypingWriter, key: ConversationKey) {
    loop {
        let deadline = match timers.lock().get(&key) {
            Some(timer) => timer.deadline,
            None => return,
        };

        tokio::time::sleep_until(deadline).await;

        let expired = {
            let mut timers = timers.lock();
            match timers.get(&key) {
                Some(timer) if timer.deadline <= Instant::now() => {
                    timers.remove(&key);
                    true
                }
                Some(_) => false,
                None => return,
            }
        };

        if expired {
            debug!("Typing in {} went idle", key);
            writer.write(&key, false).await;
            return;
        }
    }
}

/// Typing signals observed from other participants
#[derive(Debug, Clone)]
pub struct TypingBoard {
    ttl: Duration,
    expiries: HashMap<(ConversationKey, String), Instant>,
}

impl TypingBoard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            expiries: HashMap::new(),
        }
    }

    /// Apply a signal as seen by `viewer`.
    ///
    /// Returns the instant the signal lapses when it counts as typing, so the
    /// caller can re-derive its view then.
    pub fn apply(
        &mut self,
        record: &TypingRecord,
        viewer: &str,
        observed_at: Instant,
        wall_now: DateTime<Utc>,
    ) -> Option<Instant> {
        if record.participant_id == viewer {
            return None;
        }
        let key = record.conversation_key_for(viewer)?;
        let slot = (key, record.participant_id.clone());

        let age = wall_now
            .signed_duration_since(record.updated_at)
            .to_std()
            .unwrap_or_default();

        if !record.is_typing || age >= self.ttl {
            self.expiries.remove(&slot);
            return None;
        }

        let expires_at = observed_at + self.ttl;
        self.expiries.insert(slot, expires_at);
        Some(expires_at)
    }

    pub fn is_typing(&self, key: &ConversationKey, participant_id: &str, now: Instant) -> bool {
        self.expiries
            .get(&(key.clone(), participant_id.to_string()))
            .map(|expires_at| *expires_at > now)
            .unwrap_or(false)
    }

    /// Conversations with at least one unexpired typist
    pub fn active_keys(&self, now: Instant) -> HashSet<ConversationKey> {
        self.expiries
            .iter()
            .filter(|(_, expires_at)| **expires_at > now)
            .map(|((key, _), _)| key.clone())
            .collect()
    }

    /// Drop lapsed entries
    pub fn prune(&mut self, now: Instant) {
        self.expiries.retain(|_, expires_at| *expires_at > now);
    }

    pub fn clear(&mut self) {
        self.expiries.clear();
    }
}
