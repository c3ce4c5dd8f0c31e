//! Realtime event dispatcher
//!
//! One task per client drains the tenant's change feed, applies each row as
//! an idempotent upsert and re-derives the conversation list. When the
//! subscriber lags it reloads from the stores; when the feed closes it
//! reconnects with exponential backoff and reloads.

use async_trait::async_trait;
use campus_store::{ChangeHub, FeedError, Subscription};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::state::ChatState;

/// Where the dispatcher gets its change feed from
#[async_trait]
pub trait RealtimeSource: Send + Sync {
    async fn connect(&self, tenant_id: &str) -> Result<Subscription>;
}

#[async_trait]
impl RealtimeSource for ChangeHub {
    async fn connect(&self, tenant_id: &str) -> Result<Subscription> {
        Ok(self.subscribe(tenant_id))
    }
}

pub(crate) struct Dispatcher {
    state: Arc<ChatState>,
    source: Arc<dyn RealtimeSource>,
    shutdown: watch::Receiver<bool>,
    expiries: BinaryHeap<Reverse<Instant>>,
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending::<()>().await,
    }
}

impl Dispatcher {
    pub(crate) fn new(
        state: Arc<ChatState>,
        source: Arc<dyn RealtimeSource>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            state,
            source,
            shutdown,
            expiries: BinaryHeap::new(),
        }
    }

    pub(crate) fn schedule(&mut self, expiries: impl IntoIterator<Item = Instant>) {
        self.expiries.extend(expiries.into_iter().map(Reverse));
    }

    pub(crate) async fn run(mut self, mut subscription: Subscription) {
        info!("Dispatcher started for {}", self.state.me.id);

        loop {
            let next_expiry = self.expiries.peek().map(|Reverse(at)| *at);

            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                _ = sleep_until_some(next_expiry) => {
                    let now = Instant::now();
                    while matches!(self.expiries.peek(), Some(Reverse(at)) if *at <= now) {
                        self.expiries.pop();
                    }
                    self.state.expire_typing(now);
                }
                received = subscription.next() => match received {
                    Ok(event) => {
                        if let Some(expires_at) = self.state.apply(event.into()) {
                            self.expiries.push(Reverse(expires_at));
                        }
                    }
                    Err(FeedError::Lagged(missed)) => {
                        warn!("Dispatcher missed {} events, reloading", missed);
                        self.resync().await;
                    }
                    Err(FeedError::Closed) => {
                        warn!("Realtime feed closed for {}", self.state.me.id);
                        self.state.connection_lost();
                        match self.reconnect().await {
                            Some(fresh) => {
                                subscription = fresh;
                                self.resync().await;
                                self.state.reconnected();
                            }
                            None => break,
                        }
                    }
                }
            }
        }

        info!("Dispatcher stopped for {}", self.state.me.id);
    }

    async fn resync(&mut self) {
        match self.state.resync().await {
            Ok(expiries) => self.schedule(expiries),
            Err(e) => error!("Failed to reload chat state: {}", e),
        }
    }

    /// Reconnect with backoff; `None` when shut down meanwhile
    async fn reconnect(&mut self) -> Option<Subscription> {
        let tenant_id = self.state.me.tenant_id.clone();
        let mut attempt = 0u32;

        loop {
            let delay = self.state.config.reconnect_delay(attempt);
            debug!("Reconnecting in {:?} (attempt {})", delay, attempt + 1);

            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        return None;
                    }
                }
                _ = tokio::time::sleep(delay) => {
                    match self.source.connect(&tenant_id).await {
                        Ok(subscription) => {
                            info!("Realtime feed reconnected after {} attempts", attempt + 1);
                            return Some(subscription);
                        }
                        Err(e) => {
                            warn!("Reconnect attempt {} failed: {}", attempt + 1, e);
                            attempt = attempt.saturating_add(1);
                        }
                    }
                }
            }
        }
    }
}
