use std::future::Future;

use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};

use super::{Store, Topic};
use crate::AppResult;

/// A query whose result is re-read whenever its topic changes.
pub trait LiveQuery: Send + Sync + 'static {
    type Snapshot: Send;

    fn topic(&self) -> Topic;

    fn load(&self, store: &Store) -> impl Future<Output = AppResult<Self::Snapshot>> + Send;
}

/// An open live query. Yields the current snapshot first, then one full
/// snapshot per change.
pub struct Subscription<Q: LiveQuery> {
    store: Store,
    query: Q,
    rx: Option<broadcast::Receiver<Topic>>,
    // a change was seen (or nothing was delivered yet) and still needs a load
    pending: bool,
}

impl<Q: LiveQuery> Subscription<Q> {
    pub(super) fn new(store: Store, query: Q, rx: broadcast::Receiver<Topic>) -> Self {
        Subscription {
            store,
            query,
            rx: Some(rx),
            pending: true,
        }
    }

    /// Waits for the next snapshot. `None` once unsubscribed.
    ///
    /// Changes that pile up before the load starts, a lag included, are folded
    /// into that one load. Cancel-safe: if the future is dropped mid-load, the
    /// next call loads again.
    pub async fn next(&mut self) -> Option<AppResult<Q::Snapshot>> {
        let topic = self.query.topic();
        loop {
            if self.rx.is_none() {
                return None;
            }

            if self.pending {
                let snapshot = self.query.load(&self.store).await;
                self.pending = false;
                return Some(snapshot);
            }

            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(changed) if changed == topic => self.pending = true,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(?topic, skipped, "subscription lagged, reloading");
                    self.pending = true;
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                    continue;
                }
            }
            self.skip_queued();
        }
    }

    // whatever is already queued is older than the load about to run
    fn skip_queued(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            return;
        };
        let closed = loop {
            match rx.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty) => break false,
                Err(TryRecvError::Closed) => break true,
            }
        };
        if closed {
            self.rx = None;
        }
    }

    /// Stops delivery. Safe to call any number of times.
    pub fn unsubscribe(&mut self) {
        if self.rx.take().is_some() {
            tracing::trace!(topic = ?self.query.topic(), "unsubscribed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.rx.is_some()
    }
}
