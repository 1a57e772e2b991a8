use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::TodoCollection;
use crate::models::{Session, Todo};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub items: Vec<Todo>,
    /// False until the first successful fetch.
    pub is_synced: bool,
}

/// Continuous query over the todo collection.
///
/// The collection is fetched on an interval and a new [`Snapshot`] is
/// published whenever the returned items differ from the last ones. Failed
/// fetches keep the previous snapshot.
pub struct LiveQuery {
    collection: Arc<dyn TodoCollection>,
    session: Session,
    interval: Duration,
}

impl LiveQuery {
    pub fn new(collection: Arc<dyn TodoCollection>, session: Session, interval: Duration) -> Self {
        Self {
            collection,
            session,
            interval,
        }
    }

    /// Starts the query. It runs until the returned [`Subscription`] is dropped.
    pub fn subscribe(self) -> (Subscription, watch::Receiver<Snapshot>) {
        let (tx, rx) = watch::channel(Snapshot::default());
        let nudge = Arc::new(Notify::new());
        let task = tokio::spawn(self.run(tx, nudge.clone()));

        (Subscription { task, nudge }, rx)
    }

    async fn run(self, tx: watch::Sender<Snapshot>, nudge: Arc<Notify>) {
        info!("Opening live query (interval: {:?})", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = nudge.notified() => {
                    ticker.reset();
                }
            }

            match self.collection.list(&self.session).await {
                Ok(items) => {
                    let changed = tx.send_if_modified(|current| {
                        if current.is_synced && current.items == items {
                            return false;
                        }
                        current.items = items;
                        current.is_synced = true;
                        true
                    });
                    if changed {
                        debug!("Live query published {} items", tx.borrow().items.len());
                    }
                }
                Err(e) => {
                    warn!("Live query fetch failed: {}", e);
                }
            }

            if tx.is_closed() {
                debug!("Live query has no readers left");
                break;
            }
        }
    }
}

/// Handle to a running [`LiveQuery`]. Dropping it stops the query.
pub struct Subscription {
    task: JoinHandle<()>,
    nudge: Arc<Notify>,
}

impl Subscription {
    /// Asks for a fetch now instead of at the next interval.
    pub fn refresh(&self) {
        self.nudge.notify_one();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!("Closing live query");
        self.task.abort();
    }
}
