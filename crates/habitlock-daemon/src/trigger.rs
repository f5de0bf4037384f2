// Refresh triggering
//
// Every wake source (the periodic timer, socket requests, startup) funnels
// into one RefreshSignal. At most one wake is ever pending, so a burst of
// requests while a cycle runs produces exactly one follow-up cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// What a wake asks the loop to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Wake {
    /// Remove blocking before evaluating, regardless of the last applied state
    pub reset: bool,
}

#[derive(Debug, Default)]
struct Shared {
    notify: Notify,
    reset: AtomicBool,
}

#[derive(Debug, Clone, Default)]
pub struct RefreshSignal {
    shared: Arc<Shared>,
}

impl RefreshSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a cycle. Coalesces with any request not yet consumed.
    pub fn request(&self) {
        self.shared.notify.notify_one();
    }

    /// Ask for a cycle that starts by removing the blocking region.
    pub fn request_reset(&self) {
        self.shared.reset.store(true, Ordering::SeqCst);
        self.shared.notify.notify_one();
    }

    /// Wait for the next pending request.
    pub async fn wait(&self) -> Wake {
        self.shared.notify.notified().await;
        Wake { reset: self.shared.reset.swap(false, Ordering::SeqCst) }
    }
}

/// Request a cycle every `period` until shutdown. The first tick fires immediately.
pub fn spawn_timer(
    signal: RefreshSignal,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        // Ticks lost while the process was suspended collapse into one
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Periodic refresh every {:?}", period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("Periodic refresh tick");
                    signal.request();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
        }

        debug!("Periodic refresh timer stopped");
    })
}
