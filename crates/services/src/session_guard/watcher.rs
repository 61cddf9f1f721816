use std::sync::Arc;
use std::time::Duration;

use storage::repository::SessionChange;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::guard::{GuardPhase, SessionGuard};

/// How often an active session is revalidated against the remote record.
///
/// Push events shorten detection when the backend supports them; this
/// interval bounds detection latency either way.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Background revalidation loop for one active session guard.
///
/// Runs until the guard leaves `Active`, publishing expiry on a watch
/// channel. The task is aborted on drop so no orphaned tick can touch a
/// guard after its owning context is gone.
pub struct SessionWatcher {
    handle: JoinHandle<()>,
    expired: watch::Receiver<bool>,
}

impl SessionWatcher {
    /// Spawn the revalidation loop.
    ///
    /// `changes` is the backend's push subscription where available; the
    /// loop degrades to pure polling without it.
    #[must_use]
    pub fn spawn(
        guard: Arc<Mutex<SessionGuard>>,
        poll_interval: Duration,
        changes: Option<broadcast::Receiver<SessionChange>>,
    ) -> Self {
        let (tx, expired) = watch::channel(false);
        let handle = tokio::spawn(run(guard, poll_interval, changes, tx));
        Self { handle, expired }
    }

    /// Watch channel flipping to `true` once the session expires.
    #[must_use]
    pub fn expired(&self) -> watch::Receiver<bool> {
        self.expired.clone()
    }

    /// True once the loop has stopped (expiry, logout, or external abort).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SessionWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(
    guard: Arc<Mutex<SessionGuard>>,
    poll_interval: Duration,
    mut changes: Option<broadcast::Receiver<SessionChange>>,
    tx: watch::Sender<bool>,
) {
    let identity = guard.lock().await.identity().clone();

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The interval fires immediately; the guard was just validated.
    ticker.tick().await;

    loop {
        let mut push_closed = false;
        let relevant = if let Some(rx) = changes.as_mut() {
            tokio::select! {
                _ = ticker.tick() => true,
                change = rx.recv() => match change {
                    // Only this identity's record can invalidate us.
                    Ok(change) => change.identity == identity,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!(missed, "session change stream lagged; revalidating");
                        true
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        push_closed = true;
                        true
                    }
                },
            }
        } else {
            ticker.tick().await;
            true
        };

        if push_closed {
            debug!(identity = %identity, "push subscription closed; falling back to polling");
            changes = None;
        }
        if !relevant {
            continue;
        }

        // The context may have logged out between the wakeup and the lock.
        let mut guard = guard.lock().await;
        match guard.phase() {
            GuardPhase::Active => {}
            GuardPhase::Expired => {
                let _ = tx.send(true);
                return;
            }
            _ => return,
        }

        match guard.revalidate().await {
            Ok(GuardPhase::Expired) => {
                let _ = tx.send(true);
                return;
            }
            Ok(_) => {}
            // Transient store trouble: keep the session and try again on
            // the next wakeup.
            Err(error) => {
                warn!(identity = %identity, %error, "session revalidation failed; retrying");
            }
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
