use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::SessionManager;

/// Default time between two sweeps.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically reclaims idle sessions of a [`SessionManager`].
pub struct Sweeper {
    manager: Arc<SessionManager>,
    interval: Duration,
    max_age: Duration,
    stop: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl Sweeper {
    /// Creates a sweeper; `interval` defaults to 60 s when `None`.
    pub fn new(manager: Arc<SessionManager>, interval: Option<Duration>, max_age: Duration) -> Self {
        Self {
            manager,
            interval: interval.unwrap_or(DEFAULT_INTERVAL),
            max_age,
            stop: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Runs one sweep immediately.
    pub fn sweep_now(&self) -> usize {
        self.manager.sweep_expired_sessions(self.max_age)
    }

    /// Starts sweeping in a background tokio task.
    ///
    /// Call [`stop`](Self::stop) to cancel. Starting again replaces the
    /// running task.
    pub fn start(&self) {
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        {
            let mut stop = self.stop.lock().unwrap_or_else(PoisonError::into_inner);
            // Dropping the old sender ends the previous task.
            drop(stop.take());
            *stop = Some(tx);
        }

        let manager = Arc::clone(&self.manager);
        let interval = self.interval;
        let max_age = self.max_age;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.sweep_expired_sessions(max_age);
                    }
                    _ = &mut rx => {
                        debug!("session sweeper stopped");
                        break;
                    }
                }
            }
        });
        debug!(?interval, ?max_age, "session sweeper started");
    }

    /// Stops the background task.
    pub fn stop(&self) {
        let mut stop = self.stop.lock().unwrap_or_else(PoisonError::into_inner);
        drop(stop.take());
    }

    pub fn is_running(&self) -> bool {
        self.stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
