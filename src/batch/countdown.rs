//! Restartable one-shot countdown
//!
//! The batch debouncer restarts one shared countdown on every enqueue; the
//! countdown fires only after a full quiet window with no restart.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

/// Handle to a running countdown. Dropping it cancels the countdown without
/// firing.
#[derive(Debug)]
pub struct Countdown {
    restart_tx: mpsc::UnboundedSender<Duration>,
    window: Duration,
}

impl Countdown {
    /// Start a countdown over `window`. The returned receiver resolves
    /// exactly once, when the window elapses with no restart.
    pub fn start(window: Duration) -> (Self, oneshot::Receiver<()>) {
        let (restart_tx, mut restart_rx) = mpsc::unbounded_channel::<Duration>();
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut deadline = Instant::now() + window;
            loop {
                tokio::select! {
                    _ = sleep_until(deadline) => {
                        let _ = done_tx.send(());
                        return;
                    }
                    restart = restart_rx.recv() => {
                        match restart {
                            Some(window) => deadline = Instant::now() + window,
                            // handle dropped: cancel without firing
                            None => return,
                        }
                    }
                }
            }
        });

        (Self { restart_tx, window }, done_rx)
    }

    /// Cancel the pending fire and reschedule a full window from now
    pub fn restart(&self) {
        let _ = self.restart_tx.send(self.window);
    }

    /// Restart with a different window, e.g. a per-call debounce override
    pub fn restart_with(&self, window: Duration) {
        let _ = self.restart_tx.send(window);
    }
}
