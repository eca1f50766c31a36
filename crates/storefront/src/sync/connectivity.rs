//! Process-wide connectivity state.
//!
//! The monitor is created once at startup with the current reading and
//! handed to everything that needs it. Readings come from pages
//! (`POST /api/connectivity`) and, when enabled, from a background probe of
//! the remote endpoint. `shutdown` drops the sender, so every listener sees
//! its channel close.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use pwa_commerce_core::ConnectivityStatus;

/// Shared connectivity state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    sender: RwLock<Option<watch::Sender<ConnectivityStatus>>>,
    receiver: watch::Receiver<ConnectivityStatus>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the reading taken at startup.
    #[must_use]
    pub fn new(initial: ConnectivityStatus) -> Self {
        let (sender, receiver) = watch::channel(initial);
        Self {
            inner: Arc::new(MonitorInner {
                sender: RwLock::new(Some(sender)),
                receiver,
            }),
        }
    }

    /// The latest reading. Still answers after shutdown.
    #[must_use]
    pub fn current(&self) -> ConnectivityStatus {
        *self.inner.receiver.borrow()
    }

    /// Record a reading. Returns `true` if the status changed.
    ///
    /// Readings after shutdown are ignored.
    pub fn report(&self, status: ConnectivityStatus) -> bool {
        let Ok(guard) = self.inner.sender.read() else {
            return false;
        };
        let Some(sender) = guard.as_ref() else {
            tracing::debug!(%status, "connectivity reading after shutdown ignored");
            return false;
        };

        let changed = sender.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            tracing::info!(%status, "connectivity changed");
        }
        changed
    }

    /// Listen for readings. The receiver starts at the current value.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.inner.receiver.clone()
    }

    /// Deregister every listener.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.inner.sender.write()
            && guard.take().is_some()
        {
            tracing::debug!("connectivity monitor shut down");
        }
    }

    /// Whether `shutdown` has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner
            .sender
            .read()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }

    /// Poll `url` every `interval` and report the result: any HTTP response
    /// means online, a transport failure means offline. Stops after shutdown.
    #[must_use]
    pub fn spawn_probe(
        &self,
        client: reqwest::Client,
        url: Url,
        interval: Duration,
    ) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if monitor.is_shut_down() {
                    break;
                }

                let status = match client.head(url.clone()).timeout(interval).send().await {
                    Ok(_) => ConnectivityStatus::Online,
                    Err(e) => {
                        tracing::debug!(error = %e, "connectivity probe failed");
                        ConnectivityStatus::Offline
                    }
                };
                monitor.report(status);
            }
        })
    }
}
