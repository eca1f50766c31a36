//! Turning connectivity transitions into flush requests.
//!
//! - [`SyncTrigger`] is the two-state machine: only a transition into
//!   `Online` asks for a flush.
//! - [`SyncRegistry`] holds background-sync registrations by tag. A tag that
//!   is already pending is not queued twice.
//! - [`FlushScheduler`] registers the sync tag and falls back to an inline
//!   flush when no background listener is attached.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use pwa_commerce_core::ConnectivityStatus;

use super::delivery::{HttpEndpoint, RemoteEndpoint};
use super::flush::{FlushReport, FlushWorker};
use crate::db::PersistenceError;
use crate::events::{ClientMessage, EventBus};

/// Tag under which cart flushes are registered.
pub const SYNC_TAG: &str = "sync-cart";

/// State of the connectivity state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Offline,
    Online,
}

/// What a connectivity signal asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    /// Nothing to do.
    None,
    /// Request exactly one flush.
    ScheduleFlush,
}

/// Two-state connectivity machine. Starts `Offline`.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    state: TriggerState,
}

impl Default for SyncTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncTrigger {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: TriggerState::Offline,
        }
    }

    #[must_use]
    pub const fn state(&self) -> TriggerState {
        self.state
    }

    /// Feed one connectivity signal.
    pub const fn on_signal(&mut self, status: ConnectivityStatus) -> TriggerAction {
        match (self.state, status) {
            (TriggerState::Offline, ConnectivityStatus::Online) => {
                self.state = TriggerState::Online;
                TriggerAction::ScheduleFlush
            }
            (TriggerState::Online, ConnectivityStatus::Offline) => {
                self.state = TriggerState::Offline;
                TriggerAction::None
            }
            _ => TriggerAction::None,
        }
    }
}

/// Errors that can occur registering a background sync.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// No background listener is attached to receive the sync event.
    #[error("no background sync listener attached")]
    WorkerUnavailable,
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The tag was queued for the listener.
    Queued,
    /// The tag was already pending; nothing new was queued.
    Coalesced,
}

/// Background-sync registrations by tag.
#[derive(Clone, Default)]
pub struct SyncRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    sender: RwLock<Option<mpsc::UnboundedSender<String>>>,
    pending: RwLock<HashSet<String>>,
}

impl SyncRegistry {
    /// Create a registry with no listener attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the background listener. Replaces any previous listener.
    #[must_use]
    pub fn attach(&self) -> SyncEvents {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Ok(mut guard) = self.inner.sender.write() {
            *guard = Some(sender);
        }
        if let Ok(mut pending) = self.inner.pending.write() {
            pending.clear();
        }
        SyncEvents {
            receiver,
            registry: self.clone(),
        }
    }

    /// Detach the listener. Later registrations fail.
    pub fn detach(&self) {
        if let Ok(mut guard) = self.inner.sender.write() {
            guard.take();
        }
    }

    /// Register `tag` for a background sync event.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::WorkerUnavailable` if no listener is
    /// attached or the listener has stopped.
    pub fn register(&self, tag: &str) -> Result<Registration, RegistrationError> {
        let sender = self
            .inner
            .sender
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or(RegistrationError::WorkerUnavailable)?;

        {
            let Ok(mut pending) = self.inner.pending.write() else {
                return Err(RegistrationError::WorkerUnavailable);
            };
            if !pending.insert(tag.to_owned()) {
                tracing::debug!(tag, "sync already pending, coalesced");
                return Ok(Registration::Coalesced);
            }
        }

        if sender.send(tag.to_owned()).is_err() {
            self.fired(tag);
            return Err(RegistrationError::WorkerUnavailable);
        }

        tracing::debug!(tag, "sync registered");
        Ok(Registration::Queued)
    }

    /// Tags registered and not yet dispatched.
    #[must_use]
    pub fn pending_tags(&self) -> Vec<String> {
        let mut tags: Vec<_> = self
            .inner
            .pending
            .read()
            .map(|guard| guard.iter().cloned().collect())
            .unwrap_or_default();
        tags.sort();
        tags
    }

    fn fired(&self, tag: &str) {
        if let Ok(mut pending) = self.inner.pending.write() {
            pending.remove(tag);
        }
    }
}

/// Receiving side of the registry, owned by the background listener.
pub struct SyncEvents {
    receiver: mpsc::UnboundedReceiver<String>,
    registry: SyncRegistry,
}

impl SyncEvents {
    /// Wait for the next registered tag.
    ///
    /// The tag stops being pending as soon as it is handed out, so a
    /// registration made while it is being handled queues another event.
    pub async fn next(&mut self) -> Option<String> {
        let tag = self.receiver.recv().await?;
        self.registry.fired(&tag);
        Some(tag)
    }
}

/// How a flush request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlushRequest {
    /// Queued for the background listener.
    Registered,
    /// A flush was already queued.
    Coalesced,
    /// No listener; the flush ran inline.
    RanInline(FlushReport),
}

/// Requests flushes through background sync, with an inline fallback.
pub struct FlushScheduler<E = HttpEndpoint> {
    registry: SyncRegistry,
    worker: FlushWorker<E>,
}

impl<E> Clone for FlushScheduler<E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            worker: self.worker.clone(),
        }
    }
}

impl<E: RemoteEndpoint> FlushScheduler<E> {
    #[must_use]
    pub const fn new(registry: SyncRegistry, worker: FlushWorker<E>) -> Self {
        Self { registry, worker }
    }

    #[must_use]
    pub const fn registry(&self) -> &SyncRegistry {
        &self.registry
    }

    /// Ask for one flush of the operation log.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` only when the inline fallback ran and could
    /// not read or update the log.
    pub async fn request_flush(&self) -> Result<FlushRequest, PersistenceError> {
        match self.registry.register(SYNC_TAG) {
            Ok(Registration::Queued) => Ok(FlushRequest::Registered),
            Ok(Registration::Coalesced) => Ok(FlushRequest::Coalesced),
            Err(e) => {
                tracing::warn!(error = %e, "background sync unavailable, flushing inline");
                let report = self.worker.run().await?;
                Ok(FlushRequest::RanInline(report))
            }
        }
    }

    /// Drive the trigger from connectivity readings until the monitor shuts
    /// down. The first reading is the value current at spawn time.
    #[must_use]
    pub fn spawn_trigger_loop(
        &self,
        mut readings: watch::Receiver<ConnectivityStatus>,
        bus: EventBus,
    ) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut trigger = SyncTrigger::new();
            let mut status = *readings.borrow_and_update();

            loop {
                if trigger.on_signal(status) == TriggerAction::ScheduleFlush {
                    match scheduler.request_flush().await {
                        Ok(request) => tracing::debug!(?request, "flush requested on reconnect"),
                        Err(e) => tracing::error!(error = %e, "flush on reconnect failed"),
                    }
                }

                if readings.changed().await.is_err() {
                    tracing::debug!("connectivity monitor closed, trigger loop stopping");
                    break;
                }
                status = *readings.borrow_and_update();
                bus.publish(ClientMessage::Connectivity { status });
            }
        })
    }
}
