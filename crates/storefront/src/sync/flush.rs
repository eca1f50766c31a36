//! Background flush of the operation log.
//!
//! A run snapshots the pending operations and delivers them one at a time,
//! oldest first. Each acknowledged operation is removed before the next is
//! sent; the first failure ends the run and leaves it, and everything after
//! it, pending for the next run.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::instrument;

use pwa_commerce_core::SyncOperation;

use super::delivery::{DeliveryError, HttpEndpoint, RemoteEndpoint};
use super::notify::{Notification, Notifier};
use crate::db::{OperationLog, PersistenceError};
use crate::events::{ClientMessage, EventBus};

/// Outcome of one flush run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Operations acknowledged and removed during this run.
    pub delivered: usize,
    /// Operations still pending after the run.
    pub remaining: u64,
    /// Whether the run stopped on a delivery failure.
    pub halted: bool,
}

/// Drains the operation log against a remote endpoint.
///
/// Cheap to clone. Runs are serialised: a run requested while another is in
/// progress waits for it, then works on a fresh snapshot.
pub struct FlushWorker<E = HttpEndpoint> {
    inner: Arc<FlushWorkerInner<E>>,
}

struct FlushWorkerInner<E> {
    pool: SqlitePool,
    endpoint: E,
    bus: EventBus,
    notifier: Notifier,
    delivery_timeout: Duration,
    run_lock: Mutex<()>,
}

impl<E> Clone for FlushWorker<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: RemoteEndpoint> FlushWorker<E> {
    /// Create a flush worker.
    #[must_use]
    pub fn new(pool: SqlitePool, endpoint: E, bus: EventBus, delivery_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(FlushWorkerInner {
                pool,
                notifier: Notifier::new(bus.clone()),
                endpoint,
                bus,
                delivery_timeout,
                run_lock: Mutex::new(()),
            }),
        }
    }

    /// The endpoint operations are delivered to.
    #[must_use]
    pub fn endpoint(&self) -> &E {
        &self.inner.endpoint
    }

    /// Run one flush.
    ///
    /// Delivery failures end the run but are not errors: they show up as
    /// `halted` in the report.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if the log cannot be read or an
    /// acknowledged operation cannot be removed. Operations not yet removed
    /// stay pending and are delivered again by a later run.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<FlushReport, PersistenceError> {
        let _running = self.inner.run_lock.lock().await;

        let log = OperationLog::new(&self.inner.pool);
        let pending = log.list_pending().await?;
        if pending.is_empty() {
            tracing::debug!("nothing to flush");
            return Ok(FlushReport::default());
        }

        let mut report = FlushReport::default();
        for operation in &pending {
            if let Err(e) = self.deliver(operation).await {
                tracing::warn!(
                    operation_id = %operation.id,
                    product_id = %operation.product_id,
                    error = %e,
                    "delivery failed, halting flush run"
                );
                report.halted = true;
                break;
            }

            log.remove_confirmed(&[operation.id]).await?;
            report.delivered += 1;
            tracing::debug!(operation_id = %operation.id, "operation delivered");
        }

        report.remaining = log.count().await?;

        if report.delivered > 0 {
            self.announce(report.delivered);
        }

        tracing::info!(
            delivered = report.delivered,
            remaining = report.remaining,
            halted = report.halted,
            "flush run finished"
        );

        Ok(report)
    }

    async fn deliver(&self, operation: &SyncOperation) -> Result<(), DeliveryError> {
        let deadline = self.inner.delivery_timeout;
        tokio::time::timeout(deadline, self.inner.endpoint.deliver(operation))
            .await
            .unwrap_or(Err(DeliveryError::Timeout(deadline)))
    }

    fn announce(&self, delivered: usize) {
        self.inner
            .bus
            .publish(ClientMessage::SyncComplete { delivered });

        if let Err(e) = self.inner.notifier.show(Notification::sync_complete()) {
            tracing::debug!(error = %e, "sync notification not shown");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    use chrono::Utc;

    use pwa_commerce_core::{NewSyncOperation, ProductId, SyncOperationId};

    use super::*;
    use crate::db::test_pool;

    /// Endpoint that records deliveries and fails on chosen product ids.
    #[derive(Default)]
    pub(crate) struct ScriptedEndpoint {
        pub delivered: StdMutex<Vec<SyncOperationId>>,
        pub failing: StdMutex<HashSet<String>>,
        pub stall: bool,
    }

    impl ScriptedEndpoint {
        pub fn failing_on(products: &[&str]) -> Self {
            let endpoint = Self::default();
            endpoint
                .failing
                .lock()
                .unwrap()
                .extend(products.iter().map(|p| (*p).to_owned()));
            endpoint
        }

        pub fn delivered(&self) -> Vec<SyncOperationId> {
            self.delivered.lock().unwrap().clone()
        }
    }

    impl RemoteEndpoint for ScriptedEndpoint {
        async fn deliver(&self, operation: &SyncOperation) -> Result<(), DeliveryError> {
            if self.stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self
                .failing
                .lock()
                .unwrap()
                .contains(operation.product_id.as_str())
            {
                return Err(DeliveryError::Rejected {
                    status: 503,
                    body: "unavailable".to_owned(),
                });
            }
            self.delivered.lock().unwrap().push(operation.id);
            Ok(())
        }
    }

    async fn append(pool: &SqlitePool, product: &str) -> SyncOperation {
        OperationLog::new(pool)
            .append(NewSyncOperation::add_to_cart(
                ProductId::parse(product).unwrap(),
                1,
                Utc::now(),
            ))
            .await
            .unwrap()
    }

    fn worker(pool: &SqlitePool, endpoint: ScriptedEndpoint) -> FlushWorker<ScriptedEndpoint> {
        FlushWorker::new(
            pool.clone(),
            endpoint,
            EventBus::new(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_flush_delivers_in_order_and_empties_log() {
        let pool = test_pool().await;
        let first = append(&pool, "a").await;
        let second = append(&pool, "a").await;
        let third = append(&pool, "b").await;

        let worker = worker(&pool, ScriptedEndpoint::default());
        let report = worker.run().await.unwrap();

        assert_eq!(
            report,
            FlushReport {
                delivered: 3,
                remaining: 0,
                halted: false
            }
        );
        assert_eq!(
            worker.endpoint().delivered(),
            vec![first.id, second.id, third.id]
        );
    }

    #[tokio::test]
    async fn test_failure_halts_and_keeps_rest() {
        let pool = test_pool().await;
        let o1 = append(&pool, "a").await;
        let o2 = append(&pool, "b").await;
        let o3 = append(&pool, "c").await;
        let o4 = append(&pool, "d").await;

        let worker = worker(&pool, ScriptedEndpoint::failing_on(&["c"]));
        let report = worker.run().await.unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(report.remaining, 2);
        assert!(report.halted);
        assert_eq!(worker.endpoint().delivered(), vec![o1.id, o2.id]);

        let pending = OperationLog::new(&pool).list_pending().await.unwrap();
        assert_eq!(pending, vec![o3, o4]);
    }

    #[tokio::test]
    async fn test_failure_on_first_leaves_everything() {
        let pool = test_pool().await;
        let o1 = append(&pool, "a").await;
        let o2 = append(&pool, "b").await;

        let worker = worker(&pool, ScriptedEndpoint::failing_on(&["a"]));
        let report = worker.run().await.unwrap();

        assert_eq!(report.delivered, 0);
        assert!(report.halted);
        assert!(worker.endpoint().delivered().is_empty());
        let pending = OperationLog::new(&pool).list_pending().await.unwrap();
        assert_eq!(pending, vec![o1, o2]);
    }

    #[tokio::test]
    async fn test_rerun_after_recovery() {
        let pool = test_pool().await;
        append(&pool, "a").await;
        let o2 = append(&pool, "b").await;

        let worker = worker(&pool, ScriptedEndpoint::failing_on(&["b"]));
        worker.run().await.unwrap();

        worker.endpoint().failing.lock().unwrap().clear();
        let report = worker.run().await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(worker.endpoint().delivered().last(), Some(&o2.id));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let pool = test_pool().await;
        let o1 = append(&pool, "a").await;

        let endpoint = ScriptedEndpoint {
            stall: true,
            ..ScriptedEndpoint::default()
        };
        let worker = FlushWorker::new(
            pool.clone(),
            endpoint,
            EventBus::new(),
            Duration::from_millis(50),
        );
        let report = worker.run().await.unwrap();

        assert!(report.halted);
        assert_eq!(report.delivered, 0);
        let pending = OperationLog::new(&pool).list_pending().await.unwrap();
        assert_eq!(pending, vec![o1]);
    }

    #[tokio::test]
    async fn test_completion_signal_only_when_delivered() {
        let pool = test_pool().await;
        let bus = EventBus::new();
        let mut client = bus.connect("http://localhost/");
        let worker = FlushWorker::new(
            pool.clone(),
            ScriptedEndpoint::default(),
            bus.clone(),
            Duration::from_secs(5),
        );

        worker.run().await.unwrap();
        append(&pool, "a").await;
        worker.run().await.unwrap();

        assert_eq!(
            client.next_message().await,
            Some(ClientMessage::SyncComplete { delivered: 1 })
        );
        assert!(matches!(
            client.next_message().await,
            Some(ClientMessage::Notification { .. })
        ));
    }
}
