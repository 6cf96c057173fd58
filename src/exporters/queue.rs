// SPDX-License-Identifier: Apache-2.0

//! Bounded sending queue in front of an export service.
//!
//! Batches are accepted without blocking and handed to a fixed pool of
//! consumer tasks. Each consumer drives one batch through the service
//! (including any retries) before taking the next one.

use crate::bounded_channel::{BoundedReceiver, BoundedSender, TrySendError, bounded};
use crate::telemetry::{Counter, RotelCounter};
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::{BoxError, Service, ServiceExt};
use tracing::{debug, error, warn};

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub enabled: bool,
    pub num_consumers: usize,
    pub queue_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            num_consumers: 10,
            queue_size: 5000,
        }
    }
}

#[derive(Error, Debug)]
pub enum QueueError {
    /// The queue is at capacity, the batch was not accepted
    #[error("sending queue is full")]
    Full,

    #[error("exporter has been shut down")]
    Closed,

    /// Only returned when queueing is disabled and the batch was exported inline
    #[error("export failed: {0}")]
    Export(BoxError),
}

/// Number of telemetry items in a batch, used for accounting.
pub trait BatchSizer {
    fn size_of(&self) -> usize;
}

#[derive(Clone)]
pub struct QueueCounters {
    pub sent: RotelCounter<u64>,
    pub send_failed: RotelCounter<u64>,
    pub enqueue_failed: RotelCounter<u64>,
}

impl QueueCounters {
    pub fn noop() -> Self {
        Self {
            sent: RotelCounter::NoOpCounter,
            send_failed: RotelCounter::NoOpCounter,
            enqueue_failed: RotelCounter::NoOpCounter,
        }
    }
}

pub struct QueuedExporter<Req, S> {
    type_name: String,
    tx: Option<BoundedSender<Req>>,
    svc: S,
    consumers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
    counters: QueueCounters,
    queueing: bool,
}

impl<Req, S> QueuedExporter<Req, S>
where
    Req: BatchSizer + Send + 'static,
    S: Service<Req, Response = (), Error = BoxError> + Clone + Send + 'static,
    S::Future: Send,
{
    /// Start the consumer tasks. Must be called within a tokio runtime.
    ///
    /// `cancel` is the token shared with the retry policy of `svc`; it is
    /// cancelled on shutdown.
    pub fn new(
        type_name: impl Into<String>,
        config: &QueueConfig,
        svc: S,
        cancel: CancellationToken,
        counters: QueueCounters,
    ) -> Self {
        let type_name = type_name.into();
        let mut consumers = Vec::new();

        let tx = if config.enabled {
            let (tx, rx) = bounded::<Req>(config.queue_size.max(1));
            for id in 0..config.num_consumers.max(1) {
                consumers.push(tokio::spawn(run_consumer(
                    type_name.clone(),
                    id,
                    rx.clone(),
                    svc.clone(),
                    counters.clone(),
                )));
            }
            Some(tx)
        } else {
            None
        };

        Self {
            type_name,
            tx,
            svc,
            consumers,
            cancel,
            counters,
            queueing: config.enabled,
        }
    }

    /// Hand a batch to the queue. Never waits for capacity: a full queue is
    /// reported to the caller immediately.
    pub async fn consume(&self, req: Req) -> Result<(), QueueError> {
        if !self.queueing {
            if self.cancel.is_cancelled() {
                return Err(QueueError::Closed);
            }
            return export(&self.type_name, self.svc.clone(), req, &self.counters)
                .await
                .map_err(QueueError::Export);
        }

        let tx = match &self.tx {
            Some(tx) => tx,
            None => return Err(QueueError::Closed),
        };

        let size = req.size_of() as u64;
        tx.try_send(req).map_err(|e| {
            self.counters.enqueue_failed.add(size, &[]);
            match e {
                TrySendError::Full(_) => {
                    warn!(
                        exporter_type = self.type_name,
                        items = size,
                        "Sending queue is full, dropping data."
                    );
                    QueueError::Full
                }
                TrySendError::Disconnected(_) => QueueError::Closed,
            }
        })
    }

    /// Number of batches waiting for a consumer
    pub fn len(&self) -> usize {
        self.tx.as_ref().map_or(0, |tx| tx.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting batches and wait for the consumers to finish what is
    /// already queued. Pending retry backoffs are cut short, so every queued
    /// batch gets at most one more attempt.
    pub async fn shutdown(&mut self) {
        self.tx.take();
        self.cancel.cancel();

        for consumer in self.consumers.drain(..) {
            if let Err(e) = consumer.await {
                error!(exporter_type = self.type_name, error = ?e, "Queue consumer task failed.");
            }
        }
        debug!(exporter_type = self.type_name, "Sending queue drained.");
    }
}

async fn run_consumer<Req, S>(
    type_name: String,
    id: usize,
    mut rx: BoundedReceiver<Req>,
    svc: S,
    counters: QueueCounters,
) where
    Req: BatchSizer + Send + 'static,
    S: Service<Req, Response = (), Error = BoxError> + Clone + Send + 'static,
    S::Future: Send,
{
    while let Some(req) = rx.next().await {
        // Fresh clone per batch so retry state is never shared between batches.
        // Errors are logged and counted by export().
        let _ = export(&type_name, svc.clone(), req, &counters).await;
    }
    debug!(exporter_type = type_name, consumer = id, "Queue consumer exiting.");
}

async fn export<Req, S>(
    type_name: &str,
    svc: S,
    req: Req,
    counters: &QueueCounters,
) -> Result<(), BoxError>
where
    Req: BatchSizer,
    S: Service<Req, Response = (), Error = BoxError>,
{
    let size = req.size_of() as u64;
    let res = svc.oneshot(req).await;

    match &res {
        Ok(()) => counters.sent.add(size, &[]),
        Err(e) => {
            error!(
                exporter_type = type_name,
                error = %e,
                items = size,
                "Exporting failed, dropping data."
            );
            counters.send_failed.add(size, &[]);
        }
    }
    res
}
