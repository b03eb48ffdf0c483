// src/pipeline/dispatcher.rs
//
// Fire-and-forget side effects. The engine never waits on alert delivery or
// threshold persistence: it queues an `Outbound` message and moves on. A
// single supervised worker drains the queue; failures are logged and
// counted, never retried and never fed back into engine state. Config store
// writes are blocking file I/O and run on the blocking pool.

use super::metrics::PipelineMetrics;
use crate::types::AlertRequest;
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// External alert collaborator
pub trait AlertSink: Send + Sync + 'static {
    fn deliver(&self, alert: &AlertRequest) -> impl Future<Output = Result<()>> + Send;
}

/// External durable-config collaborator. Called off the async runtime, so
/// implementations may block.
pub trait ConfigStore: Send + Sync + 'static {
    fn persist_absence_threshold(&self, seconds: f64) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Alert(AlertRequest),
    PersistAbsenceThreshold { seconds: f64 },
}

/// Cloneable handle for queueing outbound work
#[derive(Debug, Clone)]
pub struct OutboundSender {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl OutboundSender {
    pub fn send(&self, message: Outbound) {
        if let Err(e) = self.tx.send(message) {
            warn!("⚠️  Dispatcher stopped, dropping {:?}", e.0);
        }
    }

    pub fn alert(&self, alert: AlertRequest) {
        self.send(Outbound::Alert(alert));
    }

    /// Sender with no worker behind it, plus the receiving end for inspection.
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

pub struct AlertDispatcher {
    sender: OutboundSender,
    stop_tx: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl AlertDispatcher {
    pub fn spawn<A, C>(sink: A, store: C, metrics: PipelineMetrics) -> Self
    where
        A: AlertSink,
        C: ConfigStore,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = tokio::spawn(run_worker(sink, Arc::new(store), metrics, rx, stop_rx));
        Self {
            sender: OutboundSender { tx },
            stop_tx,
            worker,
        }
    }

    pub fn sender(&self) -> OutboundSender {
        self.sender.clone()
    }

    /// Stop the worker after it has handled everything already queued.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.worker.await {
            error!("❌ Dispatcher worker panicked: {}", e);
        }
    }
}

async fn run_worker<A: AlertSink, C: ConfigStore>(
    sink: A,
    store: Arc<C>,
    metrics: PipelineMetrics,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(message) => handle(&sink, &store, &metrics, message).await,
                None => break,
            },
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    while let Ok(message) = rx.try_recv() {
                        handle(&sink, &store, &metrics, message).await;
                    }
                    break;
                }
            }
        }
    }
    debug!("Dispatcher worker stopped");
}

async fn handle<A: AlertSink, C: ConfigStore>(
    sink: &A,
    store: &Arc<C>,
    metrics: &PipelineMetrics,
    message: Outbound,
) {
    match message {
        Outbound::Alert(alert) => match sink.deliver(&alert).await {
            Ok(()) => debug!("Delivered {} alert", alert.as_str()),
            Err(e) => {
                metrics.inc(&metrics.delivery_failures);
                error!("❌ Failed to deliver {} alert: {:#}", alert.as_str(), e);
            }
        },
        Outbound::PersistAbsenceThreshold { seconds } => {
            let store = Arc::clone(store);
            let persisted =
                tokio::task::spawn_blocking(move || store.persist_absence_threshold(seconds))
                    .await
                    .map_err(anyhow::Error::from)
                    .and_then(|result| result);
            match persisted {
                Ok(()) => info!("💾 Absence threshold {:.0}s persisted", seconds),
                Err(e) => {
                    metrics.inc(&metrics.persist_failures);
                    error!("❌ Failed to persist absence threshold: {:#}", e);
                }
            }
        }
    }
}
