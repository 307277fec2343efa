use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    select,
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

use crate::{defs::Sample, store::StoreError};

use super::queue::SampleQueue;

/* === Definitions === */

/// Durable destination for drained samples.
#[async_trait]
pub trait SampleStore: Send + Sync {
    async fn append(&self, sample: &Sample) -> Result<(), StoreError>;
}

/// Transient destination for drained samples.
#[async_trait]
pub trait SampleDisplay: Send + Sync {
    async fn render(&self, sample: &Sample);
}

/// Periodic consumer of the sample queue, independent of the pump's
/// cadence. Each drained sample is forwarded to persistence and display
/// exactly once each.
pub struct SampleSink {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/* === Implementations === */

impl SampleSink {
    pub fn spawn(
        queue: Arc<SampleQueue>,
        store: Arc<dyn SampleStore>,
        display: Arc<dyn SampleDisplay>,
        cadence: Duration,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(sink_task(queue, store, display, cadence, shutdown_rx));

        SampleSink { shutdown, task }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

async fn sink_task(
    queue: Arc<SampleQueue>,
    store: Arc<dyn SampleStore>,
    display: Arc<dyn SampleDisplay>,
    cadence: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut timer = interval(cadence);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        select! {
            _ = shutdown.changed() => break,
            _ = timer.tick() => {}
        }

        drain(&queue, &*store, &*display).await;
    }

    let leftover = queue.len();

    if leftover > 0 {
        tracing::debug!("Discarding {leftover} undrained samples on shutdown");
    }
}

/// Forwards every queued sample, oldest first, to both collaborators. A
/// persistence failure is logged and skipped; it stops neither the rest of
/// the batch nor the display of the failed sample.
async fn drain(queue: &SampleQueue, store: &dyn SampleStore, display: &dyn SampleDisplay) {
    for sample in queue.drain() {
        if let Err(err) = store.append(&sample).await {
            tracing::warn!("Failed to persist sample: {err}");
        }

        display.render(&sample).await;
    }
}
