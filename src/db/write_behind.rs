// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Write-behind queue between the ingestion path and the repository

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

use super::{PersistOp, SensorRepository};
use crate::error::{CollaboratorError, CollaboratorResult};
use crate::ingestion::Ingested;
use crate::sensors::Reading;

const MAX_BATCH: usize = 256;

/// Producer half. Enqueueing never waits: when the queue is full the write is dropped
/// and counted.
pub struct WriteBehind {
    tx: mpsc::Sender<PersistOp>,
    dropped: AtomicU64,
}

/// Consumer half, drained by a single background task
pub struct WriteBehindWorker {
    rx: mpsc::Receiver<PersistOp>,
    repository: Arc<dyn SensorRepository>,
}

impl WriteBehind {
    pub fn new(repository: Arc<dyn SensorRepository>, capacity: usize) -> (Self, WriteBehindWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            WriteBehindWorker { rx, repository },
        )
    }

    pub fn enqueue(&self, op: PersistOp) -> CollaboratorResult<()> {
        let kind = op.kind();
        self.tx.try_send(op).map_err(|e| {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => CollaboratorError::QueueFull(kind),
                mpsc::error::TrySendError::Closed(_) => CollaboratorError::Closed("write-behind queue"),
            }
        })
    }

    /// Queue everything one ingested reading produced
    pub fn record(&self, reading: Reading, ingested: &Ingested) {
        let mut ops = vec![
            PersistOp::Reading(reading),
            PersistOp::Statistics(ingested.statistics.clone()),
        ];
        if let Some(alert) = &ingested.alert {
            ops.push(PersistOp::Alert(alert.clone()));
        }

        for op in ops {
            if let Err(e) = self.enqueue(op) {
                debug!("Persistence skipped: {}", e);
            }
        }
    }

    /// Writes dropped because the queue was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

impl WriteBehindWorker {
    /// Drain the queue into the repository until `shutdown` fires, then flush what is
    /// left. Returns the number of writes applied.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> usize {
        let mut written = 0;
        info!("Write-behind worker started");

        loop {
            tokio::select! {
                op = self.rx.recv() => match op {
                    Some(op) => {
                        let mut batch = vec![op];
                        while batch.len() < MAX_BATCH {
                            match self.rx.try_recv() {
                                Ok(op) => batch.push(op),
                                Err(_) => break,
                            }
                        }
                        written += self.flush(batch).await;
                    }
                    None => break,
                },
                _ = shutdown.recv() => {
                    self.rx.close();
                    let mut rest = Vec::new();
                    while let Ok(op) = self.rx.try_recv() {
                        rest.push(op);
                    }
                    if !rest.is_empty() {
                        written += self.flush(rest).await;
                    }
                    break;
                }
            }
        }

        info!("Write-behind worker stopped after {} writes", written);
        written
    }

    async fn flush(&self, batch: Vec<PersistOp>) -> usize {
        let repository = self.repository.clone();
        let len = batch.len();

        match tokio::task::spawn_blocking(move || repository.save_batch(&batch)).await {
            Ok(Ok(applied)) => applied,
            Ok(Err(e)) => {
                error!("Failed to persist {} writes: {}", len, e);
                0
            }
            Err(e) => {
                error!("Persistence task failed: {}", e);
                0
            }
        }
    }
}
