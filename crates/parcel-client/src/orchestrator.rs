//! Upload orchestrator: drives a batch through the three-phase protocol.
//!
//! Items are processed strictly in order, one at a time. The only suspension
//! points are the three protocol calls per item; state updates and event
//! emission never await. The first failure aborts the batch and leaves every
//! later item Pending so it can be resubmitted as a fresh batch.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use parcel_core::{
    BatchError, BatchSession, BatchStatus, ClientConfig, ErrorMetadata, FinalizedRecord, ItemId,
    ItemState, LogLevel, Phase, Session, StateError, UploadError,
};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::protocol::{HttpUploadProtocol, UploadProtocol};
use crate::reporter::{ElapsedSnapshot, ElapsedTimeReporter, DEFAULT_SLOW_THRESHOLD, DEFAULT_TICK};

/// Progress event emitted while a batch runs. Items are identified by id and
/// batch position, never by display name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UploadEvent {
    BatchStarted {
        total: usize,
    },
    ItemStateChanged {
        item_id: ItemId,
        position: usize,
        filename: String,
        state: ItemState,
    },
    ItemCompleted {
        item_id: ItemId,
        record: FinalizedRecord,
    },
    ItemFailed {
        item_id: ItemId,
        error: UploadError,
    },
    BatchFinished {
        status: BatchStatus,
    },
}

/// An item that passed all three phases.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedUpload {
    pub item_id: ItemId,
    pub filename: String,
    pub display_name: String,
    pub stored_filename: String,
    pub record: FinalizedRecord,
}

/// The item that stopped the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item_id: ItemId,
    pub filename: String,
    pub phase: Phase,
    pub error: UploadError,
    /// User-facing message; always names the file.
    pub message: String,
}

/// Outcome of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub status: BatchStatus,
    /// Completed items in processing order.
    pub completed: Vec<CompletedUpload>,
    pub failure: Option<ItemFailure>,
    /// Items left Pending because an earlier item failed.
    pub not_attempted: Vec<ItemId>,
    pub elapsed_ms: u64,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        self.status == BatchStatus::Succeeded
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

/// Orchestrates batch uploads over an [`UploadProtocol`].
pub struct UploadOrchestrator {
    protocol: Arc<dyn UploadProtocol>,
    events_tx: mpsc::UnboundedSender<UploadEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<UploadEvent>>,
    elapsed_tx: Arc<watch::Sender<ElapsedSnapshot>>,
    tick: Duration,
    slow_threshold: Duration,
}

impl UploadOrchestrator {
    pub fn new(protocol: Arc<dyn UploadProtocol>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (elapsed_tx, _) = watch::channel(ElapsedSnapshot::default());
        Self {
            protocol,
            events_tx,
            events_rx: Some(events_rx),
            elapsed_tx: Arc::new(elapsed_tx),
            tick: DEFAULT_TICK,
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
        }
    }

    /// Orchestrator over the HTTP protocol, configured from `config`.
    pub fn from_config(config: &ClientConfig, session: &Session) -> Result<Self> {
        let protocol = HttpUploadProtocol::from_config(config, session)?;
        Ok(Self::new(Arc::new(protocol))
            .with_elapsed_reporting(config.elapsed_tick, config.slow_upload_threshold))
    }

    pub fn with_elapsed_reporting(mut self, tick: Duration, slow_threshold: Duration) -> Self {
        self.tick = tick;
        self.slow_threshold = slow_threshold;
        self
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Subscribes to elapsed-time snapshots of the current run.
    pub fn elapsed(&self) -> watch::Receiver<ElapsedSnapshot> {
        self.elapsed_tx.subscribe()
    }

    /// Runs `batch` to Succeeded or Aborted.
    ///
    /// Takes `&mut self`, so one orchestrator drives one batch at a time.
    ///
    /// Returns `Err` when the submission is rejected (empty batch, invalid
    /// session, batch not idle, duplicate item), in which case nothing changed.
    /// A state machine violation during the run also returns `Err`; the batch
    /// then ends Faulted with its unattempted items still Pending. Per-item
    /// failures are reported in the returned [`BatchReport`].
    #[tracing::instrument(skip_all, fields(items = batch.len()))]
    pub async fn run(
        &mut self,
        batch: &mut BatchSession,
        session: &Session,
    ) -> Result<BatchReport, BatchError> {
        session.check(Utc::now())?;
        batch.begin(Utc::now())?;

        let reporter =
            ElapsedTimeReporter::start(self.elapsed_tx.clone(), self.tick, self.slow_threshold);
        let total = batch.len();
        info!(total, "Batch upload started");
        self.emit(UploadEvent::BatchStarted { total });

        let outcome = self.drive(batch).await;
        let elapsed = reporter.stop();

        let (completed, failure) = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "Batch upload faulted");
                batch.fault(&err);
                self.emit(UploadEvent::BatchFinished {
                    status: batch.status().clone(),
                });
                return Err(err.into());
            }
        };

        let status = batch.status().clone();
        let not_attempted = batch.pending_ids();

        match &failure {
            None => info!(
                completed = completed.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Batch upload succeeded"
            ),
            Some(f) => warn!(
                completed = completed.len(),
                not_attempted = not_attempted.len(),
                failed_item = %f.item_id,
                phase = %f.phase,
                "Batch upload aborted"
            ),
        }
        self.emit(UploadEvent::BatchFinished {
            status: status.clone(),
        });

        Ok(BatchReport {
            status,
            completed,
            failure,
            not_attempted,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }

    /// Visits items in order until one fails, then moves the batch to
    /// Succeeded or Aborted.
    async fn drive(
        &self,
        batch: &mut BatchSession,
    ) -> Result<(Vec<CompletedUpload>, Option<ItemFailure>), StateError> {
        let order: Vec<ItemId> = batch.items().iter().map(|item| item.id()).collect();
        let mut completed = Vec::with_capacity(order.len());

        for (position, id) in order.into_iter().enumerate() {
            match self.process_item(batch, id, position).await? {
                Ok(upload) => {
                    self.emit(UploadEvent::ItemCompleted {
                        item_id: id,
                        record: upload.record.clone(),
                    });
                    completed.push(upload);
                }
                Err(err) => {
                    batch.abort(id, err.clone())?;
                    self.emit(UploadEvent::ItemFailed {
                        item_id: id,
                        error: err.clone(),
                    });
                    let failure = ItemFailure {
                        item_id: id,
                        filename: err.filename().to_string(),
                        phase: err.phase(),
                        message: err.to_string(),
                        error: err,
                    };
                    return Ok((completed, Some(failure)));
                }
            }
        }

        batch.succeed()?;
        Ok((completed, None))
    }

    /// Drives one item through all three phases. The outer `Result` is a state
    /// machine violation; the inner one is the item's outcome.
    #[tracing::instrument(skip(self, batch), fields(filename = tracing::field::Empty))]
    async fn process_item(
        &self,
        batch: &mut BatchSession,
        id: ItemId,
        position: usize,
    ) -> Result<Result<CompletedUpload, UploadError>, StateError> {
        let item = batch.get(id).cloned().ok_or(StateError::UnknownItem(id))?;
        tracing::Span::current().record("filename", item.filename());

        self.transition(batch, id, position, ItemState::RequestingCredentials)?;
        let instructions = match self.protocol.request_credentials(&item).await {
            Ok(instructions) => instructions,
            Err(err) => return self.fail(batch, id, position, err),
        };

        self.transition(batch, id, position, ItemState::Transferring)?;
        if let Err(err) = self.protocol.transfer(&instructions, item.payload()).await {
            return self.fail(batch, id, position, err);
        }

        self.transition(batch, id, position, ItemState::Confirming)?;
        let record = match self.protocol.confirm(&item, &instructions).await {
            Ok(record) => record,
            Err(err) => return self.fail(batch, id, position, err),
        };

        self.transition(batch, id, position, ItemState::Completed)?;
        info!(record_id = %record.record_id, "Upload completed");

        Ok(Ok(CompletedUpload {
            item_id: id,
            filename: item.filename().to_string(),
            display_name: item.display_name().to_string(),
            stored_filename: instructions.stored_filename,
            record,
        }))
    }

    fn fail(
        &self,
        batch: &mut BatchSession,
        id: ItemId,
        position: usize,
        err: UploadError,
    ) -> Result<Result<CompletedUpload, UploadError>, StateError> {
        match err.log_level() {
            LogLevel::Debug => debug!(code = err.error_code(), error = %err, "Upload failed"),
            LogLevel::Warn => warn!(code = err.error_code(), error = %err, "Upload failed"),
            LogLevel::Error => error!(code = err.error_code(), error = %err, "Upload failed"),
        }
        self.transition(batch, id, position, ItemState::Failed(err.clone()))?;
        Ok(Err(err))
    }

    fn transition(
        &self,
        batch: &mut BatchSession,
        id: ItemId,
        position: usize,
        state: ItemState,
    ) -> Result<(), StateError> {
        batch.advance(id, state.clone())?;
        let filename = batch
            .get(id)
            .map(|item| item.filename().to_string())
            .unwrap_or_default();
        self.emit(UploadEvent::ItemStateChanged {
            item_id: id,
            position,
            filename,
            state,
        });
        Ok(())
    }

    fn emit(&self, event: UploadEvent) {
        // Nobody listening is fine.
        let _ = self.events_tx.send(event);
    }
}
