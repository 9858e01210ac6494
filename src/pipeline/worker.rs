//! Background processing worker.
//!
//! A tokio task drains an unbounded queue of claimed jobs and runs each on
//! the blocking pool with its own SQLite connection. Requests return as
//! soon as the claim is committed; callers poll the OCR result.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use crate::db::open_database;
use crate::models::OcrOwner;

use super::processor::{record_failure, DocumentProcessor, ProcessingJob};
use super::ProcessingError;

/// Recorded on a claim that could not be handed to the worker.
pub const QUEUE_CLOSED_MESSAGE: &str = "Processing queue is closed";

/// Front door for processing requests. Cheap to clone.
#[derive(Clone)]
pub struct ProcessingQueue {
    processor: Arc<DocumentProcessor>,
    sender: mpsc::UnboundedSender<ProcessingJob>,
}

impl ProcessingQueue {
    /// Claim the owner synchronously and enqueue the run. Returns the OCR
    /// result id to poll.
    pub fn request(&self, conn: &Connection, owner: OcrOwner) -> Result<Uuid, ProcessingError> {
        let job = self.processor.trigger(conn, owner)?;
        if self.sender.send(job).is_err() {
            // Nobody will run it; do not leave the claim dangling.
            record_failure(conn, &job, QUEUE_CLOSED_MESSAGE)?;
            return Err(ProcessingError::Queue);
        }
        tracing::debug!(
            owner = %owner,
            ocr_result_id = %job.ocr_result_id,
            "Processing job queued"
        );
        Ok(job.ocr_result_id)
    }

    pub fn request_document(
        &self,
        conn: &Connection,
        document_id: Uuid,
    ) -> Result<Uuid, ProcessingError> {
        self.request(conn, OcrOwner::Document(document_id))
    }

    pub fn request_referral_scan(
        &self,
        conn: &Connection,
        scan_id: Uuid,
    ) -> Result<Uuid, ProcessingError> {
        self.request(conn, OcrOwner::ReferralScan(scan_id))
    }
}

/// Handle on the running worker task.
pub struct WorkerHandle {
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Wait for the worker to drain. It stops once every `ProcessingQueue`
    /// clone has been dropped and in-flight jobs have finished.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Processing worker panicked");
        }
    }
}

/// Spawn the worker on the current tokio runtime.
pub fn start_processing_worker(
    db_path: PathBuf,
    processor: Arc<DocumentProcessor>,
    workers: usize,
) -> (ProcessingQueue, WorkerHandle) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let queue = ProcessingQueue {
        processor: processor.clone(),
        sender,
    };
    let handle = tokio::spawn(worker_loop(db_path, processor, workers.max(1), receiver));
    (queue, WorkerHandle { handle })
}

async fn worker_loop(
    db_path: PathBuf,
    processor: Arc<DocumentProcessor>,
    workers: usize,
    mut receiver: mpsc::UnboundedReceiver<ProcessingJob>,
) {
    tracing::info!(workers, db = %db_path.display(), "Processing worker started");
    let db_path = Arc::new(db_path);
    let mut running = JoinSet::new();

    while let Some(job) = receiver.recv().await {
        while running.len() >= workers {
            running.join_next().await;
        }
        let db_path = db_path.clone();
        let processor = processor.clone();
        running.spawn_blocking(move || run_job(&db_path, &processor, &job));
    }

    while running.join_next().await.is_some() {}
    tracing::info!("Processing worker stopped");
}

fn run_job(db_path: &Path, processor: &DocumentProcessor, job: &ProcessingJob) {
    let outcome = open_database(db_path)
        .map_err(ProcessingError::from)
        .and_then(|conn| processor.run(&conn, job));

    if let Err(e) = outcome {
        tracing::error!(
            owner = %job.owner,
            ocr_result_id = %job.ocr_result_id,
            error = %e,
            "Processing job could not record its outcome"
        );
    }
}
