pub mod ai;
pub mod extraction;
pub mod matching;
pub mod ocr;
pub mod processor;
pub mod worker;

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::OcrOwner;

/// Errors a processing request surfaces to its caller. Failures inside a
/// run are recorded on the OCR result instead.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Processing already in progress for {0}")]
    Conflict(OcrOwner),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Processing queue is closed")]
    Queue,
}

impl From<rusqlite::Error> for ProcessingError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.into())
    }
}
