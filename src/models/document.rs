use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored source document, optionally attached to a patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub patient_id: Option<Uuid>,
    /// Path relative to the configured storage root.
    pub file_path: String,
    pub mime_type: String,
    pub original_filename: String,
    pub uploaded_at: String,
}
