use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::FieldStatus;

/// One extracted patient field awaiting review against the live record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub id: Uuid,
    pub ocr_result_id: Uuid,
    pub patient_id: Uuid,
    pub field_name: String,
    pub extracted_value: String,
    /// Value on the patient record when the mapping was created.
    pub original_value: Option<String>,
    pub confidence_score: f32,
    pub status: FieldStatus,
    pub applied_at: Option<String>,
    pub applied_by: Option<String>,
    pub created_at: String,
}
