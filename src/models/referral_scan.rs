use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ProcessingStatus;

/// An uploaded referral letter awaiting identity reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralScan {
    pub id: Uuid,
    pub file_path: String,
    pub mime_type: String,
    pub original_filename: String,
    pub status: ProcessingStatus,
    pub error_message: Option<String>,
    pub uploaded_at: String,
    pub updated_at: String,
}
