use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{DocumentType, OwnerKind, ProcessingStatus};
use crate::pipeline::extraction::ExtractedDocumentData;

/// The record an OCR result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OcrOwner {
    Document(Uuid),
    ReferralScan(Uuid),
}

impl OcrOwner {
    pub fn kind(&self) -> OwnerKind {
        match self {
            Self::Document(_) => OwnerKind::Document,
            Self::ReferralScan(_) => OwnerKind::ReferralScan,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Document(id) | Self::ReferralScan(id) => *id,
        }
    }

    pub fn from_parts(kind: OwnerKind, id: Uuid) -> Self {
        match kind {
            OwnerKind::Document => Self::Document(id),
            OwnerKind::ReferralScan => Self::ReferralScan(id),
        }
    }
}

impl std::fmt::Display for OcrOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind(), self.id())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    pub id: Uuid,
    pub owner: OcrOwner,
    pub raw_text: Option<String>,
    pub confidence_score: Option<f32>,
    pub document_type: Option<DocumentType>,
    pub extracted_data: Option<ExtractedDocumentData>,
    pub processing_status: ProcessingStatus,
    pub error_message: Option<String>,
    pub matched_patient_id: Option<Uuid>,
    pub match_confidence: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}
