//! Optional AI extractor. Absence or failure is normal: the processor falls
//! back to the rule-based engine.

pub mod ollama;

pub use ollama::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::enums::ExtractionMethod;
use crate::pipeline::extraction::{
    capitalize_name, normalize_date, normalize_gender, normalize_phone, CandidateField,
    ExtractedDocumentData, ExtractedPatientData, ExtractedReferralData, FieldKey, PatientField,
    ReferralField,
};

#[derive(Error, Debug)]
pub enum AiError {
    #[error("Cannot reach AI service at {0}")]
    Connection(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("AI service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Failed to parse AI response: {0}")]
    ResponseParsing(String),

    #[error("AI extractor unavailable: {0}")]
    Unavailable(String),
}

/// Flat field set an AI extractor returns, with one overall confidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiExtraction {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub referring_physician: Option<String>,
    pub referring_facility: Option<String>,
    pub referral_reason: Option<String>,
    pub confidence: f32,
}

impl AiExtraction {
    pub fn has_identity(&self) -> bool {
        present(&self.first_name).is_some() || present(&self.last_name).is_some()
    }

    /// Convert into the stored shape, tagged `ai`. Values go through the
    /// same normalizers as rule-based output.
    pub fn into_document_data(self, with_referral: bool) -> ExtractedDocumentData {
        let confidence = self.confidence;
        let mut patient = ExtractedPatientData::default();
        let patient_values = [
            (PatientField::FirstName, self.first_name.as_deref().map(capitalize_name)),
            (PatientField::LastName, self.last_name.as_deref().map(capitalize_name)),
            (PatientField::DateOfBirth, self.date_of_birth.as_deref().map(normalize_date)),
            (PatientField::Gender, self.gender.as_deref().map(normalize_gender)),
            (PatientField::Phone, self.phone.as_deref().map(normalize_phone)),
            (PatientField::Email, self.email.clone()),
            (PatientField::Address, self.address.clone()),
            (PatientField::City, self.city.clone()),
            (PatientField::State, self.state.clone()),
            (PatientField::ZipCode, self.zip_code.clone()),
        ];
        for (key, value) in patient_values {
            if let Some(c) = ai_candidate(key, value, confidence) {
                patient.set(key, c);
            }
        }

        let referral = with_referral.then(|| {
            let mut referral = ExtractedReferralData::default();
            let referral_values = [
                (ReferralField::ReferringPhysician, self.referring_physician),
                (ReferralField::ReferringFacility, self.referring_facility),
                (ReferralField::ReferralReason, self.referral_reason),
            ];
            for (key, value) in referral_values {
                if let Some(c) = ai_candidate(key, value, confidence) {
                    referral.set(key, c);
                }
            }
            referral
        });

        ExtractedDocumentData {
            method: ExtractionMethod::Ai,
            patient,
            referral,
            lab: None,
        }
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn ai_candidate<K: FieldKey>(
    key: K,
    value: Option<String>,
    confidence: f32,
) -> Option<CandidateField> {
    let value = present(&value)?.to_string();
    Some(CandidateField {
        field_name: key.name().to_string(),
        value,
        confidence,
        match_context: String::new(),
    })
}

pub trait AiExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Result<AiExtraction, AiError>;
}

/// Find the JSON object in a model response: fenced block first, then the
/// outermost braces.
pub fn extract_json_object(response: &str) -> Result<&str, AiError> {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let after_fence = after_fence.strip_prefix("json").unwrap_or(after_fence);
        if let Some(end) = after_fence.find("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('{') {
                return Ok(block);
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&trimmed[start..=end]),
        _ => Err(AiError::ResponseParsing(
            "No JSON object found in model response".to_string(),
        )),
    }
}

pub fn parse_extraction(response: &str) -> Result<AiExtraction, AiError> {
    let json = extract_json_object(response)?;
    serde_json::from_str(json).map_err(|e| AiError::ResponseParsing(e.to_string()))
}

/// Mock extractor for testing: returns a fixed extraction or a fixed error.
pub struct MockAiExtractor {
    extraction: Option<AiExtraction>,
    failure: Option<String>,
}

impl MockAiExtractor {
    pub fn new(extraction: AiExtraction) -> Self {
        Self {
            extraction: Some(extraction),
            failure: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            extraction: None,
            failure: Some(message.to_string()),
        }
    }
}

impl AiExtractor for MockAiExtractor {
    fn extract(&self, _text: &str) -> Result<AiExtraction, AiError> {
        match (&self.extraction, &self.failure) {
            (Some(extraction), _) => Ok(extraction.clone()),
            (None, Some(message)) => Err(AiError::Unavailable(message.clone())),
            (None, None) => Err(AiError::Unavailable("no response configured".into())),
        }
    }
}
