//! OCR boundary. Recognition itself is a black box; this crate only needs
//! text, a confidence and a document-type guess.

use std::path::Path;

use thiserror::Error;

use crate::models::enums::DocumentType;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported format for OCR: {0}")]
    UnsupportedFormat(String),

    #[error("OCR engine failed: {0}")]
    Engine(String),
}

/// What the OCR engine hands back for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f32,
    pub document_type: DocumentType,
}

pub trait OcrEngine: Send + Sync {
    fn process(&self, path: &Path, mime_type: &str) -> Result<OcrOutput, OcrError>;
}

/// Reads already-digital text files and guesses the document type from
/// keywords. Lets the crate run end to end without a recognition engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextOcr;

impl OcrEngine for PlainTextOcr {
    fn process(&self, path: &Path, mime_type: &str) -> Result<OcrOutput, OcrError> {
        if !mime_type.starts_with("text/") {
            return Err(OcrError::UnsupportedFormat(mime_type.to_string()));
        }
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let document_type = classify_document(&text);

        tracing::debug!(
            path = %path.display(),
            chars = text.len(),
            document_type = %document_type,
            "Plain-text OCR complete"
        );

        Ok(OcrOutput {
            text,
            confidence: 1.0,
            document_type,
        })
    }
}

const REFERRAL_KEYWORDS: &[&str] = &[
    "referral", "referring", "refer ", "dear dr", "reason for referral", "thank you for seeing",
];
const LAB_KEYWORDS: &[&str] = &[
    "lab result", "laboratory", "reference range", "specimen", "collected", "mg/dl", "mmol/l",
];
const INTAKE_KEYWORDS: &[&str] = &[
    "intake", "registration", "emergency contact", "policy number", "first name", "last name",
];

/// Keyword vote over the lowercased text; ties and no hits give `Unknown`.
pub fn classify_document(text: &str) -> DocumentType {
    let lower = text.to_lowercase();
    let hits = |keywords: &[&str]| keywords.iter().filter(|k| lower.contains(*k)).count();

    let scores = [
        (DocumentType::Referral, hits(REFERRAL_KEYWORDS)),
        (DocumentType::LabResult, hits(LAB_KEYWORDS)),
        (DocumentType::IntakeForm, hits(INTAKE_KEYWORDS)),
    ];
    let best = scores.iter().map(|(_, n)| *n).max().unwrap_or(0);
    let mut winners = scores.iter().filter(|(_, n)| *n == best);

    match (best, winners.next(), winners.next()) {
        (0, _, _) => DocumentType::Unknown,
        (_, Some((doc_type, _)), None) => *doc_type,
        _ => DocumentType::Unknown,
    }
}

/// Mock OCR engine for tests; returns fixed output or a fixed failure.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
    pub document_type: DocumentType,
    pub failure: Option<String>,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32, document_type: DocumentType) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            document_type,
            failure: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new("", 0.0, DocumentType::Unknown)
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn process(&self, _path: &Path, _mime_type: &str) -> Result<OcrOutput, OcrError> {
        if let Some(message) = &self.failure {
            return Err(OcrError::Engine(message.clone()));
        }
        Ok(OcrOutput {
            text: self.text.clone(),
            confidence: self.confidence,
            document_type: self.document_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn classifies_referral_letter() {
        let text = "Dear Dr. Patel,\nThank you for seeing this patient. Reason for referral: pain";
        assert_eq!(classify_document(text), DocumentType::Referral);
    }

    #[test]
    fn classifies_lab_report() {
        let text = "LABORATORY REPORT\nSpecimen collected 01/02/2024\nGlucose 90 mg/dL";
        assert_eq!(classify_document(text), DocumentType::LabResult);
    }

    #[test]
    fn classifies_intake_form() {
        let text = "New Patient Intake\nFirst Name: A\nLast Name: B\nEmergency Contact: C";
        assert_eq!(classify_document(text), DocumentType::IntakeForm);
    }

    #[test]
    fn no_keywords_is_unknown() {
        assert_eq!(classify_document("hello world"), DocumentType::Unknown);
    }

    #[test]
    fn plain_text_engine_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Lab result\nGlucose 90 mg/dL").unwrap();

        let out = PlainTextOcr.process(file.path(), "text/plain").unwrap();
        assert!(out.text.contains("Glucose"));
        assert_eq!(out.confidence, 1.0);
        assert_eq!(out.document_type, DocumentType::LabResult);
    }

    #[test]
    fn plain_text_engine_rejects_images() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = PlainTextOcr.process(file.path(), "image/png").unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedFormat(_)));
    }

    #[test]
    fn mock_engine_can_fail() {
        let err = MockOcrEngine::failing("scanner jammed")
            .process(Path::new("x"), "image/png")
            .unwrap_err();
        assert_eq!(err.to_string(), "OCR engine failed: scanner jammed");
    }
}
