//! Document Processing Orchestrator.
//!
//! `trigger` performs the durable check-and-set and hands back a job;
//! `run` executes the job: OCR, AI-or-rule extraction, then persistence of
//! the result, field mappings or patient match. Engines are injected as
//! trait objects so the whole flow runs against mocks in tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::config::IntakeConfig;
use crate::db::{
    self, claim_for_processing, complete_ocr_result, delete_pending_mappings, fail_ocr_result,
    get_document, get_patient, get_referral_scan, insert_field_mapping, now_timestamp,
    update_referral_scan_status, CompletedRun, DatabaseError, ProcessingClaim, RunClaim,
};
use crate::models::enums::{DocumentType, FieldStatus, ProcessingStatus};
use crate::models::{FieldMapping, OcrOwner};
use crate::pipeline::ai::ollama::OllamaExtractor;
use crate::pipeline::ai::{AiError, AiExtractor};
use crate::pipeline::extraction::{
    sanitize_ocr_text, ExtractedDocumentData, FieldExtractor, PatientField,
};
use crate::pipeline::matching::{find_matching_patient, MatchWeights};
use crate::pipeline::ocr::{OcrEngine, OcrError, PlainTextOcr};

use super::ProcessingError;

/// Message recorded when a document's backing file is gone.
pub const SOURCE_MISSING_MESSAGE: &str = "Source file not found on disk";

/// A claimed processing run, ready for the background worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingJob {
    pub ocr_result_id: Uuid,
    /// Token of the claim; only this run may finish the result.
    pub run_id: Uuid,
    pub owner: OcrOwner,
}

impl ProcessingJob {
    pub fn claim(&self) -> RunClaim {
        RunClaim {
            ocr_result_id: self.ocr_result_id,
            run_id: self.run_id,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
    /// A newer claim took the result over; nothing was recorded.
    Superseded,
}

/// Why a run failed; the display text is what gets recorded.
#[derive(Error, Debug)]
pub enum RunFailure {
    #[error("Source file not found on disk")]
    SourceMissing,

    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for RunFailure {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.into())
    }
}

struct SourceFile {
    path: PathBuf,
    mime_type: String,
    patient_id: Option<Uuid>,
}

pub struct DocumentProcessor {
    ocr: Box<dyn OcrEngine>,
    ai: Option<Box<dyn AiExtractor>>,
    ai_min_confidence: f32,
    extractor: FieldExtractor,
    weights: MatchWeights,
    storage_root: PathBuf,
    stale_after: Option<Duration>,
}

impl DocumentProcessor {
    pub fn new(ocr: Box<dyn OcrEngine>, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            ocr,
            ai: None,
            ai_min_confidence: 0.0,
            extractor: FieldExtractor::default(),
            weights: MatchWeights::default(),
            storage_root: storage_root.into(),
            stale_after: None,
        }
    }

    /// Plain-text OCR, plus the Ollama extractor when an endpoint is set.
    pub fn from_config(config: &IntakeConfig) -> Result<Self, AiError> {
        let mut processor = Self::new(Box::new(PlainTextOcr), config.storage_root.clone())
            .with_stale_after(config.stale_after);
        if let Some(endpoint) = &config.ai_endpoint {
            let ai = OllamaExtractor::new(endpoint, &config.ai_model, config.ai_timeout_secs)?;
            tracing::info!(endpoint = %endpoint, model = ai.model(), "AI extraction enabled");
            processor = processor.with_ai(Box::new(ai), config.ai_min_confidence);
        }
        Ok(processor)
    }

    pub fn with_ai(mut self, ai: Box<dyn AiExtractor>, min_confidence: f32) -> Self {
        self.ai = Some(ai);
        self.ai_min_confidence = min_confidence;
        self
    }

    pub fn with_extractor(mut self, extractor: FieldExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_weights(mut self, weights: MatchWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Option<Duration>) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn trigger_document(
        &self,
        conn: &Connection,
        document_id: Uuid,
    ) -> Result<ProcessingJob, ProcessingError> {
        self.trigger(conn, OcrOwner::Document(document_id))
    }

    pub fn trigger_referral_scan(
        &self,
        conn: &Connection,
        scan_id: Uuid,
    ) -> Result<ProcessingJob, ProcessingError> {
        self.trigger(conn, OcrOwner::ReferralScan(scan_id))
    }

    /// Claim the owner's OCR result for a new run.
    ///
    /// NotFound when the owner does not exist; Conflict when a run already
    /// holds it. For referral scans the scan row moves to `processing` in the
    /// same transaction.
    pub fn trigger(
        &self,
        conn: &Connection,
        owner: OcrOwner,
    ) -> Result<ProcessingJob, ProcessingError> {
        let exists = match owner {
            OcrOwner::Document(id) => get_document(conn, &id)?.is_some(),
            OcrOwner::ReferralScan(id) => get_referral_scan(conn, &id)?.is_some(),
        };
        if !exists {
            return Err(ProcessingError::NotFound {
                entity: match owner {
                    OcrOwner::Document(_) => "Document",
                    OcrOwner::ReferralScan(_) => "ReferralScan",
                },
                id: owner.id(),
            });
        }

        let stale_before = self.stale_cutoff();
        let tx = conn.unchecked_transaction()?;
        let claim = match claim_for_processing(&tx, owner, stale_before.as_deref())? {
            ProcessingClaim::Claimed(claim) => claim,
            ProcessingClaim::AlreadyProcessing => {
                tracing::info!(owner = %owner, "Processing request refused: already in progress");
                return Err(ProcessingError::Conflict(owner));
            }
        };
        if let OcrOwner::ReferralScan(scan_id) = owner {
            update_referral_scan_status(&tx, &scan_id, ProcessingStatus::Processing, None)?;
        }
        tx.commit()?;

        tracing::info!(
            owner = %owner,
            ocr_result_id = %claim.ocr_result_id,
            run_id = %claim.run_id,
            "Processing claimed"
        );
        Ok(ProcessingJob {
            ocr_result_id: claim.ocr_result_id,
            run_id: claim.run_id,
            owner,
        })
    }

    fn stale_cutoff(&self) -> Option<String> {
        let age = chrono::Duration::from_std(self.stale_after?).ok()?;
        Some((chrono::Utc::now() - age).format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
    }

    /// Execute a claimed job to a terminal state.
    ///
    /// Run failures are recorded on the result (and the scan) and reported
    /// as `Failed`; only a failure to record them is returned as an error.
    /// A run whose claim was reclaimed in the meantime records nothing.
    pub fn run(
        &self,
        conn: &Connection,
        job: &ProcessingJob,
    ) -> Result<RunOutcome, ProcessingError> {
        let outcome = match self.execute(conn, job) {
            Ok(outcome) => outcome,
            Err(failure) => {
                let message = failure.to_string();
                tracing::warn!(
                    owner = %job.owner,
                    ocr_result_id = %job.ocr_result_id,
                    error = %message,
                    "Processing failed"
                );
                record_failure(conn, job, &message)?
            }
        };

        match outcome {
            RunOutcome::Completed => tracing::info!(
                owner = %job.owner,
                ocr_result_id = %job.ocr_result_id,
                "Processing completed"
            ),
            RunOutcome::Superseded => tracing::warn!(
                owner = %job.owner,
                ocr_result_id = %job.ocr_result_id,
                run_id = %job.run_id,
                "Processing run superseded by a newer claim; outcome discarded"
            ),
            RunOutcome::Failed => {}
        }
        Ok(outcome)
    }

    fn execute(&self, conn: &Connection, job: &ProcessingJob) -> Result<RunOutcome, RunFailure> {
        let source = self.resolve_source(conn, job.owner)?;
        if !source.path.is_file() {
            return Err(RunFailure::SourceMissing);
        }

        let ocr = self.ocr.process(&source.path, &source.mime_type)?;
        tracing::debug!(
            ocr_result_id = %job.ocr_result_id,
            confidence = ocr.confidence,
            document_type = %ocr.document_type,
            "OCR complete"
        );

        let text = sanitize_ocr_text(&ocr.text);
        let data = self.extract(&text, ocr.document_type);
        let claim = job.claim();

        match job.owner {
            OcrOwner::Document(_) => {
                let tx = conn.unchecked_transaction()?;
                let run = CompletedRun {
                    raw_text: &ocr.text,
                    confidence: ocr.confidence,
                    document_type: ocr.document_type,
                    extracted_data: &data,
                    matched_patient_id: None,
                    match_confidence: None,
                };
                if !complete_ocr_result(&tx, &claim, &run)? {
                    return Ok(RunOutcome::Superseded);
                }
                if let Some(patient_id) = source.patient_id {
                    replace_pending_mappings(&tx, job.ocr_result_id, patient_id, &data)?;
                }
                tx.commit()?;
            }
            OcrOwner::ReferralScan(scan_id) => {
                let matched = find_matching_patient(
                    conn,
                    data.patient.value(PatientField::FirstName),
                    data.patient.value(PatientField::LastName),
                    data.patient.value(PatientField::DateOfBirth),
                    &self.weights,
                )?;

                let tx = conn.unchecked_transaction()?;
                let run = CompletedRun {
                    raw_text: &ocr.text,
                    confidence: ocr.confidence,
                    document_type: ocr.document_type,
                    extracted_data: &data,
                    matched_patient_id: matched.as_ref().map(|m| m.id),
                    match_confidence: matched.as_ref().map(|m| m.match_score),
                };
                if !complete_ocr_result(&tx, &claim, &run)? {
                    return Ok(RunOutcome::Superseded);
                }
                update_referral_scan_status(&tx, &scan_id, ProcessingStatus::Completed, None)?;
                tx.commit()?;
            }
        }
        Ok(RunOutcome::Completed)
    }

    fn resolve_source(&self, conn: &Connection, owner: OcrOwner) -> Result<SourceFile, RunFailure> {
        let not_found = |entity: &str| DatabaseError::NotFound {
            entity_type: entity.into(),
            id: owner.id().to_string(),
        };
        let (file_path, mime_type, patient_id) = match owner {
            OcrOwner::Document(id) => {
                let doc = get_document(conn, &id)?.ok_or_else(|| not_found("Document"))?;
                (doc.file_path, doc.mime_type, doc.patient_id)
            }
            OcrOwner::ReferralScan(id) => {
                let scan = get_referral_scan(conn, &id)?.ok_or_else(|| not_found("ReferralScan"))?;
                (scan.file_path, scan.mime_type, None)
            }
        };
        Ok(SourceFile {
            path: self.storage_root.join(file_path),
            mime_type,
            patient_id,
        })
    }

    /// AI first when configured; it wins only with enough confidence and an
    /// identity. Anything else falls back to the rule-based engine.
    pub fn extract(&self, text: &str, document_type: DocumentType) -> ExtractedDocumentData {
        if let Some(ai) = &self.ai {
            match ai.extract(text) {
                Ok(extraction)
                    if extraction.confidence > self.ai_min_confidence
                        && extraction.has_identity() =>
                {
                    tracing::debug!(confidence = extraction.confidence, "Using AI extraction");
                    return extraction.into_document_data(document_type == DocumentType::Referral);
                }
                Ok(extraction) => {
                    tracing::debug!(
                        confidence = extraction.confidence,
                        "AI extraction below threshold or without identity, using rules"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "AI extraction failed, using rules");
                }
            }
        }
        self.extractor.extract_all_data(text, document_type)
    }
}

/// Mark the job's result (and scan) failed, unless the claim was taken over.
pub(crate) fn record_failure(
    conn: &Connection,
    job: &ProcessingJob,
    message: &str,
) -> Result<RunOutcome, ProcessingError> {
    let tx = conn.unchecked_transaction()?;
    if !fail_ocr_result(&tx, &job.claim(), message)? {
        return Ok(RunOutcome::Superseded);
    }
    if let OcrOwner::ReferralScan(scan_id) = job.owner {
        update_referral_scan_status(&tx, &scan_id, ProcessingStatus::Failed, Some(message))?;
    }
    tx.commit()?;
    Ok(RunOutcome::Failed)
}

/// Swap the result's pending mappings for one per extracted patient field,
/// each carrying the patient's current value.
fn replace_pending_mappings(
    conn: &Connection,
    ocr_result_id: Uuid,
    patient_id: Uuid,
    data: &ExtractedDocumentData,
) -> Result<usize, DatabaseError> {
    let removed = delete_pending_mappings(conn, &ocr_result_id)?;
    let patient = get_patient(conn, &patient_id)?;
    let now = now_timestamp();

    let mut created = 0;
    for (_, candidate) in data.patient.entries() {
        if candidate.value.trim().is_empty() {
            continue;
        }
        let mapping = FieldMapping {
            id: Uuid::new_v4(),
            ocr_result_id,
            patient_id,
            field_name: candidate.field_name.clone(),
            extracted_value: candidate.value.clone(),
            original_value: patient.as_ref().and_then(|p| p.field_value(&candidate.field_name)),
            confidence_score: candidate.confidence,
            status: FieldStatus::Pending,
            applied_at: None,
            applied_by: None,
            created_at: now.clone(),
        };
        insert_field_mapping(conn, &mapping)?;
        created += 1;
    }

    tracing::debug!(
        ocr_result_id = %ocr_result_id,
        patient_id = %patient_id,
        removed,
        created,
        "Pending field mappings replaced"
    );
    Ok(created)
}

/// Open the database, then trigger and run one owner synchronously.
pub fn process_now(
    db_path: &Path,
    processor: &DocumentProcessor,
    owner: OcrOwner,
) -> Result<RunOutcome, ProcessingError> {
    let conn = db::open_database(db_path)?;
    let job = processor.trigger(&conn, owner)?;
    processor.run(&conn, &job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        get_ocr_result, insert_document, insert_patient, insert_referral_scan, list_field_mappings,
        open_database, open_memory_database,
    };
    use crate::models::{Document, Patient, ReferralScan};
    use crate::pipeline::ai::{AiExtraction, MockAiExtractor};
    use crate::pipeline::ocr::MockOcrEngine;
    use crate::models::enums::ExtractionMethod;

    const LETTER: &str = "\
Dear Dr. Patel,
I am referring John Smith for assessment.
DOB: 01/15/1970
Phone: 555.123.4567
Reason for referral: Chest pain";

    fn processor(storage: &Path, text: &str, doc_type: DocumentType) -> DocumentProcessor {
        DocumentProcessor::new(Box::new(MockOcrEngine::new(text, 0.92, doc_type)), storage)
    }

    fn patient(first: &str, last: &str, dob: &str) -> Patient {
        let now = now_timestamp();
        Patient {
            id: Uuid::new_v4(),
            mrn: format!("MRN-{}", Uuid::new_v4()),
            first_name: first.into(),
            last_name: last.into(),
            date_of_birth: Some(dob.into()),
            gender: None,
            phone: Some("(555) 000-0000".into()),
            email: None,
            address: None,
            city: None,
            state: None,
            zip_code: None,
            emergency_contact_name: None,
            emergency_contact_phone: None,
            insurance_provider: None,
            insurance_policy_number: None,
            notes: None,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    fn add_document(
        conn: &Connection,
        storage: &Path,
        patient_id: Option<Uuid>,
        write_file: bool,
    ) -> Uuid {
        let doc = Document {
            id: Uuid::new_v4(),
            patient_id,
            file_path: format!("{}.txt", Uuid::new_v4()),
            mime_type: "text/plain".into(),
            original_filename: "scan.txt".into(),
            uploaded_at: now_timestamp(),
        };
        if write_file {
            std::fs::write(storage.join(&doc.file_path), "scanned bytes").unwrap();
        }
        insert_document(conn, &doc).unwrap();
        doc.id
    }

    fn add_scan(conn: &Connection, storage: &Path) -> Uuid {
        let now = now_timestamp();
        let scan = ReferralScan {
            id: Uuid::new_v4(),
            file_path: "referral.txt".into(),
            mime_type: "text/plain".into(),
            original_filename: "referral.txt".into(),
            status: ProcessingStatus::Pending,
            error_message: None,
            uploaded_at: now.clone(),
            updated_at: now,
        };
        std::fs::write(storage.join(&scan.file_path), LETTER).unwrap();
        insert_referral_scan(conn, &scan).unwrap();
        scan.id
    }

    #[test]
    fn trigger_on_missing_document_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let p = processor(dir.path(), LETTER, DocumentType::Referral);

        let err = p.trigger_document(&conn, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ProcessingError::NotFound { entity: "Document", .. }));
    }

    #[test]
    fn second_trigger_conflicts_until_run_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let p = processor(dir.path(), LETTER, DocumentType::Referral);
        let doc_id = add_document(&conn, dir.path(), None, true);

        let job = p.trigger_document(&conn, doc_id).unwrap();
        assert!(matches!(
            p.trigger_document(&conn, doc_id),
            Err(ProcessingError::Conflict(OcrOwner::Document(id))) if id == doc_id
        ));

        assert_eq!(p.run(&conn, &job).unwrap(), RunOutcome::Completed);
        let again = p.trigger_document(&conn, doc_id).unwrap();
        assert_eq!(again.ocr_result_id, job.ocr_result_id);
    }

    #[test]
    fn exclusion_holds_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("scanline.db");
        let first = open_database(&db_path).unwrap();
        let second = open_database(&db_path).unwrap();
        let p = processor(dir.path(), LETTER, DocumentType::Referral);
        let doc_id = add_document(&first, dir.path(), None, true);

        p.trigger_document(&first, doc_id).unwrap();
        assert!(matches!(
            p.trigger_document(&second, doc_id),
            Err(ProcessingError::Conflict(_))
        ));
    }

    #[test]
    fn missing_source_file_fails_with_fixed_message() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let p = processor(dir.path(), LETTER, DocumentType::Referral);
        let doc_id = add_document(&conn, dir.path(), None, false);

        let job = p.trigger_document(&conn, doc_id).unwrap();
        assert_eq!(p.run(&conn, &job).unwrap(), RunOutcome::Failed);

        let result = get_ocr_result(&conn, &job.ocr_result_id).unwrap().unwrap();
        assert_eq!(result.processing_status, ProcessingStatus::Failed);
        assert_eq!(result.error_message.as_deref(), Some(SOURCE_MISSING_MESSAGE));
    }

    #[test]
    fn document_run_creates_mappings_with_original_values() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let owner = patient("John", "Smith", "1970-01-15");
        insert_patient(&conn, &owner).unwrap();
        let doc_id = add_document(&conn, dir.path(), Some(owner.id), true);
        let p = processor(dir.path(), LETTER, DocumentType::Referral);

        let job = p.trigger_document(&conn, doc_id).unwrap();
        assert_eq!(p.run(&conn, &job).unwrap(), RunOutcome::Completed);

        let result = get_ocr_result(&conn, &job.ocr_result_id).unwrap().unwrap();
        assert_eq!(result.processing_status, ProcessingStatus::Completed);
        assert_eq!(result.confidence_score, Some(0.92));
        assert_eq!(result.raw_text.as_deref(), Some(LETTER));
        let data = result.extracted_data.unwrap();
        assert_eq!(data.method, ExtractionMethod::Regex);
        assert!(data.referral.is_some());

        let mappings = list_field_mappings(&conn, &job.ocr_result_id).unwrap();
        let phone = mappings.iter().find(|m| m.field_name == "phone").unwrap();
        assert_eq!(phone.extracted_value, "(555) 123-4567");
        assert_eq!(phone.original_value.as_deref(), Some("(555) 000-0000"));
        assert_eq!(phone.status, FieldStatus::Pending);
        assert!(mappings.iter().all(|m| m.patient_id == owner.id));
    }

    #[test]
    fn reprocessing_replaces_pending_mappings() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let owner = patient("John", "Smith", "1970-01-15");
        insert_patient(&conn, &owner).unwrap();
        let doc_id = add_document(&conn, dir.path(), Some(owner.id), true);
        let p = processor(dir.path(), LETTER, DocumentType::Referral);

        let job = p.trigger_document(&conn, doc_id).unwrap();
        p.run(&conn, &job).unwrap();
        let first_count = list_field_mappings(&conn, &job.ocr_result_id).unwrap().len();

        let job = p.trigger_document(&conn, doc_id).unwrap();
        p.run(&conn, &job).unwrap();
        assert_eq!(list_field_mappings(&conn, &job.ocr_result_id).unwrap().len(), first_count);
    }

    #[test]
    fn unattached_document_gets_no_mappings() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let doc_id = add_document(&conn, dir.path(), None, true);
        let p = processor(dir.path(), LETTER, DocumentType::Referral);

        let job = p.trigger_document(&conn, doc_id).unwrap();
        p.run(&conn, &job).unwrap();
        assert!(list_field_mappings(&conn, &job.ocr_result_id).unwrap().is_empty());
    }

    #[test]
    fn referral_scan_run_matches_patient_and_completes_scan() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let john = patient("John", "Smith", "1970-01-15");
        insert_patient(&conn, &john).unwrap();
        let scan_id = add_scan(&conn, dir.path());
        let p = processor(dir.path(), LETTER, DocumentType::Referral);

        let job = p.trigger_referral_scan(&conn, scan_id).unwrap();
        assert_eq!(
            get_referral_scan(&conn, &scan_id).unwrap().unwrap().status,
            ProcessingStatus::Processing
        );
        assert_eq!(p.run(&conn, &job).unwrap(), RunOutcome::Completed);

        let result = get_ocr_result(&conn, &job.ocr_result_id).unwrap().unwrap();
        assert_eq!(result.matched_patient_id, Some(john.id));
        assert_eq!(result.match_confidence, Some(1.2));
        assert_eq!(
            get_referral_scan(&conn, &scan_id).unwrap().unwrap().status,
            ProcessingStatus::Completed
        );
    }

    #[test]
    fn ocr_failure_fails_result_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let scan_id = add_scan(&conn, dir.path());
        let p = DocumentProcessor::new(Box::new(MockOcrEngine::failing("blank page")), dir.path());

        let job = p.trigger_referral_scan(&conn, scan_id).unwrap();
        assert_eq!(p.run(&conn, &job).unwrap(), RunOutcome::Failed);

        let result = get_ocr_result(&conn, &job.ocr_result_id).unwrap().unwrap();
        assert_eq!(
            result.error_message.as_deref(),
            Some("OCR failed: OCR engine failed: blank page")
        );
        let scan = get_referral_scan(&conn, &scan_id).unwrap().unwrap();
        assert_eq!(scan.status, ProcessingStatus::Failed);
        assert!(scan.error_message.is_some());
    }

    #[test]
    fn confident_ai_result_supersedes_rules() {
        let dir = tempfile::tempdir().unwrap();
        let ai = MockAiExtractor::new(AiExtraction {
            first_name: Some("Johnny".into()),
            last_name: Some("Smith".into()),
            confidence: 0.8,
            ..Default::default()
        });
        let p = processor(dir.path(), LETTER, DocumentType::Referral).with_ai(Box::new(ai), 0.5);

        let data = p.extract(LETTER, DocumentType::Referral);
        assert_eq!(data.method, ExtractionMethod::Ai);
        assert_eq!(data.patient.value(PatientField::FirstName), Some("Johnny"));
    }

    #[test]
    fn weak_or_failing_ai_falls_back_to_rules() {
        let dir = tempfile::tempdir().unwrap();

        let weak = MockAiExtractor::new(AiExtraction {
            first_name: Some("Johnny".into()),
            confidence: 0.4,
            ..Default::default()
        });
        let p = processor(dir.path(), LETTER, DocumentType::Referral).with_ai(Box::new(weak), 0.5);
        assert_eq!(p.extract(LETTER, DocumentType::Referral).method, ExtractionMethod::Regex);

        let nameless = MockAiExtractor::new(AiExtraction {
            phone: Some("555-123-4567".into()),
            confidence: 0.99,
            ..Default::default()
        });
        let p = processor(dir.path(), LETTER, DocumentType::Referral)
            .with_ai(Box::new(nameless), 0.0);
        assert_eq!(p.extract(LETTER, DocumentType::Referral).method, ExtractionMethod::Regex);

        let failing = MockAiExtractor::failing("connection refused");
        let p = processor(dir.path(), LETTER, DocumentType::Referral)
            .with_ai(Box::new(failing), 0.0);
        let data = p.extract(LETTER, DocumentType::Referral);
        assert_eq!(data.method, ExtractionMethod::Regex);
        assert_eq!(data.patient.value(PatientField::FirstName), Some("John"));
    }

    #[test]
    fn stale_processing_row_is_reclaimed_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let doc_id = add_document(&conn, dir.path(), None, true);
        let strict = processor(dir.path(), LETTER, DocumentType::Referral);
        strict.trigger_document(&conn, doc_id).unwrap();

        // Push the claim into the past so any threshold treats it as stale.
        conn.execute("UPDATE ocr_results SET updated_at = '2000-01-01T00:00:00.000Z'", [])
            .unwrap();
        assert!(matches!(
            strict.trigger_document(&conn, doc_id),
            Err(ProcessingError::Conflict(_))
        ));

        let lenient = processor(dir.path(), LETTER, DocumentType::Referral)
            .with_stale_after(Some(Duration::from_secs(60)));
        assert!(lenient.trigger_document(&conn, doc_id).is_ok());
    }

    fn backdate_claim(conn: &Connection, ocr_result_id: Uuid) {
        conn.execute(
            "UPDATE ocr_results SET updated_at = '2000-01-01T00:00:00.000Z' WHERE id = ?1",
            rusqlite::params![ocr_result_id.to_string()],
        )
        .unwrap();
    }

    #[test]
    fn reclaimed_run_finishing_late_leaves_the_new_claim_alone() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let owner = patient("John", "Smith", "1970-01-15");
        insert_patient(&conn, &owner).unwrap();
        let doc_id = add_document(&conn, dir.path(), Some(owner.id), true);
        let p = processor(dir.path(), LETTER, DocumentType::Referral)
            .with_stale_after(Some(Duration::from_secs(60)));

        let stuck = p.trigger_document(&conn, doc_id).unwrap();
        backdate_claim(&conn, stuck.ocr_result_id);
        let current = p.trigger_document(&conn, doc_id).unwrap();
        assert_eq!(current.ocr_result_id, stuck.ocr_result_id);
        assert_ne!(current.run_id, stuck.run_id);

        assert_eq!(p.run(&conn, &stuck).unwrap(), RunOutcome::Superseded);
        let result = get_ocr_result(&conn, &stuck.ocr_result_id).unwrap().unwrap();
        assert_eq!(result.processing_status, ProcessingStatus::Processing);
        assert!(result.extracted_data.is_none());
        assert!(list_field_mappings(&conn, &stuck.ocr_result_id).unwrap().is_empty());
        assert!(matches!(
            p.trigger_document(&conn, doc_id),
            Err(ProcessingError::Conflict(_))
        ));

        assert_eq!(p.run(&conn, &current).unwrap(), RunOutcome::Completed);
        assert!(!list_field_mappings(&conn, &current.ocr_result_id).unwrap().is_empty());
    }

    #[test]
    fn reclaimed_scan_run_failing_late_does_not_fail_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let scan_id = add_scan(&conn, dir.path());
        let stale_after = Some(Duration::from_secs(60));
        let broken =
            DocumentProcessor::new(Box::new(MockOcrEngine::failing("blank page")), dir.path())
                .with_stale_after(stale_after);
        let healthy =
            processor(dir.path(), LETTER, DocumentType::Referral).with_stale_after(stale_after);

        let stuck = broken.trigger_referral_scan(&conn, scan_id).unwrap();
        backdate_claim(&conn, stuck.ocr_result_id);
        let current = healthy.trigger_referral_scan(&conn, scan_id).unwrap();

        assert_eq!(broken.run(&conn, &stuck).unwrap(), RunOutcome::Superseded);
        let scan = get_referral_scan(&conn, &scan_id).unwrap().unwrap();
        assert_eq!(scan.status, ProcessingStatus::Processing);
        assert!(scan.error_message.is_none());

        assert_eq!(healthy.run(&conn, &current).unwrap(), RunOutcome::Completed);
        assert_eq!(
            get_referral_scan(&conn, &scan_id).unwrap().unwrap().status,
            ProcessingStatus::Completed
        );
    }

    #[test]
    fn from_config_runs_plain_text_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let config = IntakeConfig {
            storage_root: dir.path().to_path_buf(),
            ..IntakeConfig::default()
        };
        let processor = DocumentProcessor::from_config(&config).unwrap();
        assert_eq!(processor.storage_root(), dir.path());

        let doc_id = add_document(&conn, dir.path(), None, false);
        let doc = get_document(&conn, &doc_id).unwrap().unwrap();
        std::fs::write(dir.path().join(&doc.file_path), LETTER).unwrap();

        let job = processor.trigger_document(&conn, doc_id).unwrap();
        assert_eq!(processor.run(&conn, &job).unwrap(), RunOutcome::Completed);
    }

    #[test]
    fn process_now_runs_against_a_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("scanline.db");
        let conn = open_database(&db_path).unwrap();
        let doc_id = add_document(&conn, dir.path(), None, true);

        let p = processor(dir.path(), LETTER, DocumentType::Referral);
        let outcome = process_now(&db_path, &p, OcrOwner::Document(doc_id)).unwrap();
        assert_eq!(outcome, RunOutcome::Completed);

        let result = crate::db::get_ocr_result_by_owner(&conn, OcrOwner::Document(doc_id))
            .unwrap()
            .unwrap();
        assert_eq!(result.processing_status, ProcessingStatus::Completed);
    }
}
