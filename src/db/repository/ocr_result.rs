use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{parse_optional_uuid, parse_uuid};
use crate::db::{now_timestamp, DatabaseError};
use crate::models::enums::{DocumentType, OwnerKind, ProcessingStatus};
use crate::models::{OcrOwner, OcrResult};
use crate::pipeline::extraction::ExtractedDocumentData;

/// A successful claim: the result row plus the token of this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunClaim {
    pub ocr_result_id: Uuid,
    pub run_id: Uuid,
}

/// Outcome of the atomic check-and-set on an owner's OCR result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingClaim {
    /// The result row (new or reused) is now `processing` under a fresh run id.
    Claimed(RunClaim),
    /// Another run holds the row.
    AlreadyProcessing,
}

/// Move the owner's OCR result to `processing` in a single statement.
///
/// Creates the row when absent. An existing row is reset (prior data, error
/// and match cleared) unless it is already `processing`; a `processing` row
/// last touched before `stale_before` is reclaimed. Every claim stamps a new
/// `run_id`, so a reclaimed run can no longer finish the row.
pub fn claim_for_processing(
    conn: &Connection,
    owner: OcrOwner,
    stale_before: Option<&str>,
) -> Result<ProcessingClaim, DatabaseError> {
    let now = now_timestamp();
    let run_id = Uuid::new_v4();
    let changed = conn.execute(
        "INSERT INTO ocr_results
             (id, owner_kind, owner_id, processing_status, run_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'processing', ?6, ?4, ?4)
         ON CONFLICT (owner_kind, owner_id) DO UPDATE SET
             processing_status = 'processing',
             raw_text = NULL,
             confidence_score = NULL,
             document_type = NULL,
             extracted_data = NULL,
             error_message = NULL,
             matched_patient_id = NULL,
             match_confidence = NULL,
             run_id = excluded.run_id,
             updated_at = excluded.updated_at
         WHERE ocr_results.processing_status <> 'processing'
            OR (?5 IS NOT NULL AND ocr_results.updated_at < ?5)",
        params![
            Uuid::new_v4().to_string(),
            owner.kind().as_str(),
            owner.id().to_string(),
            now,
            stale_before,
            run_id.to_string(),
        ],
    )?;

    if changed == 0 {
        return Ok(ProcessingClaim::AlreadyProcessing);
    }

    let id: String = conn.query_row(
        "SELECT id FROM ocr_results WHERE owner_kind = ?1 AND owner_id = ?2",
        params![owner.kind().as_str(), owner.id().to_string()],
        |row| row.get(0),
    )?;
    Ok(ProcessingClaim::Claimed(RunClaim {
        ocr_result_id: parse_uuid("ocr_results.id", &id)?,
        run_id,
    }))
}

/// Everything a successful run records.
#[derive(Debug, Clone)]
pub struct CompletedRun<'a> {
    pub raw_text: &'a str,
    pub confidence: f32,
    pub document_type: DocumentType,
    pub extracted_data: &'a ExtractedDocumentData,
    pub matched_patient_id: Option<Uuid>,
    pub match_confidence: Option<f64>,
}

/// Record a successful run.
///
/// Returns `false` without writing when `claim` no longer holds the row,
/// i.e. a newer claim has reclaimed it.
pub fn complete_ocr_result(
    conn: &Connection,
    claim: &RunClaim,
    run: &CompletedRun<'_>,
) -> Result<bool, DatabaseError> {
    let extracted =
        serde_json::to_string(run.extracted_data).map_err(|e| DatabaseError::InvalidValue {
            field: "ocr_results.extracted_data".into(),
            reason: e.to_string(),
        })?;

    let rows = conn.execute(
        "UPDATE ocr_results SET processing_status = 'completed', raw_text = ?3,
         confidence_score = ?4, document_type = ?5, extracted_data = ?6, error_message = NULL,
         matched_patient_id = ?7, match_confidence = ?8, updated_at = ?9
         WHERE id = ?1 AND run_id = ?2 AND processing_status = 'processing'",
        params![
            claim.ocr_result_id.to_string(),
            claim.run_id.to_string(),
            run.raw_text,
            run.confidence,
            run.document_type.as_str(),
            extracted,
            run.matched_patient_id.map(|p| p.to_string()),
            run.match_confidence,
            now_timestamp(),
        ],
    )?;
    Ok(rows == 1)
}

/// Record a failed run. Same ownership rule as `complete_ocr_result`.
pub fn fail_ocr_result(
    conn: &Connection,
    claim: &RunClaim,
    message: &str,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE ocr_results SET processing_status = 'failed', error_message = ?3, updated_at = ?4
         WHERE id = ?1 AND run_id = ?2 AND processing_status = 'processing'",
        params![
            claim.ocr_result_id.to_string(),
            claim.run_id.to_string(),
            message,
            now_timestamp()
        ],
    )?;
    Ok(rows == 1)
}

const OCR_RESULT_COLUMNS: &str = "id, owner_kind, owner_id, raw_text, confidence_score,
     document_type,
     extracted_data, processing_status, error_message, matched_patient_id, match_confidence,
     created_at, updated_at";

pub fn get_ocr_result(conn: &Connection, id: &Uuid) -> Result<Option<OcrResult>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {OCR_RESULT_COLUMNS} FROM ocr_results WHERE id = ?1"),
            params![id.to_string()],
            read_ocr_result_row,
        )
        .optional()?;
    row.map(ocr_result_from_row).transpose()
}

/// The single OCR result for a document or referral scan, if any run started.
pub fn get_ocr_result_by_owner(
    conn: &Connection,
    owner: OcrOwner,
) -> Result<Option<OcrResult>, DatabaseError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {OCR_RESULT_COLUMNS} FROM ocr_results
                 WHERE owner_kind = ?1 AND owner_id = ?2"
            ),
            params![owner.kind().as_str(), owner.id().to_string()],
            read_ocr_result_row,
        )
        .optional()?;
    row.map(ocr_result_from_row).transpose()
}

struct OcrResultRow {
    id: String,
    owner_kind: String,
    owner_id: String,
    raw_text: Option<String>,
    confidence_score: Option<f32>,
    document_type: Option<String>,
    extracted_data: Option<String>,
    processing_status: String,
    error_message: Option<String>,
    matched_patient_id: Option<String>,
    match_confidence: Option<f64>,
    created_at: String,
    updated_at: String,
}

fn read_ocr_result_row(row: &Row<'_>) -> rusqlite::Result<OcrResultRow> {
    Ok(OcrResultRow {
        id: row.get(0)?,
        owner_kind: row.get(1)?,
        owner_id: row.get(2)?,
        raw_text: row.get(3)?,
        confidence_score: row.get(4)?,
        document_type: row.get(5)?,
        extracted_data: row.get(6)?,
        processing_status: row.get(7)?,
        error_message: row.get(8)?,
        matched_patient_id: row.get(9)?,
        match_confidence: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn ocr_result_from_row(row: OcrResultRow) -> Result<OcrResult, DatabaseError> {
    let owner_kind = OwnerKind::from_str(&row.owner_kind)?;
    let owner_id = parse_uuid("ocr_results.owner_id", &row.owner_id)?;
    let extracted_data = row
        .extracted_data
        .map(|json| {
            serde_json::from_str::<ExtractedDocumentData>(&json).map_err(|e| {
                DatabaseError::InvalidValue {
                    field: "ocr_results.extracted_data".into(),
                    reason: e.to_string(),
                }
            })
        })
        .transpose()?;

    Ok(OcrResult {
        id: parse_uuid("ocr_results.id", &row.id)?,
        owner: OcrOwner::from_parts(owner_kind, owner_id),
        raw_text: row.raw_text,
        confidence_score: row.confidence_score,
        document_type: row.document_type.as_deref().map(DocumentType::from_str).transpose()?,
        extracted_data,
        processing_status: ProcessingStatus::from_str(&row.processing_status)?,
        error_message: row.error_message,
        matched_patient_id: parse_optional_uuid(
            "ocr_results.matched_patient_id",
            row.matched_patient_id,
        )?,
        match_confidence: row.match_confidence,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
