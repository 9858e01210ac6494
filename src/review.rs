//! Field review workflow.
//!
//! A reviewer sees the pending field mappings of one OCR result next to the
//! patient's current values, then applies or rejects a selection. Applying
//! writes the patient and marks the mappings in one transaction.

use std::collections::{BTreeMap, HashSet};

use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{
    self, get_field_mapping, get_ocr_result, get_patient, mark_mapping_applied,
    mark_mapping_rejected, now_timestamp, update_patient_columns, DatabaseError, PatientColumn,
};
use crate::models::enums::FieldStatus;
use crate::models::{FieldMapping, Patient};

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Invalid review request: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for ReviewError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.into())
    }
}

/// Mappings of one result, oldest first.
pub fn list_field_mappings(
    conn: &Connection,
    ocr_result_id: &Uuid,
) -> Result<Vec<FieldMapping>, ReviewError> {
    Ok(db::list_field_mappings(conn, ocr_result_id)?)
}

/// Write the selected pending mappings onto their patient.
///
/// Every id must name a pending mapping of `ocr_result_id`, and all of them
/// must target the same patient. Field names outside the writable
/// allow-list are marked applied without touching the record. When the same
/// column is selected twice the later mapping wins.
pub fn apply_fields(
    conn: &Connection,
    ocr_result_id: &Uuid,
    field_ids: &[Uuid],
    applied_by: &str,
) -> Result<Patient, ReviewError> {
    if field_ids.is_empty() {
        return Err(ReviewError::Validation("No fields selected".into()));
    }
    require_ocr_result(conn, ocr_result_id)?;
    let field_ids = distinct(field_ids);

    let mappings = field_ids
        .iter()
        .map(|id| pending_mapping(conn, ocr_result_id, id))
        .collect::<Result<Vec<_>, _>>()?;

    let patient_id = mappings[0].patient_id;
    if mappings.iter().any(|m| m.patient_id != patient_id) {
        return Err(ReviewError::Validation(
            "Selected fields belong to different patients".into(),
        ));
    }

    let mut columns: BTreeMap<PatientColumn, String> = BTreeMap::new();
    for mapping in &mappings {
        match PatientColumn::from_field_name(&mapping.field_name) {
            Some(column) => {
                columns.insert(column, mapping.extracted_value.clone());
            }
            None => tracing::debug!(
                field = %mapping.field_name,
                mapping_id = %mapping.id,
                "Field is not writable; skipping patient update"
            ),
        }
    }
    let updates: Vec<(PatientColumn, String)> = columns.into_iter().collect();

    let tx = conn.unchecked_transaction()?;
    if get_patient(&tx, &patient_id)?.is_none() {
        return Err(ReviewError::NotFound { entity: "Patient", id: patient_id });
    }
    update_patient_columns(&tx, &patient_id, &updates)?;

    let applied_at = now_timestamp();
    for mapping in &mappings {
        if mark_mapping_applied(&tx, &mapping.id, applied_by, &applied_at)? != 1 {
            // Raced with another reviewer; dropping the transaction rolls back.
            return Err(ReviewError::Validation(format!(
                "Field mapping {} is no longer pending",
                mapping.id
            )));
        }
    }

    let patient = get_patient(&tx, &patient_id)?
        .ok_or(ReviewError::NotFound { entity: "Patient", id: patient_id })?;
    tx.commit()?;

    tracing::info!(
        ocr_result_id = %ocr_result_id,
        patient_id = %patient_id,
        applied = mappings.len(),
        columns = updates.len(),
        applied_by,
        "Field mappings applied"
    );
    Ok(patient)
}

/// Reject each selected mapping that is still pending on this result.
/// Returns how many were rejected; others are left alone.
pub fn reject_fields(
    conn: &Connection,
    ocr_result_id: &Uuid,
    field_ids: &[Uuid],
) -> Result<usize, ReviewError> {
    if field_ids.is_empty() {
        return Err(ReviewError::Validation("No fields selected".into()));
    }
    require_ocr_result(conn, ocr_result_id)?;
    let field_ids = distinct(field_ids);

    let mut rejected = 0;
    for id in &field_ids {
        rejected += mark_mapping_rejected(conn, ocr_result_id, id)?;
    }

    tracing::info!(
        ocr_result_id = %ocr_result_id,
        requested = field_ids.len(),
        rejected,
        "Field mappings rejected"
    );
    Ok(rejected)
}

/// First occurrence of each id, order kept.
fn distinct(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn require_ocr_result(conn: &Connection, id: &Uuid) -> Result<(), ReviewError> {
    match get_ocr_result(conn, id)? {
        Some(_) => Ok(()),
        None => Err(ReviewError::NotFound { entity: "OcrResult", id: *id }),
    }
}

fn pending_mapping(
    conn: &Connection,
    ocr_result_id: &Uuid,
    id: &Uuid,
) -> Result<FieldMapping, ReviewError> {
    let mapping = get_field_mapping(conn, id)?
        .filter(|m| m.ocr_result_id == *ocr_result_id)
        .ok_or_else(|| {
            ReviewError::Validation(format!("Field mapping {id} does not belong to this result"))
        })?;
    if mapping.status != FieldStatus::Pending {
        return Err(ReviewError::Validation(format!(
            "Field mapping {id} is already {}",
            mapping.status.as_str()
        )));
    }
    Ok(mapping)
}
