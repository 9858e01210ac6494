use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::enums::FieldStatus;
use crate::models::FieldMapping;

const FIELD_MAPPING_COLUMNS: &str = "id, ocr_result_id, patient_id, field_name, extracted_value,
     original_value, confidence_score, status, applied_at, applied_by, created_at";

pub fn insert_field_mapping(conn: &Connection, m: &FieldMapping) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO field_mappings ({FIELD_MAPPING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            m.id.to_string(),
            m.ocr_result_id.to_string(),
            m.patient_id.to_string(),
            m.field_name,
            m.extracted_value,
            m.original_value,
            m.confidence_score,
            m.status.as_str(),
            m.applied_at,
            m.applied_by,
            m.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_field_mapping(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<FieldMapping>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {FIELD_MAPPING_COLUMNS} FROM field_mappings WHERE id = ?1"),
            params![id.to_string()],
            read_field_mapping_row,
        )
        .optional()?;
    row.map(field_mapping_from_row).transpose()
}

/// All mappings of a result, oldest first, including reviewed history.
pub fn list_field_mappings(
    conn: &Connection,
    ocr_result_id: &Uuid,
) -> Result<Vec<FieldMapping>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FIELD_MAPPING_COLUMNS} FROM field_mappings
         WHERE ocr_result_id = ?1
         ORDER BY created_at, rowid"
    ))?;
    let rows = stmt
        .query_map(params![ocr_result_id.to_string()], read_field_mapping_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(field_mapping_from_row).collect()
}

/// Drop the result's unreviewed mappings; applied and rejected ones stay.
pub fn delete_pending_mappings(
    conn: &Connection,
    ocr_result_id: &Uuid,
) -> Result<usize, DatabaseError> {
    Ok(conn.execute(
        "DELETE FROM field_mappings WHERE ocr_result_id = ?1 AND status = 'pending'",
        params![ocr_result_id.to_string()],
    )?)
}

/// Pending → applied. Returns 0 when the mapping was not pending.
pub fn mark_mapping_applied(
    conn: &Connection,
    id: &Uuid,
    applied_by: &str,
    applied_at: &str,
) -> Result<usize, DatabaseError> {
    Ok(conn.execute(
        "UPDATE field_mappings SET status = 'applied', applied_by = ?2, applied_at = ?3
         WHERE id = ?1 AND status = 'pending'",
        params![id.to_string(), applied_by, applied_at],
    )?)
}

/// Pending → rejected, scoped to one result. Returns 0 when nothing matched.
pub fn mark_mapping_rejected(
    conn: &Connection,
    ocr_result_id: &Uuid,
    id: &Uuid,
) -> Result<usize, DatabaseError> {
    Ok(conn.execute(
        "UPDATE field_mappings SET status = 'rejected'
         WHERE id = ?1 AND ocr_result_id = ?2 AND status = 'pending'",
        params![id.to_string(), ocr_result_id.to_string()],
    )?)
}

struct FieldMappingRow {
    id: String,
    ocr_result_id: String,
    patient_id: String,
    field_name: String,
    extracted_value: String,
    original_value: Option<String>,
    confidence_score: f32,
    status: String,
    applied_at: Option<String>,
    applied_by: Option<String>,
    created_at: String,
}

fn read_field_mapping_row(row: &Row<'_>) -> rusqlite::Result<FieldMappingRow> {
    Ok(FieldMappingRow {
        id: row.get(0)?,
        ocr_result_id: row.get(1)?,
        patient_id: row.get(2)?,
        field_name: row.get(3)?,
        extracted_value: row.get(4)?,
        original_value: row.get(5)?,
        confidence_score: row.get(6)?,
        status: row.get(7)?,
        applied_at: row.get(8)?,
        applied_by: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn field_mapping_from_row(row: FieldMappingRow) -> Result<FieldMapping, DatabaseError> {
    Ok(FieldMapping {
        id: parse_uuid("field_mappings.id", &row.id)?,
        ocr_result_id: parse_uuid("field_mappings.ocr_result_id", &row.ocr_result_id)?,
        patient_id: parse_uuid("field_mappings.patient_id", &row.patient_id)?,
        field_name: row.field_name,
        extracted_value: row.extracted_value,
        original_value: row.original_value,
        confidence_score: row.confidence_score,
        status: FieldStatus::from_str(&row.status)?,
        applied_at: row.applied_at,
        applied_by: row.applied_by,
        created_at: row.created_at,
    })
}
