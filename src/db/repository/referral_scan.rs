use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::{now_timestamp, DatabaseError};
use crate::models::enums::ProcessingStatus;
use crate::models::ReferralScan;

pub fn insert_referral_scan(conn: &Connection, scan: &ReferralScan) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO referral_scans (id, file_path, mime_type, original_filename, status,
         error_message, uploaded_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            scan.id.to_string(),
            scan.file_path,
            scan.mime_type,
            scan.original_filename,
            scan.status.as_str(),
            scan.error_message,
            scan.uploaded_at,
            scan.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_referral_scan(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<ReferralScan>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, file_path, mime_type, original_filename, status, error_message,
             uploaded_at, updated_at
             FROM referral_scans WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok(ReferralScanRow {
                    id: row.get(0)?,
                    file_path: row.get(1)?,
                    mime_type: row.get(2)?,
                    original_filename: row.get(3)?,
                    status: row.get(4)?,
                    error_message: row.get(5)?,
                    uploaded_at: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            },
        )
        .optional()?;

    row.map(referral_scan_from_row).transpose()
}

/// Set the scan's own status; `error_message` is replaced, not merged.
pub fn update_referral_scan_status(
    conn: &Connection,
    id: &Uuid,
    status: ProcessingStatus,
    error_message: Option<&str>,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE referral_scans SET status = ?2, error_message = ?3, updated_at = ?4 WHERE id = ?1",
        params![id.to_string(), status.as_str(), error_message, now_timestamp()],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "ReferralScan".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

struct ReferralScanRow {
    id: String,
    file_path: String,
    mime_type: String,
    original_filename: String,
    status: String,
    error_message: Option<String>,
    uploaded_at: String,
    updated_at: String,
}

fn referral_scan_from_row(row: ReferralScanRow) -> Result<ReferralScan, DatabaseError> {
    Ok(ReferralScan {
        id: parse_uuid("referral_scans.id", &row.id)?,
        file_path: row.file_path,
        mime_type: row.mime_type,
        original_filename: row.original_filename,
        status: ProcessingStatus::from_str(&row.status)?,
        error_message: row.error_message,
        uploaded_at: row.uploaded_at,
        updated_at: row.updated_at,
    })
}
