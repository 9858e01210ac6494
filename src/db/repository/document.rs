use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_optional_uuid, parse_uuid};
use crate::db::DatabaseError;
use crate::models::Document;

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO documents
             (id, patient_id, file_path, mime_type, original_filename, uploaded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            doc.id.to_string(),
            doc.patient_id.map(|id| id.to_string()),
            doc.file_path,
            doc.mime_type,
            doc.original_filename,
            doc.uploaded_at,
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, patient_id, file_path, mime_type, original_filename, uploaded_at
             FROM documents WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok(DocumentRow {
                    id: row.get(0)?,
                    patient_id: row.get(1)?,
                    file_path: row.get(2)?,
                    mime_type: row.get(3)?,
                    original_filename: row.get(4)?,
                    uploaded_at: row.get(5)?,
                })
            },
        )
        .optional()?;

    row.map(document_from_row).transpose()
}

struct DocumentRow {
    id: String,
    patient_id: Option<String>,
    file_path: String,
    mime_type: String,
    original_filename: String,
    uploaded_at: String,
}

fn document_from_row(row: DocumentRow) -> Result<Document, DatabaseError> {
    Ok(Document {
        id: parse_uuid("documents.id", &row.id)?,
        patient_id: parse_optional_uuid("documents.patient_id", row.patient_id)?,
        file_path: row.file_path,
        mime_type: row.mime_type,
        original_filename: row.original_filename,
        uploaded_at: row.uploaded_at,
    })
}
