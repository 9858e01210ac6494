//! Repository layer: entity-scoped database operations on a borrowed
//! `Connection`. Callers own transactions.

mod document;
mod field_mapping;
mod ocr_result;
mod patient;
mod referral_scan;

use uuid::Uuid;

use super::DatabaseError;

pub use document::*;
pub use field_mapping::*;
pub use ocr_result::*;
pub use patient::*;
pub use referral_scan::*;

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::InvalidValue {
        field: field.into(),
        reason: e.to_string(),
    })
}

fn parse_optional_uuid(field: &str, value: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    value.map(|v| parse_uuid(field, &v)).transpose()
}
