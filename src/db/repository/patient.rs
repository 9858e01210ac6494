use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::{now_timestamp, DatabaseError};
use crate::models::Patient;

/// Patient columns a reviewer may overwrite from extracted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatientColumn {
    FirstName,
    LastName,
    DateOfBirth,
    Gender,
    Phone,
    Email,
    Address,
    City,
    State,
    ZipCode,
    EmergencyContactName,
    EmergencyContactPhone,
    InsuranceProvider,
    InsurancePolicyNumber,
    Notes,
}

impl PatientColumn {
    pub const WRITABLE: &'static [PatientColumn] = &[
        Self::FirstName,
        Self::LastName,
        Self::DateOfBirth,
        Self::Gender,
        Self::Phone,
        Self::Email,
        Self::Address,
        Self::City,
        Self::State,
        Self::ZipCode,
        Self::EmergencyContactName,
        Self::EmergencyContactPhone,
        Self::InsuranceProvider,
        Self::InsurancePolicyNumber,
        Self::Notes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::DateOfBirth => "date_of_birth",
            Self::Gender => "gender",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Address => "address",
            Self::City => "city",
            Self::State => "state",
            Self::ZipCode => "zip_code",
            Self::EmergencyContactName => "emergency_contact_name",
            Self::EmergencyContactPhone => "emergency_contact_phone",
            Self::InsuranceProvider => "insurance_provider",
            Self::InsurancePolicyNumber => "insurance_policy_number",
            Self::Notes => "notes",
        }
    }

    /// `None` for anything outside the writable allow-list.
    pub fn from_field_name(name: &str) -> Option<Self> {
        Self::WRITABLE.iter().copied().find(|c| c.as_str() == name)
    }
}

const PATIENT_COLUMNS: &str = "id, mrn, first_name, last_name, date_of_birth, gender, phone, email,
     address, city, state, zip_code, emergency_contact_name, emergency_contact_phone,
     insurance_provider, insurance_policy_number, notes, is_active, created_at, updated_at";

pub fn insert_patient(conn: &Connection, p: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO patients ({PATIENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                     ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
        ),
        params![
            p.id.to_string(),
            p.mrn,
            p.first_name,
            p.last_name,
            p.date_of_birth,
            p.gender,
            p.phone,
            p.email,
            p.address,
            p.city,
            p.state,
            p.zip_code,
            p.emergency_contact_name,
            p.emergency_contact_phone,
            p.insurance_provider,
            p.insurance_policy_number,
            p.notes,
            p.is_active as i32,
            p.created_at,
            p.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
            params![id.to_string()],
            read_patient_row,
        )
        .optional()?;

    row.map(patient_from_row).transpose()
}

/// Active patients in registry order (`created_at`, then `id`).
///
/// Identity comparison happens in the caller: SQLite `lower()` only folds
/// ASCII, so names are not filtered here.
pub fn list_active_patients(conn: &Connection) -> Result<Vec<Patient>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patients WHERE is_active = 1 ORDER BY created_at, id"
    ))?;

    let rows = stmt
        .query_map([], read_patient_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(patient_from_row).collect()
}

/// Write the given columns and bump `updated_at`. Returns rows changed.
pub fn update_patient_columns(
    conn: &Connection,
    id: &Uuid,
    updates: &[(PatientColumn, String)],
) -> Result<usize, DatabaseError> {
    let mut assignments: Vec<String> = updates
        .iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{} = ?{}", column.as_str(), i + 2))
        .collect();
    assignments.push(format!("updated_at = ?{}", updates.len() + 2));

    let sql = format!("UPDATE patients SET {} WHERE id = ?1", assignments.join(", "));

    let mut values: Vec<String> = Vec::with_capacity(updates.len() + 2);
    values.push(id.to_string());
    values.extend(updates.iter().map(|(_, v)| v.clone()));
    values.push(now_timestamp());

    Ok(conn.execute(&sql, params_from_iter(values))?)
}

struct PatientRow {
    id: String,
    mrn: String,
    first_name: String,
    last_name: String,
    date_of_birth: Option<String>,
    gender: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    address: Option<String>,
    city: Option<String>,
    state: Option<String>,
    zip_code: Option<String>,
    emergency_contact_name: Option<String>,
    emergency_contact_phone: Option<String>,
    insurance_provider: Option<String>,
    insurance_policy_number: Option<String>,
    notes: Option<String>,
    is_active: i32,
    created_at: String,
    updated_at: String,
}

fn read_patient_row(row: &Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        id: row.get(0)?,
        mrn: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        date_of_birth: row.get(4)?,
        gender: row.get(5)?,
        phone: row.get(6)?,
        email: row.get(7)?,
        address: row.get(8)?,
        city: row.get(9)?,
        state: row.get(10)?,
        zip_code: row.get(11)?,
        emergency_contact_name: row.get(12)?,
        emergency_contact_phone: row.get(13)?,
        insurance_provider: row.get(14)?,
        insurance_policy_number: row.get(15)?,
        notes: row.get(16)?,
        is_active: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}

fn patient_from_row(row: PatientRow) -> Result<Patient, DatabaseError> {
    Ok(Patient {
        id: parse_uuid("patients.id", &row.id)?,
        mrn: row.mrn,
        first_name: row.first_name,
        last_name: row.last_name,
        date_of_birth: row.date_of_birth,
        gender: row.gender,
        phone: row.phone,
        email: row.email,
        address: row.address,
        city: row.city,
        state: row.state,
        zip_code: row.zip_code,
        emergency_contact_name: row.emergency_contact_name,
        emergency_contact_phone: row.emergency_contact_phone,
        insurance_provider: row.insurance_provider,
        insurance_policy_number: row.insurance_policy_number,
        notes: row.notes,
        is_active: row.is_active != 0,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
