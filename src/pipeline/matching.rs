//! Patient Matching Engine: score registry candidates against an extracted
//! identity.

use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::db::{list_active_patients, DatabaseError};
use crate::pipeline::extraction::normalize_date;

/// Per-field weights and the minimum score for a match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchWeights {
    pub last_name: f64,
    pub first_name: f64,
    pub date_of_birth: f64,
    pub threshold: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            last_name: 0.4,
            first_name: 0.3,
            date_of_birth: 0.5,
            threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedPatient {
    pub id: Uuid,
    pub mrn: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
    /// Rounded to two decimals.
    pub match_score: f64,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.to_lowercase()
}

fn round2(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

/// Best active patient scoring at least `weights.threshold`.
///
/// Each supplied input contributes its weight on an exact match (names
/// case-insensitive, DOB after normalization). Ties keep the earliest
/// patient in registry order.
pub fn find_matching_patient(
    conn: &Connection,
    first_name: Option<&str>,
    last_name: Option<&str>,
    date_of_birth: Option<&str>,
    weights: &MatchWeights,
) -> Result<Option<MatchedPatient>, DatabaseError> {
    let first = present(first_name);
    let last = present(last_name);
    let dob = present(date_of_birth).map(normalize_date);

    if first.is_none() && last.is_none() && dob.is_none() {
        return Ok(None);
    }

    let mut best: Option<MatchedPatient> = None;
    for patient in list_active_patients(conn)? {
        let mut score = 0.0;
        if last.is_some_and(|l| same_name(&patient.last_name, l)) {
            score += weights.last_name;
        }
        if first.is_some_and(|f| same_name(&patient.first_name, f)) {
            score += weights.first_name;
        }
        if let (Some(d), Some(pd)) = (dob.as_deref(), patient.date_of_birth.as_deref()) {
            if d == pd {
                score += weights.date_of_birth;
            }
        }
        let score = round2(score);

        if score < weights.threshold {
            continue;
        }
        if best.as_ref().is_some_and(|b| score <= b.match_score) {
            continue;
        }
        best = Some(MatchedPatient {
            id: patient.id,
            mrn: patient.mrn,
            first_name: patient.first_name,
            last_name: patient.last_name,
            date_of_birth: patient.date_of_birth,
            match_score: score,
        });
    }

    match &best {
        Some(m) => tracing::info!(patient_id = %m.id, score = m.match_score, "Patient matched"),
        None => tracing::info!("No patient met the match threshold"),
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_patient, open_memory_database};
    use crate::models::Patient;

    fn add(conn: &Connection, mrn: &str, first: &str, last: &str, dob: Option<&str>) -> Uuid {
        // Distinct, increasing creation times fix registry order.
        let seq: i64 = conn
            .query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))
            .unwrap();
        let created = format!("2024-01-01T00:00:{seq:02}.000Z");
        let p = Patient {
            id: Uuid::new_v4(),
            mrn: mrn.into(),
            first_name: first.into(),
            last_name: last.into(),
            date_of_birth: dob.map(String::from),
            gender: None,
            phone: None,
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
            created_at: created.clone(),
            updated_at: created,
        };
        insert_patient(conn, &p).unwrap();
        p.id
    }

    fn find(
        conn: &Connection,
        first: Option<&str>,
        last: Option<&str>,
        dob: Option<&str>,
    ) -> Option<MatchedPatient> {
        find_matching_patient(conn, first, last, dob, &MatchWeights::default()).unwrap()
    }

    #[test]
    fn full_match_scores_one_point_two() {
        let conn = open_memory_database().unwrap();
        let id = add(&conn, "M1", "John", "Smith", Some("1970-01-01"));

        let m = find(&conn, Some("john"), Some("SMITH"), Some("01/01/1970")).unwrap();
        assert_eq!(m.id, id);
        assert_eq!(m.match_score, 1.2);
    }

    #[test]
    fn last_name_alone_is_below_threshold() {
        let conn = open_memory_database().unwrap();
        add(&conn, "M1", "John", "Smith", Some("1970-01-01"));
        assert!(find(&conn, None, Some("Smith"), None).is_none());
    }

    #[test]
    fn first_name_alone_is_below_threshold() {
        let conn = open_memory_database().unwrap();
        add(&conn, "M1", "Jane", "Doe", Some("1980-05-13"));
        assert!(find(&conn, Some("Jane"), None, None).is_none());
    }

    #[test]
    fn accented_names_match_regardless_of_case() {
        let conn = open_memory_database().unwrap();
        let id = add(&conn, "M1", "RENÉE", "BÉLANGER", None);

        let m = find(&conn, Some("Renée"), Some("Bélanger"), None).unwrap();
        assert_eq!(m.id, id);
        assert_eq!(m.match_score, 0.7);
    }

    #[test]
    fn inactive_patients_never_match() {
        let conn = open_memory_database().unwrap();
        let id = add(&conn, "M1", "John", "Smith", Some("1970-01-01"));
        conn.execute(
            "UPDATE patients SET is_active = 0 WHERE id = ?1",
            rusqlite::params![id.to_string()],
        )
        .unwrap();
        assert!(find(&conn, Some("John"), Some("Smith"), Some("1970-01-01")).is_none());
    }

    #[test]
    fn dob_alone_reaches_threshold() {
        let conn = open_memory_database().unwrap();
        add(&conn, "M1", "John", "Smith", Some("1970-01-01"));
        let m = find(&conn, None, None, Some("1970-01-01")).unwrap();
        assert_eq!(m.match_score, 0.5);
    }

    #[test]
    fn names_without_dob_match_at_point_seven() {
        let conn = open_memory_database().unwrap();
        add(&conn, "M1", "John", "Smith", None);
        let m = find(&conn, Some("John"), Some("Smith"), None).unwrap();
        assert_eq!(m.match_score, 0.7);
    }

    #[test]
    fn no_inputs_means_no_lookup() {
        let conn = open_memory_database().unwrap();
        add(&conn, "M1", "John", "Smith", Some("1970-01-01"));
        assert!(find(&conn, None, Some("  "), None).is_none());
    }

    #[test]
    fn higher_score_wins_and_ties_keep_first() {
        let conn = open_memory_database().unwrap();
        let first_smith = add(&conn, "M1", "Anna", "Smith", Some("1980-02-02"));
        add(&conn, "M2", "Anna", "Smith", Some("1980-02-02"));
        let exact = add(&conn, "M3", "Anna", "Smith", Some("1990-09-09"));

        let m = find(&conn, Some("Anna"), Some("Smith"), Some("1990-09-09")).unwrap();
        assert_eq!(m.id, exact);

        let tie = find(&conn, Some("Anna"), Some("Smith"), Some("1980-02-02")).unwrap();
        assert_eq!(tie.id, first_smith);
    }

    #[test]
    fn custom_weights_change_the_outcome() {
        let conn = open_memory_database().unwrap();
        add(&conn, "M1", "John", "Smith", None);
        let strict = MatchWeights {
            threshold: 0.9,
            ..MatchWeights::default()
        };
        let m = find_matching_patient(&conn, Some("John"), Some("Smith"), None, &strict).unwrap();
        assert!(m.is_none());
    }
}
