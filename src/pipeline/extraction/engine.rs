//! Field Extraction Engine: runs a `PatternLibrary` over OCR text.

use crate::models::enums::{DocumentType, ExtractionMethod};

use super::names::resolve_name;
use super::patterns::{PatternLibrary, PatternRule};
use super::types::{
    CandidateField, ExtractedDocumentData, ExtractedLabData, ExtractedPatientData,
    ExtractedReferralData, FieldKey, FieldRecord, LabMetadata, PatientField,
};

const MAX_CONTEXT_CHARS: usize = 120;

/// Whitespace-collapsed source snippet, capped at 120 characters.
pub fn match_context(matched: &str) -> String {
    matched
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_CONTEXT_CHARS)
        .collect()
}

/// Stateless over its input; holds only the rule set it was built with.
#[derive(Debug, Clone, Default)]
pub struct FieldExtractor {
    library: PatternLibrary,
}

impl FieldExtractor {
    pub fn new(library: PatternLibrary) -> Self {
        Self { library }
    }

    pub fn library(&self) -> &PatternLibrary {
        &self.library
    }

    pub fn extract_patient_data(&self, text: &str) -> ExtractedPatientData {
        let mut data = ExtractedPatientData::default();
        let lib = &self.library;

        if let Some(name) = resolve_name(&lib.names, &lib.name_exclusions, text) {
            data.set(
                PatientField::FirstName,
                candidate(PatientField::FirstName, name.first, name.confidence, &name.context),
            );
            data.set(
                PatientField::LastName,
                candidate(PatientField::LastName, name.last, name.confidence, &name.context),
            );
        }

        // Explicit labels beat anything the cascade inferred.
        for rule in &lib.name_labels {
            apply_rule(rule, text, &mut data, true);
        }

        apply_rules(&lib.patient, text, &mut data);
        data
    }

    pub fn extract_referral_data(&self, text: &str) -> ExtractedReferralData {
        let mut data = ExtractedReferralData::default();
        apply_rules(&self.library.referral, text, &mut data);
        data
    }

    pub fn extract_lab_data(&self, text: &str) -> ExtractedLabData {
        let mut metadata = LabMetadata::default();
        apply_rules(&self.library.lab_metadata, text, &mut metadata);
        ExtractedLabData {
            metadata,
            results: self.library.lab.scan(text),
        }
    }

    /// Patient data always; referral and lab data only for matching types.
    pub fn extract_all_data(
        &self,
        text: &str,
        document_type: DocumentType,
    ) -> ExtractedDocumentData {
        let data = ExtractedDocumentData {
            method: ExtractionMethod::Regex,
            patient: self.extract_patient_data(text),
            referral: (document_type == DocumentType::Referral)
                .then(|| self.extract_referral_data(text)),
            lab: (document_type == DocumentType::LabResult).then(|| self.extract_lab_data(text)),
        };

        tracing::debug!(
            document_type = %document_type,
            patient_fields = data.patient.entries().count(),
            lab_rows = data.lab.as_ref().map_or(0, |l| l.results.len()),
            "Rule-based extraction complete"
        );
        data
    }
}

fn candidate<K: FieldKey>(
    field: K,
    value: String,
    confidence: f32,
    context: &str,
) -> CandidateField {
    CandidateField {
        field_name: field.name().to_string(),
        value,
        confidence,
        match_context: context.to_string(),
    }
}

/// Apply rules in order; a field keeps the first value any rule gives it.
fn apply_rules<R: FieldRecord>(rules: &[PatternRule<R::Key>], text: &str, record: &mut R) {
    for rule in rules {
        apply_rule(rule, text, record, false);
    }
}

fn apply_rule<R: FieldRecord>(
    rule: &PatternRule<R::Key>,
    text: &str,
    record: &mut R,
    overwrite: bool,
) {
    if !overwrite && rule.targets.iter().all(|t| record.get_field(t.field).is_some()) {
        return;
    }
    let Some(caps) = rule.first_match(text) else {
        return;
    };
    let context = match_context(caps.get(0).map_or("", |m| m.as_str()));

    for target in &rule.targets {
        if !overwrite && record.get_field(target.field).is_some() {
            continue;
        }
        let Some(raw) = caps
            .get(target.group)
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
        else {
            continue;
        };
        let value = target.normalizer.apply(raw);
        record.set_field(target.field, candidate(target.field, value, target.confidence, &context));
    }
}
