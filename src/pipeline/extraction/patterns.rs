//! Pattern Library: the ordered, immutable rule tables driving extraction.
//!
//! Rules are evaluated in declaration order and the first rule that yields a
//! value for a field wins, so more specific (labeled) rules precede their
//! standalone fallbacks. The standard library is compiled once; callers that
//! need different rules build their own `PatternLibrary` and inject it into
//! `FieldExtractor`.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::lab::{LabTest, LabVocabulary};
use super::names::{NameCapture, NameStrategy};
use super::normalize::{capitalize_name, normalize_date, normalize_gender, normalize_phone};
use super::types::{FieldKey, LabField, PatientField, ReferralField};

/// Canonicalization applied to a captured substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalizer {
    Trim,
    Lowercase,
    Date,
    Phone,
    Gender,
    Name,
}

impl Normalizer {
    pub fn apply(&self, raw: &str) -> String {
        let raw = raw.trim();
        match self {
            Self::Trim => raw.to_string(),
            Self::Lowercase => raw.to_lowercase(),
            Self::Date => normalize_date(raw),
            Self::Phone => normalize_phone(raw),
            Self::Gender => normalize_gender(raw),
            Self::Name => capitalize_name(raw),
        }
    }
}

/// Where one field's value comes from inside a rule's match.
#[derive(Debug, Clone)]
pub struct CaptureTarget<K> {
    pub field: K,
    pub group: usize,
    pub confidence: f32,
    pub normalizer: Normalizer,
}

/// A named regular expression feeding one or more fields.
#[derive(Debug, Clone)]
pub struct PatternRule<K> {
    pub name: &'static str,
    pub regex: Regex,
    pub targets: Vec<CaptureTarget<K>>,
    /// Skip matches whose line, up to the match, mentions this word.
    pub unless_line_mentions: Option<&'static str>,
}

impl<K: FieldKey> PatternRule<K> {
    /// Build a single-target rule reading capture group 1.
    pub fn single(
        name: &'static str,
        pattern: &str,
        field: K,
        confidence: f32,
        normalizer: Normalizer,
    ) -> Result<Self, regex::Error> {
        Self::multi(name, pattern, vec![(field, 1, confidence, normalizer)])
    }

    /// Build a rule with one target per `(field, group, confidence, normalizer)`.
    pub fn multi(
        name: &'static str,
        pattern: &str,
        targets: Vec<(K, usize, f32, Normalizer)>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            regex: Regex::new(pattern)?,
            targets: targets
                .into_iter()
                .map(|(field, group, confidence, normalizer)| CaptureTarget {
                    field,
                    group,
                    confidence,
                    normalizer,
                })
                .collect(),
            unless_line_mentions: None,
        })
    }

    pub fn unless_line_mentions(mut self, word: &'static str) -> Self {
        self.unless_line_mentions = Some(word);
        self
    }

    /// First acceptable match in `text`.
    pub fn first_match<'t>(&self, text: &'t str) -> Option<Captures<'t>> {
        let Some(word) = self.unless_line_mentions else {
            return self.regex.captures(text);
        };
        self.regex.captures_iter(text).find(|caps| {
            let start = caps.get(0).map_or(0, |m| m.start());
            let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
            !text[line_start..start].to_lowercase().contains(word)
        })
    }
}

/// All extraction rules, in evaluation order per category.
#[derive(Debug, Clone)]
pub struct PatternLibrary {
    pub patient: Vec<PatternRule<PatientField>>,
    pub names: Vec<NameStrategy>,
    /// Explicit `First Name:` / `Last Name:` labels; these override the cascade.
    pub name_labels: Vec<PatternRule<PatientField>>,
    /// Header words that can never be an ALL-CAPS patient name.
    pub name_exclusions: Vec<&'static str>,
    pub referral: Vec<PatternRule<ReferralField>>,
    pub lab_metadata: Vec<PatternRule<LabField>>,
    pub lab: LabVocabulary,
}

static STANDARD: LazyLock<PatternLibrary> = LazyLock::new(build_standard);

impl PatternLibrary {
    /// The built-in rule set.
    pub fn standard() -> Self {
        STANDARD.clone()
    }
}

impl Default for PatternLibrary {
    fn default() -> Self {
        Self::standard()
    }
}

// Shared fragments.
const DATE: &str = r"(\d{1,4}[/\-]\d{1,2}[/\-]\d{2,4})";
const PHONE: &str = r"(\(?\d{3}\)?[\s.\-]*\d{3}[\s.\-]*\d{4})";
const EMAIL: &str = r"([A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,})";
const NAME: &str = r"([A-Z][A-Za-z'\-]+)";
const TITLE: &str = r"(?:(?:Mr|Mrs|Ms|Miss|Mx)\.?[ \t]+)?";
const DOCTOR: &str = r"((?i:dr\.?|doctor)[ \t]+(?-i:[A-Z][A-Za-z.'\-]*(?:[ \t]+[A-Z][A-Za-z.'\-]*){0,2}))";

fn build_standard() -> PatternLibrary {
    PatternLibrary {
        patient: patient_rules(),
        names: name_strategies(),
        name_labels: name_label_rules(),
        name_exclusions: vec![
            "REFERRAL", "LETTER", "PATIENT", "DOCTOR", "HOSPITAL", "CLINIC", "MEDICAL",
            "CENTER", "HEALTH", "PRIVATE", "DEAR", "DATE", "FROM", "ADDRESS", "PHONE",
        ],
        referral: referral_rules(),
        lab_metadata: lab_metadata_rules(),
        lab: lab_vocabulary(),
    }
}

fn rule<K: FieldKey>(
    name: &'static str,
    pattern: &str,
    field: K,
    confidence: f32,
    normalizer: Normalizer,
) -> PatternRule<K> {
    PatternRule::single(name, pattern, field, confidence, normalizer).unwrap()
}

fn patient_rules() -> Vec<PatternRule<PatientField>> {
    use Normalizer::{Date, Lowercase, Trim};
    use PatientField::*;

    vec![
        rule(
            "dob_label",
            &format!(r"(?i)\b(?:date\s+of\s+birth|d\.?\s?o\.?\s?b\.?|birth\s*date)\s*[:#\-]?\s*{DATE}"),
            DateOfBirth,
            0.90,
            Date,
        ),
        rule(
            "dob_born",
            &format!(r"(?i)\bborn(?:\s+on)?\s*[:\-]?\s*{DATE}"),
            DateOfBirth,
            0.80,
            Date,
        ),
        rule(
            "gender_label",
            r"(?i)\b(?:gender|sex)\s*[:\-]?\s*(male|female|m|f)\b",
            Gender,
            0.90,
            Normalizer::Gender,
        ),
        rule(
            "emergency_contact_name",
            r"(?i)\bemergency\s+contact(?:\s+name)?\s*[:\-]\s*([A-Za-z][A-Za-z'\-]+(?:[ \t]+[A-Za-z][A-Za-z'\-]+){0,3})",
            EmergencyContactName,
            0.85,
            Trim,
        ),
        rule(
            "emergency_contact_phone_label",
            &format!(r"(?i)\bemergency\s+(?:contact\s+)?(?:phone|tel(?:ephone)?|number|#)\s*[:\-]?\s*{PHONE}"),
            EmergencyContactPhone,
            0.85,
            Normalizer::Phone,
        ),
        rule(
            "emergency_contact_phone_inline",
            &format!(r"(?i)\bemergency\s+contact\b[^\n]*?{PHONE}"),
            EmergencyContactPhone,
            0.75,
            Normalizer::Phone,
        ),
        rule(
            "emergency_contact_relationship",
            r"(?i)\brelation(?:ship)?(?:\s+to\s+patient)?\s*[:\-]\s*(spouse|wife|husband|mother|father|son|daughter|sister|brother|partner|friend|parent|child|guardian|other)\b",
            EmergencyContactRelationship,
            0.85,
            Lowercase,
        ),
        rule(
            "phone_label",
            &format!(r"(?i)\b(?:home\s+phone|phone|tel(?:ephone)?|mobile|cell|contact\s+number)(?:\s*(?:no\.?|number|#))?\s*[:\-]?\s*{PHONE}"),
            Phone,
            0.90,
            Normalizer::Phone,
        )
        .unless_line_mentions("emergency"),
        rule(
            "email_label",
            &format!(r"(?i)\be-?mail(?:\s+address)?\s*[:\-]?\s*{EMAIL}"),
            Email,
            0.95,
            Trim,
        ),
        rule("email_standalone", &format!(r"\b{EMAIL}\b"), Email, 0.80, Trim),
        rule(
            "address_label",
            r"(?i)\b(?:street\s+)?address(?:\s+line\s*1)?\s*[:\-]\s*(\d+[ \t]+[^\n,]+)",
            Address,
            0.85,
            Trim,
        ),
        rule(
            "address_standalone",
            r"(?im)\b(\d{1,6}[ \t]+(?:[A-Za-z0-9.]+[ \t]+){0,4}(?:street|st|avenue|ave|road|rd|boulevard|blvd|drive|dr|lane|ln|way|court|ct|place|pl|terrace|parkway|pkwy)\.?)(?:[ \t]*,|[ \t]*$)",
            Address,
            0.75,
            Trim,
        ),
        PatternRule::multi(
            "city_state_zip",
            r"\b([A-Z][a-zA-Z]+(?:[ \t]+[A-Z][a-zA-Z]+)*),[ \t]*([A-Z]{2})[ \t]+(\d{5}(?:-\d{4})?)\b",
            vec![
                (City, 1, 0.90, Trim),
                (State, 2, 0.95, Trim),
                (ZipCode, 3, 0.95, Trim),
            ],
        )
        .unwrap(),
        rule(
            "city_label",
            r"(?i)\bcity\s*[:\-]\s*([A-Za-z][A-Za-z.'\-]*(?:[ ][A-Za-z][A-Za-z.'\-]*)?)",
            City,
            0.85,
            Trim,
        ),
        rule(
            "state_label",
            r"(?i)\bstate\s*[:\-]\s*((?-i:[A-Z]{2}))\b",
            State,
            0.85,
            Trim,
        ),
        rule(
            "zip_label",
            r"(?i)\b(?:zip|postal)(?:\s*code)?\s*[:\-]\s*(\d{5}(?:-\d{4})?)\b",
            ZipCode,
            0.90,
            Trim,
        ),
        rule(
            "insurance_provider_label",
            r"(?i)\b(?:insurance(?:\s+(?:provider|company|carrier|plan))?|insurer|health\s+plan)\s*[:\-]\s*([A-Za-z][A-Za-z0-9&.'\- ]*[A-Za-z0-9.])",
            InsuranceProvider,
            0.90,
            Trim,
        ),
        rule(
            "insurance_provider_known",
            r"(?i)\b(blue\s+cross(?:\s+blue\s+shield)?|blue\s+shield|aetna|cigna|united\s*healthcare|humana|kaiser(?:\s+permanente)?|anthem|medicare|medicaid|tricare|molina)\b",
            InsuranceProvider,
            0.75,
            Trim,
        ),
        rule(
            "policy_number_label",
            r"(?i)\b(?:policy|member|subscriber|insurance)(?:\s*(?:id|no\.?|number|#))+\s*[:\-]?\s*((?-i:[A-Z0-9][A-Z0-9\-]{4,19}))\b",
            InsurancePolicyNumber,
            0.90,
            Trim,
        ),
        rule(
            "policy_number_standalone",
            r"\b([A-Z]{2,4}\d{6,12})\b",
            InsurancePolicyNumber,
            0.70,
            Trim,
        ),
        rule(
            "group_number_label",
            r"(?i)\bgroup(?:\s*(?:no\.?|number|#|id))?\s*[:\-]\s*((?-i:[A-Z0-9][A-Z0-9\-]{2,14}))\b",
            InsuranceGroupNumber,
            0.85,
            Trim,
        ),
    ]
}

fn name_strategies() -> Vec<NameStrategy> {
    let pair = |name, pattern: String, confidence| {
        NameStrategy::new(name, &pattern, confidence, NameCapture::Pair).unwrap()
    };

    vec![
        pair("re_header", format!(r"\b(?i:re)[ \t]*:[ \t]*{TITLE}{NAME}[ \t]+{NAME}"), 0.95),
        pair(
            "patient_label",
            format!(r"\b(?i:patient)(?:[ \t]+(?i:name))?[ \t]*:[ \t]*{TITLE}{NAME}[ \t]+{NAME}"),
            0.95,
        ),
        pair(
            "dear_doctor_referring",
            format!(r"(?i:dear)[ \t]+(?i:dr)\.?[ \t]+[A-Z][A-Za-z'\-]*,?[\s\S]{{0,300}}?\b(?i:i[ \t]+am[ \t]+referring)[ \t]+{TITLE}{NAME}[ \t]+{NAME}"),
            0.90,
        ),
        pair("referring", format!(r"\b(?i:referring)[ \t]+{TITLE}{NAME}[ \t]+{NAME}"), 0.85),
        pair(
            "seeing",
            format!(r"\b(?i:seeing|reviewing|assessing)[ \t]+{TITLE}{NAME}[ \t]+{NAME}"),
            0.85,
        ),
        NameStrategy::new(
            "full_name_label",
            r"\b(?i:full[ \t]+name|patient[ \t]+name|name)[ \t]*:[ \t]*([A-Z][A-Za-z'\-]+(?:[ \t]+[A-Z][A-Za-z'\-]*\.?){1,2})",
            0.80,
            NameCapture::FullName,
        )
        .unwrap(),
        NameStrategy::new(
            "all_caps_line",
            r"(?m)^[ \t]*([A-Z]{2,})[ \t]+([A-Z]{2,})[ \t]*$",
            0.70,
            NameCapture::HeaderLine,
        )
        .unwrap(),
    ]
}

fn name_label_rules() -> Vec<PatternRule<PatientField>> {
    vec![
        rule(
            "first_name_label",
            r"(?i)\b(?:first|given)\s+name\s*[:\-]\s*([A-Za-z][A-Za-z'\-]*)",
            PatientField::FirstName,
            0.95,
            Normalizer::Name,
        ),
        rule(
            "last_name_label",
            r"(?i)\b(?:last|family|sur)\s*name\s*[:\-]\s*([A-Za-z][A-Za-z'\-]*)",
            PatientField::LastName,
            0.95,
            Normalizer::Name,
        ),
    ]
}

fn referral_rules() -> Vec<PatternRule<ReferralField>> {
    use Normalizer::*;
    use ReferralField::*;

    vec![
        rule(
            "referring_physician_label",
            &format!(r"(?i)\b(?:referring\s+(?:physician|doctor|provider|clinician)|referred\s+by|from)\s*[:\-]?\s*{DOCTOR}"),
            ReferringPhysician,
            0.90,
            Trim,
        ),
        rule(
            "referring_physician_signature",
            r"(?m)^[ \t]*(Dr\.?[ \t]+[A-Z][A-Za-z.'\-]*(?:[ \t]+[A-Z][A-Za-z.'\-]*){0,2})[ \t,]*(?:M\.?D\.?)?[ \t]*$",
            ReferringPhysician,
            0.75,
            Trim,
        ),
        rule(
            "referring_facility",
            r"(?i)\b(?:referring\s+)?(?:facility|clinic|practice|hospital|organization)(?:\s+name)?\s*[:\-]\s*([^\n]+)",
            ReferringFacility,
            0.85,
            Trim,
        ),
        rule(
            "referral_reason",
            r"(?i)\b(?:reason\s+for\s+referral|referral\s+reason|reason\s+for\s+consult(?:ation)?|reason)\s*[:\-]\s*([^\n]+)",
            ReferralReason,
            0.85,
            Trim,
        ),
        rule(
            "referral_date",
            &format!(r"(?i)\b(?:referral\s+date|date\s+of\s+referral|date)\s*[:\-]\s*{DATE}"),
            ReferralDate,
            0.85,
            Date,
        ),
        rule(
            "specialty",
            r"(?i)\b(?:specialty|speciality|department|referred\s+to)\s*[:\-]\s*([A-Za-z][A-Za-z &/\-]*[A-Za-z])",
            Specialty,
            0.80,
            Trim,
        ),
        rule(
            "urgency_label",
            r"(?i)\b(?:urgency|priority)\s*[:\-]\s*(semi-urgent|urgent|routine|emergent|stat|soon)\b",
            Urgency,
            0.90,
            Lowercase,
        ),
        rule(
            "urgency_standalone",
            r"(?i)\b(urgent|emergent|routine)\b",
            Urgency,
            0.70,
            Lowercase,
        ),
        rule(
            "diagnosis",
            r"(?i)\b(?:provisional\s+diagnosis|diagnosis|dx|impression)\s*[:\-]\s*([^\n]+)",
            Diagnosis,
            0.80,
            Trim,
        ),
    ]
}

fn lab_metadata_rules() -> Vec<PatternRule<LabField>> {
    vec![
        rule(
            "collection_date",
            &format!(r"(?i)\b(?:collection|collected|specimen|sample)(?:\s+date)?(?:\s+on)?\s*[:\-]?\s*{DATE}"),
            LabField::CollectionDate,
            0.90,
            Normalizer::Date,
        ),
        rule(
            "ordering_provider",
            &format!(r"(?i)\b(?:ordering\s+(?:physician|provider|doctor)|ordered\s+by)\s*[:\-]?\s*{DOCTOR}"),
            LabField::OrderingProvider,
            0.85,
            Normalizer::Trim,
        ),
    ]
}

fn lab_vocabulary() -> LabVocabulary {
    // Longer names first where a shorter one is a whole word inside them.
    let tests: &[(&str, &str)] = &[
        ("hemoglobin a1c", "HbA1c"),
        ("hba1c", "HbA1c"),
        ("a1c", "HbA1c"),
        ("hemoglobin", "Hemoglobin"),
        ("hematocrit", "Hematocrit"),
        ("wbc", "WBC"),
        ("rbc", "RBC"),
        ("platelets", "Platelets"),
        ("glucose", "Glucose"),
        ("sodium", "Sodium"),
        ("potassium", "Potassium"),
        ("chloride", "Chloride"),
        ("bicarbonate", "Bicarbonate"),
        ("bun", "BUN"),
        ("creatinine", "Creatinine"),
        ("egfr", "eGFR"),
        ("calcium", "Calcium"),
        ("magnesium", "Magnesium"),
        ("albumin", "Albumin"),
        ("total protein", "Total Protein"),
        ("bilirubin", "Bilirubin"),
        ("alkaline phosphatase", "Alkaline Phosphatase"),
        ("alt", "ALT"),
        ("ast", "AST"),
        ("ldl", "LDL"),
        ("hdl", "HDL"),
        ("triglycerides", "Triglycerides"),
        ("cholesterol", "Cholesterol"),
        ("tsh", "TSH"),
        ("free t4", "Free T4"),
        ("t4", "T4"),
        ("vitamin d", "Vitamin D"),
        ("vitamin b12", "Vitamin B12"),
        ("ferritin", "Ferritin"),
        ("psa", "PSA"),
        ("inr", "INR"),
    ];

    LabVocabulary {
        tests: tests
            .iter()
            .map(|(key, display)| LabTest::new(key, display).unwrap())
            .collect(),
        value: Regex::new(r"(-?\d+(?:\.\d+)?)(?:[ \t]*([A-Za-z%µ][^\s(),;]*))?").unwrap(),
        range: Regex::new(r"\(\s*(-?\d+(?:\.\d+)?)\s*[-–]\s*(-?\d+(?:\.\d+)?)\s*\)").unwrap(),
        abnormal_markers: vec!["high", "low", "abnormal", "h", "l", "*"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_library_compiles_every_rule() {
        let lib = PatternLibrary::standard();
        assert!(!lib.patient.is_empty());
        assert_eq!(lib.names.len(), 7);
        assert_eq!(lib.name_labels.len(), 2);
        assert_eq!(lib.name_exclusions.len(), 15);
        assert!(lib.lab.tests.len() >= 30);
    }

    #[test]
    fn labeled_email_precedes_standalone() {
        let lib = PatternLibrary::standard();
        let pos = |name: &str| lib.patient.iter().position(|r| r.name == name).unwrap();
        assert!(pos("email_label") < pos("email_standalone"));
        assert!(pos("insurance_provider_label") < pos("insurance_provider_known"));
        assert!(pos("policy_number_label") < pos("policy_number_standalone"));
    }

    #[test]
    fn line_exclusion_skips_emergency_phone() {
        let rule = PatternRule::single(
            "phone",
            &format!(r"(?i)\bphone\s*:\s*{PHONE}"),
            PatientField::Phone,
            0.9,
            Normalizer::Phone,
        )
        .unwrap()
        .unless_line_mentions("emergency");

        let text = "Emergency Contact Phone: 555-000-1111\nPhone: 555-222-3333";
        let caps = rule.first_match(text).unwrap();
        assert_eq!(&caps[1], "555-222-3333");
    }

    #[test]
    fn normalizers_trim_before_applying() {
        assert_eq!(Normalizer::Trim.apply("  Aetna "), "Aetna");
        assert_eq!(Normalizer::Lowercase.apply(" URGENT"), "urgent");
        assert_eq!(Normalizer::Date.apply(" 13/05/2020 "), "2020-05-13");
        assert_eq!(Normalizer::Name.apply("SMITH"), "Smith");
    }
}
