use serde::{Deserialize, Serialize};

use crate::models::enums::ExtractionMethod;

/// A single extracted value with its pattern confidence and source snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateField {
    pub field_name: String,
    pub value: String,
    pub confidence: f32,
    pub match_context: String,
}

/// A closed set of field names.
pub trait FieldKey: Copy + Eq + std::fmt::Debug {
    fn name(&self) -> &'static str;
}

/// A record with at most one candidate per key.
pub trait FieldRecord {
    type Key: FieldKey;

    fn get_field(&self, key: Self::Key) -> Option<&CandidateField>;
    fn set_field(&mut self, key: Self::Key, candidate: CandidateField);
}

/// Generates a closed field-name enum and a record holding one optional
/// candidate per field.
macro_rules! candidate_record {
    (
        $(#[$meta:meta])*
        $record:ident keyed by $key:ident {
            $($variant:ident => $field:ident),+ $(,)?
        }
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $key {
            $($variant),+
        }

        impl $key {
            pub const ALL: &'static [$key] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($field)),+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|key| key.as_str() == name)
            }
        }

        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct $record {
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<CandidateField>,
            )+
        }

        impl $record {
            pub fn get(&self, key: $key) -> Option<&CandidateField> {
                match key {
                    $($key::$variant => self.$field.as_ref()),+
                }
            }

            pub fn set(&mut self, key: $key, candidate: CandidateField) {
                match key {
                    $($key::$variant => self.$field = Some(candidate)),+
                }
            }

            pub fn value(&self, key: $key) -> Option<&str> {
                self.get(key).map(|c| c.value.as_str())
            }

            /// Present fields in declaration order.
            pub fn entries(&self) -> impl Iterator<Item = ($key, &CandidateField)> + '_ {
                $key::ALL
                    .iter()
                    .filter_map(move |key| self.get(*key).map(|c| (*key, c)))
            }

            pub fn is_empty(&self) -> bool {
                self.entries().next().is_none()
            }
        }

        impl FieldKey for $key {
            fn name(&self) -> &'static str {
                self.as_str()
            }
        }

        impl FieldRecord for $record {
            type Key = $key;

            fn get_field(&self, key: $key) -> Option<&CandidateField> {
                self.get(key)
            }

            fn set_field(&mut self, key: $key, candidate: CandidateField) {
                self.set(key, candidate)
            }
        }
    };
}

candidate_record!(
    /// Identity, contact, address, emergency-contact and insurance fields.
    ExtractedPatientData keyed by PatientField {
        FirstName => first_name,
        LastName => last_name,
        DateOfBirth => date_of_birth,
        Gender => gender,
        Phone => phone,
        Email => email,
        Address => address,
        City => city,
        State => state,
        ZipCode => zip_code,
        EmergencyContactName => emergency_contact_name,
        EmergencyContactPhone => emergency_contact_phone,
        EmergencyContactRelationship => emergency_contact_relationship,
        InsuranceProvider => insurance_provider,
        InsurancePolicyNumber => insurance_policy_number,
        InsuranceGroupNumber => insurance_group_number,
    }
);

candidate_record!(
    /// Referral letter metadata.
    ExtractedReferralData keyed by ReferralField {
        ReferringPhysician => referring_physician,
        ReferringFacility => referring_facility,
        ReferralReason => referral_reason,
        ReferralDate => referral_date,
        Specialty => specialty,
        Urgency => urgency,
        Diagnosis => diagnosis,
    }
);

candidate_record!(
    /// Lab report header fields.
    LabMetadata keyed by LabField {
        CollectionDate => collection_date,
        OrderingProvider => ordering_provider,
    }
);

/// One row of a lab panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabResultRow {
    pub test_name: String,
    pub value: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub abnormal: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedLabData {
    #[serde(default)]
    pub metadata: LabMetadata,
    #[serde(default)]
    pub results: Vec<LabResultRow>,
}

/// Everything extracted from one document, as stored on its OCR result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocumentData {
    pub method: ExtractionMethod,
    pub patient: ExtractedPatientData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral: Option<ExtractedReferralData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab: Option<ExtractedLabData>,
}

impl ExtractedDocumentData {
    /// True when at least a first or last name was found.
    pub fn has_identity(&self) -> bool {
        self.patient.first_name.is_some() || self.patient.last_name.is_some()
    }
}
