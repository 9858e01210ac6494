use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub mrn: String,
    pub first_name: String,
    pub last_name: String,
    /// Canonical `YYYY-MM-DD`.
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_policy_number: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Patient {
    /// Current value of a patient column by name, for review diffs.
    pub fn field_value(&self, field_name: &str) -> Option<String> {
        let value = match field_name {
            "first_name" => Some(&self.first_name),
            "last_name" => Some(&self.last_name),
            "date_of_birth" => self.date_of_birth.as_ref(),
            "gender" => self.gender.as_ref(),
            "phone" => self.phone.as_ref(),
            "email" => self.email.as_ref(),
            "address" => self.address.as_ref(),
            "city" => self.city.as_ref(),
            "state" => self.state.as_ref(),
            "zip_code" => self.zip_code.as_ref(),
            "emergency_contact_name" => self.emergency_contact_name.as_ref(),
            "emergency_contact_phone" => self.emergency_contact_phone.as_ref(),
            "insurance_provider" => self.insurance_provider.as_ref(),
            "insurance_policy_number" => self.insurance_policy_number.as_ref(),
            "notes" => self.notes.as_ref(),
            _ => None,
        };
        value.cloned()
    }
}
