use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(ProcessingStatus {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
});

impl ProcessingStatus {
    /// Completed and failed runs only change through a new processing request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

str_enum!(FieldStatus {
    Pending => "pending",
    Applied => "applied",
    Rejected => "rejected",
});

str_enum!(DocumentType {
    Referral => "referral",
    LabResult => "lab_result",
    IntakeForm => "intake_form",
    Unknown => "unknown",
});

impl DocumentType {
    /// Lenient parse for engine and model output; anything unrecognised is `Unknown`.
    pub fn from_guess(s: &str) -> Self {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "referral" | "referral_letter" => Self::Referral,
            "lab_result" | "lab_results" | "lab" | "laboratory" => Self::LabResult,
            "intake_form" | "intake" | "registration" => Self::IntakeForm,
            _ => Self::Unknown,
        }
    }
}

str_enum!(ExtractionMethod {
    Ai => "ai",
    Regex => "regex",
});

str_enum!(OwnerKind {
    Document => "document",
    ReferralScan => "referral_scan",
});
