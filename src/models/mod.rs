pub mod enums;
pub mod document;
pub mod field_mapping;
pub mod ocr_result;
pub mod patient;
pub mod referral_scan;

pub use document::*;
pub use field_mapping::*;
pub use ocr_result::*;
pub use patient::*;
pub use referral_scan::*;
