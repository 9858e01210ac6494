//! Rule-based field extraction from OCR text.

pub mod engine;
pub mod lab;
pub mod names;
pub mod normalize;
pub mod patterns;
pub mod sanitize;
pub mod types;

pub use engine::*;
pub use normalize::*;
pub use patterns::{Normalizer, PatternLibrary, PatternRule};
pub use sanitize::*;
pub use types::*;
