//! Post-OCR text analysis: quality scoring and document number extraction.

pub mod confidence;
pub mod extractor;

pub use extractor::{DocumentNumberExtractor, Extraction};
