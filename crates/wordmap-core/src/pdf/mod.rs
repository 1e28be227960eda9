pub mod extractor;

pub use extractor::{extract_document, extract_text, ExtractedText};
