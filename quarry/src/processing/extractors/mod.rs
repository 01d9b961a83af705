mod docx;
mod pdf;

pub use docx::DocxExtractor;
pub use pdf::PdfExtractor;

use crate::error::Result;
use crate::models::FileType;

/// Byte-level parsers are external collaborators behind this seam: they take
/// uploaded bytes and produce markdown with structural cues preserved.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, file_type: FileType, bytes: &[u8]) -> Result<String>;
}

/// Production extractor dispatching on file type.
pub struct DocumentExtractor;

impl TextExtractor for DocumentExtractor {
    fn extract(&self, file_type: FileType, bytes: &[u8]) -> Result<String> {
        match file_type {
            FileType::Pdf => PdfExtractor::extract(bytes),
            FileType::Docx => DocxExtractor::extract(bytes),
        }
    }
}
