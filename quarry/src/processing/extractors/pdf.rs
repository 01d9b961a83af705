use crate::error::{QuarryError, Result};

pub struct PdfExtractor;

impl PdfExtractor {
    pub fn extract(bytes: &[u8]) -> Result<String> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| QuarryError::Validation(format!("PDF parse error: {e}")))?;

        Ok(normalize(&text))
    }
}

/// Collapse the extractor's raw page text into paragraph-shaped markdown:
/// runs of blank lines become one paragraph break, intra-paragraph newlines
/// become spaces.
fn normalize(raw: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(trimmed);
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs.join("\n\n")
}
