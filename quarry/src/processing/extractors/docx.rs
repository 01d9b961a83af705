use crate::error::{QuarryError, Result};

pub struct DocxExtractor;

impl DocxExtractor {
    pub fn extract(bytes: &[u8]) -> Result<String> {
        let docx = docx_rs::read_docx(bytes)
            .map_err(|e| QuarryError::Validation(format!("DOCX parse error: {e}")))?;

        let mut blocks: Vec<String> = Vec::new();
        for child in &docx.document.children {
            match child {
                docx_rs::DocumentChild::Paragraph(paragraph) => {
                    let text = Self::paragraph_markdown(paragraph);
                    if !text.trim().is_empty() {
                        blocks.push(text);
                    }
                }
                docx_rs::DocumentChild::Table(table) => {
                    let text = Self::table_markdown(table);
                    if !text.is_empty() {
                        blocks.push(text);
                    }
                }
                _ => {}
            }
        }

        Ok(blocks.join("\n\n"))
    }

    fn paragraph_markdown(paragraph: &docx_rs::Paragraph) -> String {
        let content = Self::paragraph_text(paragraph);
        if content.is_empty() {
            return content;
        }

        if let Some(prefix) = Self::heading_prefix(paragraph) {
            return format!("{prefix}{content}");
        }
        if let Some(prefix) = Self::list_prefix(paragraph) {
            return format!("{prefix}{content}");
        }
        content
    }

    fn heading_prefix(paragraph: &docx_rs::Paragraph) -> Option<String> {
        let style = paragraph.property.style.as_ref()?;
        if style.val == "Title" {
            return Some("# ".to_string());
        }
        let level: u8 = style.val.strip_prefix("Heading")?.parse().ok()?;
        (1..=6).contains(&level).then(|| format!("{} ", "#".repeat(level as usize)))
    }

    fn list_prefix(paragraph: &docx_rs::Paragraph) -> Option<String> {
        let numbering = paragraph.property.numbering_property.as_ref()?;
        let level = numbering.level.as_ref().map(|l| l.val).unwrap_or(0);
        Some(format!("{}- ", "  ".repeat(level)))
    }

    fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
        let mut content = String::new();
        for child in &paragraph.children {
            if let docx_rs::ParagraphChild::Run(run) = child {
                for run_child in &run.children {
                    if let docx_rs::RunChild::Text(text) = run_child {
                        content.push_str(&text.text);
                    }
                }
            }
        }
        content
    }

    fn table_markdown(table: &docx_rs::Table) -> String {
        let mut rows: Vec<Vec<String>> = Vec::new();
        for child in &table.rows {
            let docx_rs::TableChild::TableRow(row) = child;
            let mut cells = Vec::new();
            for row_child in &row.cells {
                let docx_rs::TableRowChild::TableCell(cell) = row_child;
                let mut text = String::new();
                for cell_child in &cell.children {
                    if let docx_rs::TableCellContent::Paragraph(para) = cell_child {
                        if !text.is_empty() {
                            text.push(' ');
                        }
                        text.push_str(&Self::paragraph_text(para));
                    }
                }
                cells.push(text.trim().to_string());
            }
            if !cells.is_empty() {
                rows.push(cells);
            }
        }

        let Some(header) = rows.first() else {
            return String::new();
        };

        let mut out = format!("| {} |\n", header.join(" | "));
        out.push_str(&format!("|{}\n", "------|".repeat(header.len())));
        for row in rows.iter().skip(1) {
            out.push_str(&format!("| {} |\n", row.join(" | ")));
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_docx(docx: docx_rs::Docx) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        docx.build().pack(&mut buffer).expect("pack docx");
        buffer.into_inner()
    }

    #[test]
    fn plain_paragraphs_extract() {
        use docx_rs::*;
        let bytes = build_docx(
            Docx::new()
                .add_paragraph(
                    Paragraph::new().add_run(Run::new().add_text("Revenue grew 25% in Q3.")),
                )
                .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Second paragraph."))),
        );

        let text = DocxExtractor::extract(&bytes).unwrap();
        assert!(text.contains("Revenue grew 25% in Q3."));
        assert!(text.contains("Second paragraph."));
    }

    #[test]
    fn headings_become_markdown() {
        use docx_rs::*;
        let bytes = build_docx(Docx::new().add_paragraph(
            Paragraph::new()
                .style("Heading2")
                .add_run(Run::new().add_text("Findings")),
        ));

        let text = DocxExtractor::extract(&bytes).unwrap();
        assert!(text.contains("## Findings"));
    }

    #[test]
    fn garbage_bytes_are_a_validation_error() {
        let err = DocxExtractor::extract(b"not a docx").unwrap_err();
        assert_eq!(err.code(), "validation");
    }
}
