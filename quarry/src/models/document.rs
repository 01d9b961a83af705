use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
}

impl FileType {
    /// Resolve from a filename extension. Anything other than pdf/docx is a
    /// validation failure at upload time.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = filename.rsplit('.').next()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Docx => write!(f, "docx"),
        }
    }
}

impl std::str::FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            other => Err(format!("unknown file type: {other}")),
        }
    }
}

/// A document as stored in the graph. Owned by exactly one tenant key;
/// mutated only by the ingest pipeline after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub tenant_key: String,
    pub filename: String,
    pub file_type: FileType,
    pub byte_size: u64,
    pub upload_time: DateTime<Utc>,
    pub chunk_count: i64,
    pub summary_cache: Option<String>,
}

impl Document {
    pub fn new(
        tenant_key: String,
        filename: String,
        file_type: FileType,
        byte_size: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_key,
            filename,
            file_type,
            byte_size,
            upload_time: Utc::now(),
            chunk_count: 0,
            summary_cache: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummaryFormat {
    #[default]
    Brief,
    Detailed,
    Executive,
    Bullet,
}

impl std::str::FromStr for SummaryFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brief" => Ok(Self::Brief),
            "detailed" => Ok(Self::Detailed),
            "executive" => Ok(Self::Executive),
            "bullet" => Ok(Self::Bullet),
            other => Err(format!("unknown summary format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_from_filename() {
        assert_eq!(FileType::from_filename("report.pdf"), Some(FileType::Pdf));
        assert_eq!(FileType::from_filename("Notes.DOCX"), Some(FileType::Docx));
        assert_eq!(FileType::from_filename("data.xlsx"), None);
        assert_eq!(FileType::from_filename("noext"), None);
    }

    #[test]
    fn new_document_starts_unindexed() {
        let doc = Document::new("tenant".into(), "a.pdf".into(), FileType::Pdf, 42);
        assert_eq!(doc.chunk_count, 0);
        assert!(doc.summary_cache.is_none());
    }

    #[test]
    fn summary_format_parses() {
        assert_eq!("brief".parse::<SummaryFormat>(), Ok(SummaryFormat::Brief));
        assert_eq!("bullet".parse::<SummaryFormat>(), Ok(SummaryFormat::Bullet));
        assert!("haiku".parse::<SummaryFormat>().is_err());
    }
}
