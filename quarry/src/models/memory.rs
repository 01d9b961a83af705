use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Fact,
    Conversation,
    Preference,
    Shared,
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fact => write!(f, "fact"),
            Self::Conversation => write!(f, "conversation"),
            Self::Preference => write!(f, "preference"),
            Self::Shared => write!(f, "shared"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryMetadata {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<MemoryKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: Uuid,
    pub tenant_key: String,
    pub text: String,
    pub metadata: MemoryMetadata,
    pub created_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(tenant_key: String, text: String, metadata: MemoryMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_key,
            text,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Historical-summary entries fold older memories together; their
    /// critical-facts section is never re-summarized.
    pub fn is_summary(&self) -> bool {
        self.text.starts_with("[Historical Summary]")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    pub entry: MemoryEntry,
    pub score: f32,
    /// True when the entry came from the shared sentinel rather than the
    /// principal's own tenant.
    pub shared: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_detection() {
        let summary = MemoryEntry::new(
            "t".into(),
            "[Historical Summary] prior discussion...".into(),
            MemoryMetadata::default(),
        );
        assert!(summary.is_summary());

        let plain = MemoryEntry::new("t".into(), "likes rust".into(), MemoryMetadata::default());
        assert!(!plain.is_summary());
    }
}
