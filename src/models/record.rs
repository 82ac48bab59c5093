use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::ScreenAnalysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Auto,
    Manual,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Auto => "auto",
            SourceType::Manual => "manual",
        }
    }
}

/// What the vision model produced for one frame. `Raw` carries the
/// response text verbatim when it could not be parsed into the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScreenContext {
    Structured(ScreenAnalysis),
    Raw(String),
}

/// Tagged record payload. Serialized uniformly at the storage boundary:
/// structured auto context becomes JSON text, everything else is stored
/// verbatim so the content column stays human-readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordContent {
    Auto(ScreenContext),
    Manual(String),
}

impl RecordContent {
    pub fn source_type(&self) -> SourceType {
        match self {
            RecordContent::Auto(_) => SourceType::Auto,
            RecordContent::Manual(_) => SourceType::Manual,
        }
    }

    pub fn to_storage_text(&self) -> Result<String> {
        match self {
            RecordContent::Auto(ScreenContext::Structured(analysis)) => {
                Ok(serde_json::to_string(analysis)?)
            }
            RecordContent::Auto(ScreenContext::Raw(text)) => Ok(text.clone()),
            RecordContent::Manual(text) => Ok(text.clone()),
        }
    }

    /// Inverse of `to_storage_text`. An auto row whose content is not valid
    /// schema JSON is read back as raw text rather than rejected.
    pub fn from_storage(source: SourceType, text: &str) -> Self {
        match source {
            SourceType::Manual => RecordContent::Manual(text.to_string()),
            SourceType::Auto => match serde_json::from_str::<ScreenAnalysis>(text) {
                Ok(analysis) => RecordContent::Auto(ScreenContext::Structured(analysis)),
                Err(_) => RecordContent::Auto(ScreenContext::Raw(text.to_string())),
            },
        }
    }
}

/// One activity record. Immutable once created; never updated, only
/// inserted and read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub content: RecordContent,
    pub screenshot_path: Option<String>,
}

impl Record {
    pub fn source_type(&self) -> SourceType {
        self.content.source_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_analysis() -> ScreenAnalysis {
        ScreenAnalysis {
            current_focus: "writing a database migration".to_string(),
            active_software: "VS Code".to_string(),
            context_keywords: vec!["Rust".to_string(), "SQLite".to_string()],
        }
    }

    #[test]
    fn structured_auto_content_round_trips_through_storage() {
        let content = RecordContent::Auto(ScreenContext::Structured(sample_analysis()));
        let stored = content.to_storage_text().unwrap();
        assert!(stored.starts_with('{'), "structured content stored as JSON");
        assert_eq!(RecordContent::from_storage(SourceType::Auto, &stored), content);
    }

    #[test]
    fn raw_auto_content_is_stored_verbatim() {
        let content = RecordContent::Auto(ScreenContext::Raw("plain prose reply".to_string()));
        let stored = content.to_storage_text().unwrap();
        assert_eq!(stored, "plain prose reply");
        assert_eq!(RecordContent::from_storage(SourceType::Auto, &stored), content);
    }

    #[test]
    fn manual_note_is_never_parsed_as_json() {
        let note = "{\"looks\": \"like json\"}";
        let read = RecordContent::from_storage(SourceType::Manual, note);
        assert_eq!(read, RecordContent::Manual(note.to_string()));
    }

    #[test]
    fn source_type_matches_variant() {
        assert_eq!(
            RecordContent::Manual("x".into()).source_type().as_str(),
            "manual"
        );
        assert_eq!(
            RecordContent::Auto(ScreenContext::Raw("x".into())).source_type().as_str(),
            "auto"
        );
    }
}
