use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use lexhook_webhook::{DocumentPayload, IngestResponse, IngestStatistics};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::Snafu;

/// Document category offered by the upload form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    General,
    CaseLaw,
    Statute,
    Regulation,
    Contract,
    Brief,
    Opinion,
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::General,
        Category::CaseLaw,
        Category::Statute,
        Category::Regulation,
        Category::Contract,
        Category::Brief,
        Category::Opinion,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::CaseLaw => "case_law",
            Self::Statute => "statute",
            Self::Regulation => "regulation",
            Self::Contract => "contract",
            Self::Brief => "brief",
            Self::Opinion => "opinion",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("unknown document category '{value}'"))]
pub struct UnknownCategory {
    value: String,
}

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Accepts `case_law`, `Case Law` and `case-law` alike.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| UnknownCategory {
                value: value.to_string(),
            })
    }
}

/// Which input the upload form submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    #[default]
    File,
    Text,
}

/// Editable text fields of the upload form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataField {
    Title,
    Author,
    Court,
    CaseNumber,
    Date,
    /// Raw comma-separated tag string.
    Tags,
    Description,
    TextContent,
}

/// Form contents as the user typed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadMetadata {
    pub title: String,
    pub author: String,
    pub category: Category,
    pub court: String,
    pub case_number: String,
    pub date: String,
    pub tags: String,
    pub description: String,
    pub text_content: String,
}

impl UploadMetadata {
    pub fn with_category(category: Category) -> Self {
        Self {
            category,
            ..Self::default()
        }
    }

    pub fn get(&self, field: MetadataField) -> &str {
        match field {
            MetadataField::Title => &self.title,
            MetadataField::Author => &self.author,
            MetadataField::Court => &self.court,
            MetadataField::CaseNumber => &self.case_number,
            MetadataField::Date => &self.date,
            MetadataField::Tags => &self.tags,
            MetadataField::Description => &self.description,
            MetadataField::TextContent => &self.text_content,
        }
    }

    pub fn set(&mut self, field: MetadataField, value: impl Into<String>) {
        let slot = match field {
            MetadataField::Title => &mut self.title,
            MetadataField::Author => &mut self.author,
            MetadataField::Court => &mut self.court,
            MetadataField::CaseNumber => &mut self.case_number,
            MetadataField::Date => &mut self.date,
            MetadataField::Tags => &mut self.tags,
            MetadataField::Description => &mut self.description,
            MetadataField::TextContent => &mut self.text_content,
        };
        *slot = value.into();
    }

    pub fn tag_list(&self) -> Vec<String> {
        split_tags(&self.tags)
    }

    /// Wire record for `mode`. Text content is only sent in text mode.
    pub fn to_payload(&self, mode: IngestMode) -> DocumentPayload {
        DocumentPayload {
            title: self.title.clone(),
            author: self.author.clone(),
            category: self.category.as_str().to_string(),
            court: self.court.clone(),
            case_number: self.case_number.clone(),
            date: self.date.clone(),
            tags: self.tag_list(),
            description: self.description.clone(),
            text_content: match mode {
                IngestMode::Text => Some(self.text_content.clone()),
                IngestMode::File => None,
            },
        }
    }
}

/// Splits a comma-separated tag string, dropping blank entries.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// What the form shows after a successful upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub success: bool,
    pub message: String,
    /// Metadata record as the ingestion workflow echoed it back.
    pub metadata: Value,
    pub processing_id: Option<String>,
    pub collection: Option<String>,
    pub statistics: IngestStatistics,
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<IngestResponse> for UploadOutcome {
    fn from(response: IngestResponse) -> Self {
        Self {
            success: response.success.unwrap_or(true),
            message: response.message,
            metadata: response.metadata,
            processing_id: response.processing_id,
            collection: response.qdrant_collection,
            statistics: response.statistics,
            timestamp: response.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_trimmed_and_blanks_dropped() {
        assert_eq!(split_tags("a, b ,c"), vec!["a", "b", "c"]);
        assert_eq!(split_tags(" contract ,, ,lease "), vec!["contract", "lease"]);
        assert!(split_tags("").is_empty());
        assert!(split_tags(" , ").is_empty());
    }

    #[test]
    fn category_parses_loose_spellings() {
        assert_eq!("case_law".parse::<Category>().ok(), Some(Category::CaseLaw));
        assert_eq!("Case Law".parse::<Category>().ok(), Some(Category::CaseLaw));
        assert_eq!(" statute ".parse::<Category>().ok(), Some(Category::Statute));
        assert!("treaty".parse::<Category>().is_err());
        assert_eq!(Category::default().to_string(), "general");
    }

    #[test]
    fn file_mode_payload_omits_text_content() {
        let mut metadata = UploadMetadata::with_category(Category::Contract);
        metadata.set(MetadataField::Title, "Lease");
        metadata.set(MetadataField::TextContent, "typed earlier");
        metadata.set(MetadataField::Tags, "lease, property");

        let file_payload = metadata.to_payload(IngestMode::File);
        assert_eq!(file_payload.text_content, None);
        assert_eq!(file_payload.category, "contract");
        assert_eq!(file_payload.tags, vec!["lease", "property"]);

        let text_payload = metadata.to_payload(IngestMode::Text);
        assert_eq!(text_payload.text_content.as_deref(), Some("typed earlier"));
    }

    #[test]
    fn missing_success_flag_counts_as_success() {
        let outcome = UploadOutcome::from(IngestResponse {
            message: "stored".to_string(),
            metadata: serde_json::json!({ "title": "Lease" }),
            statistics: IngestStatistics {
                total_chunks: 3,
                ..IngestStatistics::default()
            },
            ..IngestResponse::default()
        });

        assert!(outcome.success);
        assert_eq!(outcome.metadata["title"], "Lease");
        assert_eq!(outcome.statistics.total_chunks, 3);
        assert_eq!(outcome.statistics.successful_insertions, 0);
    }
}
