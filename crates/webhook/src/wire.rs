use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Body posted to the chat webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub message: String,
}

impl ChatPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Which reply body layout the deployed chat workflow answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyShape {
    /// Accept every known layout, first match wins.
    #[default]
    Auto,
    /// `[{ "output": "..." }, ...]`
    OutputArray,
    /// `{ "response": "..." }`
    ResponseObject,
}

/// Pulls the assistant reply out of a chat webhook body.
///
/// Returns `None` when the body carries no usable text so the caller can
/// substitute its fallback line.
pub fn extract_reply(body: &Value, shape: ReplyShape) -> Option<String> {
    let reply = match shape {
        ReplyShape::OutputArray => first_output(body),
        ReplyShape::ResponseObject => text_field(body, "response"),
        ReplyShape::Auto => first_output(body)
            .or_else(|| text_field(body, "response"))
            .or_else(|| text_field(body, "output"))
            .or_else(|| body.as_str().map(str::to_string)),
    };

    reply.filter(|text| !text.is_empty())
}

fn first_output(body: &Value) -> Option<String> {
    body.as_array()?
        .first()
        .and_then(|item| text_field(item, "output"))
}

fn text_field(body: &Value, key: &str) -> Option<String> {
    body.get(key)?.as_str().map(str::to_string)
}

/// Document metadata record as the ingestion workflow expects it.
///
/// `text_content` is serialized as `null` for file uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPayload {
    pub title: String,
    pub author: String,
    pub category: String,
    pub court: String,
    pub case_number: String,
    pub date: String,
    pub tags: Vec<String>,
    pub description: String,
    pub text_content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStatistics {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_chunks: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub successful_insertions: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub failed_insertions: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub original_document_length: u64,
}

/// Success body of the ingestion webhook.
///
/// Every field is optional on the wire and `null` reads as absent, so a 2xx
/// answer never fails to decode over a missing detail.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub processing_id: Option<String>,
    #[serde(default)]
    pub qdrant_collection: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub statistics: IngestStatistics,
    /// Unparsable timestamps decode as `None`.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(parse_timestamp))
}

/// Reads an ISO-8601 timestamp. Values without an offset are taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .into_iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
