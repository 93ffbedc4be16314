use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use snafu::{OptionExt, ResultExt, Snafu, ensure};

use super::wire::{ChatPayload, DocumentPayload, IngestResponse};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_USER_AGENT: &str = concat!("lexhook/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    /// Whole-request deadline enforced by the HTTP client itself.
    ///
    /// Sessions run their own deadline; this is only a backstop and stays
    /// unset by default.
    pub request_timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl TransportConfig {
    pub fn new(connect_timeout: Duration, user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into().trim().to_string();
        Self {
            connect_timeout,
            request_timeout: None,
            user_agent: if user_agent.is_empty() {
                DEFAULT_USER_AGENT.to_string()
            } else {
                user_agent
            },
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = Some(request_timeout);
        self
    }
}

/// Binary document picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileAttachment {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = guess_mime_type(&file_name).to_string();
        Self {
            file_name,
            mime_type,
            bytes,
        }
    }

    /// Lower-cased extension without the leading dot.
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.file_name)
    }

    /// Reads an attachment from disk.
    ///
    /// `accepted_extensions` holds lower-case extensions without dots; an empty
    /// list accepts every file.
    pub async fn read(path: &Path, accepted_extensions: &[String]) -> TransportResult<Self> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .context(UnsupportedAttachmentSnafu {
                stage: "attachment-file-name",
                file_name: path.display().to_string(),
            })?;

        if !accepted_extensions.is_empty() {
            let extension = file_extension(&file_name).unwrap_or_default();
            ensure!(
                accepted_extensions
                    .iter()
                    .any(|accepted| *accepted == extension),
                UnsupportedAttachmentSnafu {
                    stage: "attachment-extension",
                    file_name,
                }
            );
        }

        let bytes = tokio::fs::read(path).await.context(ReadAttachmentSnafu {
            stage: "read-attachment",
            path: path.to_path_buf(),
        })?;

        Ok(Self::new(file_name, bytes))
    }
}

fn file_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase)
}

fn guess_mime_type(file_name: &str) -> &'static str {
    match file_extension(file_name).as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// One ingestion request, shaped by the active upload mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSubmission {
    /// Metadata record posted as the JSON body.
    Json(DocumentPayload),
    /// `file` part plus a JSON-encoded `metadata` part.
    Multipart {
        file: FileAttachment,
        metadata: DocumentPayload,
    },
}

impl DocumentSubmission {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::Multipart { .. } => "multipart",
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to {endpoint} failed on `{stage}`: {source}"))]
    Send {
        stage: &'static str,
        endpoint: String,
        source: reqwest::Error,
    },
    #[snafu(display("webhook {endpoint} returned status {status}: {body}"))]
    Status {
        stage: &'static str,
        endpoint: String,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to read response from {endpoint}: {source}"))]
    ReadBody {
        stage: &'static str,
        endpoint: String,
        source: reqwest::Error,
    },
    #[snafu(display("failed to decode response from {endpoint}: {source}"))]
    DecodeBody {
        stage: &'static str,
        endpoint: String,
        source: serde_json::Error,
    },
    #[snafu(display("failed to encode document metadata on `{stage}`: {source}"))]
    EncodeMetadata {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to build multipart part for '{file_name}': {source}"))]
    AttachmentPart {
        stage: &'static str,
        file_name: String,
        source: reqwest::Error,
    },
    #[snafu(display("failed to read attachment {path:?}: {source}"))]
    ReadAttachment {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("attachment '{file_name}' is not an accepted document type"))]
    UnsupportedAttachment {
        stage: &'static str,
        file_name: String,
    },
}

impl TransportError {
    /// True when the HTTP client gave up because a deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Send { source, .. } | Self::ReadBody { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

pub trait WebhookTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Posts a chat message and returns the raw response body.
    ///
    /// Non-JSON bodies come back as a JSON string, empty bodies as `null`.
    fn post_chat<'a>(
        &'a self,
        endpoint: &'a str,
        payload: ChatPayload,
    ) -> BoxFuture<'a, TransportResult<Value>>;

    fn post_document<'a>(
        &'a self,
        endpoint: &'a str,
        submission: DocumentSubmission,
    ) -> BoxFuture<'a, TransportResult<IngestResponse>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted() -> Vec<String> {
        ["pdf", "doc", "docx", "txt"]
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn mime_type_follows_extension() {
        assert_eq!(
            FileAttachment::new("brief.PDF", Vec::new()).mime_type,
            "application/pdf"
        );
        assert_eq!(
            FileAttachment::new("notes.txt", Vec::new()).mime_type,
            "text/plain"
        );
        assert_eq!(
            FileAttachment::new("blob", Vec::new()).mime_type,
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn read_loads_accepted_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ruling.txt");
        std::fs::write(&path, b"the court finds").expect("write fixture");

        let attachment = FileAttachment::read(&path, &accepted())
            .await
            .expect("txt should be accepted");

        assert_eq!(attachment.file_name, "ruling.txt");
        assert_eq!(attachment.bytes, b"the court finds");
        assert_eq!(attachment.extension().as_deref(), Some("txt"));
    }

    #[tokio::test]
    async fn read_rejects_unlisted_extensions_before_touching_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("photo.png");

        let error = FileAttachment::read(&path, &accepted())
            .await
            .expect_err("png is not a document");

        assert!(matches!(error, TransportError::UnsupportedAttachment { .. }));
    }

    #[tokio::test]
    async fn read_reports_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing.pdf");

        let error = FileAttachment::read(&path, &[])
            .await
            .expect_err("file does not exist");

        assert!(matches!(error, TransportError::ReadAttachment { .. }));
        assert!(!error.is_timeout());
    }
}
