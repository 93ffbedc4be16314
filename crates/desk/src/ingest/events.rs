use lexhook_webhook::TransportError;
use snafu::Snafu;

use crate::ingest::metadata::{IngestMode, UploadOutcome};

pub const MISSING_FILE_MESSAGE: &str = "Please select a file to upload.";
pub const MISSING_TEXT_MESSAGE: &str = "Please enter document text.";
pub const MISSING_TITLE_MESSAGE: &str = "Please enter a document title.";
pub const UPLOAD_FAILED_MESSAGE: &str = "Error uploading document.";
pub const UPLOAD_BUSY_MESSAGE: &str = "An upload is already in progress.";
pub const UPLOAD_SUCCESS_MESSAGE: &str = "Document uploaded successfully!";

/// State-change notification published by an ingestion session.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    ModeChanged(IngestMode),
    /// Selected file name, `None` once cleared.
    FileChanged(Option<String>),
    UploadingChanged(bool),
    Succeeded(UploadOutcome),
    /// User-facing error line, `None` once cleared.
    ErrorChanged(Option<String>),
    OutcomeDismissed,
}

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IngestError {
    #[snafu(display("no file selected on `{stage}`"))]
    MissingFile { stage: &'static str },
    #[snafu(display("no document text entered on `{stage}`"))]
    MissingText { stage: &'static str },
    #[snafu(display("no document title entered on `{stage}`"))]
    MissingTitle { stage: &'static str },
    #[snafu(display("upload already in progress on `{stage}`"))]
    Busy { stage: &'static str },
    #[snafu(display("ingestion webhook rejected the document: {message}"))]
    Rejected {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("document upload failed on `{stage}`: {source}"))]
    Upload {
        stage: &'static str,
        source: TransportError,
    },
    #[snafu(display("failed to load attachment on `{stage}`: {source}"))]
    Attachment {
        stage: &'static str,
        source: TransportError,
    },
}

impl IngestError {
    /// Line shown in the form's error slot.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingFile { .. } => MISSING_FILE_MESSAGE.to_string(),
            Self::MissingText { .. } => MISSING_TEXT_MESSAGE.to_string(),
            Self::MissingTitle { .. } => MISSING_TITLE_MESSAGE.to_string(),
            Self::Busy { .. } => UPLOAD_BUSY_MESSAGE.to_string(),
            Self::Rejected { .. } | Self::Upload { .. } => UPLOAD_FAILED_MESSAGE.to_string(),
            Self::Attachment { source, .. } => source.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingFile { .. } | Self::MissingText { .. } | Self::MissingTitle { .. }
        )
    }
}
