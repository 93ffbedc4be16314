use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lexhook_webhook::{DocumentSubmission, FileAttachment, WebhookTransport};
use snafu::{OptionExt, ResultExt, ensure};
use tokio::sync::{RwLock, broadcast};

use crate::ingest::events::{
    AttachmentSnafu, BusySnafu, IngestEvent, IngestResult, MissingFileSnafu, MissingTextSnafu,
    MissingTitleSnafu, RejectedSnafu, UPLOAD_SUCCESS_MESSAGE, UploadSnafu,
};
use crate::ingest::metadata::{Category, IngestMode, MetadataField, UploadMetadata, UploadOutcome};
use crate::settings::IngestSettings;

pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct IngestState {
    mode: IngestMode,
    file: Option<FileAttachment>,
    metadata: UploadMetadata,
    outcome: Option<UploadOutcome>,
    success: Option<String>,
    error: Option<String>,
}

/// Point-in-time copy of the upload form.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSnapshot {
    pub mode: IngestMode,
    pub file_name: Option<String>,
    pub metadata: UploadMetadata,
    pub uploading: bool,
    pub outcome: Option<UploadOutcome>,
    /// Confirmation line shown after a successful upload.
    pub success: Option<String>,
    pub error: Option<String>,
}

/// Upload form state and the single submission it drives.
pub struct IngestSession {
    settings: IngestSettings,
    transport: Arc<dyn WebhookTransport>,
    state: RwLock<IngestState>,
    uploading: AtomicBool,
    events: broadcast::Sender<IngestEvent>,
}

impl IngestSession {
    pub fn new(settings: IngestSettings, transport: Arc<dyn WebhookTransport>) -> Self {
        let state = IngestState {
            metadata: UploadMetadata::with_category(settings.default_category),
            ..IngestState::default()
        };
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            settings,
            transport,
            state: RwLock::new(state),
            uploading: AtomicBool::new(false),
            events,
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> IngestSnapshot {
        let state = self.state.read().await;
        IngestSnapshot {
            mode: state.mode,
            file_name: state.file.as_ref().map(|file| file.file_name.clone()),
            metadata: state.metadata.clone(),
            uploading: self.uploading.load(Ordering::SeqCst),
            outcome: state.outcome.clone(),
            success: state.success.clone(),
            error: state.error.clone(),
        }
    }

    /// Switches the submission mode. Entered metadata is kept.
    pub async fn set_mode(&self, mode: IngestMode) {
        self.state.write().await.mode = mode;
        self.emit(IngestEvent::ModeChanged(mode));
    }

    pub async fn select_file(&self, file: Option<FileAttachment>) {
        let file_name = file.as_ref().map(|file| file.file_name.clone());
        self.state.write().await.file = file;
        self.emit(IngestEvent::FileChanged(file_name));
    }

    /// Reads `path` and selects it, enforcing the accepted extensions.
    pub async fn select_file_from_path(&self, path: &Path) -> IngestResult<()> {
        let file = match FileAttachment::read(path, &self.settings.accepted_extensions)
            .await
            .context(AttachmentSnafu {
                stage: "select-attachment",
            }) {
            Ok(file) => file,
            Err(error) => {
                tracing::warn!(path = ?path, error = %error, "attachment rejected");
                self.set_error(Some(error.user_message())).await;
                return Err(error);
            }
        };

        tracing::info!(
            file_name = %file.file_name,
            mime_type = %file.mime_type,
            size = file.bytes.len(),
            "attachment selected"
        );
        self.select_file(Some(file)).await;
        Ok(())
    }

    pub async fn set_field(&self, field: MetadataField, value: impl Into<String>) {
        self.state.write().await.metadata.set(field, value);
    }

    pub async fn set_category(&self, category: Category) {
        self.state.write().await.metadata.category = category;
    }

    /// Clears the stored outcome and success line. Form fields are untouched.
    pub async fn dismiss_outcome(&self) {
        {
            let mut state = self.state.write().await;
            state.outcome = None;
            state.success = None;
        }
        self.emit(IngestEvent::OutcomeDismissed);
    }

    /// Validates the form for the active mode and sends it.
    ///
    /// Validation failures set the error line and send nothing. Text made only
    /// of whitespace counts as missing. Transport and server failures set the
    /// generic upload error and leave no outcome.
    pub async fn submit(&self) -> IngestResult<UploadOutcome> {
        let (mode, submission) = {
            let mut state = self.state.write().await;
            ensure!(
                !self.uploading.load(Ordering::SeqCst),
                BusySnafu {
                    stage: "check-in-flight"
                }
            );

            let submission = match Self::prepare(&state) {
                Ok(submission) => submission,
                Err(error) => {
                    tracing::warn!(
                        mode = ?state.mode,
                        error = %error,
                        "document upload failed validation"
                    );
                    state.error = Some(error.user_message());
                    drop(state);
                    self.emit(IngestEvent::ErrorChanged(Some(error.user_message())));
                    return Err(error);
                }
            };

            self.uploading.store(true, Ordering::SeqCst);
            state.error = None;
            state.outcome = None;
            state.success = None;
            (state.mode, submission)
        };

        let mut pending = PendingUpload {
            uploading: &self.uploading,
            events: &self.events,
            settled: false,
        };
        self.emit(IngestEvent::UploadingChanged(true));
        self.emit(IngestEvent::ErrorChanged(None));

        tracing::info!(
            endpoint = %self.settings.endpoint,
            mode = ?mode,
            kind = submission.kind(),
            "document upload started"
        );

        let result = self
            .transport
            .post_document(&self.settings.endpoint, submission)
            .await
            .context(UploadSnafu {
                stage: "post-document",
            })
            .map(UploadOutcome::from)
            .and_then(|outcome| {
                ensure!(
                    outcome.success,
                    RejectedSnafu {
                        stage: "check-upload-success",
                        message: outcome.message.clone(),
                    }
                );
                Ok(outcome)
            });

        {
            let mut state = self.state.write().await;
            match &result {
                Ok(outcome) => {
                    state.outcome = Some(outcome.clone());
                    state.success = Some(UPLOAD_SUCCESS_MESSAGE.to_string());
                }
                Err(error) => state.error = Some(error.user_message()),
            }
        }
        self.uploading.store(false, Ordering::SeqCst);
        pending.settled = true;

        match &result {
            Ok(outcome) => {
                tracing::info!(
                    endpoint = %self.settings.endpoint,
                    processing_id = ?outcome.processing_id,
                    total_chunks = outcome.statistics.total_chunks,
                    "document upload succeeded"
                );
                self.emit(IngestEvent::Succeeded(outcome.clone()));
            }
            Err(error) => {
                tracing::error!(
                    endpoint = %self.settings.endpoint,
                    error = %error,
                    "document upload failed"
                );
                self.emit(IngestEvent::ErrorChanged(Some(error.user_message())));
            }
        }
        self.emit(IngestEvent::UploadingChanged(false));

        result
    }

    fn prepare(state: &IngestState) -> IngestResult<DocumentSubmission> {
        let metadata = &state.metadata;
        let submission = match state.mode {
            IngestMode::File => {
                let file = state.file.clone().context(MissingFileSnafu {
                    stage: "validate-file",
                })?;
                ensure_title(metadata)?;
                DocumentSubmission::Multipart {
                    file,
                    metadata: metadata.to_payload(IngestMode::File),
                }
            }
            IngestMode::Text => {
                ensure!(
                    !metadata.text_content.trim().is_empty(),
                    MissingTextSnafu {
                        stage: "validate-text"
                    }
                );
                ensure_title(metadata)?;
                DocumentSubmission::Json(metadata.to_payload(IngestMode::Text))
            }
        };
        Ok(submission)
    }

    async fn set_error(&self, error: Option<String>) {
        self.state.write().await.error = error.clone();
        self.emit(IngestEvent::ErrorChanged(error));
    }

    fn emit(&self, event: IngestEvent) {
        let _ = self.events.send(event);
    }
}

/// Clears the uploading flag when a `submit` future is dropped mid-upload.
struct PendingUpload<'a> {
    uploading: &'a AtomicBool,
    events: &'a broadcast::Sender<IngestEvent>,
    settled: bool,
}

impl Drop for PendingUpload<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.uploading.store(false, Ordering::SeqCst);
        let _ = self.events.send(IngestEvent::UploadingChanged(false));
    }
}

fn ensure_title(metadata: &UploadMetadata) -> IngestResult<()> {
    ensure!(
        !metadata.title.trim().is_empty(),
        MissingTitleSnafu {
            stage: "validate-title"
        }
    );
    Ok(())
}
