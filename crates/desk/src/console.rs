//! Line-oriented terminal front end for both sessions.
//!
//! The chat loop reads drafts from `input` and renders session events on
//! `output` from a separate task, so the delay notice shows up while a request
//! is still pending.

use std::path::PathBuf;
use std::sync::Arc;

use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot};

use crate::chat::{ChatEvent, ComposerKey, ConversationSession, Message, Origin};
use crate::ingest::{
    Category, IngestError, IngestMode, IngestSession, MetadataField, UPLOAD_SUCCESS_MESSAGE,
    UploadOutcome,
};

pub const DELAY_NOTICE_LINE: &str = "Taking longer than usual...";
pub const ASSISTANT_PREFIX: &str = "assistant> ";
const QUIT_COMMANDS: [&str; 2] = ["/quit", "/exit"];

pub type ConsoleResult<T> = Result<T, ConsoleError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConsoleError {
    #[snafu(display("failed to read input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to write output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("renderer task stopped on `{stage}`: {source}"))]
    Renderer {
        stage: &'static str,
        source: tokio::task::JoinError,
    },
    #[snafu(display("upload failed on `{stage}`: {source}"))]
    Upload {
        stage: &'static str,
        source: IngestError,
    },
}

/// Runs an interactive chat until `input` ends or a quit command is read.
///
/// Returns the writer once the renderer has flushed every event.
pub async fn run_chat<R, W>(
    session: Arc<ConversationSession>,
    mut input: R,
    output: W,
) -> ConsoleResult<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let events = session.subscribe();
    let transcript = session.transcript().await;
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let renderer = tokio::spawn(render_chat(transcript, events, shutdown_rx, output));

    let mut line = String::new();
    loop {
        line.clear();
        let read = input.read_line(&mut line).await.context(ReadInputSnafu {
            stage: "read-chat-line",
        })?;
        if read == 0 {
            break;
        }

        let draft = line.trim_end_matches(['\r', '\n']);
        if QUIT_COMMANDS.contains(&draft.trim()) {
            break;
        }

        session.set_draft(draft).await;
        session.handle_key(ComposerKey::Commit).await;
    }

    let _ = shutdown_tx.send(());
    renderer.await.context(RendererSnafu {
        stage: "join-chat-renderer",
    })?
}

async fn render_chat<W>(
    transcript: Vec<Message>,
    mut events: broadcast::Receiver<ChatEvent>,
    mut shutdown: oneshot::Receiver<()>,
    mut output: W,
) -> ConsoleResult<W>
where
    W: AsyncWrite + Unpin,
{
    for message in &transcript {
        write_message(&mut output, message).await?;
    }

    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Ok(event) => write_chat_event(&mut output, &event).await?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "chat renderer fell behind");
                }
                Err(RecvError::Closed) => break,
            },
            _ = &mut shutdown => break,
        }
    }

    output.flush().await.context(WriteOutputSnafu {
        stage: "flush-chat-output",
    })?;
    Ok(output)
}

async fn write_chat_event<W>(output: &mut W, event: &ChatEvent) -> ConsoleResult<()>
where
    W: AsyncWrite + Unpin,
{
    match event {
        ChatEvent::MessageAppended { message, .. } => write_message(output, message).await,
        ChatEvent::DelayNoticeChanged(true) => write_line(output, DELAY_NOTICE_LINE).await,
        ChatEvent::DelayNoticeChanged(false)
        | ChatEvent::DraftChanged(_)
        | ChatEvent::InFlightChanged(_) => Ok(()),
    }
}

async fn write_message<W>(output: &mut W, message: &Message) -> ConsoleResult<()>
where
    W: AsyncWrite + Unpin,
{
    // The terminal already shows what the user typed.
    if message.origin() == Origin::User {
        return Ok(());
    }
    write_line(output, &format!("{ASSISTANT_PREFIX}{}", message.text())).await
}

async fn write_line<W>(output: &mut W, line: &str) -> ConsoleResult<()>
where
    W: AsyncWrite + Unpin,
{
    output
        .write_all(format!("{line}\n").as_bytes())
        .await
        .context(WriteOutputSnafu { stage: "write-line" })?;
    output
        .flush()
        .await
        .context(WriteOutputSnafu { stage: "flush-line" })
}

/// Form input for a one-shot upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadForm {
    pub file: Option<PathBuf>,
    pub text: Option<String>,
    pub category: Option<Category>,
    pub fields: Vec<(MetadataField, String)>,
}

impl UploadForm {
    /// File wins over text when both are given.
    pub fn mode(&self) -> IngestMode {
        if self.file.is_none() && self.text.is_some() {
            IngestMode::Text
        } else {
            IngestMode::File
        }
    }

    async fn apply(&self, session: &IngestSession) -> Result<(), IngestError> {
        session.set_mode(self.mode()).await;
        if let Some(category) = self.category {
            session.set_category(category).await;
        }
        for (field, value) in &self.fields {
            session.set_field(*field, value.clone()).await;
        }
        if let Some(text) = &self.text {
            session.set_field(MetadataField::TextContent, text.clone()).await;
        }
        if let Some(path) = &self.file {
            session.select_file_from_path(path).await?;
        }
        Ok(())
    }
}

/// Fills the form, submits it once and reports the result on `output`.
pub async fn run_upload<W>(
    session: &IngestSession,
    form: &UploadForm,
    output: &mut W,
) -> ConsoleResult<UploadOutcome>
where
    W: AsyncWrite + Unpin,
{
    let result = match form.apply(session).await {
        Ok(()) => session.submit().await,
        Err(error) => Err(error),
    };

    match result {
        Ok(outcome) => {
            write_outcome(output, &outcome).await?;
            Ok(outcome)
        }
        Err(error) => {
            write_line(output, &error.user_message()).await?;
            Err(error).context(UploadSnafu {
                stage: "submit-upload",
            })
        }
    }
}

async fn write_outcome<W>(output: &mut W, outcome: &UploadOutcome) -> ConsoleResult<()>
where
    W: AsyncWrite + Unpin,
{
    write_line(output, UPLOAD_SUCCESS_MESSAGE).await?;
    if !outcome.message.is_empty() {
        write_line(output, &format!("  message: {}", outcome.message)).await?;
    }
    if let Some(processing_id) = &outcome.processing_id {
        write_line(output, &format!("  processing id: {processing_id}")).await?;
    }
    if let Some(collection) = &outcome.collection {
        write_line(output, &format!("  collection: {collection}")).await?;
    }

    let statistics = &outcome.statistics;
    write_line(
        output,
        &format!(
            "  chunks: {} total, {} stored, {} failed ({} characters)",
            statistics.total_chunks,
            statistics.successful_insertions,
            statistics.failed_insertions,
            statistics.original_document_length
        ),
    )
    .await?;

    if let Some(timestamp) = outcome.timestamp {
        write_line(output, &format!("  processed at: {}", timestamp.to_rfc3339())).await?;
    }
    Ok(())
}
