//! In-memory webhook transport for session tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use lexhook_webhook::{
    ChatPayload, DocumentSubmission, IngestResponse, TransportError, TransportResult,
    WebhookTransport,
};
use serde_json::Value;

pub(crate) enum ChatStep {
    Respond { after: Duration, body: Value },
    Fail(TransportError),
    /// Never answers.
    Hang,
}

pub(crate) enum DocumentStep {
    Respond(IngestResponse),
    Fail(TransportError),
    Hang,
}

/// Plays back queued responses and records every request it sees.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    chat_steps: Mutex<VecDeque<ChatStep>>,
    document_steps: Mutex<VecDeque<DocumentStep>>,
    chat_requests: Mutex<Vec<(String, ChatPayload)>>,
    document_requests: Mutex<Vec<(String, DocumentSubmission)>>,
    abandoned: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push_chat(&self, step: ChatStep) {
        self.chat_steps.lock().expect("chat steps").push_back(step);
    }

    pub(crate) fn push_document(&self, step: DocumentStep) {
        self.document_steps
            .lock()
            .expect("document steps")
            .push_back(step);
    }

    pub(crate) fn chat_requests(&self) -> Vec<(String, ChatPayload)> {
        self.chat_requests.lock().expect("chat requests").clone()
    }

    pub(crate) fn document_requests(&self) -> Vec<(String, DocumentSubmission)> {
        self.document_requests
            .lock()
            .expect("document requests")
            .clone()
    }

    /// Requests whose future was dropped before it produced a result.
    pub(crate) fn abandoned_requests(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }
}

/// Counts a request as abandoned unless it was marked finished.
struct RequestGuard {
    abandoned: Arc<AtomicUsize>,
    finished: bool,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub(crate) fn status_error(status: u16) -> TransportError {
    TransportError::Status {
        stage: "scripted",
        endpoint: "scripted".to_string(),
        status,
        body: "scripted failure".to_string(),
    }
}

impl WebhookTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    fn post_chat<'a>(
        &'a self,
        endpoint: &'a str,
        payload: ChatPayload,
    ) -> BoxFuture<'a, TransportResult<Value>> {
        self.chat_requests
            .lock()
            .expect("chat requests")
            .push((endpoint.to_string(), payload));
        let step = self
            .chat_steps
            .lock()
            .expect("chat steps")
            .pop_front()
            .unwrap_or(ChatStep::Hang);
        let guard = RequestGuard {
            abandoned: self.abandoned.clone(),
            finished: false,
        };

        async move {
            // Move the whole guard in; edition-2021 disjoint capture would
            // otherwise capture only `guard.finished` and drop it up front.
            let mut guard = guard;
            let result = match step {
                ChatStep::Respond { after, body } => {
                    tokio::time::sleep(after).await;
                    Ok(body)
                }
                ChatStep::Fail(error) => Err(error),
                ChatStep::Hang => futures::future::pending().await,
            };
            guard.finished = true;
            result
        }
        .boxed()
    }

    fn post_document<'a>(
        &'a self,
        endpoint: &'a str,
        submission: DocumentSubmission,
    ) -> BoxFuture<'a, TransportResult<IngestResponse>> {
        self.document_requests
            .lock()
            .expect("document requests")
            .push((endpoint.to_string(), submission));
        let step = self
            .document_steps
            .lock()
            .expect("document steps")
            .pop_front()
            .unwrap_or(DocumentStep::Hang);

        async move {
            match step {
                DocumentStep::Respond(response) => Ok(response),
                DocumentStep::Fail(error) => Err(error),
                DocumentStep::Hang => futures::future::pending().await,
            }
        }
        .boxed()
    }
}
