use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lexhook_webhook::{ChatPayload, WebhookTransport, extract_reply};
use snafu::ResultExt;
use tokio::sync::{RwLock, broadcast};

use crate::chat::events::{
    ChatEvent, ChatResult, ComposerKey, SubmitOutcome, TimedOutSnafu, TransportSnafu,
};
use crate::chat::message::{FALLBACK_REPLY, GENERIC_FAILURE_REPLY, Message, timeout_reply};
use crate::settings::ChatSettings;

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Observable state of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    pub transcript: Vec<Message>,
    pub draft: String,
    pub in_flight: bool,
    pub delayed: bool,
}

#[derive(Debug, Default)]
struct Conversation {
    transcript: Vec<Message>,
    draft: String,
}

/// One chat view's worth of state plus the request/response cycle behind it.
///
/// At most one exchange is pending at a time; a second `submit` while one is
/// in flight is rejected with [`SubmitOutcome::Busy`].
pub struct ConversationSession {
    settings: ChatSettings,
    transport: Arc<dyn WebhookTransport>,
    state: RwLock<Conversation>,
    /// Kept outside the lock so a dropped exchange can always release it.
    in_flight: AtomicBool,
    delayed: AtomicBool,
    events: broadcast::Sender<ChatEvent>,
}

impl ConversationSession {
    pub fn new(settings: ChatSettings, transport: Arc<dyn WebhookTransport>) -> Self {
        let mut state = Conversation::default();
        if let Some(greeting) = settings.greeting() {
            state.transcript.push(Message::assistant(greeting));
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            settings,
            transport,
            state: RwLock::new(state),
            in_flight: AtomicBool::new(false),
            delayed: AtomicBool::new(false),
            events,
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> ChatState {
        let state = self.state.read().await;
        ChatState {
            transcript: state.transcript.clone(),
            draft: state.draft.clone(),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            delayed: self.delayed.load(Ordering::SeqCst),
        }
    }

    pub async fn transcript(&self) -> Vec<Message> {
        self.state.read().await.transcript.clone()
    }

    pub async fn set_draft(&self, draft: impl Into<String>) {
        let draft = draft.into();
        self.state.write().await.draft = draft.clone();
        self.emit(ChatEvent::DraftChanged(draft));
    }

    /// Applies one composer key; `Commit` submits the current draft.
    pub async fn handle_key(&self, key: ComposerKey) -> Option<SubmitOutcome> {
        let draft = {
            let mut state = self.state.write().await;
            match key {
                ComposerKey::Char(ch) => state.draft.push(ch),
                ComposerKey::Backspace => {
                    state.draft.pop();
                }
                ComposerKey::Commit => {
                    let draft = state.draft.clone();
                    drop(state);
                    return Some(self.submit(draft).await);
                }
            }
            state.draft.clone()
        };

        self.emit(ChatEvent::DraftChanged(draft));
        None
    }

    /// Sends `draft` to the chat webhook and appends the reply.
    ///
    /// The user message is appended before the request goes out. Exactly one
    /// assistant message follows, whether the exchange succeeds, fails or
    /// times out.
    pub async fn submit(&self, draft: impl Into<String>) -> SubmitOutcome {
        let draft = draft.into();
        if draft.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }

        let user_message = Message::user(draft.clone());
        let index = {
            let mut state = self.state.write().await;
            if self
                .in_flight
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                tracing::warn!(
                    endpoint = %self.settings.endpoint,
                    "rejecting chat submit while another exchange is pending"
                );
                return SubmitOutcome::Busy;
            }

            state.transcript.push(user_message.clone());
            state.draft.clear();
            state.transcript.len() - 1
        };

        let mut pending = PendingExchange {
            in_flight: &self.in_flight,
            delayed: &self.delayed,
            events: &self.events,
            settled: false,
        };

        self.emit(ChatEvent::MessageAppended {
            index,
            message: user_message,
        });
        self.emit(ChatEvent::DraftChanged(String::new()));
        self.emit(ChatEvent::InFlightChanged(true));

        tracing::info!(
            endpoint = %self.settings.endpoint,
            transport = self.transport.name(),
            message_len = draft.len(),
            "chat exchange started"
        );

        let (reply, error) = match self.exchange(ChatPayload::new(draft)).await {
            Ok(text) => {
                tracing::info!(reply_len = text.len(), "chat exchange answered");
                (Message::assistant(text), None)
            }
            Err(error) => {
                let text = if error.is_timeout() {
                    timeout_reply(self.settings.response_timeout())
                } else {
                    GENERIC_FAILURE_REPLY.to_string()
                };
                tracing::error!(
                    endpoint = %self.settings.endpoint,
                    timeout = error.is_timeout(),
                    error = %error,
                    "chat exchange failed"
                );
                (Message::assistant(text), Some(error))
            }
        };

        let index = {
            let mut state = self.state.write().await;
            state.transcript.push(reply.clone());
            state.transcript.len() - 1
        };
        let was_delayed = self.delayed.swap(false, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);
        pending.settled = true;

        self.emit(ChatEvent::MessageAppended {
            index,
            message: reply.clone(),
        });
        if was_delayed {
            self.emit(ChatEvent::DelayNoticeChanged(false));
        }
        self.emit(ChatEvent::InFlightChanged(false));

        match error {
            None => SubmitOutcome::Answered(reply),
            Some(error) => SubmitOutcome::Failed { reply, error },
        }
    }

    /// Races the request against the delay-notice and deadline timers.
    ///
    /// Both timers and the request future live in this frame, so returning
    /// disposes of whichever has not fired yet. On deadline the request future
    /// is dropped, which aborts the underlying HTTP call.
    async fn exchange(&self, payload: ChatPayload) -> ChatResult<String> {
        let deadline = self.settings.response_timeout();
        let mut request = self.transport.post_chat(&self.settings.endpoint, payload);
        let delay_notice = tokio::time::sleep(self.settings.delay_notice());
        let timeout = tokio::time::sleep(deadline);
        tokio::pin!(delay_notice, timeout);

        let mut notice_shown = false;
        let body = loop {
            tokio::select! {
                biased;
                result = &mut request => {
                    break result.context(TransportSnafu { stage: "post-chat" })?;
                }
                _ = &mut timeout => {
                    tracing::warn!(
                        endpoint = %self.settings.endpoint,
                        deadline_ms = deadline.as_millis() as u64,
                        "chat request cancelled at deadline"
                    );
                    return TimedOutSnafu {
                        stage: "response-deadline",
                        after: deadline,
                    }
                    .fail();
                }
                _ = &mut delay_notice, if !notice_shown => {
                    notice_shown = true;
                    self.show_delay_notice();
                }
            }
        };

        Ok(extract_reply(&body, self.settings.reply_shape)
            .unwrap_or_else(|| FALLBACK_REPLY.to_string()))
    }

    fn show_delay_notice(&self) {
        if !self.in_flight.load(Ordering::SeqCst) {
            return;
        }
        self.delayed.store(true, Ordering::SeqCst);
        tracing::info!(
            endpoint = %self.settings.endpoint,
            "chat request is taking longer than usual"
        );
        self.emit(ChatEvent::DelayNoticeChanged(true));
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine; state stays queryable through `snapshot`.
        let _ = self.events.send(event);
    }
}

/// Clears the in-flight flags when a `submit` future is dropped mid-exchange.
struct PendingExchange<'a> {
    in_flight: &'a AtomicBool,
    delayed: &'a AtomicBool,
    events: &'a broadcast::Sender<ChatEvent>,
    settled: bool,
}

impl Drop for PendingExchange<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let was_delayed = self.delayed.swap(false, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);
        if was_delayed {
            let _ = self.events.send(ChatEvent::DelayNoticeChanged(false));
        }
        let _ = self.events.send(ChatEvent::InFlightChanged(false));
    }
}
