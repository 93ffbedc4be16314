use std::time::Duration;

use lexhook_webhook::TransportError;
use snafu::Snafu;

use crate::chat::message::Message;

/// State-change notification published by a conversation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A message landed at `index`; views scroll to it.
    MessageAppended { index: usize, message: Message },
    DraftChanged(String),
    InFlightChanged(bool),
    /// The "taking longer than usual" notice became visible or hidden.
    DelayNoticeChanged(bool),
}

/// Keys the composer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerKey {
    Char(char),
    Backspace,
    /// Sends the current draft.
    Commit,
}

/// How one `submit` call ended.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Blank draft, nothing sent.
    Ignored,
    /// Another exchange is still pending, nothing sent.
    Busy,
    Answered(Message),
    /// The exchange failed; `reply` is the assistant line that was appended.
    Failed { reply: Message, error: ChatError },
}

impl SubmitOutcome {
    /// Assistant message appended by this call, if any.
    pub fn reply(&self) -> Option<&Message> {
        match self {
            Self::Answered(reply) | Self::Failed { reply, .. } => Some(reply),
            Self::Ignored | Self::Busy => None,
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("chat webhook did not answer within {after:?}"))]
    TimedOut {
        stage: &'static str,
        after: Duration,
    },
    #[snafu(display("chat exchange failed on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        source: TransportError,
    },
}

impl ChatError {
    /// Deadline expiry and transport-reported timeouts share one user message.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::TimedOut { .. } => true,
            Self::Transport { source, .. } => source.is_timeout(),
        }
    }
}
