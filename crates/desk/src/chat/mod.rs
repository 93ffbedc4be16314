pub mod events;
pub mod message;
pub mod session;

pub use events::{ChatError, ChatEvent, ChatResult, ComposerKey, SubmitOutcome};
pub use message::{FALLBACK_REPLY, GENERIC_FAILURE_REPLY, Message, Origin, timeout_reply};
pub use session::{ChatState, ConversationSession};
