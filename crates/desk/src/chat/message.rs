use std::time::Duration;

/// Shown when the webhook answers without a usable reply.
pub const FALLBACK_REPLY: &str = "I'm sorry, I didn't get that.";
/// Shown for every failure that is not a timeout.
pub const GENERIC_FAILURE_REPLY: &str = "⚠️ Sorry, something went wrong. Please try again later.";

/// Who authored a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    User,
    Assistant,
}

/// One transcript entry. Fields are fixed once the message exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    origin: Origin,
    text: String,
}

impl Message {
    pub fn new(origin: Origin, text: impl Into<String>) -> Self {
        Self {
            origin,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Origin::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Origin::Assistant, text)
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Assistant line used when the response deadline elapses.
pub fn timeout_reply(after: Duration) -> String {
    format!(
        "⚠️ Request timed out after {}. Please try again or rephrase your question.",
        describe_duration(after)
    )
}

fn describe_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis >= 60_000 && millis % 60_000 == 0 {
        plural(millis / 60_000, "minute")
    } else if millis >= 1_000 && millis % 1_000 == 0 {
        plural(millis / 1_000, "second")
    } else {
        plural(millis, "millisecond")
    }
}

fn plural(count: u128, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_reply_names_the_deadline() {
        assert_eq!(
            timeout_reply(Duration::from_secs(120)),
            "⚠️ Request timed out after 2 minutes. Please try again or rephrase your question."
        );
        assert!(timeout_reply(Duration::from_secs(60)).contains("after 1 minute."));
        assert!(timeout_reply(Duration::from_secs(45)).contains("after 45 seconds."));
        assert!(timeout_reply(Duration::from_millis(1_500)).contains("after 1500 milliseconds."));
    }

    #[test]
    fn constructors_fix_the_origin() {
        assert_eq!(Message::user("hi").origin(), Origin::User);
        assert_eq!(Message::assistant("hello").origin(), Origin::Assistant);
        assert_eq!(Message::assistant("hello").text(), "hello");
    }
}
