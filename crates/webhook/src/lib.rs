use std::sync::Arc;

mod reqwest_adapter;
mod transport;
mod wire;

pub use reqwest_adapter::{REQWEST_TRANSPORT_NAME, ReqwestTransport};
pub use transport::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_USER_AGENT, DocumentSubmission, FileAttachment,
    TransportConfig, TransportError, TransportResult, WebhookTransport,
};
pub use wire::{
    ChatPayload, DocumentPayload, IngestResponse, IngestStatistics, ReplyShape, extract_reply,
};

/// Builds the production transport shared by both sessions.
pub fn create_transport(config: TransportConfig) -> TransportResult<Arc<dyn WebhookTransport>> {
    Ok(Arc::new(ReqwestTransport::new(config)?))
}
