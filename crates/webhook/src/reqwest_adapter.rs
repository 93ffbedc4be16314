use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use snafu::ResultExt;

use super::transport::{
    AttachmentPartSnafu, BuildClientSnafu, DecodeBodySnafu, DocumentSubmission,
    EncodeMetadataSnafu, FileAttachment, ReadBodySnafu, SendSnafu, StatusSnafu, TransportConfig,
    TransportResult, WebhookTransport,
};
use super::wire::{ChatPayload, DocumentPayload, IngestResponse};

pub const REQWEST_TRANSPORT_NAME: &str = "reqwest";

/// HTTP transport backed by a pooled `reqwest` client.
pub struct ReqwestTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl ReqwestTransport {
    pub fn new(config: TransportConfig) -> TransportResult<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str());
        if let Some(request_timeout) = config.request_timeout {
            builder = builder.timeout(request_timeout);
        }

        let client = builder.build().context(BuildClientSnafu {
            stage: "build-client",
        })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    async fn send_chat(&self, endpoint: &str, payload: ChatPayload) -> TransportResult<Value> {
        tracing::debug!(
            endpoint = %endpoint,
            message_len = payload.message.len(),
            "posting chat message"
        );

        let response = self
            .client
            .post(endpoint)
            .json(&payload)
            .send()
            .await
            .context(SendSnafu {
                stage: "send-chat",
                endpoint,
            })?;

        let body = Self::read_success_body(endpoint, response).await?;
        Ok(Self::body_to_value(&body))
    }

    async fn send_document(
        &self,
        endpoint: &str,
        submission: DocumentSubmission,
    ) -> TransportResult<IngestResponse> {
        tracing::debug!(
            endpoint = %endpoint,
            kind = submission.kind(),
            "posting document"
        );

        let request = self.client.post(endpoint);
        let request = match submission {
            DocumentSubmission::Json(metadata) => request.json(&metadata),
            DocumentSubmission::Multipart { file, metadata } => {
                request.multipart(Self::build_form(file, &metadata)?)
            }
        };

        let response = request.send().await.context(SendSnafu {
            stage: "send-document",
            endpoint,
        })?;

        let body = Self::read_success_body(endpoint, response).await?;
        if body.trim().is_empty() {
            return Ok(IngestResponse::default());
        }

        serde_json::from_str(&body).context(DecodeBodySnafu {
            stage: "decode-ingest-response",
            endpoint,
        })
    }

    fn build_form(file: FileAttachment, metadata: &DocumentPayload) -> TransportResult<Form> {
        let metadata = serde_json::to_string(metadata).context(EncodeMetadataSnafu {
            stage: "encode-multipart-metadata",
        })?;

        let FileAttachment {
            file_name,
            mime_type,
            bytes,
        } = file;
        let part = Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str(&mime_type)
            .context(AttachmentPartSnafu {
                stage: "attachment-mime",
                file_name,
            })?;

        Ok(Form::new().part("file", part).text("metadata", metadata))
    }

    async fn read_success_body(
        endpoint: &str,
        response: reqwest::Response,
    ) -> TransportResult<String> {
        let status = response.status();
        let body = response.text().await.context(ReadBodySnafu {
            stage: "read-response",
            endpoint,
        })?;

        if !status.is_success() {
            tracing::warn!(
                endpoint = %endpoint,
                status = status.as_u16(),
                "webhook answered with a non-success status"
            );
            return StatusSnafu {
                stage: "response-status",
                endpoint,
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        Ok(body)
    }

    fn body_to_value(body: &str) -> Value {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }

        // Workflows configured to "respond with text" send a bare string.
        serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(body.to_string()))
    }
}

impl WebhookTransport for ReqwestTransport {
    fn name(&self) -> &str {
        REQWEST_TRANSPORT_NAME
    }

    fn post_chat<'a>(
        &'a self,
        endpoint: &'a str,
        payload: ChatPayload,
    ) -> BoxFuture<'a, TransportResult<Value>> {
        self.send_chat(endpoint, payload).boxed()
    }

    fn post_document<'a>(
        &'a self,
        endpoint: &'a str,
        submission: DocumentSubmission,
    ) -> BoxFuture<'a, TransportResult<IngestResponse>> {
        self.send_document(endpoint, submission).boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::transport::TransportError;

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new(TransportConfig::default()).expect("client should build")
    }

    fn lease_payload(text_content: Option<&str>) -> DocumentPayload {
        DocumentPayload {
            title: "Lease".to_string(),
            author: "J. Doe".to_string(),
            category: "contract".to_string(),
            court: String::new(),
            case_number: "CV-12".to_string(),
            date: "2024-05-01".to_string(),
            tags: vec!["lease".to_string(), "tenancy".to_string()],
            description: String::new(),
            text_content: text_content.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn chat_posts_message_and_returns_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook/legal-query"))
            .and(body_json(json!({ "message": "what is a lien?" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "a claim" })))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = format!("{}/webhook/legal-query", server.uri());
        let body = transport()
            .post_chat(&endpoint, ChatPayload::new("what is a lien?"))
            .await
            .expect("chat request should succeed");

        assert_eq!(body, json!({ "response": "a claim" }));
    }

    #[tokio::test]
    async fn chat_keeps_plain_text_bodies_as_strings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("plain reply"))
            .mount(&server)
            .await;

        let body = transport()
            .post_chat(&server.uri(), ChatPayload::new("hi"))
            .await
            .expect("chat request should succeed");

        assert_eq!(body, Value::String("plain reply".to_string()));
    }

    #[tokio::test]
    async fn server_errors_surface_status_and_are_not_timeouts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("workflow crashed"))
            .mount(&server)
            .await;

        let error = transport()
            .post_chat(&server.uri(), ChatPayload::new("hi"))
            .await
            .expect_err("500 must fail");

        match &error {
            TransportError::Status { status, body, .. } => {
                assert_eq!(*status, 500);
                assert_eq!(body, "workflow crashed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!error.is_timeout());
    }

    #[tokio::test]
    async fn client_deadline_is_classified_as_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "response": "late" }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let config = TransportConfig::default().with_request_timeout(Duration::from_millis(50));
        let transport = ReqwestTransport::new(config).expect("client should build");

        let error = transport
            .post_chat(&server.uri(), ChatPayload::new("hi"))
            .await
            .expect_err("request should time out");

        assert!(error.is_timeout(), "expected timeout, got {error:?}");
    }

    #[tokio::test]
    async fn text_submission_posts_metadata_json() {
        let server = MockServer::start().await;
        let payload = lease_payload(Some("full lease text"));
        Mock::given(method("POST"))
            .and(path("/webhook/ingest-legal-document"))
            .and(body_json(json!({
                "title": "Lease",
                "author": "J. Doe",
                "category": "contract",
                "court": "",
                "case_number": "CV-12",
                "date": "2024-05-01",
                "tags": ["lease", "tenancy"],
                "description": "",
                "text_content": "full lease text"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "stored",
                "processingId": "proc-1",
                "statistics": { "totalChunks": 4 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = format!("{}/webhook/ingest-legal-document", server.uri());
        let response = transport()
            .post_document(&endpoint, DocumentSubmission::Json(payload))
            .await
            .expect("text upload should succeed");

        assert_eq!(response.success, Some(true));
        assert_eq!(response.processing_id.as_deref(), Some("proc-1"));
        assert_eq!(response.statistics.total_chunks, 4);
    }

    #[tokio::test]
    async fn file_submission_sends_file_and_metadata_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&server)
            .await;

        let submission = DocumentSubmission::Multipart {
            file: FileAttachment::new("ruling.txt", b"the court finds".to_vec()),
            metadata: lease_payload(None),
        };
        transport()
            .post_document(&server.uri(), submission)
            .await
            .expect("file upload should succeed");

        let requests = server
            .received_requests()
            .await
            .expect("request recording is enabled by default");
        assert_eq!(requests.len(), 1);

        let content_type = requests[0]
            .headers
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(content_type.starts_with("multipart/form-data"));

        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"file\"; filename=\"ruling.txt\""));
        assert!(body.contains("the court finds"));
        assert!(body.contains("name=\"metadata\""));
        assert!(body.contains("\"text_content\":null"));
        assert!(body.contains("\"tags\":[\"lease\",\"tenancy\"]"));
    }

    #[tokio::test]
    async fn empty_ingest_body_decodes_to_default_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let response = transport()
            .post_document(&server.uri(), DocumentSubmission::Json(lease_payload(Some("x"))))
            .await
            .expect("empty 200 should be accepted");

        assert_eq!(response, IngestResponse::default());
    }
}
