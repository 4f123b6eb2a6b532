//! `webhook` jobs: deliver a JSON body to an HTTP endpoint.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use taskflow::prelude::*;
use tracing::info;

/// Per-request timeout applied by the client.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Payload of a `webhook` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Target URL.
    pub url: String,
    /// HTTP method. Empty or absent means `POST`.
    #[serde(default)]
    pub method: Option<String>,
    /// Extra request headers. These override `Content-Type`.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request body, sent as JSON.
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

/// Delivers `webhook` jobs.
#[derive(Debug, Clone)]
pub struct WebhookHandler {
    client: Client,
}

impl WebhookHandler {
    /// Handler with a [`REQUEST_TIMEOUT`] client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }

    fn method(payload: &WebhookPayload) -> Result<Method, HandlerError> {
        match payload.method.as_deref().map(str::trim) {
            None | Some("") => Ok(Method::POST),
            Some(method) => Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|_| HandlerError::new(format!("invalid http method '{method}'"))),
        }
    }

    fn headers(payload: &WebhookPayload) -> Result<HeaderMap, HandlerError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &payload.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| HandlerError::new(format!("invalid header name '{name}'")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| HandlerError::new(format!("invalid value for header '{name}'")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl Handler for WebhookHandler {
    async fn handle(&self, ctx: &CancellationToken, job: &Job) -> Result<(), HandlerError> {
        let payload: WebhookPayload = serde_json::from_value(job.payload.clone())?;
        let method = Self::method(&payload)?;

        let mut request = self
            .client
            .request(method.clone(), &payload.url)
            .headers(Self::headers(&payload)?);
        if let Some(body) = &payload.body {
            request = request.body(serde_json::to_vec(body)?);
        }

        let response = ctx
            .run_until_cancelled(request.send())
            .await
            .ok_or_else(|| HandlerError::new("webhook delivery cancelled"))?
            .map_err(|e| HandlerError::new(format!("send request: {e}")))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(HandlerError::new(format!(
                "webhook failed with status {}",
                status.as_u16()
            )));
        }

        info!(url = %payload.url, %method, status = status.as_u16(), "Webhook delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn webhook_job(payload: &serde_json::Value) -> Job {
        Job::new("webhook", payload).unwrap()
    }

    #[tokio::test]
    async fn test_posts_json_body_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/order"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({ "order": 42 })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let job = webhook_job(&json!({
            "url": format!("{}/hooks/order", server.uri()),
            "body": { "order": 42 },
        }));
        WebhookHandler::new()
            .unwrap()
            .handle(&CancellationToken::new(), &job)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_custom_method_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/hooks"))
            .and(header("x-signature", "abc123"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let job = webhook_job(&json!({
            "url": format!("{}/hooks", server.uri()),
            "method": "put",
            "headers": { "X-Signature": "abc123" },
            "body": {},
        }));
        WebhookHandler::new()
            .unwrap()
            .handle(&CancellationToken::new(), &job)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_status_fails_the_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let job = webhook_job(&json!({ "url": server.uri(), "body": {} }));
        let err = WebhookHandler::new()
            .unwrap()
            .handle(&CancellationToken::new(), &job)
            .await
            .unwrap_err();
        assert_eq!(err.message(), "webhook failed with status 503");
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        token.cancel();
        let job = webhook_job(&json!({ "url": server.uri() }));
        let err = WebhookHandler::new()
            .unwrap()
            .handle(&token, &job)
            .await
            .unwrap_err();
        assert_eq!(err.message(), "webhook delivery cancelled");
    }

    #[tokio::test]
    async fn test_missing_url_is_invalid_payload() {
        let err = WebhookHandler::new()
            .unwrap()
            .handle(&CancellationToken::new(), &webhook_job(&json!({ "body": {} })))
            .await
            .unwrap_err();
        assert!(err.message().starts_with("invalid payload"));
    }

    #[test]
    fn test_method_defaults_to_post() {
        let mut payload = WebhookPayload {
            url: "http://localhost".to_string(),
            method: None,
            headers: HashMap::new(),
            body: None,
        };
        assert_eq!(WebhookHandler::method(&payload).unwrap(), Method::POST);

        payload.method = Some(String::new());
        assert_eq!(WebhookHandler::method(&payload).unwrap(), Method::POST);

        payload.method = Some("delete".to_string());
        assert_eq!(WebhookHandler::method(&payload).unwrap(), Method::DELETE);
    }
}
