//! HTTP webhook responder.
//!
//! Posts `{"message":{"from":..,"text":..}}` to the configured URL and reads
//! the reply from the `response` (or `message`) field of the JSON response.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;
use warelay_core::{
    config::WebhookConfig, error::RelayError, message::WebhookReply, traits::Responder,
};

/// Responder backed by an external HTTP webhook.
pub struct WebhookResponder {
    client: reqwest::Client,
    url: String,
}

impl WebhookResponder {
    /// Create from config values.
    pub fn from_config(config: &WebhookConfig) -> Result<Self, RelayError> {
        Self::new(config.url.clone(), config.timeout())
    }

    /// Create a responder posting to `url`, abandoning calls after `timeout`.
    pub fn new(url: String, timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Webhook(format!("failed to build http client: {e}")))?;
        Ok(Self { client, url })
    }
}

// --- Serde types ---

#[derive(Serialize)]
struct WebhookRequest<'a> {
    message: WebhookPayload<'a>,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    from: &'a str,
    text: &'a str,
}

/// Interpret a success response body.
///
/// The reply is read from the first field present out of `response`,
/// `message` and `reply`. Webhooks answering `{"message": "success",
/// "response": "<text>"}` carry a status in `message`, so `response` wins.
///
/// A non-empty string is a reply; an empty string or `null` means "no
/// reply"; anything else is malformed.
pub fn parse_reply(body: &str) -> WebhookReply {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return WebhookReply::Malformed(format!("invalid JSON: {e}")),
    };

    let field = ["response", "message", "reply"]
        .into_iter()
        .find_map(|key| value.get(key).map(|v| (key, v)));
    match field {
        Some((_, Value::String(text))) if text.trim().is_empty() => WebhookReply::Empty,
        Some((_, Value::String(text))) => WebhookReply::Text(text.clone()),
        Some((_, Value::Null)) => WebhookReply::Empty,
        Some((key, other)) => WebhookReply::Malformed(format!("`{key}` is not a string: {other}")),
        None => WebhookReply::Malformed("body has no `response` or `message` field".to_string()),
    }
}

#[async_trait]
impl Responder for WebhookResponder {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn respond(&self, from: &str, text: &str) -> Result<WebhookReply, RelayError> {
        let body = WebhookRequest {
            message: WebhookPayload { from, text },
        };
        let start = Instant::now();

        debug!("webhook: POST {} from={from}", self.url);

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Timeout(format!("webhook did not answer: {e}"))
                } else {
                    RelayError::Webhook(format!("webhook request failed: {e}"))
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(RelayError::Webhook(format!(
                "webhook returned {status}: {text}"
            )));
        }

        let raw = resp
            .text()
            .await
            .map_err(|e| RelayError::Webhook(format!("failed to read webhook body: {e}")))?;

        let reply = parse_reply(&raw);
        if let WebhookReply::Malformed(ref why) = reply {
            debug!("webhook reply malformed: {why}");
        }
        debug!(
            "webhook answered in {}ms",
            start.elapsed().as_millis()
        );
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responder(server: &mockito::Server, timeout: Duration) -> WebhookResponder {
        WebhookResponder::new(format!("{}/webhook", server.url()), timeout).unwrap()
    }

    #[test]
    fn test_parse_reply_text() {
        assert_eq!(
            parse_reply(r#"{"message": "Seu saldo atual é R$ 1.000,00", "status": "success"}"#),
            WebhookReply::Text("Seu saldo atual é R$ 1.000,00".to_string())
        );
    }

    #[test]
    fn test_parse_reply_prefers_response_over_status_message() {
        assert_eq!(
            parse_reply(r#"{"message": "success", "response": "Olá! Como posso ajudar?"}"#),
            WebhookReply::Text("Olá! Como posso ajudar?".to_string())
        );
        assert_eq!(
            parse_reply(r#"{"message": "success", "response": ""}"#),
            WebhookReply::Empty
        );
    }

    #[test]
    fn test_parse_reply_alias() {
        assert_eq!(
            parse_reply(r#"{"reply": "hi"}"#),
            WebhookReply::Text("hi".to_string())
        );
    }

    #[test]
    fn test_parse_reply_empty_and_null() {
        assert_eq!(parse_reply(r#"{"message": ""}"#), WebhookReply::Empty);
        assert_eq!(parse_reply(r#"{"message": "   "}"#), WebhookReply::Empty);
        assert_eq!(parse_reply(r#"{"message": null}"#), WebhookReply::Empty);
    }

    #[test]
    fn test_parse_reply_malformed() {
        assert!(matches!(
            parse_reply(r#"{"status": "success"}"#),
            WebhookReply::Malformed(_)
        ));
        assert!(matches!(
            parse_reply(r#"{"message": {"text": "nested"}}"#),
            WebhookReply::Malformed(_)
        ));
        assert!(matches!(
            parse_reply("not json at all"),
            WebhookReply::Malformed(_)
        ));
    }

    #[tokio::test]
    async fn test_respond_sends_expected_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/webhook")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "message": {"from": "5511999887766", "text": "/saldo"}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "ok"}"#)
            .create_async()
            .await;

        let result = responder(&server, Duration::from_secs(5))
            .respond("5511999887766", "/saldo")
            .await;

        mock.assert_async().await;
        assert_eq!(result.unwrap(), WebhookReply::Text("ok".to_string()));
    }

    #[tokio::test]
    async fn test_respond_non_success_is_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/webhook")
            .with_status(500)
            .with_body(r#"{"status": "error", "message": "boom"}"#)
            .create_async()
            .await;

        let result = responder(&server, Duration::from_secs(5))
            .respond("5511", "oi")
            .await;

        mock.assert_async().await;
        let err = result.unwrap_err();
        assert!(matches!(err, RelayError::Webhook(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_respond_malformed_body_is_ok() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/webhook")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let result = responder(&server, Duration::from_secs(5))
            .respond("5511", "oi")
            .await;

        assert!(matches!(result, Ok(WebhookReply::Malformed(_))));
    }

    #[tokio::test]
    async fn test_respond_timeout_maps_to_timeout() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let responder =
            WebhookResponder::new(format!("http://{addr}/webhook"), Duration::from_millis(100))
                .unwrap();
        let result = responder.respond("5511", "oi").await;

        assert!(
            matches!(result, Err(RelayError::Timeout(_))),
            "expected timeout, got {result:?}"
        );
        server.abort();
    }

    #[tokio::test]
    async fn test_respond_unreachable_is_error() {
        // Nothing listens on port 9 (discard) in the test environment.
        let responder =
            WebhookResponder::new("http://127.0.0.1:9/webhook".into(), Duration::from_secs(2))
                .unwrap();
        let result = responder.respond("5511", "oi").await;
        assert!(result.is_err());
    }
}
