use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{config::ComplianceConfig, error::HookError};

use super::{ComplianceModel, ComplianceRequest};

const MAX_TOKENS: u32 = 20;

/// OpenAI-compatible chat-completion endpoint serving the compliance model.
#[derive(Debug, Clone)]
pub struct HttpComplianceModel {
    client: Client,
    endpoint_url: Url,
    model: String,
    api_key: Option<String>,
}

impl HttpComplianceModel {
    pub fn new(config: &ComplianceConfig) -> Result<Self, HookError> {
        if config.allow_insecure_tls {
            warn!(
                endpoint = %config.endpoint_url,
                "TLS certificate verification is disabled for the compliance endpoint"
            );
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.allow_insecure_tls)
            .build()
            .map_err(HookError::Client)?;

        Ok(Self {
            client,
            endpoint_url: config.endpoint_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Value,
}

#[async_trait]
impl ComplianceModel for HttpComplianceModel {
    async fn complete(&self, request: ComplianceRequest) -> Result<String, HookError> {
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_message,
                },
            ],
            stream: false,
            max_tokens: MAX_TOKENS,
        };

        let mut builder = self
            .client
            .post(self.endpoint_url.clone())
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| {
                warn!(?error, "compliance request failed");
                upstream(error)
            })?
            .error_for_status()
            .map_err(|error| {
                warn!(status = ?error.status(), "compliance endpoint returned error status");
                upstream(error)
            })?
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|error| {
                if error.is_decode() {
                    HookError::MalformedResponse(format!(
                        "failed to decode response body: {error}"
                    ))
                } else {
                    warn!(?error, "failed to read compliance response body");
                    upstream(error)
                }
            })?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| HookError::MalformedResponse("model returned no choices".to_owned()))?;

        extract_message_content(&choice.message.content).ok_or_else(|| {
            HookError::MalformedResponse("model returned no text content".to_owned())
        })
    }
}

fn upstream(error: reqwest::Error) -> HookError {
    debug!(error = ?error, "error in request to compliance model");
    HookError::Upstream(error)
}

fn extract_message_content(content: &Value) -> Option<String> {
    if let Some(text) = content.as_str() {
        return Some(text.to_owned());
    }

    let array = content.as_array()?;
    let joined = array
        .iter()
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");

    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{Json, Router, http::HeaderMap, http::StatusCode, routing::post};
    use serde_json::{Value, json};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        sync::Mutex,
    };

    use crate::{
        config::ComplianceConfig,
        error::HookError,
        model::{ComplianceModel, ComplianceRequest},
    };

    use super::{HttpComplianceModel, extract_message_content};

    type Seen = Arc<Mutex<Vec<Value>>>;

    async fn spawn_endpoint(status: StatusCode, body: Value) -> (String, Seen) {
        let seen: Seen = Arc::default();
        let recorder = seen.clone();
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(payload): Json<Value>| {
                let recorder = recorder.clone();
                let body = body.clone();
                async move {
                    let header = |name: &str| {
                        headers
                            .get(name)
                            .and_then(|value| value.to_str().ok())
                            .map(str::to_owned)
                    };
                    recorder.lock().await.push(json!({
                        "payload": payload,
                        "content_type": header("content-type"),
                        "authorization": header("authorization"),
                    }));
                    (status, Json(body))
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        (format!("http://{addr}/v1/chat/completions"), seen)
    }

    fn completion(content: Value) -> Value {
        json!({
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })
    }

    fn model_for(url: &str) -> HttpComplianceModel {
        let config = ComplianceConfig::new(url, "compliance-llm").expect("config should load");
        HttpComplianceModel::new(&config).expect("client should build")
    }

    fn request(message: &str) -> ComplianceRequest {
        ComplianceRequest {
            system_prompt: "classify".to_owned(),
            user_message: message.to_owned(),
        }
    }

    #[tokio::test]
    async fn sends_capped_non_streaming_request() {
        let (url, seen) = spawn_endpoint(StatusCode::OK, completion(json!("conform"))).await;
        let mut config = ComplianceConfig::new(&url, "compliance-llm").expect("config");
        config.api_key = Some("sk-compliance".to_owned());
        let model = HttpComplianceModel::new(&config).expect("client should build");

        let reply = model
            .complete(request("what is the weather"))
            .await
            .expect("request should succeed");
        assert_eq!(reply, "conform");

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0]["payload"],
            json!({
                "model": "compliance-llm",
                "messages": [
                    { "role": "system", "content": "classify" },
                    { "role": "user", "content": "what is the weather" }
                ],
                "stream": false,
                "max_tokens": 20
            })
        );
        assert_eq!(seen[0]["content_type"], "application/json");
        assert_eq!(seen[0]["authorization"], "Bearer sk-compliance");
    }

    #[tokio::test]
    async fn error_status_is_upstream_error() {
        let (url, _) = spawn_endpoint(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "overloaded" }),
        )
        .await;

        let result = model_for(&url).complete(request("hello")).await;
        let error = result.expect_err("500 should fail");
        assert!(matches!(error, HookError::Upstream(_)));
        assert!(error.is_surfaced());
    }

    #[tokio::test]
    async fn refused_connection_is_upstream_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let mut config =
            ComplianceConfig::new(&format!("http://{addr}/v1/chat/completions"), "compliance-llm")
                .expect("config");
        config.request_timeout = Duration::from_secs(2);
        let model = HttpComplianceModel::new(&config).expect("client should build");

        let error = model
            .complete(request("hello"))
            .await
            .expect_err("closed port should fail");
        assert!(error.is_surfaced());
    }

    #[tokio::test]
    async fn body_cut_short_is_upstream_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            // read the whole request before answering
            while let Ok(read) = socket.read(&mut buf).await {
                if read == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..read]);
                if request_complete(&raw) {
                    break;
                }
            }
            let _ = socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 200\r\n\r\n{\"choices\":",
                )
                .await;
            let _ = socket.shutdown().await;
        });

        let error = model_for(&format!("http://{addr}/v1/chat/completions"))
            .complete(request("hello"))
            .await
            .expect_err("truncated body should fail");

        assert!(matches!(error, HookError::Upstream(_)));
        assert!(error.is_surfaced());
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(head_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..head_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        raw.len() >= head_end + 4 + content_length
    }

    #[tokio::test]
    async fn missing_choices_is_malformed() {
        let (url, _) = spawn_endpoint(StatusCode::OK, json!({ "choices": [] })).await;

        let error = model_for(&url)
            .complete(request("hello"))
            .await
            .expect_err("empty choices should fail");
        assert!(matches!(error, HookError::MalformedResponse(_)));
        assert!(!error.is_surfaced());
    }

    #[tokio::test]
    async fn unexpected_body_is_malformed() {
        let (url, _) = spawn_endpoint(StatusCode::OK, json!({ "result": "conform" })).await;

        let error = model_for(&url)
            .complete(request("hello"))
            .await
            .expect_err("body without choices should fail");
        assert!(matches!(error, HookError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn insecure_tls_client_still_builds() {
        let mut config =
            ComplianceConfig::new("https://llm.internal/v1/chat/completions", "compliance-llm")
                .expect("config");
        config.allow_insecure_tls = true;

        assert!(HttpComplianceModel::new(&config).is_ok());
    }

    #[test]
    fn joins_content_parts() {
        let content = json!([{ "type": "text", "text": "compliance " }, { "type": "text", "text": "violation" }]);
        assert_eq!(
            extract_message_content(&content).as_deref(),
            Some("compliance violation")
        );
        assert_eq!(extract_message_content(&Value::Null), None);
    }
}
