use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::core::llm::{
    Completion, ModelCallError, ModelClient, ModelRequest, ModelStream, StreamEvent, StreamItem,
    Usage,
};

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Client for the Anthropic Messages API. Holds no per-call state.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    api_version: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, base_url: String, api_version: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            api_version,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            anyhow!(
                "No API key configured. Set {} or model.api_key in studio.toml.",
                crate::config::API_KEY_ENV
            )
        })?;
        Ok(Self::new(
            api_key,
            config.base_url.clone(),
            config.api_version.clone(),
        ))
    }

    async fn send(
        &self,
        request: &ModelRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ModelCallError> {
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.instructions,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            stream,
        };
        let res = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(ModelCallError::Api { status, body });
        }
        Ok(res)
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ModelCallError> {
        let response = self.send(&request, true).await?;
        let (tx, stream) = ModelStream::channel(64);
        tokio::spawn(pump_events(response, request.model, tx));
        Ok(stream)
    }

    async fn complete(&self, request: ModelRequest) -> Result<Completion, ModelCallError> {
        let response = self.send(&request, false).await?;
        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ModelCallError::Protocol(e.to_string()))?;
        Ok(completion_from_response(parsed, &request.model))
    }
}

fn completion_from_response(response: MessagesResponse, model: &str) -> Completion {
    let text = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");
    Completion {
        text,
        usage: Usage::new(model, response.usage.input_tokens, response.usage.output_tokens),
    }
}

async fn pump_events(response: reqwest::Response, model: String, tx: mpsc::Sender<StreamItem>) {
    let mut body = std::pin::pin!(response.bytes_stream());
    let mut buffer: Vec<u8> = Vec::new();
    let mut parser = SseParser::default();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.send(Err(e.into())).await;
                return;
            }
        };
        buffer.extend_from_slice(&chunk);

        while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&line);
            match parser.feed(line.trim_end()) {
                Ok(Some(SseSignal::Text(text))) => {
                    if tx.send(Ok(StreamEvent::Text(text))).await.is_err() {
                        debug!("Stream consumer went away; dropping remaining events");
                        return;
                    }
                }
                Ok(Some(SseSignal::Stop)) => {
                    let _ = tx
                        .send(Ok(StreamEvent::Completed(parser.usage(&model))))
                        .await;
                    return;
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    }
    warn!("Model stream closed without message_stop");
}

#[derive(Debug, PartialEq)]
enum SseSignal {
    Text(String),
    Stop,
}

/// Line-level reader for the Messages API event stream.
#[derive(Debug, Default)]
struct SseParser {
    input_tokens: u64,
    output_tokens: u64,
}

impl SseParser {
    fn feed(&mut self, line: &str) -> Result<Option<SseSignal>, ModelCallError> {
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            return Ok(None);
        }
        let event: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| ModelCallError::Protocol(format!("bad event payload: {e}")))?;

        match event["type"].as_str().unwrap_or_default() {
            "message_start" => {
                let usage = &event["message"]["usage"];
                self.input_tokens = usage["input_tokens"].as_u64().unwrap_or(0);
                if let Some(out) = usage["output_tokens"].as_u64() {
                    self.output_tokens = out;
                }
                Ok(None)
            }
            "content_block_delta" if event["delta"]["type"] == "text_delta" => Ok(event["delta"]
                ["text"]
                .as_str()
                .filter(|t| !t.is_empty())
                .map(|t| SseSignal::Text(t.to_string()))),
            "message_delta" => {
                // output_tokens here is cumulative for the message.
                if let Some(out) = event["usage"]["output_tokens"].as_u64() {
                    self.output_tokens = out;
                }
                Ok(None)
            }
            "message_stop" => Ok(Some(SseSignal::Stop)),
            "error" => {
                let message = event["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown stream error")
                    .to_string();
                Err(ModelCallError::Protocol(message))
            }
            _ => Ok(None),
        }
    }

    fn usage(&self, model: &str) -> Usage {
        Usage::new(model, self.input_tokens, self.output_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::header, response::IntoResponse, routing::post};

    const TRANSCRIPT: &str = "event: message_start\n\
data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":1000,\"output_tokens\":1}}}\n\
\n\
event: ping\n\
data: {\"type\":\"ping\"}\n\
\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"{\\\"ok\\\": \"}}\n\
\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"true}\"}}\n\
\n\
event: message_delta\n\
data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":1000}}\n\
\n\
event: message_stop\n\
data: {\"type\":\"message_stop\"}\n\n";

    fn request() -> ModelRequest {
        ModelRequest {
            instructions: "You are terse.".into(),
            prompt: "Say ok".into(),
            model: "claude-sonnet-4-5-20250929".into(),
            temperature: 0.7,
            max_tokens: 100,
        }
    }

    #[test]
    fn parser_accumulates_text_and_usage() {
        let mut parser = SseParser::default();
        let mut text = String::new();
        let mut stopped = false;
        for line in TRANSCRIPT.lines() {
            match parser.feed(line).unwrap() {
                Some(SseSignal::Text(t)) => text.push_str(&t),
                Some(SseSignal::Stop) => stopped = true,
                None => {}
            }
        }
        assert!(stopped);
        assert_eq!(text, "{\"ok\": true}");
        let usage = parser.usage("claude-sonnet-4-5-20250929");
        assert_eq!(usage.input_tokens, 1000);
        assert_eq!(usage.output_tokens, 1000);
        assert!((usage.cost_usd - 0.018).abs() < 1e-9);
    }

    #[test]
    fn parser_surfaces_error_events() {
        let mut parser = SseParser::default();
        let err = parser
            .feed(r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#)
            .unwrap_err();
        assert!(matches!(err, ModelCallError::Protocol(ref m) if m == "Overloaded"));
    }

    #[test]
    fn request_body_carries_system_and_stream_flag() {
        let req = request();
        let body = MessagesRequest {
            model: &req.model,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            system: &req.instructions,
            messages: vec![Message {
                role: "user",
                content: &req.prompt,
            }],
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["system"], "You are terse.");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["stream"], true);

        let blocking = MessagesRequest { stream: false, ..body };
        assert!(serde_json::to_value(&blocking).unwrap().get("stream").is_none());
    }

    #[test]
    fn blocking_response_joins_text_blocks() {
        let parsed: MessagesResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "{\"a\":"},
                {"type": "text", "text": "1}"}
            ],
            "usage": {"input_tokens": 5000, "output_tokens": 3000}
        }))
        .unwrap();
        let completion = completion_from_response(parsed, "claude-sonnet-4-5-20250929");
        assert_eq!(completion.text, "{\"a\":1}");
        assert!((completion.usage.cost_usd - 0.06).abs() < 1e-9);
    }

    async fn spawn_backend(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}/v1/messages", addr)
    }

    #[tokio::test]
    async fn stream_reads_events_from_backend() {
        let app = Router::new().route(
            "/v1/messages",
            post(|| async { ([(header::CONTENT_TYPE, "text/event-stream")], TRANSCRIPT).into_response() }),
        );
        let url = spawn_backend(app).await;
        let client = AnthropicClient::new(
            "test-key".into(),
            url,
            "2023-06-01".into(),
        );
        let completion = client.stream(request()).await.unwrap().collect().await.unwrap();
        assert_eq!(completion.text, "{\"ok\": true}");
        assert_eq!(completion.usage.total_tokens, 2000);
    }

    #[tokio::test]
    async fn backend_errors_become_api_errors() {
        let app = Router::new().route(
            "/v1/messages",
            post(|| async { (axum::http::StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let url = spawn_backend(app).await;
        let client = AnthropicClient::new(
            "test-key".into(),
            url,
            "2023-06-01".into(),
        );
        let err = client.complete(request()).await.unwrap_err();
        assert!(matches!(err, ModelCallError::Api { status: 429, ref body } if body == "slow down"));
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = ModelConfig::default();
        assert!(AnthropicClient::from_config(&config).is_err());
    }
}
