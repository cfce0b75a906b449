pub mod anthropic;
pub mod pricing;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use pricing::calculate_cost;

/// One model call: the instruction template plus the rendered prompt.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub instructions: String,
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Token accounting for a single call. Produced once per call; never shared between calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

impl Usage {
    pub fn new(model: &str, input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            model: model.to_string(),
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            cost_usd: calculate_cost(model, input_tokens, output_tokens),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Text(String),
    /// Terminal event. Carries the usage for the whole call.
    Completed(Usage),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelCallError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("model backend returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed model response: {0}")]
    Protocol(String),
    #[error("model stream ended before completion")]
    Incomplete,
}

impl From<reqwest::Error> for ModelCallError {
    fn from(err: reqwest::Error) -> Self {
        ModelCallError::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

pub type StreamItem = Result<StreamEvent, ModelCallError>;

/// Finite, non-restartable sequence of text chunks ending in `StreamEvent::Completed`.
///
/// Yields `None` after the terminal event or the first error. A producer that goes away
/// before sending `Completed` surfaces as `ModelCallError::Incomplete`.
pub struct ModelStream {
    rx: mpsc::Receiver<StreamItem>,
    finished: bool,
}

impl ModelStream {
    pub fn channel(buffer: usize) -> (mpsc::Sender<StreamItem>, ModelStream) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            tx,
            ModelStream {
                rx,
                finished: false,
            },
        )
    }

    pub async fn next(&mut self) -> Option<StreamItem> {
        if self.finished {
            return None;
        }
        let item = match self.rx.recv().await {
            Some(item) => item,
            None => Err(ModelCallError::Incomplete),
        };
        if !matches!(item, Ok(StreamEvent::Text(_))) {
            self.finished = true;
        }
        Some(item)
    }

    /// Drains the stream into the full text and final usage.
    pub async fn collect(mut self) -> Result<Completion, ModelCallError> {
        let mut text = String::new();
        while let Some(item) = self.next().await {
            match item? {
                StreamEvent::Text(chunk) => text.push_str(&chunk),
                StreamEvent::Completed(usage) => return Ok(Completion { text, usage }),
            }
        }
        Err(ModelCallError::Incomplete)
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ModelCallError>;

    async fn complete(&self, request: ModelRequest) -> Result<Completion, ModelCallError> {
        self.stream(request).await?.collect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collect_joins_chunks_and_returns_usage() {
        let (tx, stream) = ModelStream::channel(8);
        tokio::spawn(async move {
            let _ = tx.send(Ok(StreamEvent::Text("{\"a\":".into()))).await;
            let _ = tx.send(Ok(StreamEvent::Text(" 1}".into()))).await;
            let _ = tx
                .send(Ok(StreamEvent::Completed(Usage::new(
                    "claude-sonnet-4-5-20250929",
                    10,
                    5,
                ))))
                .await;
        });
        let completion = stream.collect().await.unwrap();
        assert_eq!(completion.text, "{\"a\": 1}");
        assert_eq!(completion.usage.total_tokens, 15);
    }

    #[tokio::test]
    async fn producer_dropping_early_is_incomplete() {
        let (tx, mut stream) = ModelStream::channel(8);
        tx.send(Ok(StreamEvent::Text("partial".into())))
            .await
            .unwrap();
        drop(tx);
        assert!(matches!(stream.next().await, Some(Ok(StreamEvent::Text(_)))));
        assert!(matches!(
            stream.next().await,
            Some(Err(ModelCallError::Incomplete))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_is_finished_after_completion() {
        let (tx, mut stream) = ModelStream::channel(8);
        tx.send(Ok(StreamEvent::Completed(Usage::default())))
            .await
            .unwrap();
        tx.send(Ok(StreamEvent::Text("late".into()))).await.unwrap();
        assert!(matches!(
            stream.next().await,
            Some(Ok(StreamEvent::Completed(_)))
        ));
        assert!(stream.next().await.is_none());
    }
}
