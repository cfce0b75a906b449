//! Deterministic `ModelClient` for tests: replays scripted replies in call order.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ModelCallError, ModelClient, ModelRequest, ModelStream, StreamEvent, Usage};

pub enum Scripted {
    Reply(String),
    Fail(ModelCallError),
    /// Never finishes; exercises stage timeouts.
    Stall,
}

pub fn reply(text: impl Into<String>) -> Scripted {
    Scripted::Reply(text.into())
}

pub fn fail(message: &str) -> Scripted {
    Scripted::Fail(ModelCallError::Transport(message.to_string()))
}

pub struct ScriptedClient {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedClient {
    pub const TOKENS_PER_SIDE: u64 = 1000;

    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ModelCallError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        let (tx, stream) = ModelStream::channel(16);
        match next {
            None => return Err(ModelCallError::Transport("script exhausted".into())),
            Some(Scripted::Fail(err)) => return Err(err),
            Some(Scripted::Stall) => {
                tokio::spawn(async move {
                    let _held = tx;
                    std::future::pending::<()>().await;
                });
            }
            Some(Scripted::Reply(text)) => {
                let split = text.char_indices().nth(text.chars().count() / 2).map_or(0, |(i, _)| i);
                let (head, tail) = text.split_at(split);
                let chunks = vec![head.to_string(), tail.to_string()];
                let usage = Usage::new(&request.model, Self::TOKENS_PER_SIDE, Self::TOKENS_PER_SIDE);
                tokio::spawn(async move {
                    for chunk in chunks.into_iter().filter(|c| !c.is_empty()) {
                        let _ = tx.send(Ok(StreamEvent::Text(chunk))).await;
                    }
                    let _ = tx.send(Ok(StreamEvent::Completed(usage))).await;
                });
            }
        }
        Ok(stream)
    }
}
