//! Scripted adapter for tests: replays canned outcomes and records requests.

use super::{ProviderAdapter, ProviderId};
use crate::errors::Result;
use crate::models::chat::{ChatCompletionRequest, ChatCompletionResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub(crate) type Received = Arc<Mutex<Vec<ChatCompletionRequest>>>;

pub(crate) struct ScriptedAdapter {
    id: ProviderId,
    outcomes: Mutex<VecDeque<Result<String>>>,
    pub(crate) received: Received,
}

impl ScriptedAdapter {
    pub(crate) fn new(id: ProviderId, outcomes: Vec<Result<String>>) -> Self {
        Self {
            id,
            outcomes: Mutex::new(outcomes.into()),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn chat(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        self.received.lock().unwrap().push(request.clone());
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .expect("adapter called more often than scripted");
        outcome.map(|content| ChatCompletionResponse {
            content,
            model: request.model.clone(),
            provider: self.id,
            usage: None,
            latency_ms: 1,
        })
    }

    async fn healthcheck(&self) -> bool {
        true
    }
}
