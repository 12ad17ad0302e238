//! `InferenceBackend` over a rig-core agent.

use async_trait::async_trait;
use rig::agent::Agent;
use rig::completion::{CompletionModel, Prompt};

use crate::error::InferenceError;
use crate::llm::InferenceBackend;

/// Bridges a rig `Agent` to the relay's `InferenceBackend` trait.
pub struct RigBackend<M: CompletionModel> {
    agent: Agent<M>,
    provider: String,
    name: String,
}

impl<M: CompletionModel> RigBackend<M> {
    pub fn new(agent: Agent<M>, provider: &str, model: &str) -> Self {
        Self {
            agent,
            provider: provider.to_string(),
            name: format!("{provider}/{model}"),
        }
    }
}

#[async_trait]
impl<M> InferenceBackend for RigBackend<M>
where
    M: CompletionModel + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn respond(&self, text: &str) -> Result<String, InferenceError> {
        let reply = self
            .agent
            .prompt(text)
            .await
            .map_err(|e| InferenceError::RequestFailed {
                backend: self.provider.clone(),
                reason: e.to_string(),
            })?;

        if reply.trim().is_empty() {
            return Err(InferenceError::EmptyResponse {
                backend: self.provider.clone(),
            });
        }
        Ok(reply)
    }
}
