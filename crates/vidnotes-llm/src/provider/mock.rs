//! Mock provider for testing
//!
//! Replays queued outcomes in order, then answers with a default reply.
//! Rules keyed by credential id or model name take precedence over the
//! queue, which makes "this key is always throttled" scenarios easy.

use super::{InvocationParams, ProviderAdapter, ProviderError, ProviderReply};
use crate::credential::SelectedCredential;
use crate::message::Message;
use crate::token::{estimate_message_tokens, estimate_tokens};

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Text of the default reply
pub const DEFAULT_REPLY: &str = "mock response";

/// One scripted call outcome
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Succeed with this reply
    Reply(ProviderReply),
    /// Fail with this error
    Fail(ProviderError),
    /// Sleep, then succeed with the default reply
    Hang(Duration),
}

/// A recorded invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Credential id used
    pub credential: String,
    /// Model requested
    pub model: String,
    /// Estimated prompt tokens actually sent
    pub prompt_tokens: usize,
}

/// A provider that returns queued outcomes or a default reply
#[derive(Debug, Default)]
pub struct MockProvider {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    credential_failures: Mutex<HashMap<String, ProviderError>>,
    model_failures: Mutex<HashMap<String, ProviderError>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockProvider {
    /// Create a mock that always answers with the default reply
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next unscripted call
    pub fn push(&self, outcome: MockOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
    }

    /// Queue a successful reply
    pub fn push_reply(&self, content: impl Into<String>) {
        self.push(MockOutcome::Reply(ProviderReply::text(content)));
    }

    /// Queue a failure
    pub fn push_error(&self, error: ProviderError) {
        self.push(MockOutcome::Fail(error));
    }

    /// Every call with this credential fails with `error`
    pub fn fail_credential(&self, credential_id: impl Into<String>, error: ProviderError) {
        self.credential_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(credential_id.into(), error);
    }

    /// Every call to this model fails with `error`
    pub fn fail_model(&self, model: impl Into<String>, error: ProviderError) {
        self.model_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(model.into(), error);
    }

    /// Calls made so far
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of calls made so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn default_reply(prompt_tokens: usize) -> ProviderReply {
        ProviderReply {
            content: DEFAULT_REPLY.to_string(),
            usage_tokens: Some((prompt_tokens + estimate_tokens(DEFAULT_REPLY)) as u64),
            model: None,
        }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn invoke(
        &self,
        credential: &SelectedCredential,
        model: &str,
        messages: &[Message],
        _params: &InvocationParams,
    ) -> Result<ProviderReply, ProviderError> {
        let prompt_tokens = estimate_message_tokens(messages);
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(MockCall {
                credential: credential.id.as_str().to_string(),
                model: model.to_string(),
                prompt_tokens,
            });

        let ruled = {
            let by_credential = self
                .credential_failures
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let by_model = self.model_failures.lock().unwrap_or_else(|e| e.into_inner());
            by_credential
                .get(credential.id.as_str())
                .or_else(|| by_model.get(model))
                .cloned()
        };
        if let Some(error) = ruled {
            return Err(error);
        }

        let next = self
            .outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(MockOutcome::Reply(reply)) => Ok(reply),
            Some(MockOutcome::Fail(error)) => Err(error),
            Some(MockOutcome::Hang(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(Self::default_reply(prompt_tokens))
            }
            None => Ok(Self::default_reply(prompt_tokens)),
        }
    }
}
