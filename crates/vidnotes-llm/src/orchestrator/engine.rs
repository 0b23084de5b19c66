//! The attempt loop

use super::config::OrchestratorConfig;
use super::types::{InvocationRequest, InvocationResult};
use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::credential::{CredentialPool, SelectedCredential};
use crate::error::InvocationError;
use crate::message::Message;
use crate::provider::{exponential_backoff, ErrorKind, InvocationParams, ProviderAdapter, ProviderError};
use crate::token::{estimate_message_tokens, estimate_tokens, PromptBudgeter};
use crate::usage::TokenBudgetMonitor;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Resilient front door to one provider: rotates credentials, falls back
/// across models and keeps per-domain usage.
pub struct Orchestrator {
    pub(super) provider: Arc<dyn ProviderAdapter>,
    pub(super) pool: Arc<CredentialPool>,
    pub(super) catalog: Arc<ModelCatalog>,
    pub(super) usage: Arc<TokenBudgetMonitor>,
    budgeter: PromptBudgeter,
    config: OrchestratorConfig,
}

/// Bookkeeping that must survive the attempt future being cancelled
#[derive(Debug, Default)]
struct Progress {
    attempts: u32,
    last_kind: Option<ErrorKind>,
    last_error: Option<String>,
    truncated: bool,
}

enum Selection {
    Ready {
        model: ModelDescriptor,
        messages: Vec<Message>,
        truncated: bool,
    },
    /// Models are available but none can hold the prompt
    TooLarge,
    /// Every capability-matching model is cooling
    NoneAvailable,
}

impl Orchestrator {
    /// Wire an orchestrator with default tuning
    #[must_use]
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        pool: Arc<CredentialPool>,
        catalog: Arc<ModelCatalog>,
        usage: Arc<TokenBudgetMonitor>,
    ) -> Self {
        Self {
            provider,
            pool,
            catalog,
            usage,
            budgeter: PromptBudgeter::default(),
            config: OrchestratorConfig::default(),
        }
    }

    /// Replace the tuning
    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the prompt budgeter
    #[must_use]
    pub fn with_budgeter(mut self, budgeter: PromptBudgeter) -> Self {
        self.budgeter = budgeter;
        self
    }

    /// Credential pool
    #[must_use]
    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// Model catalog
    #[must_use]
    pub fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.catalog
    }

    /// Usage monitor
    #[must_use]
    pub fn usage(&self) -> &Arc<TokenBudgetMonitor> {
        &self.usage
    }

    /// Tuning in effect
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Upper bound on provider calls per request:
    /// `min(credentials * 2, models * credentials)`
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        let credentials = self.pool.len();
        let models = self.catalog.len();
        let bound = (credentials * 2).min(models * credentials);
        u32::try_from(bound).unwrap_or(u32::MAX)
    }

    /// Generate a completion, rotating credentials and models as needed.
    ///
    /// Never returns early with a bare provider error: the result carries
    /// either content or a terminal [`InvocationError`].
    #[instrument(skip_all, fields(domain = %request.domain, request_id = tracing::field::Empty))]
    pub async fn generate(&self, request: InvocationRequest) -> InvocationResult {
        let request_id = Uuid::new_v4();
        tracing::Span::current().record("request_id", tracing::field::display(request_id));

        if request.messages.is_empty() {
            return InvocationResult::failure(
                request_id,
                0,
                false,
                InvocationError::Fatal {
                    message: "request has no messages".to_string(),
                },
            );
        }

        let started = Instant::now();
        let deadline = started + request.timeout.unwrap_or_else(|| self.config.default_timeout());
        let mut progress = Progress::default();

        let outcome = tokio::time::timeout_at(
            deadline,
            self.run_attempts(&request, request_id, deadline, &mut progress),
        )
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                error!(attempts = progress.attempts, elapsed_ms, "Request deadline expired");
                InvocationResult::failure(
                    request_id,
                    progress.attempts,
                    progress.truncated,
                    InvocationError::Timeout {
                        attempts: progress.attempts,
                        elapsed_ms,
                    },
                )
            }
        }
    }

    async fn run_attempts(
        &self,
        request: &InvocationRequest,
        request_id: Uuid,
        deadline: Instant,
        progress: &mut Progress,
    ) -> InvocationResult {
        let max_attempts = self.max_attempts();
        let estimated = estimate_message_tokens(&request.messages);
        debug!(estimated, max_attempts, "Starting attempt loop");

        loop {
            let mut selection = self.select_model(request, estimated);

            if progress.attempts >= max_attempts {
                // A fatal failure on the last candidate is reported as such
                if progress.last_kind == Some(ErrorKind::Fatal)
                    && !matches!(selection, Selection::Ready { .. })
                {
                    return self.no_model(request_id, progress, false);
                }
                error!(
                    attempts = progress.attempts,
                    last_error = progress.last_error.as_deref().unwrap_or("-"),
                    "All options exhausted"
                );
                return self.fail(
                    request_id,
                    progress,
                    InvocationError::AllOptionsExhausted {
                        attempts: progress.attempts,
                        last_error: progress.last_error.clone(),
                    },
                );
            }

            if matches!(selection, Selection::Ready { .. })
                && matches!(progress.last_kind, Some(ErrorKind::Overloaded | ErrorKind::Fatal))
            {
                let wait = self.config.backoff(progress.attempts);
                debug!(wait_ms = wait.as_millis() as u64, "Backing off before retry");
                tokio::time::sleep(wait).await;
                selection = self.select_model(request, estimated);
            }

            let (model, messages, truncated) = match selection {
                Selection::Ready {
                    model,
                    messages,
                    truncated,
                } => (model, messages, truncated),
                Selection::TooLarge => {
                    return self.no_model(request_id, progress, true);
                }
                Selection::NoneAvailable => {
                    let too_large = progress.last_kind == Some(ErrorKind::PayloadTooLarge);
                    return self.no_model(request_id, progress, too_large);
                }
            };

            let credential = match self.pool.next() {
                Ok(credential) => credential,
                Err(exhausted) => {
                    error!(
                        attempts = progress.attempts,
                        retry_in_ms = exhausted.retry_in.map(|d| d.as_millis() as u64),
                        "All credentials are rate limited"
                    );
                    return self.fail(
                        request_id,
                        progress,
                        InvocationError::AllCredentialsRateLimited {
                            attempts: progress.attempts,
                            retry_in_ms: exhausted.retry_in.map(|d| d.as_millis() as u64),
                            last_error: progress.last_error.clone(),
                        },
                    );
                }
            };

            progress.attempts += 1;
            progress.truncated = truncated;
            debug!(
                attempt = progress.attempts,
                model = %model.name,
                credential = %credential.id,
                truncated,
                "Invoking provider"
            );

            let params = InvocationParams {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
                deadline: Some(deadline),
            };

            match self
                .provider
                .invoke(&credential, &model.name, &messages, &params)
                .await
            {
                Ok(reply) => {
                    self.pool.mark_succeeded(&credential.id);
                    let usage_tokens = reply.usage_tokens.unwrap_or_else(|| {
                        (estimate_message_tokens(&messages) + estimate_tokens(&reply.content)) as u64
                    });
                    self.usage.record(&request.domain, usage_tokens).await;

                    info!(
                        attempt = progress.attempts,
                        model = %model.name,
                        credential = %credential.id,
                        usage_tokens,
                        "Generation succeeded"
                    );
                    return InvocationResult {
                        request_id,
                        success: true,
                        content: Some(reply.content),
                        usage_tokens,
                        model_used: Some(model.name.clone()),
                        credential_used: Some(credential.id.to_string()),
                        prompt_was_truncated: truncated,
                        attempts: progress.attempts,
                        estimated_cost: model.estimate_cost(usage_tokens),
                        error: None,
                    };
                }
                Err(err) => {
                    let kind = self.provider.classify_error(&err);
                    warn!(
                        attempt = progress.attempts,
                        model = %model.name,
                        credential = %credential.id,
                        kind = %kind,
                        error = %err,
                        "Provider call failed"
                    );
                    self.react(kind, &err, &credential, &model);
                    progress.last_kind = Some(kind);
                    progress.last_error = Some(err.to_string());
                }
            }
        }
    }

    /// Pick the best model for this attempt and fit the prompt to it.
    ///
    /// The catalog is re-queried every attempt so cooldowns set by earlier
    /// attempts or concurrent requests apply immediately.
    fn select_model(&self, request: &InvocationRequest, estimated: usize) -> Selection {
        let required = request.required_capability;

        let model = match self.catalog.candidates(estimated, required).into_iter().next() {
            Some(model) => model,
            None => {
                let available = self.catalog.available(required);
                if available.is_empty() {
                    return Selection::NoneAvailable;
                }
                if !self.config.truncate_oversized_prompts {
                    return Selection::TooLarge;
                }
                // Largest window loses the least; ties go to priority order
                let Some(model) = available
                    .into_iter()
                    .rev()
                    .max_by_key(|m| m.max_context_tokens)
                else {
                    return Selection::NoneAvailable;
                };
                warn!(
                    estimated,
                    model = %model.name,
                    budget = model.input_token_budget(),
                    "Prompt exceeds every model's budget, truncating"
                );
                model
            }
        };

        let (messages, truncated) = self
            .budgeter
            .fit_messages(&request.messages, model.input_token_budget());
        Selection::Ready {
            model,
            messages,
            truncated,
        }
    }

    /// Update pool/catalog state for a failed attempt
    fn react(
        &self,
        kind: ErrorKind,
        err: &ProviderError,
        credential: &SelectedCredential,
        model: &ModelDescriptor,
    ) {
        match kind {
            ErrorKind::RateLimited => {
                let delay = self.provider.extract_retry_after(err).unwrap_or_else(|| {
                    exponential_backoff(self.pool.consecutive_failures(&credential.id))
                });
                self.pool.mark_failed(&credential.id, delay);
            }
            ErrorKind::PayloadTooLarge => {
                self.catalog
                    .set_cooldown(&model.name, self.config.payload_too_large_cooldown());
            }
            ErrorKind::Overloaded => {
                self.catalog
                    .set_cooldown(&model.name, self.config.overloaded_cooldown());
            }
            ErrorKind::Fatal => {
                self.catalog
                    .set_cooldown(&model.name, self.config.fatal_cooldown());
            }
        }
    }

    fn no_model(&self, request_id: Uuid, progress: &Progress, payload_too_large: bool) -> InvocationResult {
        // An unclassified failure on the last remaining candidate is more
        // useful to the caller than a generic "nothing available".
        if progress.last_kind == Some(ErrorKind::Fatal) {
            let message = progress
                .last_error
                .clone()
                .unwrap_or_else(|| "provider error".to_string());
            error!(attempts = progress.attempts, %message, "No candidates left after provider error");
            return self.fail(request_id, progress, InvocationError::Fatal { message });
        }

        error!(
            attempts = progress.attempts,
            payload_too_large,
            "No suitable model available"
        );
        self.fail(
            request_id,
            progress,
            InvocationError::AllModelsUnavailable {
                attempts: progress.attempts,
                last_error: progress.last_error.clone(),
                payload_too_large,
            },
        )
    }

    fn fail(&self, request_id: Uuid, progress: &Progress, error: InvocationError) -> InvocationResult {
        InvocationResult::failure(request_id, progress.attempts, progress.truncated, error)
    }
}
