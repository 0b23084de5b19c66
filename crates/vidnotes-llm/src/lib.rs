//! Vidnotes LLM - resilient generative-AI invocation layer
//!
//! This crate sits between content generators (notes, charts, flashcards,
//! quizzes) and vendor APIs:
//! - Credential: round-robin API key pool with per-key cooldowns
//! - Catalog: ranked models filtered by size, capability and cooldown
//! - Token: characters/4 estimation and line-based prompt packing
//! - Usage: soft per-domain daily token budgets
//! - Provider: Gemini and OpenAI-compatible adapters, error classification
//! - Orchestrator: the retry/fallback loop tying it all together

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod credential;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod provider;
pub mod token;
pub mod usage;
pub mod util;

pub use catalog::{CapabilityTier, ModelCatalog, ModelDescriptor, RequiredCapability};
pub use credential::{
    credentials_from_list, AllExhausted, Credential, CredentialConfig, CredentialId,
    CredentialPool, SelectedCredential,
};
pub use error::{Error, InvocationError, Result};
pub use message::{Message, MessageRole};
pub use orchestrator::{
    DomainConfig, InvocationRequest, InvocationResult, Orchestrator, OrchestratorConfig,
    OrchestratorStatus,
};
pub use provider::{
    build_provider, ErrorKind, GeminiProvider, MockProvider, OpenAiCompatibleProvider,
    ProviderAdapter, ProviderConfig, ProviderError, ProviderKind,
};
pub use token::{estimate_message_tokens, estimate_tokens, PromptBudgeter};
pub use usage::{BudgetState, TokenBudgetMonitor, UsageConfig};
