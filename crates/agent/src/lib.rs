//! Chat runtime - intent routing, command translation and safe execution
//!
//! This crate turns one user message into one assistant reply:
//! - Classifies the message as a database command or free conversation
//! - Translates commands into a structured `CommandDescriptor`
//! - Validates descriptors against a closed grammar before they reach a store
//! - Builds conversation context from the stored history
//!
//! # Architecture
//!
//! 1. **Routing** (`router`) - keyword classification and turn persistence
//! 2. **Translation** (`translator`) - natural language → `CommandDescriptor`
//! 3. **Execution** (`executor`) - validation, then `CollectionStore::execute`
//! 4. **Normalization** (`normalizer`) - `ExecutionOutcome` → reply text
//! 5. **Conversation** (`conversation`) - context window + completion
//!
//! # Safety Principle
//!
//! The completion service is strictly a translator. Its output is parsed as
//! data and validated; it is never evaluated and never picks what runs.

pub mod conversation;
pub mod executor;
pub mod llm;
pub mod normalizer;
pub mod router;
pub mod translator;

pub use conversation::{ContextBuilder, ConversationResponder};
pub use executor::{CommandValidator, SafeCommandExecutor, ValidationError};
pub use llm::{ChatCompletionsClient, CompletionError, CompletionRequest, LlmClient};
pub use normalizer::{completion_failure_reply, ResultNormalizer};
pub use router::{ChatRouter, Intent, IntentClassifier, RouterError};
pub use translator::{parse_descriptor, CommandTranslator, TranslationError};
