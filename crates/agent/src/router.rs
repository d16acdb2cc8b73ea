use std::sync::Arc;

use thiserror::Error;

use parley_core::config::AppConfig;
use parley_core::domain::message::{TurnPair, UserId};
use parley_core::domain::outcome::{ExecutionOutcome, COMPLETION_TIMEOUT, COMPLETION_UNAVAILABLE};
use parley_db::{CollectionStore, ConversationRepository, RepositoryError};

use crate::conversation::{ContextBuilder, ConversationResponder};
use crate::executor::{CommandValidator, SafeCommandExecutor};
use crate::llm::{CompletionError, LlmClient};
use crate::normalizer::{completion_failure_reply, ResultNormalizer};
use crate::translator::{CommandTranslator, TranslationError};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("failed to persist conversation turn: {0}")]
    Persistence(#[source] RepositoryError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    Command { keyword: String },
    Conversation,
}

/// Keyword heuristic. Input containing any configured keyword (case-insensitive)
/// is treated as a database command; everything else is conversation.
#[derive(Clone, Debug)]
pub struct IntentClassifier {
    keywords: Vec<String>,
}

impl IntentClassifier {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|keyword| keyword.as_ref().trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn classify(&self, text: &str) -> Intent {
        let lowered = text.to_lowercase();
        self.keywords
            .iter()
            .find(|keyword| lowered.contains(keyword.as_str()))
            .map(|keyword| Intent::Command { keyword: keyword.clone() })
            .unwrap_or(Intent::Conversation)
    }
}

/// Entry point for one chat turn: classify, answer, persist.
pub struct ChatRouter {
    classifier: IntentClassifier,
    translator: CommandTranslator,
    executor: SafeCommandExecutor,
    normalizer: ResultNormalizer,
    context: ContextBuilder,
    responder: ConversationResponder,
    conversations: Arc<dyn ConversationRepository>,
    conversation_model: String,
}

impl ChatRouter {
    pub fn from_config(
        config: &AppConfig,
        llm: Arc<dyn LlmClient>,
        conversations: Arc<dyn ConversationRepository>,
        collections: Arc<dyn CollectionStore>,
    ) -> Result<Self, regex::Error> {
        let validator = CommandValidator::new(&config.router)?;

        Ok(Self {
            classifier: IntentClassifier::new(&config.router.command_keywords),
            translator: CommandTranslator::new(
                llm.clone(),
                config.llm.effective_translator_model(),
            ),
            executor: SafeCommandExecutor::new(validator, collections),
            normalizer: ResultNormalizer::new(config.router.max_found_documents),
            context: ContextBuilder::new(conversations.clone(), config.router.history_limit),
            responder: ConversationResponder::new(llm, &config.assistant.system_prompt),
            conversations,
            conversation_model: config.llm.model.clone(),
        })
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// Produces the reply for `text` and stores the user/assistant pair.
    ///
    /// Translation, execution and completion failures become the reply text.
    /// Only a failure to store the turn is returned as an error.
    pub async fn route(&self, user_id: &UserId, text: &str) -> Result<String, RouterError> {
        let intent = self.classifier.classify(text);
        let reply = match &intent {
            Intent::Command { keyword } => {
                tracing::info!(
                    event_name = "router.intent_classified",
                    user_id = %user_id.as_str(),
                    intent = "command",
                    keyword = %keyword,
                    "routing to command path"
                );
                self.run_command(text).await
            }
            Intent::Conversation => {
                tracing::info!(
                    event_name = "router.intent_classified",
                    user_id = %user_id.as_str(),
                    intent = "conversation",
                    "routing to conversation path"
                );
                self.run_conversation(user_id, text).await
            }
        };

        let pair = TurnPair::new(user_id.clone(), text, &reply);
        if let Err(error) = self.conversations.insert_many(&pair.into_messages()).await {
            tracing::error!(
                event_name = "router.persist_failed",
                user_id = %user_id.as_str(),
                error = %error,
                "failed to persist conversation turn"
            );
            return Err(RouterError::Persistence(error));
        }

        Ok(reply)
    }

    async fn run_command(&self, text: &str) -> String {
        let outcome = match self.translator.translate(text).await {
            Ok(descriptor) => {
                tracing::info!(
                    event_name = "router.command_generated",
                    operation = %descriptor.operation,
                    collection = %descriptor.collection,
                    descriptor = %serde_json::to_string(&descriptor).unwrap_or_default(),
                    "command descriptor generated"
                );
                self.executor.execute(&descriptor).await
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "router.translation_failed",
                    error = %error,
                    "command translation failed"
                );
                translation_failure_outcome(&error)
            }
        };

        self.normalizer.normalize(&outcome)
    }

    async fn run_conversation(&self, user_id: &UserId, text: &str) -> String {
        let context = match self.context.build_context(user_id).await {
            Ok(context) => context,
            Err(error) => {
                tracing::warn!(
                    event_name = "router.context_unavailable",
                    user_id = %user_id.as_str(),
                    error = %error,
                    "continuing without conversation history"
                );
                Vec::new()
            }
        };

        match self.responder.complete(context, text, &self.conversation_model).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(
                    event_name = "router.completion_failed",
                    user_id = %user_id.as_str(),
                    error = %error,
                    "conversation completion failed"
                );
                completion_failure_reply(&error)
            }
        }
    }
}

fn translation_failure_outcome(error: &TranslationError) -> ExecutionOutcome {
    match error {
        TranslationError::Unparseable(_) => ExecutionOutcome::unparseable_command(),
        TranslationError::Completion(CompletionError::Timeout) => {
            ExecutionOutcome::failed(COMPLETION_TIMEOUT)
        }
        TranslationError::Completion(_) => ExecutionOutcome::failed(COMPLETION_UNAVAILABLE),
    }
}
