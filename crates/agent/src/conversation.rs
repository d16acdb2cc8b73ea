use std::sync::Arc;

use parley_core::domain::message::{ContextMessage, UserId};
use parley_db::{ConversationRepository, RepositoryError};

use crate::llm::{CompletionError, CompletionRequest, LlmClient};

/// Rebuilds the recent dialogue for a user from the conversation log.
pub struct ContextBuilder {
    conversations: Arc<dyn ConversationRepository>,
    history_limit: u32,
}

impl ContextBuilder {
    pub fn new(conversations: Arc<dyn ConversationRepository>, history_limit: u32) -> Self {
        Self { conversations, history_limit }
    }

    /// At most `history_limit` messages, oldest first.
    pub async fn build_context(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ContextMessage>, RepositoryError> {
        let mut recent = self.conversations.recent_for_user(user_id, self.history_limit).await?;
        recent.reverse();
        Ok(recent.iter().map(|message| message.to_context()).collect())
    }
}

/// Free-form assistant replies on the conversation path.
pub struct ConversationResponder {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl ConversationResponder {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self { llm, system_prompt: system_prompt.into() }
    }

    pub async fn complete(
        &self,
        context: Vec<ContextMessage>,
        user_input: &str,
        model: &str,
    ) -> Result<String, CompletionError> {
        let messages = self.compose(context, user_input);
        self.llm.complete(CompletionRequest::new(model, messages)).await
    }

    fn compose(&self, context: Vec<ContextMessage>, user_input: &str) -> Vec<ContextMessage> {
        let mut messages = Vec::with_capacity(context.len() + 2);
        messages.push(ContextMessage::system(&self.system_prompt));
        messages.extend(context);
        messages.push(ContextMessage::user(user_input));
        messages
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use parley_core::chrono::{Duration, Utc};
    use parley_core::domain::message::{ContextMessage, Message, MessageRole, UserId};
    use parley_db::{ConversationRepository, InMemoryConversationRepository};

    use super::{ContextBuilder, ConversationResponder};
    use crate::llm::{CompletionError, CompletionRequest, LlmClient};

    #[derive(Default)]
    struct RecordingLlm {
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request);
            }
            Ok("Claro, con gusto.".to_string())
        }
    }

    fn user(raw: &str) -> UserId {
        UserId::parse(raw).expect("user id")
    }

    async fn seeded_repository(user_id: &UserId, count: i64) -> Arc<InMemoryConversationRepository> {
        let repository = Arc::new(InMemoryConversationRepository::default());
        let base = Utc::now();
        let messages = (0..count)
            .map(|index| {
                let role = if index % 2 == 0 { MessageRole::User } else { MessageRole::Assistant };
                let mut message = Message::new(user_id.clone(), role, format!("m{index}"));
                message.timestamp = base + Duration::milliseconds(index);
                message
            })
            .collect::<Vec<_>>();
        repository.insert_many(&messages).await.expect("seed");
        repository
    }

    #[tokio::test]
    async fn context_is_capped_and_chronological_for_any_history_length() {
        let user_id = user("u-ctx");
        for count in [0_i64, 1, 9, 10, 11, 25] {
            let repository = seeded_repository(&user_id, count).await;
            let builder = ContextBuilder::new(repository, 10);

            let context = builder.build_context(&user_id).await.expect("context");

            let expected_len = count.min(10) as usize;
            assert_eq!(context.len(), expected_len, "history length {count}");
            let expected = (count - expected_len as i64..count)
                .map(|index| format!("m{index}"))
                .collect::<Vec<_>>();
            let actual = context.iter().map(|message| message.content.clone()).collect::<Vec<_>>();
            assert_eq!(actual, expected);
        }
    }

    #[tokio::test]
    async fn responder_wraps_context_with_system_prompt_and_user_turn() {
        let llm = Arc::new(RecordingLlm::default());
        let responder = ConversationResponder::new(llm.clone(), "Responde en español.");
        let context = vec![ContextMessage::user("hola"), ContextMessage::assistant("¡Hola!")];

        let reply = responder
            .complete(context, "¿cómo estás?", "openai/gpt-3.5-turbo")
            .await
            .expect("reply");
        assert_eq!(reply, "Claro, con gusto.");

        let requests = llm.requests.lock().expect("requests lock");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "openai/gpt-3.5-turbo");
        assert_eq!(
            requests[0].messages,
            vec![
                ContextMessage::system("Responde en español."),
                ContextMessage::user("hola"),
                ContextMessage::assistant("¡Hola!"),
                ContextMessage::user("¿cómo estás?"),
            ]
        );
    }
}
