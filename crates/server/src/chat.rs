use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use parley_agent::{ChatRouter, RouterError};
use parley_core::domain::message::UserId;
use parley_core::errors::{ApplicationError, InterfaceError};

#[derive(Clone)]
pub struct ChatState {
    chat_router: Arc<ChatRouter>,
}

impl ChatState {
    pub fn new(chat_router: Arc<ChatRouter>) -> Self {
        Self { chat_router }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatError {
    pub error: String,
    pub correlation_id: String,
}

pub fn router(state: ChatState) -> Router {
    Router::new().route("/chat", post(chat)).with_state(state)
}

pub async fn chat(
    State(state): State<ChatState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ChatError>)> {
    let correlation_id = Uuid::new_v4().to_string();

    let Json(request) = payload.map_err(|rejection| {
        error_response(InterfaceError::bad_request(rejection.body_text(), &correlation_id))
    })?;

    let user_id = UserId::parse(&request.user_id).map_err(|error| {
        error_response(ApplicationError::from(error).into_interface(&correlation_id))
    })?;
    if request.message.trim().is_empty() {
        return Err(error_response(InterfaceError::bad_request(
            "message must not be empty",
            &correlation_id,
        )));
    }

    let span = tracing::info_span!(
        "chat_turn",
        correlation_id = %correlation_id,
        user_id = %user_id.as_str()
    );

    let reply = state
        .chat_router
        .route(&user_id, &request.message)
        .instrument(span)
        .await
        .map_err(|RouterError::Persistence(error)| {
            error_response(
                ApplicationError::Persistence(error.to_string()).into_interface(&correlation_id),
            )
        })?;

    Ok(Json(ChatResponse { response: reply }))
}

fn error_response(error: InterfaceError) -> (StatusCode, Json<ChatError>) {
    let status = if error.is_unavailable() {
        tracing::error!(
            event_name = "http.chat.failed",
            correlation_id = %error.correlation_id(),
            error = %error,
            "chat request failed"
        );
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        tracing::warn!(
            event_name = "http.chat.rejected",
            correlation_id = %error.correlation_id(),
            error = %error,
            "chat request rejected"
        );
        StatusCode::BAD_REQUEST
    };

    (
        status,
        Json(ChatError {
            error: error.public_message(),
            correlation_id: error.correlation_id().to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        extract::State,
        http::{header, Request, StatusCode},
        Json,
    };
    use tower::ServiceExt;

    use parley_agent::{ChatRouter, CompletionError, CompletionRequest, LlmClient};
    use parley_core::config::AppConfig;
    use parley_core::domain::message::{Message, UserId};
    use parley_db::{
        ConversationRepository, InMemoryCollectionStore, InMemoryConversationRepository,
        RepositoryError,
    };

    use super::{chat, router, ChatError, ChatRequest, ChatResponse, ChatState};

    struct FixedLlm(&'static str);

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
            Ok(self.0.to_string())
        }
    }

    struct OfflineConversations;

    #[async_trait]
    impl ConversationRepository for OfflineConversations {
        async fn insert_many(&self, _messages: &[Message]) -> Result<(), RepositoryError> {
            Err(RepositoryError::Unavailable("log offline".to_string()))
        }

        async fn recent_for_user(
            &self,
            _user_id: &UserId,
            _limit: u32,
        ) -> Result<Vec<Message>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    fn state_with(conversations: Arc<dyn ConversationRepository>) -> ChatState {
        let chat_router = ChatRouter::from_config(
            &AppConfig::default(),
            Arc::new(FixedLlm("¡Hola! ¿En qué puedo ayudarte?")),
            conversations,
            Arc::new(InMemoryCollectionStore::default()),
        )
        .expect("router");
        ChatState::new(Arc::new(chat_router))
    }

    fn json_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn chat_returns_reply_and_persists_turn() {
        let conversations = Arc::new(InMemoryConversationRepository::default());
        let app = router(state_with(conversations.clone()));

        let response = app
            .oneshot(json_request(r#"{"user_id": "u-1", "message": "hola, ¿cómo estás?"}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload: ChatResponse = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(payload.response, "¡Hola! ¿En qué puedo ayudarte?");
        assert_eq!(conversations.len().await, 2);
    }

    #[tokio::test]
    async fn malformed_or_incomplete_bodies_are_bad_requests() {
        let conversations = Arc::new(InMemoryConversationRepository::default());

        for body in [
            "not json",
            r#"{"user_id": "u-1"}"#,
            r#"{"message": "hola"}"#,
            r#"{"user_id": 7, "message": "hola"}"#,
            r#"{"user_id": "   ", "message": "hola"}"#,
            r#"{"user_id": "u-1", "message": "  "}"#,
        ] {
            let response = router(state_with(conversations.clone()))
                .oneshot(json_request(body))
                .await
                .expect("response");

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body `{body}`");
            let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
            let payload: ChatError = serde_json::from_slice(&bytes).expect("json");
            assert!(!payload.error.is_empty());
        }

        assert!(conversations.is_empty().await);
    }

    #[tokio::test]
    async fn persistence_failure_is_service_unavailable() {
        let result = chat(
            State(state_with(Arc::new(OfflineConversations))),
            Ok(Json(ChatRequest { user_id: "u-1".to_string(), message: "hola".to_string() })),
        )
        .await;

        let Err((status, Json(payload))) = result else {
            panic!("expected an error response");
        };
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!payload.correlation_id.is_empty());
        assert!(!payload.error.contains("log offline"));
        assert!(payload.error.contains("temporarily unavailable"));
    }
}
