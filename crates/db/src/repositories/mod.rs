use async_trait::async_trait;
use thiserror::Error;

use parley_core::domain::command::ValidatedCommand;
use parley_core::domain::message::{Message, UserId};
use parley_core::domain::outcome::StoreResult;

pub mod collection;
pub mod conversation;
pub mod memory;

pub use collection::SqlCollectionStore;
pub use conversation::SqlConversationRepository;
pub use memory::{InMemoryCollectionStore, InMemoryConversationRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Timestamped conversation log, one row per message.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Stores all messages atomically, in slice order.
    async fn insert_many(&self, messages: &[Message]) -> Result<(), RepositoryError>;

    /// Latest `limit` messages for the user, newest first. Ties on timestamp
    /// are ordered by insertion, later inserts first.
    async fn recent_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;
}

/// General-purpose document collections. Only validated commands reach a store.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn execute(&self, command: &ValidatedCommand) -> Result<StoreResult, RepositoryError>;
}

pub(crate) fn with_id(
    id: &str,
    body: parley_core::Document,
) -> parley_core::Document {
    let mut document = parley_core::Document::new();
    document.insert("_id".to_string(), serde_json::Value::String(id.to_string()));
    document.extend(body);
    document
}
