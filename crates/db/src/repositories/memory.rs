use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;
use uuid::Uuid;

use parley_core::domain::command::{matches_filter, Document, ValidatedCommand};
use parley_core::domain::message::{Message, UserId};
use parley_core::domain::outcome::StoreResult;

use super::{with_id, CollectionStore, ConversationRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryConversationRepository {
    messages: RwLock<Vec<Message>>,
}

impl InMemoryConversationRepository {
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn insert_many(&self, messages: &[Message]) -> Result<(), RepositoryError> {
        let mut stored = self.messages.write().await;
        stored.extend_from_slice(messages);
        Ok(())
    }

    async fn recent_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let stored = self.messages.read().await;
        let mut matching = stored
            .iter()
            .enumerate()
            .filter(|(_, message)| &message.user_id == user_id)
            .collect::<Vec<_>>();

        // Vector position stands in for the SQL row id on timestamp ties.
        matching.sort_by(|(left_seq, left), (right_seq, right)| {
            right.timestamp.cmp(&left.timestamp).then(right_seq.cmp(left_seq))
        });

        Ok(matching
            .into_iter()
            .take(limit as usize)
            .map(|(_, message)| message.clone())
            .collect())
    }
}

/// Collections keyed by name; documents keep insertion order.
#[derive(Default)]
pub struct InMemoryCollectionStore {
    collections: RwLock<HashMap<String, BTreeMap<u64, (String, Document)>>>,
    sequence: RwLock<u64>,
}

impl InMemoryCollectionStore {
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names = self.collections.read().await.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    async fn next_sequence(&self) -> u64 {
        let mut sequence = self.sequence.write().await;
        *sequence += 1;
        *sequence
    }

    async fn insert_documents(&self, collection: &str, documents: &[Document]) -> Vec<String> {
        let mut ids = Vec::with_capacity(documents.len());
        for document in documents {
            let seq = self.next_sequence().await;
            let id = Uuid::new_v4().to_string();
            let mut collections = self.collections.write().await;
            collections
                .entry(collection.to_string())
                .or_default()
                .insert(seq, (id.clone(), document.clone()));
            ids.push(id);
        }
        ids
    }

    async fn matching_documents(&self, collection: &str, filter: &Document) -> Vec<Document> {
        let collections = self.collections.read().await;
        let Some(documents) = collections.get(collection) else {
            return Vec::new();
        };

        documents
            .values()
            .map(|(id, body)| with_id(id, body.clone()))
            .filter(|document| matches_filter(document, filter))
            .collect()
    }
}

#[async_trait::async_trait]
impl CollectionStore for InMemoryCollectionStore {
    async fn execute(&self, command: &ValidatedCommand) -> Result<StoreResult, RepositoryError> {
        match command {
            ValidatedCommand::Insert { collection, document } => {
                let mut ids =
                    self.insert_documents(collection, std::slice::from_ref(document)).await;
                let id = ids.pop().ok_or_else(|| {
                    RepositoryError::Unavailable("insert returned no document id".to_string())
                })?;
                Ok(StoreResult::InsertedId(id))
            }
            ValidatedCommand::InsertMany { collection, documents } => {
                Ok(StoreResult::InsertedIds(self.insert_documents(collection, documents).await))
            }
            ValidatedCommand::Find { collection, filter, limit } => {
                let mut documents = self.matching_documents(collection, filter).await;
                if let Some(limit) = limit {
                    documents.truncate(usize::try_from(*limit).unwrap_or(usize::MAX));
                }
                Ok(StoreResult::Documents(documents))
            }
            ValidatedCommand::Count { collection, filter } => {
                let count = self.matching_documents(collection, filter).await.len();
                Ok(StoreResult::Count(count as u64))
            }
            ValidatedCommand::Delete { collection, filter } => {
                let mut collections = self.collections.write().await;
                let Some(documents) = collections.get_mut(collection.as_str()) else {
                    return Ok(StoreResult::DeletedCount(0));
                };
                let before = documents.len();
                documents
                    .retain(|_, (id, body)| !matches_filter(&with_id(id, body.clone()), filter));
                Ok(StoreResult::DeletedCount((before - documents.len()) as u64))
            }
            ValidatedCommand::Drop { collection } => {
                self.collections.write().await.remove(collection.as_str());
                Ok(StoreResult::Acknowledged)
            }
            ValidatedCommand::CreateCollection { collection } => {
                self.collections.write().await.entry(collection.clone()).or_default();
                Ok(StoreResult::Acknowledged)
            }
        }
    }
}
