use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use parley_core::domain::message::{Message, MessageRole, UserId};

use super::{ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn insert_many(&self, messages: &[Message]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for message in messages {
            sqlx::query(
                "INSERT INTO conversation_message (user_id, role, content, created_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(message.user_id.as_str())
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(encode_timestamp(&message.timestamp))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn recent_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT user_id, role, content, created_at
             FROM conversation_message
             WHERE user_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(user_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }
}

// Fixed-width UTC text so lexical order in SQLite equals chronological order.
fn encode_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid created_at `{raw}`: {error}")))
}

fn message_from_row(row: SqliteRow) -> Result<Message, RepositoryError> {
    let role: String = row.try_get("role")?;
    let role = role
        .parse::<MessageRole>()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Message {
        user_id: UserId(row.try_get("user_id")?),
        role,
        content: row.try_get("content")?,
        timestamp: decode_timestamp(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use parley_core::domain::message::{Message, MessageRole, TurnPair, UserId};

    use super::SqlConversationRepository;
    use crate::repositories::ConversationRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn migrated_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn message_at(user: &str, role: MessageRole, content: &str, offset_secs: i64) -> Message {
        Message {
            user_id: UserId(user.to_string()),
            role,
            content: content.to_string(),
            timestamp: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn persisted_turn_is_returned_for_fresh_user() {
        let pool = migrated_pool().await;
        let repo = SqlConversationRepository::new(pool.clone());
        let user = UserId("fresh-user".to_string());

        let pair = TurnPair::new(user.clone(), "hola", "¡Hola! ¿En qué puedo ayudarte?");
        repo.insert_many(&pair.clone().into_messages()).await.expect("insert turn");

        let recent = repo.recent_for_user(&user, 10).await.expect("fetch recent");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], pair.assistant);
        assert_eq!(recent[1], pair.user);

        pool.close().await;
    }

    #[tokio::test]
    async fn recent_messages_are_limited_newest_first_and_scoped_by_user() {
        let pool = migrated_pool().await;
        let repo = SqlConversationRepository::new(pool.clone());

        let mut messages = Vec::new();
        for index in 0..15 {
            messages.push(message_at("u-1", MessageRole::User, &format!("m{index}"), index));
        }
        messages.push(message_at("u-2", MessageRole::User, "other user", 100));
        repo.insert_many(&messages).await.expect("insert");

        let recent = repo.recent_for_user(&UserId("u-1".to_string()), 10).await.expect("fetch");
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "m14");
        assert_eq!(recent[9].content, "m5");
        assert!(recent.iter().all(|message| message.user_id.as_str() == "u-1"));
        assert!(recent.windows(2).all(|pair| pair[0].timestamp >= pair[1].timestamp));

        pool.close().await;
    }

    #[tokio::test]
    async fn equal_timestamps_fall_back_to_insertion_order() {
        let pool = migrated_pool().await;
        let repo = SqlConversationRepository::new(pool.clone());
        let timestamp = Utc::now();
        let user = UserId("tie".to_string());

        let first = Message {
            user_id: user.clone(),
            role: MessageRole::User,
            content: "first".to_string(),
            timestamp,
        };
        let second = Message {
            role: MessageRole::Assistant,
            content: "second".to_string(),
            ..first.clone()
        };
        repo.insert_many(&[first, second]).await.expect("insert");

        let recent = repo.recent_for_user(&user, 10).await.expect("fetch");
        assert_eq!(recent[0].content, "second");
        assert_eq!(recent[1].content, "first");

        pool.close().await;
    }

    #[tokio::test]
    async fn unknown_user_has_empty_history() {
        let pool = migrated_pool().await;
        let repo = SqlConversationRepository::new(pool.clone());

        let recent = repo.recent_for_user(&UserId("nobody".to_string()), 10).await.expect("fetch");
        assert!(recent.is_empty());

        pool.close().await;
    }
}
