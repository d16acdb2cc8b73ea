use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvariantViolation("user_id must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(DomainError::InvariantViolation(format!("unknown message role `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub user_id: UserId,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(user_id: UserId, role: MessageRole, content: impl Into<String>) -> Self {
        Self { user_id, role, content: content.into(), timestamp: Utc::now() }
    }

    pub fn to_context(&self) -> ContextMessage {
        ContextMessage { role: self.role, content: self.content.clone() }
    }
}

/// Role and content only; what gets sent to the completion service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ContextMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

/// The user message and the assistant reply of one processed turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnPair {
    pub user: Message,
    pub assistant: Message,
}

impl TurnPair {
    pub fn new(user_id: UserId, user_content: &str, assistant_content: &str) -> Self {
        let user = Message::new(user_id.clone(), MessageRole::User, user_content);
        let mut assistant = Message::new(user_id, MessageRole::Assistant, assistant_content);
        if assistant.timestamp < user.timestamp {
            assistant.timestamp = user.timestamp;
        }
        Self { user, assistant }
    }

    pub fn into_messages(self) -> Vec<Message> {
        vec![self.user, self.assistant]
    }
}

#[cfg(test)]
mod tests {
    use super::{MessageRole, TurnPair, UserId};

    #[test]
    fn user_id_rejects_blank_values() {
        assert!(UserId::parse("   ").is_err());
        assert_eq!(UserId::parse(" u-1 ").expect("valid id").as_str(), "u-1");
    }

    #[test]
    fn turn_pair_keeps_user_before_assistant() {
        let pair = TurnPair::new(UserId("u-1".to_string()), "hola", "¡Hola!");

        assert_eq!(pair.user.role, MessageRole::User);
        assert_eq!(pair.assistant.role, MessageRole::Assistant);
        assert_eq!(pair.user.user_id, pair.assistant.user_id);
        assert!(pair.assistant.timestamp >= pair.user.timestamp);

        let messages = pair.into_messages();
        assert_eq!(messages[0].content, "hola");
        assert_eq!(messages[1].content, "¡Hola!");
    }

    #[test]
    fn role_round_trips_through_storage_text() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::System] {
            assert_eq!(role.as_str().parse::<MessageRole>().expect("known role"), role);
        }
        assert!("tool".parse::<MessageRole>().is_err());
    }
}
