use serde::{Deserialize, Serialize};

use super::command::Document;

pub const INVALID_OPERATION: &str = "invalid operation";
pub const UNPARSEABLE_COMMAND: &str = "unparseable command";
pub const COMPLETION_TIMEOUT: &str = "timeout";
pub const COMPLETION_UNAVAILABLE: &str = "completion service unavailable";

/// Raw result of running a validated command against a collection store.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreResult {
    InsertedId(String),
    InsertedIds(Vec<String>),
    DeletedCount(u64),
    Documents(Vec<Document>),
    Count(u64),
    Acknowledged,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Inserted { id: String },
    InsertedMany { ids: Vec<String> },
    Deleted { count: u64 },
    Found { documents: Vec<Document> },
    Counted { count: u64 },
    Acknowledged,
    Failed { reason: String },
}

impl ExecutionOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed { reason: reason.into() }
    }

    pub fn invalid_operation() -> Self {
        Self::failed(INVALID_OPERATION)
    }

    pub fn unparseable_command() -> Self {
        Self::failed(UNPARSEABLE_COMMAND)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Inserted { .. } => "inserted",
            Self::InsertedMany { .. } => "inserted_many",
            Self::Deleted { .. } => "deleted",
            Self::Found { .. } => "found",
            Self::Counted { .. } => "counted",
            Self::Acknowledged => "acknowledged",
            Self::Failed { .. } => "failed",
        }
    }
}

impl From<StoreResult> for ExecutionOutcome {
    fn from(value: StoreResult) -> Self {
        match value {
            StoreResult::InsertedId(id) => Self::Inserted { id },
            StoreResult::InsertedIds(ids) => Self::InsertedMany { ids },
            StoreResult::DeletedCount(count) => Self::Deleted { count },
            StoreResult::Documents(documents) => Self::Found { documents },
            StoreResult::Count(count) => Self::Counted { count },
            StoreResult::Acknowledged => Self::Acknowledged,
        }
    }
}
