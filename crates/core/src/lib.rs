pub mod config;
pub mod domain;
pub mod errors;

pub use chrono;
pub use domain::command::{matches_filter, CommandDescriptor, Document, Operation, ValidatedCommand};
pub use domain::message::{ContextMessage, Message, MessageRole, TurnPair, UserId};
pub use domain::outcome::{ExecutionOutcome, StoreResult};
pub use errors::{ApplicationError, DomainError, InterfaceError};
