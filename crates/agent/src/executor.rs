use std::collections::BTreeSet;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use parley_core::config::RouterConfig;
use parley_core::domain::command::{CommandDescriptor, Document, Operation, ValidatedCommand};
use parley_core::domain::outcome::ExecutionOutcome;
use parley_db::CollectionStore;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("collection name `{0}` is not allowed")]
    CollectionName(String),
    #[error("collection `{0}` is protected")]
    ProtectedCollection(String),
    #[error("invalid argument for `{operation}`: {detail}")]
    ArgumentShape { operation: Operation, detail: String },
    #[error("operator key `{0}` is not supported")]
    OperatorKey(String),
    #[error("delete requires a non-empty filter")]
    UnfilteredDelete,
}

impl ValidationError {
    fn shape(operation: Operation, detail: impl Into<String>) -> Self {
        Self::ArgumentShape { operation, detail: detail.into() }
    }
}

/// Checks a descriptor against the closed command grammar.
#[derive(Clone, Debug)]
pub struct CommandValidator {
    collection_pattern: Regex,
    protected_collections: BTreeSet<String>,
    allow_unfiltered_delete: bool,
}

impl CommandValidator {
    pub fn new(config: &RouterConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            collection_pattern: Regex::new(&config.collection_pattern)?,
            protected_collections: config.protected_collections.iter().cloned().collect(),
            allow_unfiltered_delete: config.allow_unfiltered_delete,
        })
    }

    pub fn validate(
        &self,
        descriptor: &CommandDescriptor,
    ) -> Result<ValidatedCommand, ValidationError> {
        let collection = self.validate_collection(&descriptor.collection)?;
        let operation = descriptor.operation;
        let argument = descriptor.argument.as_ref();

        if descriptor.limit.is_some() && operation != Operation::Find {
            return Err(ValidationError::shape(operation, "`limit` only applies to find"));
        }

        match operation {
            Operation::Insert => {
                let document = insertable_document(operation, argument)?;
                Ok(ValidatedCommand::Insert { collection, document })
            }
            Operation::InsertMany => {
                let Some(Value::Array(items)) = argument else {
                    return Err(ValidationError::shape(operation, "expected an array of documents"));
                };
                if items.is_empty() {
                    return Err(ValidationError::shape(operation, "no documents to insert"));
                }
                let documents = items
                    .iter()
                    .map(|item| insertable_document(operation, Some(item)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ValidatedCommand::InsertMany { collection, documents })
            }
            Operation::Find => {
                let filter = optional_filter(operation, argument)?;
                Ok(ValidatedCommand::Find { collection, filter, limit: descriptor.limit })
            }
            Operation::Count => {
                let filter = optional_filter(operation, argument)?;
                Ok(ValidatedCommand::Count { collection, filter })
            }
            Operation::Delete => {
                let filter = optional_filter(operation, argument)?;
                if filter.is_empty() && !self.allow_unfiltered_delete {
                    return Err(ValidationError::UnfilteredDelete);
                }
                Ok(ValidatedCommand::Delete { collection, filter })
            }
            Operation::Drop => {
                expect_no_argument(operation, argument)?;
                Ok(ValidatedCommand::Drop { collection })
            }
            Operation::CreateCollection => {
                expect_no_argument(operation, argument)?;
                Ok(ValidatedCommand::CreateCollection { collection })
            }
        }
    }

    fn validate_collection(&self, name: &str) -> Result<String, ValidationError> {
        if !self.collection_pattern.is_match(name) {
            return Err(ValidationError::CollectionName(name.to_string()));
        }
        if self.protected_collections.contains(name) {
            return Err(ValidationError::ProtectedCollection(name.to_string()));
        }
        Ok(name.to_string())
    }
}

fn insertable_document(
    operation: Operation,
    argument: Option<&Value>,
) -> Result<Document, ValidationError> {
    let Some(Value::Object(document)) = argument else {
        return Err(ValidationError::shape(operation, "expected a document object"));
    };
    if document.is_empty() {
        return Err(ValidationError::shape(operation, "document is empty"));
    }
    if document.contains_key("_id") {
        return Err(ValidationError::shape(operation, "documents may not set `_id`"));
    }
    reject_operator_keys(argument)?;
    Ok(document.clone())
}

fn optional_filter(
    operation: Operation,
    argument: Option<&Value>,
) -> Result<Document, ValidationError> {
    match argument {
        None | Some(Value::Null) => Ok(Document::new()),
        Some(Value::Object(filter)) => {
            reject_operator_keys(argument)?;
            Ok(filter.clone())
        }
        Some(_) => Err(ValidationError::shape(operation, "filter must be an object")),
    }
}

fn expect_no_argument(
    operation: Operation,
    argument: Option<&Value>,
) -> Result<(), ValidationError> {
    match argument {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Object(object)) if object.is_empty() => Ok(()),
        Some(_) => Err(ValidationError::shape(operation, "takes no argument")),
    }
}

fn reject_operator_keys(value: Option<&Value>) -> Result<(), ValidationError> {
    match value {
        Some(Value::Object(object)) => {
            for (key, nested) in object {
                if key.starts_with('$') {
                    return Err(ValidationError::OperatorKey(key.clone()));
                }
                reject_operator_keys(Some(nested))?;
            }
            Ok(())
        }
        Some(Value::Array(items)) => {
            items.iter().try_for_each(|item| reject_operator_keys(Some(item)))
        }
        _ => Ok(()),
    }
}

/// Runs descriptors that pass validation against the collection store.
/// Every failure is reported as `ExecutionOutcome::Failed`.
pub struct SafeCommandExecutor {
    validator: CommandValidator,
    store: Arc<dyn CollectionStore>,
}

impl SafeCommandExecutor {
    pub fn new(validator: CommandValidator, store: Arc<dyn CollectionStore>) -> Self {
        Self { validator, store }
    }

    pub async fn execute(&self, descriptor: &CommandDescriptor) -> ExecutionOutcome {
        let command = match self.validator.validate(descriptor) {
            Ok(command) => command,
            Err(error) => {
                tracing::warn!(
                    event_name = "executor.validation_rejected",
                    operation = %descriptor.operation,
                    collection = %descriptor.collection,
                    error = %error,
                    "command rejected by validator"
                );
                return ExecutionOutcome::invalid_operation();
            }
        };

        match self.store.execute(&command).await {
            Ok(result) => {
                let outcome = ExecutionOutcome::from(result);
                tracing::info!(
                    event_name = "executor.command_executed",
                    operation = %command.operation(),
                    collection = %command.collection(),
                    outcome = outcome.kind(),
                    "command executed"
                );
                outcome
            }
            Err(error) => {
                tracing::error!(
                    event_name = "executor.store_failed",
                    operation = %command.operation(),
                    collection = %command.collection(),
                    error = %error,
                    "collection store failed"
                );
                ExecutionOutcome::failed(error.to_string())
            }
        }
    }
}
