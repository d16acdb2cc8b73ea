use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use parley_core::domain::command::{CommandDescriptor, Operation};
use parley_core::domain::message::ContextMessage;

use crate::llm::{CompletionError, CompletionRequest, LlmClient};

const TRANSLATOR_SYSTEM_PROMPT: &str = "Responde únicamente con un objeto JSON que describa la \
operación de base de datos. No incluyas explicaciones, texto adicional ni código.";

const TRANSLATOR_EXAMPLES: &str = r#"Traduce la instrucción del usuario a un único objeto JSON con los campos
"operation", "collection" y, según la operación, "document", "documents" o "filter".
Operaciones válidas: insert, insert_many, find, count, delete, drop, create_collection.

Ejemplos:
inserta un usuario llamado Juan de 30 años
{"operation": "insert", "collection": "usuarios", "document": {"nombre": "Juan", "edad": 30}}
inserta dos productos: mesa y silla
{"operation": "insert_many", "collection": "productos", "documents": [{"nombre": "mesa"}, {"nombre": "silla"}]}
muestra todos los usuarios
{"operation": "find", "collection": "usuarios", "filter": {}}
¿cuántos usuarios tienen 30 años?
{"operation": "count", "collection": "usuarios", "filter": {"edad": 30}}
elimina al usuario Juan
{"operation": "delete", "collection": "usuarios", "filter": {"nombre": "Juan"}}
borra la colección usuarios
{"operation": "drop", "collection": "usuarios"}
crea la colección pedidos
{"operation": "create_collection", "collection": "pedidos"}
"#;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("translator output is not a recognized command: {0}")]
    Unparseable(String),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// Turns a natural-language instruction into a `CommandDescriptor`.
///
/// The completion service only ever produces data here. Its output is parsed
/// against a closed grammar and never evaluated.
pub struct CommandTranslator {
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl CommandTranslator {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self { llm, model: model.into() }
    }

    pub async fn translate(&self, user_input: &str) -> Result<CommandDescriptor, TranslationError> {
        let messages = vec![
            ContextMessage::system(TRANSLATOR_SYSTEM_PROMPT),
            ContextMessage::user(translation_prompt(user_input)),
        ];
        let raw = self.llm.complete(CompletionRequest::new(&self.model, messages)).await?;

        tracing::debug!(
            event_name = "translator.raw_output",
            model = %self.model,
            raw = %raw,
            "translator returned output"
        );

        parse_descriptor(&raw)
    }
}

fn translation_prompt(user_input: &str) -> String {
    format!("{TRANSLATOR_EXAMPLES}\nEl usuario dijo: {user_input}")
}

/// Parses translator output into a descriptor.
///
/// Accepted shapes, after trimming and removing a Markdown code fence:
/// a JSON object `{"operation", "collection", "document" | "documents" | "filter", "limit"?}`
/// or a driver call `db.<collection>.<method>(<json>?)`.
pub fn parse_descriptor(raw: &str) -> Result<CommandDescriptor, TranslationError> {
    let text = strip_code_fence(raw);
    if text.is_empty() {
        return Err(TranslationError::Unparseable("empty output".to_string()));
    }

    if text.starts_with('{') {
        return parse_json_descriptor(text);
    }
    if text.starts_with("db.") {
        return parse_call_descriptor(text);
    }

    Err(TranslationError::Unparseable(preview(text)))
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(fenced) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // An info string (`json`, `python`, ...) ends at whitespace, on the same line or the next.
    let info_len = fenced
        .find(|character: char| !(character.is_ascii_alphanumeric() || "-_".contains(character)))
        .unwrap_or(fenced.len());
    let body = match &fenced[info_len..] {
        rest if rest.starts_with(char::is_whitespace) => rest,
        _ => fenced,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn parse_json_descriptor(text: &str) -> Result<CommandDescriptor, TranslationError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|error| TranslationError::Unparseable(format!("invalid JSON: {error}")))?;
    let Value::Object(object) = value else {
        return Err(TranslationError::Unparseable("expected a JSON object".to_string()));
    };

    let operation_name = required_str(&object, "operation")?;
    let operation = Operation::from_name(operation_name).ok_or_else(|| {
        TranslationError::Unparseable(format!("unknown operation `{operation_name}`"))
    })?;
    let collection = required_str(&object, "collection")?;

    let argument = argument_key(operation).and_then(|key| object.get(key)).cloned();

    let mut descriptor = CommandDescriptor::new(operation, collection, argument);
    match object.get("limit") {
        None | Some(Value::Null) => {}
        Some(limit) => {
            let limit = limit.as_u64().ok_or_else(|| {
                TranslationError::Unparseable("`limit` must be a non-negative integer".to_string())
            })?;
            descriptor = descriptor.with_limit(limit);
        }
    }

    Ok(descriptor)
}

/// The only field read as the argument; other argument-like keys are ignored.
fn argument_key(operation: Operation) -> Option<&'static str> {
    match operation {
        Operation::Insert => Some("document"),
        Operation::InsertMany => Some("documents"),
        Operation::Find | Operation::Count | Operation::Delete => Some("filter"),
        Operation::Drop | Operation::CreateCollection => None,
    }
}

fn required_str<'a>(
    object: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a str, TranslationError> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| TranslationError::Unparseable(format!("missing `{key}`")))
}

fn parse_call_descriptor(text: &str) -> Result<CommandDescriptor, TranslationError> {
    let call = text.trim_end_matches(';').trim_end();
    let unparseable = || TranslationError::Unparseable(preview(text));

    let target = call.strip_prefix("db.").ok_or_else(unparseable)?;
    let (collection, invocation) = target.split_once('.').ok_or_else(unparseable)?;
    let (method, rest) = invocation.split_once('(').ok_or_else(unparseable)?;
    let argument_text = rest.strip_suffix(')').ok_or_else(unparseable)?.trim();

    if !is_identifier(collection) || !is_identifier(method) {
        return Err(unparseable());
    }

    let operation = Operation::from_name(method)
        .ok_or_else(|| TranslationError::Unparseable(format!("unsupported method `{method}`")))?;

    let argument = if argument_text.is_empty() {
        None
    } else {
        Some(serde_json::from_str::<Value>(argument_text).map_err(|error| {
            TranslationError::Unparseable(format!("argument is not JSON: {error}"))
        })?)
    };

    Ok(CommandDescriptor::new(operation, collection, argument))
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.chars().all(|character| character.is_ascii_alphanumeric() || character == '_')
}

fn preview(text: &str) -> String {
    const MAX_PREVIEW_CHARS: usize = 120;
    let mut preview = text.chars().take(MAX_PREVIEW_CHARS).collect::<String>();
    if text.chars().count() > MAX_PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}
