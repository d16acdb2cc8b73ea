use serde_json::Value;

use parley_core::domain::outcome::ExecutionOutcome;

use crate::llm::CompletionError;

pub const DEFAULT_MAX_FOUND_DOCUMENTS: usize = 50;

/// Renders execution outcomes as user-facing reply text.
#[derive(Clone, Copy, Debug)]
pub struct ResultNormalizer {
    max_found_documents: usize,
}

impl Default for ResultNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FOUND_DOCUMENTS)
    }
}

impl ResultNormalizer {
    pub fn new(max_found_documents: usize) -> Self {
        Self { max_found_documents: max_found_documents.max(1) }
    }

    /// Always returns a non-empty string.
    pub fn normalize(&self, outcome: &ExecutionOutcome) -> String {
        match outcome {
            ExecutionOutcome::Inserted { id } => format!("Document inserted with ID: {id}"),
            ExecutionOutcome::InsertedMany { ids } => {
                format!("Documents inserted with IDs: {}", ids.join(", "))
            }
            ExecutionOutcome::Deleted { count } => format!("{count} documents deleted."),
            ExecutionOutcome::Found { documents } => {
                if documents.is_empty() {
                    return "Documents found:\n(no matching documents)".to_string();
                }

                let lines = documents
                    .iter()
                    .take(self.max_found_documents)
                    .map(|document| Value::Object(document.clone()).to_string())
                    .collect::<Vec<_>>();
                let mut reply = format!("Documents found:\n{}", lines.join("\n"));

                let hidden = documents.len().saturating_sub(self.max_found_documents);
                if hidden > 0 {
                    reply.push_str(&format!("\n... and {hidden} more documents not shown."));
                }
                reply
            }
            ExecutionOutcome::Counted { count } => format!("Documents counted: {count}"),
            ExecutionOutcome::Acknowledged => "Command executed successfully.".to_string(),
            ExecutionOutcome::Failed { reason } => format!("Error executing command: {reason}"),
        }
    }
}

/// Fixed reply used when the conversation-path completion fails.
pub fn completion_failure_reply(error: &CompletionError) -> String {
    let detail = match error {
        CompletionError::Timeout => "the language service timed out",
        CompletionError::Transport(_) | CompletionError::Status { .. } => {
            "the language service is unavailable"
        }
        CompletionError::MalformedResponse(_) | CompletionError::EmptyChoices => {
            "the language service returned an invalid response"
        }
        CompletionError::NotConfigured(_) => "the language service is not configured",
    };
    format!("Error generating response: {detail}. Please try again later.")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use parley_core::domain::command::Document;
    use parley_core::domain::outcome::ExecutionOutcome;

    use super::{completion_failure_reply, ResultNormalizer};
    use crate::llm::CompletionError;

    fn document(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn scalar_outcomes_use_fixed_templates() {
        let normalizer = ResultNormalizer::default();

        assert_eq!(
            normalizer.normalize(&ExecutionOutcome::Inserted { id: "abc".to_string() }),
            "Document inserted with ID: abc"
        );
        assert_eq!(
            normalizer.normalize(&ExecutionOutcome::InsertedMany {
                ids: vec!["a".to_string(), "b".to_string()]
            }),
            "Documents inserted with IDs: a, b"
        );
        assert_eq!(
            normalizer.normalize(&ExecutionOutcome::Deleted { count: 2 }),
            "2 documents deleted."
        );
        assert_eq!(
            normalizer.normalize(&ExecutionOutcome::Counted { count: 7 }),
            "Documents counted: 7"
        );
        assert_eq!(
            normalizer.normalize(&ExecutionOutcome::Acknowledged),
            "Command executed successfully."
        );
        assert_eq!(
            normalizer.normalize(&ExecutionOutcome::failed("invalid operation")),
            "Error executing command: invalid operation"
        );
    }

    #[test]
    fn found_documents_are_listed_one_per_line() {
        let normalizer = ResultNormalizer::default();
        let reply = normalizer.normalize(&ExecutionOutcome::Found {
            documents: vec![
                document(json!({"_id": "1", "nombre": "Juan"})),
                document(json!({"_id": "2", "nombre": "Ana"})),
            ],
        });

        assert_eq!(
            reply,
            "Documents found:\n{\"_id\":\"1\",\"nombre\":\"Juan\"}\n{\"_id\":\"2\",\"nombre\":\"Ana\"}"
        );
    }

    #[test]
    fn found_documents_are_capped_with_a_truncation_note() {
        let normalizer = ResultNormalizer::new(2);
        let documents = (0..5).map(|index| document(json!({"n": index}))).collect();

        let reply = normalizer.normalize(&ExecutionOutcome::Found { documents });

        assert_eq!(reply, "Documents found:\n{\"n\":0}\n{\"n\":1}\n... and 3 more documents not shown.");
    }

    #[test]
    fn empty_result_is_still_a_non_empty_reply() {
        let reply = ResultNormalizer::default().normalize(&ExecutionOutcome::Found { documents: vec![] });
        assert_eq!(reply, "Documents found:\n(no matching documents)");
    }

    #[test]
    fn completion_failures_have_fixed_replies() {
        let timeout = completion_failure_reply(&CompletionError::Timeout);
        assert!(timeout.starts_with("Error generating response:"));
        assert!(timeout.contains("timed out"));

        let unavailable =
            completion_failure_reply(&CompletionError::Status { status: 503, body: "down".to_string() });
        assert!(!unavailable.contains("down"));
        assert_ne!(unavailable, timeout);
    }
}
