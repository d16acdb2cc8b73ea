use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored document or a filter: a JSON object with string keys.
pub type Document = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    InsertMany,
    Find,
    Count,
    Delete,
    Drop,
    CreateCollection,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Self::Insert,
        Self::InsertMany,
        Self::Find,
        Self::Count,
        Self::Delete,
        Self::Drop,
        Self::CreateCollection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::InsertMany => "insert_many",
            Self::Find => "find",
            Self::Count => "count",
            Self::Delete => "delete",
            Self::Drop => "drop",
            Self::CreateCollection => "create_collection",
        }
    }

    /// Resolves an operation or driver-method name (`insert_one`, `insertOne`,
    /// `count_documents`, ...) to a supported operation.
    pub fn from_name(name: &str) -> Option<Self> {
        let folded = name
            .trim()
            .chars()
            .filter(|character| !matches!(character, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();

        match folded.as_str() {
            "insert" | "insertone" => Some(Self::Insert),
            "insertmany" => Some(Self::InsertMany),
            "find" | "findmany" => Some(Self::Find),
            "count" | "countdocuments" => Some(Self::Count),
            "delete" | "deletemany" | "remove" => Some(Self::Delete),
            "drop" | "dropcollection" => Some(Self::Drop),
            "createcollection" | "create" => Some(Self::CreateCollection),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured description of a database operation as produced by the
/// translator. It carries data only and has not been validated yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub operation: Operation,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl CommandDescriptor {
    pub fn new(operation: Operation, collection: impl Into<String>, argument: Option<Value>) -> Self {
        Self { operation, collection: collection.into(), argument, limit: None }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A command that passed validation. Stores only ever execute this type.
#[derive(Clone, Debug, PartialEq)]
pub enum ValidatedCommand {
    Insert { collection: String, document: Document },
    InsertMany { collection: String, documents: Vec<Document> },
    Find { collection: String, filter: Document, limit: Option<u64> },
    Count { collection: String, filter: Document },
    Delete { collection: String, filter: Document },
    Drop { collection: String },
    CreateCollection { collection: String },
}

impl ValidatedCommand {
    pub fn collection(&self) -> &str {
        match self {
            Self::Insert { collection, .. }
            | Self::InsertMany { collection, .. }
            | Self::Find { collection, .. }
            | Self::Count { collection, .. }
            | Self::Delete { collection, .. }
            | Self::Drop { collection }
            | Self::CreateCollection { collection } => collection,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Self::Insert { .. } => Operation::Insert,
            Self::InsertMany { .. } => Operation::InsertMany,
            Self::Find { .. } => Operation::Find,
            Self::Count { .. } => Operation::Count,
            Self::Delete { .. } => Operation::Delete,
            Self::Drop { .. } => Operation::Drop,
            Self::CreateCollection { .. } => Operation::CreateCollection,
        }
    }
}

/// Top-level equality match: every filter entry must equal the document's
/// value for that key. An empty filter matches every document.
///
/// Numbers compare by value, so `30` matches `30.0`.
pub fn matches_filter(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, expected)| document.get(key).is_some_and(|actual| values_equal(actual, expected)))
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(actual), Value::Number(expected)) => {
            if let (Some(a), Some(b)) = (actual.as_i64(), expected.as_i64()) {
                a == b
            } else if let (Some(a), Some(b)) = (actual.as_u64(), expected.as_u64()) {
                a == b
            } else {
                actual.as_f64() == expected.as_f64()
            }
        }
        _ => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{matches_filter, Document, Operation};

    fn object(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn driver_method_names_resolve_to_operations() {
        assert_eq!(Operation::from_name("insert_one"), Some(Operation::Insert));
        assert_eq!(Operation::from_name("insertOne"), Some(Operation::Insert));
        assert_eq!(Operation::from_name("insert_many"), Some(Operation::InsertMany));
        assert_eq!(Operation::from_name("count_documents"), Some(Operation::Count));
        assert_eq!(Operation::from_name("delete_many"), Some(Operation::Delete));
        assert_eq!(Operation::from_name("DROP"), Some(Operation::Drop));
        assert_eq!(Operation::from_name("create_collection"), Some(Operation::CreateCollection));
        assert_eq!(Operation::from_name("eval"), None);
        assert_eq!(Operation::from_name("delete_one"), None);
    }

    #[test]
    fn canonical_names_resolve_to_themselves() {
        for operation in Operation::ALL {
            assert_eq!(Operation::from_name(operation.as_str()), Some(operation));
        }
    }

    #[test]
    fn filter_matches_on_top_level_equality() {
        let document = object(json!({"nombre": "Juan", "edad": 30, "tags": ["a"]}));

        assert!(matches_filter(&document, &Document::new()));
        assert!(matches_filter(&document, &object(json!({"nombre": "Juan"}))));
        assert!(matches_filter(&document, &object(json!({"edad": 30, "tags": ["a"]}))));
        assert!(!matches_filter(&document, &object(json!({"edad": 31}))));
        assert!(!matches_filter(&document, &object(json!({"ciudad": "Lima"}))));
    }

    #[test]
    fn integer_and_float_forms_of_a_number_match() {
        let document = object(json!({"edad": 30, "precio": 12.5}));

        assert!(matches_filter(&document, &object(json!({"edad": 30.0}))));
        assert!(matches_filter(&object(json!({"edad": 30.0})), &object(json!({"edad": 30}))));
        assert!(matches_filter(&document, &object(json!({"precio": 12.5}))));
        assert!(!matches_filter(&document, &object(json!({"edad": 30.5}))));
        assert!(!matches_filter(&document, &object(json!({"edad": "30"}))));
        assert!(!matches_filter(
            &object(json!({"id": 9_007_199_254_740_993_u64})),
            &object(json!({"id": 9_007_199_254_740_992_u64}))
        ));
    }
}
