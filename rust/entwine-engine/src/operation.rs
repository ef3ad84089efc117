//! Index operations, documents and submitted batches.

use entwine_common::error::Error;
use entwine_model::DocumentKey;
use entwine_workflow::oneshot;

/// One serialized index document.
///
/// The engine treats documents as opaque payloads; the document deriver
/// produces them and the backend client consumes them.
#[derive(Debug, Clone, PartialEq)]
pub struct Document(serde_json::Value);

impl Document {
    pub fn new(value: serde_json::Value) -> Document {
        Document(value)
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for Document {
    fn from(value: serde_json::Value) -> Document {
        Document(value)
    }
}

/// The kind of a document operation sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Add,
    Update,
    Delete,
}

/// One document operation: a key, an operation kind, and for add/update the
/// freshly derived document.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexOperation {
    pub key: DocumentKey,
    pub kind: OperationKind,
    pub document: Option<Document>,
}

impl IndexOperation {
    pub fn add(key: DocumentKey, document: Document) -> IndexOperation {
        IndexOperation {
            key,
            kind: OperationKind::Add,
            document: Some(document),
        }
    }

    pub fn update(key: DocumentKey, document: Document) -> IndexOperation {
        IndexOperation {
            key,
            kind: OperationKind::Update,
            document: Some(document),
        }
    }

    pub fn delete(key: DocumentKey) -> IndexOperation {
        IndexOperation {
            key,
            kind: OperationKind::Delete,
            document: None,
        }
    }
}

/// Per-batch outcome reported by the backend client.
///
/// Best-effort semantics: keys absent from `failures` were applied.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub failures: Vec<(DocumentKey, Error)>,
}

impl BatchOutcome {
    pub fn success() -> BatchOutcome {
        BatchOutcome::default()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One element of the shared operation queue: a batch of operations together
/// with the acknowledgement channel the backend worker completes once the
/// batch has been applied.
#[derive(Debug)]
pub struct SubmittedBatch {
    pub operations: Vec<IndexOperation>,
    pub ack: oneshot::Sender<BatchOutcome>,
}

impl SubmittedBatch {
    pub fn new(
        operations: Vec<IndexOperation>,
    ) -> (SubmittedBatch, oneshot::Receiver<BatchOutcome>) {
        let (ack, outcome) = oneshot::channel();
        (SubmittedBatch { operations, ack }, outcome)
    }
}
