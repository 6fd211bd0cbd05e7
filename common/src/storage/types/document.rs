use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved metadata key linking a chunk back to its parent document.
pub const ID_KEY: &str = "doc_id";
/// Reserved metadata key for a chunk's byte offset within its parent.
pub const START_INDEX_KEY: &str = "start_index";

/// A unit of retrievable content with scalar metadata attached by the
/// loaders. Documents are immutable once produced; identity lives in the
/// metadata, not on the struct itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Builder-style metadata insertion. Absent values are expected to be
    /// omitted by callers rather than inserted as nulls.
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_owned(), value.into());
        self
    }

    pub fn insert_meta(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_owned(), value.into());
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.meta_str(ID_KEY)
    }
}

/// The two payload shapes the byte store holds for a parent id: a full
/// text document, or the raw base64 bytes of an extracted image/table.
/// Untagged so the stored form is either a mapping carrying
/// `page_content` or a bare string, which is exactly what the content
/// hash projection distinguishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParentPayload {
    Document(Document),
    Image(String),
}

impl ParentPayload {
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            ParentPayload::Document(doc) => Some(doc),
            ParentPayload::Image(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&str> {
        match self {
            ParentPayload::Image(encoded) => Some(encoded),
            ParentPayload::Document(_) => None,
        }
    }
}
