//! Core data models used throughout kb-chat.
//!
//! These types represent the wire events, normalized sources, parsed
//! segments and chat messages that flow through the streaming pipeline.
//!
//! Raw sources arrive from the backend with inconsistent field names
//! (`doc_id` vs `documentId`, `kb_name` vs `dataset`, …). They are folded
//! into one [`Source`] shape by [`Source::from_raw`] at ingestion, and
//! nothing past that point ever looks at the raw JSON again.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fallback display title when neither a title nor a document id is present.
pub const UNKNOWN_TITLE: &str = "unknown";

const DOC_ID_KEYS: &[&str] = &[
    "doc_id",
    "docId",
    "document_id",
    "documentId",
    "ragflow_doc_id",
    "ragflowDocId",
    "id",
];

const DATASET_KEYS: &[&str] = &[
    "dataset_id",
    "datasetId",
    "dataset",
    "dataset_name",
    "datasetName",
    "kb_id",
    "kbId",
    "kb_name",
    "kbName",
];

const TITLE_KEYS: &[&str] = &[
    "filename",
    "doc_name",
    "docName",
    "document_name",
    "documentName",
    "name",
    "title",
];

const CHUNK_KEYS: &[&str] = &["chunk", "chunk_text", "chunkText", "content", "text"];

/// A normalized descriptor of a retrieved document chunk backing an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub doc_id: String,
    pub dataset: String,
    pub title: String,
    pub chunk: String,
}

impl Source {
    /// Normalize one raw source object.
    ///
    /// Each field takes the first alias that is present with a usable value
    /// (non-empty string or a number). Non-object input yields a source with
    /// every field empty and the title `"unknown"`.
    pub fn from_raw(raw: &Value) -> Self {
        let doc_id = first_present(raw, DOC_ID_KEYS).unwrap_or_default();
        let dataset = first_present(raw, DATASET_KEYS).unwrap_or_default();
        let title = first_present(raw, TITLE_KEYS)
            .or_else(|| (!doc_id.is_empty()).then(|| doc_id.clone()))
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
        let chunk = first_present(raw, CHUNK_KEYS).unwrap_or_default();
        Self {
            doc_id,
            dataset,
            title,
            chunk,
        }
    }

    /// Normalize a raw `sources` array. Anything that is not an array is an
    /// empty list.
    pub fn list_from_raw(raw: &Value) -> Vec<Source> {
        raw.as_array()
            .map(|items| items.iter().map(Source::from_raw).collect())
            .unwrap_or_default()
    }

    /// The reference handed to the external preview/download operation.
    pub fn document_ref(&self) -> DocumentRef {
        DocumentRef {
            doc_id: self.doc_id.clone(),
            dataset: self.dataset.clone(),
            title: self.title.clone(),
        }
    }
}

fn first_present(raw: &Value, keys: &[&str]) -> Option<String> {
    let obj = raw.as_object()?;
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// What the document-preview/download collaborator needs to open a citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    pub doc_id: String,
    pub dataset: String,
    pub title: String,
}

/// One decoded wire frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamEvent {
    pub code: i64,
    pub message: Option<String>,
    pub answer: Option<String>,
    pub sources: Option<Vec<Source>>,
}

impl StreamEvent {
    /// Build an event from a parsed `{ code, message?, data? }` payload.
    ///
    /// A missing `code` reads as `0`. `data` that is not an object (the
    /// backend sometimes sends `data: true` on its closing frame) carries
    /// neither answer nor sources.
    pub fn from_payload(payload: &Value) -> Self {
        let code = payload.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);
        let data = payload.get("data").filter(|d| d.is_object());
        let answer = data
            .and_then(|d| d.get("answer"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let sources = data
            .and_then(|d| d.get("sources"))
            .filter(|s| s.is_array())
            .map(Source::list_from_raw);
        Self {
            code,
            message,
            answer,
            sources,
        }
    }

    pub fn is_error(&self) -> bool {
        self.code != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Reasoning,
    Visible,
}

/// A run of canonical text that is either model reasoning or user-visible.
///
/// `text` is what the view shows. `raw` is the exact slice of canonical text
/// the segment was cut from, tags included, so joining every `raw` in order
/// rebuilds the canonical text byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
    #[serde(skip)]
    pub raw: String,
}

impl Segment {
    pub fn visible(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            kind: SegmentKind::Visible,
            raw: text.clone(),
            text,
        }
    }

    pub fn reasoning(text: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Reasoning,
            text: text.into(),
            raw: raw.into(),
        }
    }

    pub fn is_reasoning(&self) -> bool {
        self.kind == SegmentKind::Reasoning
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A chat message as the surrounding view holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources: Vec::new(),
        }
    }
}
