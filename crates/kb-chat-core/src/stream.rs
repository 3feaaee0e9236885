//! Per-message answer state machine.
//!
//! An [`AnswerStream`] owns everything one in-flight assistant message
//! accumulates: the canonical text, the latest source list, and the derived
//! segments and citations. It moves `Accumulating → Finalized` exactly once
//! and ignores every event after that.
//!
//! Each applied event re-derives segments and citations from the whole
//! canonical text and yields one [`RenderUpdate`]; nothing is batched.
//!
//! ```rust
//! use kb_chat_core::models::StreamEvent;
//! use kb_chat_core::stream::AnswerStream;
//!
//! let mut answer = AnswerStream::default();
//! for chunk in ["Hello", "Hello world"] {
//!     answer.apply(&StreamEvent { answer: Some(chunk.into()), ..Default::default() });
//! }
//! let last = answer.finish().unwrap();
//! assert!(last.done);
//! assert_eq!(answer.visible_text(), "Hello world");
//! ```

use serde::Serialize;

use crate::citation::{resolve_citations, rewrite_markers, Citation};
use crate::models::{Message, Segment, Source, StreamEvent};
use crate::reconcile::Reconciler;
use crate::segment::{parse_segments, visible_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Accumulating,
    Finalized,
}

/// How a finalized answer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Completion {
    /// Terminal sentinel or end of the underlying stream.
    Completed,
    /// The backend sent a non-zero `code`.
    Failed,
    /// The consumer stopped reading before the stream ended.
    Cancelled,
}

/// One view refresh for a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderUpdate {
    pub segments: Vec<Segment>,
    /// Visible text with `[ID:n]` markers rewritten to anchors.
    pub visible_text: String,
    pub citations: Vec<Citation>,
    pub done: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct AnswerStream {
    reconciler: Reconciler,
    canonical: String,
    sources: Vec<Source>,
    segments: Vec<Segment>,
    visible: String,
    citations: Vec<Citation>,
    completion: Option<Completion>,
    error: Option<String>,
    frames: usize,
}

impl AnswerStream {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            ..Self::default()
        }
    }

    pub fn state(&self) -> StreamState {
        if self.completion.is_some() {
            StreamState::Finalized
        } else {
            StreamState::Accumulating
        }
    }

    pub fn completion(&self) -> Option<Completion> {
        self.completion
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Visible text with raw `[ID:n]` markers, as the backend will store it.
    pub fn visible_text(&self) -> &str {
        &self.visible
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Number of events that changed the answer.
    pub fn frames_applied(&self) -> usize {
        self.frames
    }

    /// Apply one event. Returns the resulting view refresh, or `None` when the
    /// event changed nothing or the answer is already finalized.
    pub fn apply(&mut self, event: &StreamEvent) -> Option<RenderUpdate> {
        if self.completion.is_some() {
            return None;
        }

        if event.is_error() {
            let message = event
                .message
                .clone()
                .unwrap_or_else(|| format!("backend error (code {})", event.code));
            tracing::warn!(code = event.code, %message, "backend reported an error mid-stream");
            self.error = Some(message);
            self.completion = Some(Completion::Failed);
            self.frames += 1;
            return Some(self.update());
        }

        let mut changed = false;

        if let Some(sources) = &event.sources {
            self.sources = sources.clone();
            changed = true;
        }

        if let Some(answer) = event.answer.as_deref().filter(|a| !a.is_empty()) {
            let merge = self.reconciler.merge(&self.canonical, answer);
            tracing::debug!(
                rule = ?merge.rule,
                before = self.canonical.len(),
                after = merge.text.len(),
                "reconciled answer fragment"
            );
            self.canonical = merge.text;
            self.segments = parse_segments(&self.canonical);
            self.visible = visible_text(&self.segments);
            changed = true;
        }

        if !changed {
            return None;
        }
        self.citations = resolve_citations(&self.visible, &self.sources);
        self.frames += 1;
        Some(self.update())
    }

    /// Finalize after a terminal sentinel or the end of the stream.
    pub fn finish(&mut self) -> Option<RenderUpdate> {
        self.finalize(Completion::Completed)
    }

    /// Finalize because the consumer stopped reading.
    pub fn cancel(&mut self) -> Option<RenderUpdate> {
        self.finalize(Completion::Cancelled)
    }

    fn finalize(&mut self, completion: Completion) -> Option<RenderUpdate> {
        if self.completion.is_some() {
            return None;
        }
        self.completion = Some(completion);
        Some(self.update())
    }

    /// True when the answer ended normally and its sources may be persisted.
    pub fn is_persistable(&self) -> bool {
        self.completion == Some(Completion::Completed)
    }

    /// The assistant message as the view keeps it. On a backend error the
    /// content is the error message.
    pub fn message(&self) -> Message {
        let content = match &self.error {
            Some(message) => message.clone(),
            None => self.canonical.clone(),
        };
        Message {
            sources: self.sources.clone(),
            ..Message::assistant(content)
        }
    }

    fn update(&self) -> RenderUpdate {
        match &self.error {
            Some(message) => RenderUpdate {
                segments: vec![Segment::visible(message.clone())],
                visible_text: message.clone(),
                citations: Vec::new(),
                done: true,
                error: Some(message.clone()),
            },
            None => RenderUpdate {
                segments: self.segments.clone(),
                visible_text: rewrite_markers(&self.visible),
                citations: self.citations.clone(),
                done: self.completion.is_some(),
                error: None,
            },
        }
    }
}
