//! Render sinks for streaming answers.
//!
//! Every applied frame produces one [`RenderUpdate`]; a [`RenderSink`]
//! decides how it reaches the user. Answer text goes to **stdout**;
//! reasoning, citations and errors go to **stderr** so a piped answer stays
//! clean.

use std::io::Write;
use std::sync::Mutex;

use kb_chat_core::models::DocumentRef;
use kb_chat_core::segment::reasoning_text;
use kb_chat_core::stream::RenderUpdate;

/// Receives one update per applied frame, in arrival order.
pub trait RenderSink: Send + Sync {
    fn render(&self, update: &RenderUpdate);
}

/// Human-friendly terminal output.
///
/// Prints only what was added since the last update. When the canonical
/// answer is rewritten rather than extended, the whole answer is printed
/// again on a fresh line.
#[derive(Default)]
pub struct TerminalRender {
    shown: Mutex<Shown>,
}

#[derive(Default)]
struct Shown {
    visible: String,
    reasoning: String,
}

impl TerminalRender {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The text to print to move the screen from `shown` to `next`.
fn delta<'a>(shown: &str, next: &'a str) -> (bool, &'a str) {
    match next.strip_prefix(shown) {
        Some(rest) => (false, rest),
        None => (true, next),
    }
}

impl RenderSink for TerminalRender {
    fn render(&self, update: &RenderUpdate) {
        let mut shown = self.shown.lock().unwrap();
        let mut out = std::io::stdout().lock();
        let mut err = std::io::stderr().lock();

        if let Some(message) = &update.error {
            let _ = writeln!(err, "\nerror: {}", message);
            return;
        }

        let reasoning = reasoning_text(&update.segments);
        let (restart, add) = delta(&shown.reasoning, &reasoning);
        if !add.is_empty() {
            if restart || shown.reasoning.is_empty() {
                let _ = write!(err, "\n[thinking] ");
            }
            let _ = write!(err, "{}", add);
            let _ = err.flush();
        }
        shown.reasoning = reasoning;

        let (restart, add) = delta(&shown.visible, &update.visible_text);
        if !add.is_empty() {
            if restart && !shown.visible.is_empty() {
                let _ = writeln!(out);
            }
            let _ = write!(out, "{}", add);
            let _ = out.flush();
        }
        shown.visible = update.visible_text.clone();

        if update.done {
            let _ = writeln!(out);
            for cite in &update.citations {
                let _ = writeln!(err, "{}", citation_line(cite.id, &cite.source.document_ref()));
            }
        }
    }
}

/// One line of a citation listing: everything needed to open the document.
pub fn citation_line(id: usize, doc: &DocumentRef) -> String {
    if doc.dataset.is_empty() {
        format!("  [{}] {} <{}>", id, doc.title, doc.doc_id)
    } else {
        format!("  [{}] {} <{}/{}>", id, doc.title, doc.dataset, doc.doc_id)
    }
}

/// Machine-readable output: one JSON object per update on stdout.
pub struct JsonRender;

impl RenderSink for JsonRender {
    fn render(&self, update: &RenderUpdate) {
        if let Ok(line) = serde_json::to_string(update) {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
    }
}

/// No-op sink.
pub struct NoRender;

impl RenderSink for NoRender {
    fn render(&self, _update: &RenderUpdate) {}
}

/// Collects every update for later inspection.
#[derive(Default)]
pub struct CollectRender {
    updates: Mutex<Vec<RenderUpdate>>,
}

impl CollectRender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<RenderUpdate> {
        std::mem::take(&mut *self.updates.lock().unwrap())
    }
}

impl RenderSink for CollectRender {
    fn render(&self, update: &RenderUpdate) {
        self.updates.lock().unwrap().push(update.clone());
    }
}

/// Output mode for the CLI: off, human, or JSON lines.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RenderMode {
    Off,
    Human,
    Json,
}

impl RenderMode {
    /// Default: human output when stdout is a TTY, otherwise JSON lines.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stdout) {
            RenderMode::Human
        } else {
            RenderMode::Json
        }
    }

    pub fn sink(&self) -> Box<dyn RenderSink> {
        match self {
            RenderMode::Off => Box::new(NoRender),
            RenderMode::Human => Box::new(TerminalRender::new()),
            RenderMode::Json => Box::new(JsonRender),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_extends_or_restarts() {
        assert_eq!(delta("Hello", "Hello world"), (false, " world"));
        assert_eq!(delta("", "abc"), (false, "abc"));
        assert_eq!(delta("Hello world", "Hi there"), (true, "Hi there"));
        assert_eq!(delta("same", "same"), (false, ""));
    }

    #[test]
    fn citation_line_names_the_document() {
        let doc = DocumentRef {
            doc_id: "d1".into(),
            dataset: "kb".into(),
            title: "Guide".into(),
        };
        assert_eq!(citation_line(2, &doc), "  [2] Guide <kb/d1>");
        let bare = DocumentRef {
            dataset: String::new(),
            ..doc
        };
        assert_eq!(citation_line(0, &bare), "  [0] Guide <d1>");
    }

    #[test]
    fn collector_keeps_order() {
        let sink = CollectRender::new();
        for done in [false, true] {
            sink.render(&RenderUpdate {
                segments: Vec::new(),
                visible_text: String::new(),
                citations: Vec::new(),
                done,
                error: None,
            });
        }
        let updates = sink.take();
        assert_eq!(updates.len(), 2);
        assert!(updates[1].done);
        assert!(sink.take().is_empty());
    }
}
