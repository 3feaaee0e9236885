//! Citation marker extraction and resolution.
//!
//! Answers cite retrieved chunks with inline `[ID:n]` markers, where `n` is
//! a 0-based index into the most recent source list received for the
//! message. Markers are never stored as references; they are resolved
//! against the current list every time the view is rendered.
//!
//! # Resolution
//!
//! 1. Collect the distinct ids in ascending numeric order.
//! 2. Drop ids with no matching source (list too short or not received yet).
//! 3. Drop ids whose source title matches, after normalization, the title of
//!    a lower id that was kept.
//!
//! For rendering, [`rewrite_markers`] turns each marker into a same-document
//! markdown anchor (`[n](#citation-n)`) that survives link sanitizers, and
//! [`resolve_anchor`] maps a clicked anchor back to its [`Source`].

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::models::Source;

/// Fragment prefix of rewritten citation anchors.
pub const ANCHOR_PREFIX: &str = "#citation-";

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[ID:(\d+)\]").expect("citation marker pattern"));

/// A surfaced citation: marker id plus the source it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub id: usize,
    pub source: Source,
}

/// Distinct marker ids in `visible`, ascending.
pub fn marker_ids(visible: &str) -> Vec<usize> {
    MARKER
        .captures_iter(visible)
        .filter_map(|caps| caps[1].parse::<usize>().ok())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Resolve the markers in `visible` against `sources`.
pub fn resolve_citations(visible: &str, sources: &[Source]) -> Vec<Citation> {
    let mut seen_titles = HashSet::new();
    marker_ids(visible)
        .into_iter()
        .filter_map(|id| sources.get(id).map(|source| (id, source)))
        .filter(|(_, source)| seen_titles.insert(normalize_title(&source.title)))
        .map(|(id, source)| Citation {
            id,
            source: source.clone(),
        })
        .collect()
}

/// Rewrite every `[ID:n]` marker into an inert `[n](#citation-n)` anchor.
pub fn rewrite_markers(visible: &str) -> String {
    MARKER
        .replace_all(visible, |caps: &Captures| {
            format!("[{id}]({ANCHOR_PREFIX}{id})", id = &caps[1])
        })
        .into_owned()
}

/// Parse the citation id out of an anchor href such as `#citation-3`.
pub fn anchor_id(href: &str) -> Option<usize> {
    href.strip_prefix(ANCHOR_PREFIX)?.parse().ok()
}

/// Look up the source an anchor points at.
pub fn resolve_anchor<'a>(href: &str, sources: &'a [Source]) -> Option<&'a Source> {
    anchor_id(href).and_then(|id| sources.get(id))
}

/// Title key used for duplicate suppression: trimmed, lowercased, inner
/// whitespace collapsed.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
