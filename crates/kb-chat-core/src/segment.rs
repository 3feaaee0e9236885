//! Reasoning/visible segmentation of canonical answer text.
//!
//! Models wrap private reasoning in `<think …>…</think>` (case-insensitive,
//! attributes ignored). [`parse_segments`] cuts the canonical text into an
//! ordered list of [`Segment`]s in one linear pass. It is rerun from scratch
//! on every update, so there is no incremental state to get out of sync.
//!
//! An open tag with no close tag yet yields a trailing reasoning segment, so
//! reasoning shows up while it streams. An open tag with no terminating `>`
//! is left as visible text.

use crate::models::{Segment, SegmentKind};

const OPEN_TAG: &str = "<think";
const CLOSE_TAG: &str = "</think>";

/// Split `text` into ordered segments.
///
/// Joining every segment's `raw` in order gives back `text` exactly.
pub fn parse_segments(text: &str) -> Vec<Segment> {
    // ASCII lowercasing keeps byte offsets identical to `text`.
    let lower = text.to_ascii_lowercase();
    let mut segments = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let Some(open) = find_open_tag(&lower, pos) else {
            segments.push(Segment::visible(&text[pos..]));
            break;
        };
        if open > pos {
            segments.push(Segment::visible(&text[pos..open]));
        }
        let Some(gt) = lower[open + OPEN_TAG.len()..].find('>') else {
            segments.push(Segment::visible(&text[open..]));
            break;
        };
        let body_start = open + OPEN_TAG.len() + gt + 1;
        match lower[body_start..].find(CLOSE_TAG) {
            Some(rel) => {
                let body_end = body_start + rel;
                let end = body_end + CLOSE_TAG.len();
                segments.push(Segment::reasoning(
                    &text[body_start..body_end],
                    &text[open..end],
                ));
                pos = end;
            }
            None => {
                segments.push(Segment::reasoning(&text[body_start..], &text[open..]));
                break;
            }
        }
    }

    segments
}

/// Byte offset of the next `<think` that is a real tag name, i.e. followed
/// by `>`, whitespace, or the end of the text so far.
fn find_open_tag(lower: &str, from: usize) -> Option<usize> {
    let mut at = from;
    while let Some(rel) = lower[at..].find(OPEN_TAG) {
        let start = at + rel;
        let after = start + OPEN_TAG.len();
        match lower[after..].chars().next() {
            None | Some('>') => return Some(start),
            Some(c) if c.is_whitespace() || c == '/' => return Some(start),
            _ => at = after,
        }
    }
    None
}

/// True when `text` carries a reasoning open or close tag.
pub fn contains_reasoning_tag(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    find_open_tag(&lower, 0).is_some() || lower.contains(CLOSE_TAG)
}

/// Concatenation of every visible segment, in order.
pub fn visible_text(segments: &[Segment]) -> String {
    join(segments, SegmentKind::Visible)
}

/// Concatenation of every reasoning segment body, in order.
pub fn reasoning_text(segments: &[Segment]) -> String {
    join(segments, SegmentKind::Reasoning)
}

fn join(segments: &[Segment], kind: SegmentKind) -> String {
    segments
        .iter()
        .filter(|s| s.kind == kind)
        .map(|s| s.text.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rebuild(segments: &[Segment]) -> String {
        segments.iter().map(|s| s.raw.as_str()).collect()
    }

    #[test]
    fn plain_text_is_one_visible_segment() {
        let segs = parse_segments("Just an answer.");
        assert_eq!(segs, vec![Segment::visible("Just an answer.")]);
    }

    #[test]
    fn empty_text_has_no_segments() {
        assert!(parse_segments("").is_empty());
    }

    #[test]
    fn closed_reasoning_then_answer() {
        let text = "<think>A\nB</think>final";
        let segs = parse_segments(text);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].kind, SegmentKind::Reasoning);
        assert_eq!(segs[0].text, "A\nB");
        assert_eq!(segs[1], Segment::visible("final"));
        assert_eq!(rebuild(&segs), text);
    }

    #[test]
    fn unterminated_reasoning_streams_progressively() {
        let text = "Intro <THINK mode=\"deep\">still thinking";
        let segs = parse_segments(text);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0], Segment::visible("Intro "));
        assert!(segs[1].is_reasoning());
        assert_eq!(segs[1].text, "still thinking");
        assert_eq!(rebuild(&segs), text);
    }

    #[test]
    fn malformed_open_tag_degrades_to_visible() {
        let text = "Answer <think still typing";
        let segs = parse_segments(text);
        assert_eq!(
            segs,
            vec![Segment::visible("Answer "), Segment::visible("<think still typing")]
        );
        assert_eq!(rebuild(&segs), text);
    }

    #[test]
    fn multiple_blocks_interleave() {
        let text = "a<think>r1</think>b<Think>r2</tHiNk>c";
        let segs = parse_segments(text);
        let kinds: Vec<_> = segs.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SegmentKind::Visible,
                SegmentKind::Reasoning,
                SegmentKind::Visible,
                SegmentKind::Reasoning,
                SegmentKind::Visible,
            ]
        );
        assert_eq!(visible_text(&segs), "abc");
        assert_eq!(reasoning_text(&segs), "r1r2");
        assert_eq!(rebuild(&segs), text);
    }

    #[test]
    fn lookalike_tag_names_are_visible() {
        let text = "<thinking>not a tag</thinking>";
        let segs = parse_segments(text);
        assert_eq!(segs, vec![Segment::visible(text)]);
    }

    #[test]
    fn empty_reasoning_block_is_kept_for_losslessness() {
        let text = "<think></think>done";
        let segs = parse_segments(text);
        assert_eq!(segs[0].text, "");
        assert_eq!(rebuild(&segs), text);
        assert_eq!(visible_text(&segs), "done");
    }

    #[test]
    fn detects_tags() {
        assert!(contains_reasoning_tag("x <Think> y"));
        assert!(contains_reasoning_tag("tail</think>"));
        assert!(!contains_reasoning_tag("<thinking>"));
    }
}
