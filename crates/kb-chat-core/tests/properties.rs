//! Property tests for the reconciliation and segmentation invariants.

use kb_chat_core::reconcile::{reconcile, Reconciler};
use kb_chat_core::segment::parse_segments;
use proptest::prelude::*;

/// Text drawn from a small alphabet so overlaps, tags and line endings
/// actually occur.
fn answer_text() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("a".to_string()),
            Just("b".to_string()),
            Just(" ".to_string()),
            Just("\r\n".to_string()),
            Just("\n".to_string()),
            Just("é".to_string()),
            Just("<think>".to_string()),
            Just("<THINK x=1>".to_string()),
            Just("</think>".to_string()),
            Just("<think".to_string()),
            Just("[ID:0]".to_string()),
        ],
        0..24,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn reconciling_with_itself_is_identity(c in answer_text()) {
        prop_assert_eq!(reconcile(&c, &c), c);
    }

    #[test]
    fn cumulative_fragment_wins_exactly(c in answer_text(), tail in answer_text()) {
        let incoming = format!("{c}{tail}");
        prop_assert_eq!(reconcile(&c, &incoming), incoming);
    }

    #[test]
    fn empty_fragment_is_a_no_op(c in answer_text()) {
        prop_assert_eq!(reconcile(&c, ""), c);
    }

    #[test]
    fn stale_prefix_never_shrinks(c in answer_text(), cut in 0usize..64) {
        let boundary = c
            .char_indices()
            .map(|(i, _)| i)
            .nth(cut)
            .unwrap_or(c.len());
        let m = Reconciler::default().merge(&c, &c[..boundary]);
        prop_assert_eq!(m.text, c);
    }

    #[test]
    fn segments_rebuild_the_text(t in answer_text()) {
        let rebuilt: String = parse_segments(&t).iter().map(|s| s.raw.as_str()).collect();
        prop_assert_eq!(rebuilt, t);
    }
}
