//! Answer chunk reconciliation.
//!
//! The backend does not promise a single chunking mode: one deployment sends
//! deltas, another resends the whole answer-so-far on every frame, and some
//! mix the two or repeat a frame. [`Reconciler::merge`] folds one incoming
//! fragment into the current canonical text using only those two strings.
//!
//! # Algorithm
//!
//! The first matching rule wins:
//!
//! 1. Empty base: the incoming fragment becomes the text.
//! 2. Raw containment: incoming extends the base (cumulative), the base
//!    already starts with incoming (stale repeat), or incoming contains the
//!    whole base.
//! 3. Reasoning snapshot: a `<think>` tag appears on either side and the
//!    normalized incoming text is at least as long as the base.
//! 4. Long common prefix: normalized incoming is longer and shares a prefix
//!    of at least `prefix_ratio` of the base or at least `prefix_min_chars`
//!    characters.
//! 5. Rule 2 again on normalized forms (CRLF/CR folded to LF, NULs removed).
//! 6. Largest suffix/prefix overlap, then plain append.
//!
//! Only prefix/suffix relationships are considered. An incoming fragment that
//! merely echoes some earlier sentence is appended, never deduplicated.
//!
//! # Example
//!
//! ```rust
//! use kb_chat_core::reconcile::reconcile;
//!
//! assert_eq!(reconcile("The quick brown", "brown fox jumps"), "The quick brown fox jumps");
//! assert_eq!(reconcile("Hello", "Hello world"), "Hello world");
//! ```

use std::borrow::Cow;

use crate::segment::contains_reasoning_tag;

/// Tunables for rule 4.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcilePolicy {
    /// Minimum share of the base that must be a common prefix.
    pub prefix_ratio: f64,
    /// Absolute common-prefix length (in characters) that is always enough.
    pub prefix_min_chars: usize,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            prefix_ratio: 0.8,
            prefix_min_chars: 400,
        }
    }
}

/// Which rule produced a merge result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    /// Incoming fragment was empty; text unchanged.
    Ignored,
    EmptyBase,
    Cumulative,
    StaleRepeat,
    Contains,
    ReasoningSnapshot,
    PrefixSnapshot,
    NormalizedCumulative,
    NormalizedStale,
    NormalizedContains,
    Overlap,
    Append,
}

/// Result of one merge step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merge {
    pub text: String,
    pub rule: MergeRule,
}

impl Merge {
    fn new(text: &str, rule: MergeRule) -> Self {
        Self {
            text: text.to_string(),
            rule,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    policy: ReconcilePolicy,
}

impl Reconciler {
    pub fn new(policy: ReconcilePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    /// Fold `incoming` into `current`.
    pub fn merge(&self, current: &str, incoming: &str) -> Merge {
        if incoming.is_empty() {
            return Merge::new(current, MergeRule::Ignored);
        }
        if current.is_empty() {
            return Merge::new(incoming, MergeRule::EmptyBase);
        }

        if incoming.starts_with(current) {
            return Merge::new(incoming, MergeRule::Cumulative);
        }
        if current.starts_with(incoming) {
            return Merge::new(current, MergeRule::StaleRepeat);
        }
        if incoming.len() >= current.len() && incoming.contains(current) {
            return Merge::new(incoming, MergeRule::Contains);
        }

        let cur_n = normalize(current);
        let inc_n = normalize(incoming);
        let cur_chars = cur_n.chars().count();
        let inc_chars = inc_n.chars().count();

        if (contains_reasoning_tag(&cur_n) || contains_reasoning_tag(&inc_n))
            && inc_chars >= cur_chars
        {
            return Merge::new(incoming, MergeRule::ReasoningSnapshot);
        }

        if inc_chars > cur_chars {
            let prefix = common_prefix_chars(&cur_n, &inc_n);
            let ratio = if cur_chars == 0 {
                1.0
            } else {
                prefix as f64 / cur_chars as f64
            };
            if ratio >= self.policy.prefix_ratio || prefix >= self.policy.prefix_min_chars {
                return Merge::new(incoming, MergeRule::PrefixSnapshot);
            }
        }

        if inc_n.starts_with(cur_n.as_ref()) {
            return Merge::new(incoming, MergeRule::NormalizedCumulative);
        }
        if cur_n.starts_with(inc_n.as_ref()) {
            return Merge::new(current, MergeRule::NormalizedStale);
        }
        if inc_chars >= cur_chars && inc_n.contains(cur_n.as_ref()) {
            return Merge::new(incoming, MergeRule::NormalizedContains);
        }

        if overlap_len(&cur_n, &inc_n) > 0 {
            // Normalization can shift lengths, so the raw cut is found with
            // its own scan rather than mapped from the normalized one.
            let raw = overlap_len(current, incoming);
            let mut text = String::with_capacity(current.len() + incoming.len() - raw);
            text.push_str(current);
            text.push_str(&incoming[raw..]);
            return Merge {
                text,
                rule: MergeRule::Overlap,
            };
        }

        let mut text = String::with_capacity(current.len() + incoming.len());
        text.push_str(current);
        text.push_str(incoming);
        Merge {
            text,
            rule: MergeRule::Append,
        }
    }
}

/// Merge with the default policy.
pub fn reconcile(current: &str, incoming: &str) -> String {
    Reconciler::default().merge(current, incoming).text
}

/// Fold CRLF and lone CR to LF and strip embedded NULs.
pub fn normalize(s: &str) -> Cow<'_, str> {
    if !s.contains(['\r', '\0']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            '\0' => {}
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

fn common_prefix_chars(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

/// Byte length of the largest prefix of `incoming` that is also a suffix of
/// `current`. Zero when there is none.
fn overlap_len(current: &str, incoming: &str) -> usize {
    let max = current.len().min(incoming.len());
    incoming
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= max)
        .filter(|end| current.ends_with(&incoming[..*end]))
        .last()
        .unwrap_or(0)
}
