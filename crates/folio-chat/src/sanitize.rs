//! Markdown and reasoning-markup removal for model output.
//!
//! The portfolio widget renders plain text, and some models (qwen3 in
//! particular) think out loud inside `<think>` blocks. [`sanitize`] strips
//! both from a piece of text; [`ReasoningFilter`] applies it to a live
//! stream whose reasoning blocks may be split across fragments.

use once_cell::sync::Lazy;
use regex::Regex;

/// Opening markers, lowercase, of the blocks removed with their content.
const REASONING_TAGS: &[&str] = &["redacted_reasoning", "think", "thinking", "reasoning"];

static REASONING_BLOCKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    REASONING_TAGS
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}>.*?</{tag}>")).expect("valid reasoning pattern")
        })
        .collect()
});

/// Any opening marker; capture group `n` is `REASONING_TAGS[n - 1]`.
static OPEN_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(?:(redacted_reasoning)|(think)|(thinking)|(reasoning))>")
        .expect("valid open-tag pattern")
});

/// Closing markers, case-folded the same way as [`REASONING_BLOCKS`].
static CLOSE_TAGS: Lazy<Vec<Regex>> = Lazy::new(|| {
    REASONING_TAGS
        .iter()
        .map(|tag| Regex::new(&format!(r"(?i)</{tag}>")).expect("valid close-tag pattern"))
        .collect()
});

/// `(pattern, replacement)` applied in order after reasoning blocks.
static MARKDOWN: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\*\*(.*?)\*\*", "${1}"),
        (r"\*(.*?)\*", "${1}"),
        (r"`(.*?)`", "${1}"),
        (r"\[(.*?)\]\(.*?\)", "${1}"),
        (r"(?m)(^|\s)#{1,6}[ \t]+", "${1}"),
    ]
    .into_iter()
    .map(|(p, r)| (Regex::new(p).expect("valid markdown pattern"), r))
    .collect()
});

fn sanitize_once(text: &str) -> String {
    let mut out = text.to_string();
    for block in REASONING_BLOCKS.iter() {
        out = block.replace_all(&out, "").into_owned();
    }
    for (pattern, replacement) in MARKDOWN.iter() {
        out = pattern.replace_all(&out, *replacement).into_owned();
    }
    out
}

/// Strip reasoning blocks and markdown decoration from `text`.
///
/// Every substitution only deletes characters, so repeating the pass until
/// nothing changes terminates, and the result is a fixed point.
/// Whitespace is never trimmed.
pub fn sanitize(text: &str) -> String {
    if !text.contains(['*', '`', '[', '#', '<']) {
        return text.to_string();
    }
    let mut current = sanitize_once(text);
    loop {
        let next = sanitize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Byte offset of the first reasoning block that has no closing tag yet.
fn unclosed_block_start(text: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(caps) = OPEN_TAG.captures_at(text, from) {
        let open = caps.get(0)?;
        let tag = (1..caps.len()).find(|&i| caps.get(i).is_some())? - 1;
        match CLOSE_TAGS[tag].find_at(text, open.end()) {
            Some(close) => from = close.end(),
            None => return Some(open.start()),
        }
    }
    None
}

/// Byte offset of a trailing `<...` that could still grow into an opening tag.
fn partial_tag_start(text: &str) -> Option<usize> {
    let lt = text.rfind('<')?;
    let tail = text[lt..].to_lowercase();
    if tail.contains('>') {
        return None;
    }
    REASONING_TAGS
        .iter()
        .any(|tag| format!("<{}>", tag).starts_with(&tail))
        .then_some(lt)
}

/// Sanitizes a fragment stream, holding back text that may belong to a
/// reasoning block until the block closes.
#[derive(Debug, Default)]
pub struct ReasoningFilter {
    pending: String,
}

impl ReasoningFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw fragment; returns the sanitized text safe to emit now
    /// (possibly empty).
    pub fn push(&mut self, fragment: &str) -> String {
        self.pending.push_str(fragment);
        let safe = unclosed_block_start(&self.pending)
            .or_else(|| partial_tag_start(&self.pending))
            .unwrap_or(self.pending.len());
        if safe == 0 {
            return String::new();
        }
        let ready: String = self.pending.drain(..safe).collect();
        sanitize(&ready)
    }

    /// End of stream. A reasoning block that never closed is discarded.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        let visible = match unclosed_block_start(&rest) {
            Some(start) => &rest[..start],
            None => &rest[..],
        };
        sanitize(visible)
    }
}
