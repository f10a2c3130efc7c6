//! Sentence segmentation for speech synthesis
//!
//! Splits reply text into sentence-sized units so synthesis can start
//! before the whole reply has arrived. Sentence-level chunking balances
//! synthesis latency against voice naturalness: a unit is large enough to
//! sound like speech, small enough to synthesize quickly.

/// A trailing fragment shorter than this is merged into the previous unit
/// instead of becoming its own synthesis call.
const MIN_TAIL_CHARS: usize = 20;

/// Hard cap on the streaming buffer; callers flush at this size even
/// without a sentence boundary, to bound synthesis latency.
pub const MAX_BUFFERED_CHARS: usize = 300;

/// One speakable span of text, ordered by `index` within its utterance.
///
/// The text is trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceUnit {
    /// Zero-based position within the utterance
    pub index: usize,

    /// Trimmed sentence text
    pub text: String,
}

/// Split a complete reply into ordered sentence units.
///
/// A unit ends at `.`, `!`, or `?` followed by whitespace or end of input.
/// A short trailing fragment (fewer than [`MIN_TAIL_CHARS`] characters) is
/// merged into the previous unit rather than emitted alone.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<SentenceUnit> {
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut span_start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if is_sentence_end(c) {
            let at_boundary = match chars.peek() {
                Some(&(_, next)) => next.is_whitespace(),
                None => true,
            };
            if at_boundary {
                let end = i + c.len_utf8();
                if !text[span_start..end].trim().is_empty() {
                    spans.push((span_start, end));
                }
                span_start = end;
            }
        }
    }

    if !text[span_start..].trim().is_empty() {
        spans.push((span_start, text.len()));
    }

    // Merge a short tail into the preceding span so TTS never gets an
    // orphaned word or two.
    if spans.len() >= 2 {
        let (tail_start, tail_end) = spans[spans.len() - 1];
        let tail = text[tail_start..tail_end].trim();
        if tail.chars().count() < MIN_TAIL_CHARS {
            spans.pop();
            let last = spans.len() - 1;
            spans[last].1 = tail_end;
        }
    }

    spans
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| SentenceUnit {
            index,
            text: text[start..end].trim().to_string(),
        })
        .collect()
}

/// Find a flush point in an accumulating streaming buffer.
///
/// Searches for the *last* sentence-ending punctuation followed by
/// whitespace at or after `min_len` characters, returning the byte index
/// just past the punctuation. Returns `None` when the buffer is shorter
/// than `min_len` or holds no boundary.
///
/// With `flush` set (stream ended), a buffer that ends in terminal
/// punctuation is itself a boundary.
#[must_use]
pub fn find_boundary(buf: &str, min_len: usize, flush: bool) -> Option<usize> {
    if flush {
        let trimmed = buf.trim_end();
        if trimmed.chars().next_back().is_some_and(is_sentence_end) {
            return Some(buf.len());
        }
    }

    if buf.chars().count() < min_len {
        return None;
    }

    let mut boundary = None;
    let mut seen = 0;
    let mut chars = buf.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        seen += 1;
        if seen >= min_len
            && is_sentence_end(c)
            && chars.peek().is_some_and(|&(_, next)| next.is_whitespace())
        {
            boundary = Some(i + c.len_utf8());
        }
    }

    boundary
}

/// Whether a character terminates a sentence
const fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}
