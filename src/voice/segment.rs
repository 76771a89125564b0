//! Splitting text into speakable segments
//!
//! Synthesizers reject or degrade on long inputs, so text is cut into
//! segments of at most `max_len` characters. Cut points are chosen by
//! punctuation tier: sentence ends first, then clause breaks, then commas,
//! then spaces. Text with no cut point inside the window is emitted whole.

/// Sentence-ending delimiters
const TIER_1: &[char] = &['.', '?', '!'];

/// Clause delimiters
const TIER_2: &[char] = &[':', ';', '—'];

/// Comma
const TIER_3: &[char] = &[','];

/// Last resort
const TIER_4: &[char] = &[' '];

/// Closing characters kept with the sentence they follow
const SENTENCE_TRAILERS: &[char] = &['"', '?', '!'];

/// A contiguous, trimmed slice of the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// Segment text with surrounding whitespace removed
    pub text: &'a str,
    /// Byte offset of `text` within the source
    pub offset: usize,
}

impl Segment<'_> {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Split `text` into segments no longer than `max_len` characters where possible
///
/// Always returns at least one segment; empty input yields a single empty
/// segment. A remainder with no delimiter inside the window is returned as
/// one final oversized segment.
#[must_use]
pub fn segment(text: &str, max_len: usize) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = text;
    let mut base = 0;

    while rest.chars().count() > max_len {
        let Some(split_at) = find_split(rest, max_len) else {
            break;
        };

        let piece = trimmed(&rest[..split_at], base);
        if !piece.is_empty() {
            segments.push(piece);
        }
        rest = &rest[split_at..];
        base += split_at;
    }

    segments.push(trimmed(rest, base));
    segments
}

/// Segment and copy out the text of each non-empty segment
#[must_use]
pub fn segment_owned(text: &str, max_len: usize) -> Vec<String> {
    segment(text, max_len)
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(|s| s.text.to_string())
        .collect()
}

/// Prepare model output for a synthesizer
///
/// Line breaks and tabs become spaces. With `avoid_ellipses`, ellipses become
/// commas since some voices stall on them.
#[must_use]
pub fn normalize_for_speech(text: &str, avoid_ellipses: bool) -> String {
    let mut cleaned: String = text
        .chars()
        .map(|c| if matches!(c, '\r' | '\n' | '\t') { ' ' } else { c })
        .collect();

    if avoid_ellipses {
        cleaned = cleaned.replace("...", ",").replace('…', ",");
    }

    cleaned
}

/// Byte index just past the chosen delimiter, or `None` if the window has none
fn find_split(rest: &str, max_len: usize) -> Option<usize> {
    let window_end = rest
        .char_indices()
        .nth(max_len)
        .map_or(rest.len(), |(i, _)| i);
    let window = &rest[..window_end];

    if let Some(idx) = rightmost(window, TIER_1) {
        let mut end = idx + char_len_at(rest, idx);
        for c in rest[end..].chars() {
            if !SENTENCE_TRAILERS.contains(&c) {
                break;
            }
            end += c.len_utf8();
        }
        return Some(end);
    }

    [TIER_2, TIER_3, TIER_4]
        .iter()
        .find_map(|tier| rightmost(window, tier))
        .map(|idx| idx + char_len_at(rest, idx))
}

fn rightmost(window: &str, tier: &[char]) -> Option<usize> {
    window.rfind(tier)
}

fn char_len_at(s: &str, idx: usize) -> usize {
    s[idx..].chars().next().map_or(0, char::len_utf8)
}

fn trimmed(slice: &str, base: usize) -> Segment<'_> {
    let lead = slice.len() - slice.trim_start().len();
    Segment {
        text: slice.trim(),
        offset: base + lead,
    }
}
