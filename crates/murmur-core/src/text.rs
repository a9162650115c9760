//! The pipe-delimited `rawText` format and the text clean-up applied before
//! anything is persisted or classified.
//!
//! A publication's raw text is `post | comment_1 | ... | comment_k`. A string
//! without any `|` is a post with zero comments.

use crate::sentiment::UnitKind;

/// Maximum characters of a persisted publication's raw text.
pub const RAW_TEXT_MAX_CHARS: usize = 4000;

/// Maximum characters of a single classified unit.
pub const UNIT_TEXT_MAX_CHARS: usize = 2000;

pub const SEGMENT_DELIMITER: char = '|';

/// One classifiable fragment of a publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    pub kind: UnitKind,
    pub text: String,
}

/// Strip control characters and pictographic emoji, collapse whitespace runs
/// to a single space, trim, and cut to at most `max_chars` characters.
#[must_use]
pub fn sanitize(input: &str, max_chars: usize) -> String {
    let filtered: String = input
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some(' ')
            } else if c.is_control() || is_pictographic(c) {
                None
            } else {
                Some(c)
            }
        })
        .collect();

    let collapsed = filtered.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, max_chars).trim_end().to_string()
}

/// Return the longest prefix of `s` holding at most `max_chars` characters.
#[must_use]
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Make a single segment safe to embed in raw text by replacing the delimiter.
#[must_use]
pub fn escape_segment(segment: &str) -> String {
    segment.replace(SEGMENT_DELIMITER, "-")
}

/// Split raw text into a post followed by its comments.
///
/// Segments are whitespace-normalized and empty segments are skipped, so the
/// first non-empty segment is always the post.
#[must_use]
pub fn decompose(raw_text: &str) -> Vec<TextUnit> {
    raw_text
        .split(SEGMENT_DELIMITER)
        .map(|segment| sanitize(segment, UNIT_TEXT_MAX_CHARS))
        .filter(|segment| !segment.is_empty())
        .enumerate()
        .map(|(idx, text)| TextUnit {
            kind: if idx == 0 {
                UnitKind::Post
            } else {
                UnitKind::Comment(u32::try_from(idx).unwrap_or(u32::MAX))
            },
            text,
        })
        .collect()
}

/// Join units back into raw text in post-then-comments order.
///
/// Ordering comes from each unit's kind, not from slice position.
#[must_use]
pub fn recombine(units: &[TextUnit]) -> String {
    let mut ordered: Vec<&TextUnit> = units.iter().collect();
    ordered.sort_by_key(|unit| unit.kind);
    ordered
        .iter()
        .map(|unit| unit.text.as_str())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Join a post and its comments into raw text, escaping embedded delimiters.
#[must_use]
pub fn join_segments<S: AsRef<str>>(post: &str, comments: &[S]) -> String {
    std::iter::once(escape_segment(post))
        .chain(comments.iter().map(|c| escape_segment(c.as_ref())))
        .map(|segment| sanitize(&segment, UNIT_TEXT_MAX_CHARS))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

fn is_pictographic(c: char) -> bool {
    matches!(
        u32::from(c),
        0x1F000..=0x1FAFF   // mahjong through symbols & pictographs extended-A
            | 0x2600..=0x27BF   // misc symbols, dingbats
            | 0x2B00..=0x2BFF   // arrows and stars used as emoji
            | 0xFE00..=0xFE0F   // variation selectors
            | 0x200D            // zero-width joiner
            | 0xE0020..=0xE007F // tag sequences
    )
}
