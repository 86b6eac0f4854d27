
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Premise markers that must not open a chunk when argument preservation is
/// enabled. Multi-word markers are matched as a whole phrase.
pub const ARGUMENT_MARKERS: &[&str] = &[
    "therefore",
    "hence",
    "thus",
    "consequently",
    "it follows that",
];

/// Configuration for splitting document text into chunks.
///
/// Sizes and offsets are measured in characters, not bytes, so multi-byte
/// text chunks the same way everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between a chunk and its predecessor.
    pub chunk_overlap: usize,
    /// Prefer paragraph and sentence boundaries over hard cuts.
    pub sentence_boundaries: bool,
    /// Keep premise markers ("therefore", "hence", ...) attached to the
    /// clause they conclude from.
    pub preserve_argument_markers: bool,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            sentence_boundaries: true,
            preserve_argument_markers: true,
        }
    }
}

/// A contiguous span of document text, the unit of embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Zero-based position of this chunk within the document.
    pub ordinal: usize,
    /// Inclusive start, in characters from the start of the document.
    pub start_offset: usize,
    /// Exclusive end, in characters.
    pub end_offset: usize,
    pub text: String,
    /// Whether the chunk contains a premise marker.
    pub has_argument_marker: bool,
}

/// Split `text` into overlapping chunks.
///
/// Deterministic: identical input and configuration always produce identical
/// boundaries. Consecutive chunks satisfy
/// `next.start_offset == previous.end_offset - chunk_overlap`, so the
/// configured overlap is exact. Empty text yields no chunks; text shorter
/// than `chunk_size` yields exactly one.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    if total == 0 {
        return Vec::new();
    }

    // Byte offset of every char boundary, so char offsets slice the source.
    let mut byte_offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    byte_offsets.push(text.len());

    // Overlap must leave room for forward progress.
    let overlap = config.chunk_overlap.min(config.chunk_size.saturating_sub(1));

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let target_end = (start + config.chunk_size).min(total);
        let end = if target_end == total {
            total
        } else {
            find_break(&chars, start, target_end, overlap, config)
        };

        let slice = &text[byte_offsets[start]..byte_offsets[end]];
        chunks.push(TextChunk {
            ordinal: chunks.len(),
            start_offset: start,
            end_offset: end,
            text: slice.to_string(),
            has_argument_marker: contains_argument_marker(slice),
        });

        if end == total {
            break;
        }
        start = end - overlap;
    }

    debug!(
        "chunked {} chars into {} chunks (size {}, overlap {})",
        total,
        chunks.len(),
        config.chunk_size,
        overlap
    );

    chunks
}

/// Pick a break position in `(floor, target_end]`, preferring paragraph
/// breaks, then sentence boundaries, then a hard cut at `target_end`.
fn find_break(
    chars: &[char],
    start: usize,
    target_end: usize,
    overlap: usize,
    config: &ChunkingConfig,
) -> usize {
    // Breaking at or before start + overlap would make the next chunk start
    // at or before this one, so boundaries that early are ignored.
    let floor = start + overlap + 1;
    if !config.sentence_boundaries || floor >= target_end {
        return target_end;
    }

    let mut end = find_paragraph_break(chars, floor, target_end)
        .or_else(|| find_sentence_break(chars, floor, target_end))
        .unwrap_or(target_end);

    if config.preserve_argument_markers && opens_with_argument_marker(chars, end) {
        // Move the break before the preceding clause so the marker and the
        // clause it concludes from travel together into the next chunk.
        if let Some(earlier) = find_sentence_break(chars, floor, end.saturating_sub(1)) {
            end = earlier;
        }
    }

    end
}

/// Last position after a blank line within `[floor, limit)`.
fn find_paragraph_break(chars: &[char], floor: usize, limit: usize) -> Option<usize> {
    let mut found = None;
    let mut i = floor.max(1);
    while i < limit {
        if chars[i] == '\n' && chars[i - 1] == '\n' {
            found = Some(i + 1);
        }
        i += 1;
    }
    found
}

/// Last position after sentence-ending punctuation within `[floor, limit)`.
fn find_sentence_break(chars: &[char], floor: usize, limit: usize) -> Option<usize> {
    let mut found = None;
    let mut i = floor;
    while i < limit {
        if matches!(chars[i], '.' | '!' | '?')
            && chars.get(i + 1).is_none_or(|c| c.is_whitespace())
        {
            found = Some(i + 1);
        }
        i += 1;
    }
    found
}

/// Whether the text beginning at `pos` (after whitespace) starts with a
/// premise marker.
fn opens_with_argument_marker(chars: &[char], pos: usize) -> bool {
    let mut i = pos;
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    let window: String = chars[i..chars.len().min(i + 24)]
        .iter()
        .collect::<String>()
        .to_lowercase();
    ARGUMENT_MARKERS.iter().any(|marker| {
        window.starts_with(marker)
            && window[marker.len()..]
                .chars()
                .next()
                .is_none_or(|c| !c.is_alphanumeric())
    })
}

/// Whether `text` contains any premise marker as a whole word or phrase.
fn contains_argument_marker(text: &str) -> bool {
    let lowered = text.to_lowercase();
    ARGUMENT_MARKERS.iter().any(|marker| {
        let mut from = 0;
        while let Some(at) = lowered[from..].find(marker) {
            let begin = from + at;
            let end = begin + marker.len();
            let before_ok = begin == 0
                || !lowered[..begin]
                    .chars()
                    .next_back()
                    .is_some_and(char::is_alphanumeric);
            let after_ok = !lowered[end..].chars().next().is_some_and(char::is_alphanumeric);
            if before_ok && after_ok {
                return true;
            }
            from = end;
        }
        false
    })
}
