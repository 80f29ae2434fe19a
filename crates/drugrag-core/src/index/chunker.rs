//! Character-window chunking for plain-text sources

use std::ops::Range;

pub const CHUNK_SIZE_CHARS: usize = 3200;
pub const CHUNK_OVERLAP_CHARS: usize = 480;

/// A slice of a document before it is embedded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    /// Byte range within the document
    pub range: Range<usize>,
}

fn floor_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Where to end a window that ends at `end`: the last paragraph, sentence,
/// line or word break within the final 30% of the window.
fn break_point(content: &str, start: usize, end: usize, size: usize) -> usize {
    let search_start = ceil_boundary(content, start + size * 70 / 100);
    if search_start >= end {
        return end;
    }
    let region = &content[search_start..end];
    let offset = ["\n\n", ". ", "\n", " "]
        .iter()
        .find_map(|sep| region.rfind(sep).map(|pos| pos + sep.len()));
    match offset {
        Some(off) => search_start + off,
        None => end,
    }
}

/// Split `content` into windows of at most `size` bytes overlapping by `overlap`.
///
/// Blank windows are skipped. Every span's text equals `content[range]`.
pub fn chunk_text(content: &str, size: usize, overlap: usize) -> Vec<TextSpan> {
    let size = size.max(1);
    let overlap = overlap.min(size / 2);
    let mut spans = Vec::new();
    let mut start = 0;

    while start < content.len() {
        let raw_end = floor_boundary(content, start + size);
        // A window narrower than one char would stall on multi-byte input.
        let end = if raw_end <= start {
            ceil_boundary(content, start + 1)
        } else {
            raw_end
        };
        let chunk_end = if end < content.len() {
            break_point(content, start, end, size)
        } else {
            end
        };

        if !content[start..chunk_end].trim().is_empty() {
            spans.push(TextSpan {
                text: content[start..chunk_end].to_string(),
                range: start..chunk_end,
            });
        }

        if chunk_end >= content.len() {
            break;
        }
        let next = ceil_boundary(content, chunk_end.saturating_sub(overlap));
        start = if next > start { next } else { chunk_end };
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_content_is_one_span() {
        let spans = chunk_text("Small content.", 100, 20);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].range, 0..14);
    }

    #[test]
    fn test_spans_match_source_ranges() {
        let content = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let spans = chunk_text(content, 30, 5);
        assert!(spans.len() >= 2);
        for span in &spans {
            assert_eq!(&content[span.range.clone()], span.text);
        }
        assert_eq!(spans.last().unwrap().range.end, content.len());
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let content = "aaaa aaaa aaaa aaaa aaaa.\n\nbbbb bbbb bbbb";
        let spans = chunk_text(content, 30, 0);
        assert!(spans[0].text.ends_with("\n\n"));
    }

    #[test]
    fn test_handles_multibyte_characters() {
        let content = "Ibuprofeno é um anti-inflamatório não esteroide. ".repeat(20);
        let spans = chunk_text(&content, 7, 3);
        assert!(!spans.is_empty());
        for span in &spans {
            assert_eq!(&content[span.range.clone()], span.text);
        }
    }

    #[test]
    fn test_blank_content_yields_nothing() {
        assert!(chunk_text("   \n\n  ", 100, 10).is_empty());
        assert!(chunk_text("", 100, 10).is_empty());
    }
}
