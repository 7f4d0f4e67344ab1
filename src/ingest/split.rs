//! Length-bounded chunk splitting at punctuation boundaries.
//!
//! Pages are cut into chunks of at most `max_length` characters. Near each cut point the
//! splitter scans backward through a fixed window looking for sentence-ending punctuation;
//! when none exists the cut falls back to the hard limit so progress is always made. The
//! algorithm is pure and deterministic, measured in characters rather than bytes so
//! multi-byte text never splits inside a code point.

/// How far back from the cut point to look for a punctuation boundary.
const SPLIT_SCAN_WINDOW: usize = 300;

/// Split normalized page text into chunks of at most `max_length` characters.
///
/// Text at or under the limit comes back as a single chunk equal to the input. The chunks
/// concatenate back to the input exactly.
pub fn split_text(text: &str, max_length: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut rest: &[char] = &chars;

    while rest.len() > max_length {
        let split_index = find_split_index(rest, max_length);
        chunks.push(rest[..split_index].iter().collect());
        rest = &rest[split_index..];
    }
    chunks.push(rest.iter().collect());
    chunks
}

/// Locate the cut position for a slice longer than `max_length`.
///
/// Scans backward from `max_length` through the window for the first punctuation character;
/// falls back to a hard cut at exactly `max_length` when the scan finds none, including when
/// the window reaches position 0.
fn find_split_index(chars: &[char], max_length: usize) -> usize {
    let floor = max_length.saturating_sub(SPLIT_SCAN_WINDOW);
    let mut index = max_length;
    while index > floor {
        if is_punctuation(chars[index]) {
            return index;
        }
        index -= 1;
    }
    max_length
}

fn is_punctuation(c: char) -> bool {
    matches!(c, '.' | ':' | ';' | '?' | '!')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_with_period_at(len: usize, period_index: usize) -> String {
        let mut chars = vec!['a'; len];
        chars[period_index] = '.';
        chars.into_iter().collect()
    }

    #[test]
    fn short_text_returns_one_identical_chunk() {
        let text = "a short page of text.";
        assert_eq!(split_text(text, 7500), vec![text.to_string()]);
    }

    #[test]
    fn text_at_exact_limit_is_not_split() {
        let text: String = std::iter::repeat('x').take(7500).collect();
        let chunks = split_text(&text, 7500);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn cut_prefers_punctuation_inside_the_window() {
        let text = text_with_period_at(15000, 7300);
        let chunks = split_text(&text, 7500);
        assert_eq!(chunks[0].chars().count(), 7300);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 7500));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn cut_falls_back_to_hard_limit_without_punctuation() {
        let text: String = std::iter::repeat('b').take(7600).collect();
        let chunks = split_text(&text, 7500);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 7500);
        assert_eq!(chunks[1].chars().count(), 100);
    }

    #[test]
    fn chunks_concatenate_to_the_input() {
        let sentence = "The quick brown fox jumps over the lazy dog. ";
        let text: String = sentence.repeat(600);
        let chunks = split_text(&text, 7500);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 7500));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn multibyte_text_splits_on_character_boundaries() {
        let text: String = std::iter::repeat('ü').take(200).collect();
        let chunks = split_text(&text, 90);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 90));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn tiny_limit_without_punctuation_never_cuts_at_zero() {
        let text: String = std::iter::repeat('c').take(500).collect();
        let chunks = split_text(&text, 100);
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|chunk| !chunk.is_empty()));
    }
}
