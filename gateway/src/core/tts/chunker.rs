//! Sentence chunking for streaming synthesis
//!
//! Generated text is handed to the synthesis backend one sentence at a time
//! so audio can start before the whole response is framed. Sentences longer
//! than the chunk limit are split on word boundaries, and a single word
//! longer than the limit is split on character boundaries.

/// Default chunk size limit in characters.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 250;

/// Characters that end a sentence when followed by whitespace or end of text.
const SENTENCE_TERMINATORS: [char; 5] = ['.', '!', '?', ';', '…'];

/// Split `text` into sentence-sized chunks of at most `max_chars` characters.
///
/// When `max_chars` is 0, [`DEFAULT_MAX_CHUNK_CHARS`] is used. Every chunk
/// is trimmed and non-empty; whitespace-only input yields no chunks.
#[must_use]
pub fn chunk_for_synthesis(text: &str, max_chars: usize) -> Vec<String> {
    let limit = if max_chars == 0 {
        DEFAULT_MAX_CHUNK_CHARS
    } else {
        max_chars
    };

    split_sentences(text)
        .into_iter()
        .flat_map(|sentence| split_long(sentence, limit))
        .collect()
}

/// Split on sentence terminators and line breaks, keeping the punctuation.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        let boundary = if ch == '\n' {
            true
        } else if SENTENCE_TERMINATORS.contains(&ch) {
            // Runs like "?!" or "..." stay with their sentence
            match chars.peek() {
                None => true,
                Some((_, next)) => next.is_whitespace(),
            }
        } else {
            false
        };

        if boundary {
            let end = idx + ch.len_utf8();
            push_trimmed(&mut sentences, &text[start..end]);
            start = end;
        }
    }
    push_trimmed(&mut sentences, &text[start..]);

    sentences
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, segment: &'a str) {
    let trimmed = segment.trim();
    if !trimmed.is_empty() {
        out.push(trimmed);
    }
}

/// Pack the words of an over-long sentence into chunks within `limit`.
fn split_long(sentence: &str, limit: usize) -> Vec<String> {
    if sentence.chars().count() <= limit {
        return vec![sentence.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in sentence.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > limit {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            chunks.extend(hard_split(word, limit));
            continue;
        }

        let needed = if current.is_empty() {
            word_len
        } else {
            current_len + 1 + word_len
        };
        if needed > limit {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Split a single word at character boundaries.
fn hard_split(word: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(limit)
        .map(|piece| piece.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_sentence() {
        assert_eq!(chunk_for_synthesis("Hi there!", 0), vec!["Hi there!"]);
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert!(chunk_for_synthesis("", 0).is_empty());
        assert!(chunk_for_synthesis("  \n\t ", 0).is_empty());
    }

    #[test]
    fn test_splits_on_sentence_boundaries() {
        let chunks = chunk_for_synthesis("Hello there. How are you? I am fine!", 0);
        assert_eq!(chunks, vec!["Hello there.", "How are you?", "I am fine!"]);
    }

    #[test]
    fn test_keeps_decimal_numbers_together() {
        let chunks = chunk_for_synthesis("Pi is 3.14 roughly. Yes.", 0);
        assert_eq!(chunks, vec!["Pi is 3.14 roughly.", "Yes."]);
    }

    #[test]
    fn test_punctuation_runs_stay_attached() {
        let chunks = chunk_for_synthesis("Really?! Wait... okay.", 0);
        assert_eq!(chunks, vec!["Really?!", "Wait...", "okay."]);
    }

    #[test]
    fn test_newlines_are_boundaries() {
        let chunks = chunk_for_synthesis("First line\nSecond line", 0);
        assert_eq!(chunks, vec!["First line", "Second line"]);
    }

    #[test]
    fn test_long_sentence_split_on_words() {
        let chunks = chunk_for_synthesis("one two three four five six", 10);
        assert_eq!(chunks, vec!["one two", "three four", "five six"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn test_oversized_word_hard_split() {
        let chunks = chunk_for_synthesis("abcdefghij xy", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij", "xy"]);
    }

    #[test]
    fn test_multibyte_text_is_char_safe() {
        let chunks = chunk_for_synthesis("Ça va très bien. ありがとうございます", 5);
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
        assert_eq!(chunks.concat().replace(' ', ""), "Çavatrèsbien.ありがとうございます");
    }

    #[test]
    fn test_every_chunk_non_empty() {
        let chunks = chunk_for_synthesis(". ! ? \n\n a.", 0);
        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
    }
}
