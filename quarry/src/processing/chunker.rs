use unicode_segmentation::UnicodeSegmentation;

use crate::config::ProcessingConfig;

/// Rough token estimate: four characters per token works well enough for
/// sizing English chunks.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Sentence-aware chunker. Paragraph boundaries are preferred split points;
/// sentences are never cut mid-way. Consecutive chunks overlap by carrying
/// trailing sentences worth roughly `overlap_percent` of the target.
#[derive(Debug, Clone)]
pub struct SemanticChunker {
    target_tokens: usize,
    overlap_tokens: usize,
}

impl SemanticChunker {
    pub fn new(config: &ProcessingConfig) -> Self {
        let target_tokens = config.chunk_target_tokens.max(50);
        Self {
            target_tokens,
            overlap_tokens: target_tokens * config.chunk_overlap_percent / 100,
        }
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let sentences = split_sentences(text);
        self.merge(sentences)
    }

    fn merge(&self, sentences: Vec<String>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_tokens = 0usize;

        for sentence in sentences {
            let sentence_tokens = estimate_tokens(&sentence);

            if current_tokens + sentence_tokens > self.target_tokens && !current.is_empty() {
                chunks.push(current.join(" "));

                let overlap = self.trailing_overlap(&current);
                current_tokens = overlap.iter().map(|s| estimate_tokens(s)).sum();
                current = overlap;
            }

            current_tokens += sentence_tokens;
            current.push(sentence);
        }

        if !current.is_empty() {
            chunks.push(current.join(" "));
        }

        chunks
    }

    fn trailing_overlap(&self, sentences: &[String]) -> Vec<String> {
        if self.overlap_tokens == 0 {
            return Vec::new();
        }

        let mut overlap = Vec::new();
        let mut tokens = 0usize;
        for sentence in sentences.iter().rev() {
            let sentence_tokens = estimate_tokens(sentence);
            if tokens + sentence_tokens > self.overlap_tokens && !overlap.is_empty() {
                break;
            }
            tokens += sentence_tokens;
            overlap.push(sentence.clone());
            if tokens >= self.overlap_tokens {
                break;
            }
        }
        overlap.reverse();
        overlap
    }
}

/// Split text into sentences, treating paragraph breaks as hard boundaries.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        let mut current = String::new();
        for grapheme in paragraph.graphemes(true) {
            current.push_str(grapheme);
            if is_sentence_boundary(&current) {
                let trimmed = current.trim().to_string();
                if !trimmed.is_empty() {
                    sentences.push(trimmed);
                }
                current.clear();
            }
        }
        if !current.trim().is_empty() {
            sentences.push(current.trim().to_string());
        }
    }

    sentences
}

fn is_sentence_boundary(text: &str) -> bool {
    let trimmed = text.trim_end();
    let Some(last_char) = trimmed.chars().last() else {
        return false;
    };

    if last_char == '\n' {
        return true;
    }
    if !matches!(last_char, '.' | '!' | '?') {
        return false;
    }

    // Common abbreviations do not end a sentence.
    const ABBREVIATIONS: &[&str] = &[
        "Mr.", "Mrs.", "Ms.", "Dr.", "Prof.", "Sr.", "Jr.", "vs.", "etc.", "i.e.", "e.g.",
        "Inc.", "Ltd.", "Corp.", "Co.", "No.", "Vol.", "Fig.", "Sec.",
    ];
    if let Some(last_word) = trimmed.split_whitespace().last() {
        if ABBREVIATIONS.contains(&last_word) {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunker(target: usize, overlap_percent: usize) -> SemanticChunker {
        SemanticChunker::new(&ProcessingConfig {
            chunk_target_tokens: target,
            chunk_overlap_percent: overlap_percent,
            max_upload_bytes: 1024,
        })
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunker(100, 10).chunk("   ").is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunker(100, 10).chunk("Revenue grew 25% in Q3.");
        assert_eq!(chunks, vec!["Revenue grew 25% in Q3.".to_string()]);
    }

    #[test]
    fn sentences_are_never_split() {
        let text = "First sentence here. Second sentence follows. Third one closes."
            .repeat(20);
        let chunks = chunker(50, 0).chunk(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.ends_with('.'), "chunk should end at a sentence: {chunk}");
        }
    }

    #[test]
    fn abbreviations_do_not_break_sentences() {
        let sentences = split_sentences("Dr. Smith arrived. He sat down.");
        assert_eq!(sentences, vec!["Dr. Smith arrived.", "He sat down."]);
    }

    #[test]
    fn paragraph_breaks_are_boundaries() {
        let sentences = split_sentences("no terminal punctuation here\n\nNext paragraph.");
        assert_eq!(
            sentences,
            vec!["no terminal punctuation here", "Next paragraph."]
        );
    }

    #[test]
    fn overlap_repeats_trailing_sentences() {
        let text = "Alpha sentence one is fairly long indeed. Beta sentence two is fairly long indeed. \
                    Gamma sentence three is fairly long indeed. Delta sentence four is fairly long indeed.";
        let chunks = chunker(20, 50).chunk(text);
        assert!(chunks.len() >= 2);
        // Some sentence from the end of chunk N reappears at the start of N+1.
        let first_tail = chunks[0].split(". ").last().unwrap().trim_end_matches('.');
        assert!(
            chunks[1].contains(first_tail),
            "expected overlap between {:?} and {:?}",
            chunks[0],
            chunks[1]
        );
    }

    #[test]
    fn token_estimate_is_quarter_of_chars() {
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
    }
}
