use triage_core::model::document::{CHUNK_INDEX_KEY, Document};
use unicode_segmentation::UnicodeSegmentation;

/// Chunks shorter than this after trimming are not worth embedding.
const MIN_CHUNK_CHARS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl ChunkingConfig {
    /// Markdown and other prose.
    pub const PROSE: Self = Self {
        max_tokens: 1000,
        overlap_tokens: 200,
    };

    /// Trace narratives are denser, so they get bigger chunks.
    pub const NARRATIVE: Self = Self {
        max_tokens: 1500,
        overlap_tokens: 300,
    };
}

fn token_count(text: &str) -> usize {
    text.unicode_words().count()
}

/// Splits on line boundaries, carrying whole trailing lines forward as overlap.
pub fn split_text(text: &str, cfg: &ChunkingConfig) -> Vec<String> {
    let max_tokens = cfg.max_tokens.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<(&str, usize)> = Vec::new();
    let mut current_tokens = 0_usize;
    // Leading lines of `current` that were already emitted in the previous chunk.
    let mut carried = 0_usize;

    for line in text.split_inclusive('\n').flat_map(|l| split_long_line(l, max_tokens)) {
        let tokens = token_count(line);
        if current_tokens + tokens > max_tokens && !current.is_empty() {
            if current.len() > carried {
                push_chunk(&mut chunks, &current);
                let tail = overlap_tail(&current, cfg.overlap_tokens);
                current.drain(..current.len() - tail);
            } else {
                current.clear();
            }
            current_tokens = current.iter().map(|(_, t)| t).sum();
            carried = current.len();

            if current_tokens + tokens > max_tokens {
                current.clear();
                current_tokens = 0;
                carried = 0;
            }
        }
        current.push((line, tokens));
        current_tokens += tokens;
    }

    if current.len() > carried {
        push_chunk(&mut chunks, &current);
    }
    chunks
}

/// Splits a document and tags every chunk with its position.
pub fn split_document(doc: &Document, cfg: &ChunkingConfig) -> Vec<Document> {
    split_text(&doc.text, cfg)
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let mut metadata = doc.metadata.clone();
            metadata.insert(CHUNK_INDEX_KEY.to_string(), i.to_string());
            Document::new(text, metadata)
        })
        .collect()
}

fn push_chunk(chunks: &mut Vec<String>, lines: &[(&str, usize)]) {
    let text = lines.iter().map(|(l, _)| *l).collect::<String>();
    let trimmed = text.trim();
    if trimmed.chars().count() >= MIN_CHUNK_CHARS {
        chunks.push(trimmed.to_string());
    }
}

/// Number of trailing lines whose tokens fit in `budget`.
fn overlap_tail(lines: &[(&str, usize)], budget: usize) -> usize {
    let mut used = 0;
    let mut count = 0;
    for (_, tokens) in lines.iter().rev() {
        if used + tokens > budget {
            break;
        }
        used += tokens;
        count += 1;
    }
    // Never carry the whole chunk, or nothing would advance.
    count.min(lines.len().saturating_sub(1))
}

/// Breaks a single over-long line at word starts so no piece exceeds `max_tokens`.
fn split_long_line(line: &str, max_tokens: usize) -> Vec<&str> {
    if token_count(line) <= max_tokens {
        return vec![line];
    }
    let cuts = line
        .unicode_word_indices()
        .map(|(idx, _)| idx)
        .enumerate()
        .filter(|(n, _)| *n > 0 && n % max_tokens == 0)
        .map(|(_, idx)| idx)
        .collect::<Vec<_>>();

    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        pieces.push(&line[start..cut]);
        start = cut;
    }
    pieces.push(&line[start..]);
    pieces
}

#[cfg(test)]
mod tests {
    use triage_core::model::document::Metadata;

    use super::*;

    fn numbered_lines(n: usize, words_per_line: usize) -> String {
        (0..n)
            .map(|i| {
                let words = (0..words_per_line)
                    .map(|w| format!("w{i}x{w}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("line{i} {words}\n")
            })
            .collect()
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = split_text("=== Distributed Trace ===\nTrace ID: abc\n", &ChunkingConfig::NARRATIVE);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].starts_with("=== Distributed Trace ==="));
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(split_text("   \n\n ", &ChunkingConfig::PROSE).is_empty());
        assert!(split_text("", &ChunkingConfig::PROSE).is_empty());
    }

    #[test]
    fn chunks_respect_budget_and_overlap() {
        // 10 tokens per line.
        let text = numbered_lines(20, 9);
        let cfg = ChunkingConfig {
            max_tokens: 50,
            overlap_tokens: 20,
        };
        let chunks = split_text(&text, &cfg);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(token_count(chunk) <= 50);
        }
        // Two trailing lines carried into the next chunk.
        assert!(chunks[0].contains("line3 ") && chunks[0].contains("line4 "));
        assert!(chunks[1].starts_with("line3 "));
        assert!(chunks.last().unwrap().contains("line19 "));
    }

    #[test]
    fn oversized_line_is_split() {
        let line = (0..25).map(|i| format!("t{i}")).collect::<Vec<_>>().join(" ");
        let cfg = ChunkingConfig {
            max_tokens: 10,
            overlap_tokens: 0,
        };
        let chunks = split_text(&line, &cfg);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| token_count(c) <= 10));
    }

    #[test]
    fn document_chunks_keep_metadata_and_index() {
        let mut metadata = Metadata::new();
        metadata.insert("traceId".into(), "t1".into());
        let doc = Document::new(numbered_lines(30, 9), metadata);
        let cfg = ChunkingConfig {
            max_tokens: 100,
            overlap_tokens: 10,
        };
        let chunks = split_document(&doc, &cfg);
        assert!(chunks.len() >= 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.get("traceId"), Some("t1"));
            assert_eq!(chunk.get("chunkIndex"), Some(i.to_string().as_str()));
        }
    }
}
