// ABOUTME: Overlapping chunk splitter with per-source separator hierarchies
// ABOUTME: Recursively splits on the coarsest separator that still fits the budget
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use super::extract::{CodeLanguage, SourceKind};

/// Split extracted text into overlapping chunks
///
/// `chunk_size` and `chunk_overlap` are measured in characters. The
/// separator hierarchy depends on the source kind: Markdown prefers heading
/// boundaries, code prefers top-level declarations, everything else falls
/// back to paragraphs, lines, words and finally raw characters.
///
/// Overlap is taken from the tail of the preceding chunk, so consecutive
/// chunks share up to `chunk_overlap` characters of context.
#[must_use]
pub fn split_text(
    text: &str,
    kind: SourceKind,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    if text.trim().is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let separators = separators_for(kind);
    let pieces = split_recursive(text, chunk_size, &separators);
    merge_with_overlap(&pieces, chunk_size, chunk_overlap)
}

/// Separator hierarchy per source kind, coarsest first
fn separators_for(kind: SourceKind) -> Vec<&'static str> {
    match kind {
        SourceKind::Markdown => vec!["\n## ", "\n### ", "\n\n", "\n", " "],
        SourceKind::Code(language) => {
            let mut seps = language_separators(language);
            seps.extend(["\n\n", "\n", " "]);
            seps
        }
        SourceKind::Text | SourceKind::Html | SourceKind::Pdf | SourceKind::Notebook => {
            vec!["\n\n", "\n", " "]
        }
    }
}

/// Language-specific top-level boundaries
fn language_separators(language: CodeLanguage) -> Vec<&'static str> {
    match language {
        CodeLanguage::Rust => vec!["\nfn ", "\npub fn ", "\nimpl ", "\nstruct ", "\nenum "],
        CodeLanguage::Python => vec!["\ndef ", "\nclass ", "\n\tdef ", "\n    def "],
        CodeLanguage::JavaScript => vec!["\nfunction ", "\nconst ", "\nclass ", "\nexport "],
        CodeLanguage::Go => vec!["\nfunc ", "\ntype ", "\nvar "],
        CodeLanguage::Java => vec!["\npublic ", "\nprivate ", "\nprotected ", "\nclass "],
        CodeLanguage::C => vec!["\nstatic ", "\nvoid ", "\nint ", "\nstruct "],
    }
}

/// Recursively break `text` into pieces no larger than `chunk_size`
///
/// Tries the coarsest separator first; pieces that still exceed the budget
/// recurse with the remaining separators, bottoming out at a hard character
/// split on char boundaries.
fn split_recursive(text: &str, chunk_size: usize, separators: &[&str]) -> Vec<String> {
    if char_len(text) <= chunk_size {
        return vec![text.to_owned()];
    }

    let Some((separator, rest)) = separators.split_first() else {
        return hard_split(text, chunk_size);
    };

    let mut pieces = Vec::new();
    for part in split_keeping_separator(text, separator) {
        if char_len(&part) <= chunk_size {
            pieces.push(part);
        } else {
            pieces.extend(split_recursive(&part, chunk_size, rest));
        }
    }
    pieces
}

/// Split on a separator, keeping the separator attached to the following
/// part so heading/declaration markers survive the split
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return vec![text.to_owned()];
    }

    let mut parts = Vec::new();
    let mut start = 0usize;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            parts.push(text[start..idx].to_owned());
            start = idx;
        }
    }
    if start < text.len() {
        parts.push(text[start..].to_owned());
    }
    parts
}

/// Last resort: split at character boundaries
fn hard_split(text: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

/// Merge pieces into budget-sized chunks, carrying tail overlap forward
fn merge_with_overlap(pieces: &[String], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for piece in pieces {
        if !current.is_empty() && char_len(&current) + char_len(piece) > chunk_size {
            let overlap_tail = tail_chars(&current, chunk_overlap);
            let finished = std::mem::take(&mut current);
            if !finished.trim().is_empty() {
                chunks.push(finished);
            }
            current = overlap_tail;
        }
        current.push_str(piece);
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }

    chunks
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `n` characters of a string, on char boundaries
fn tail_chars(s: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let total = char_len(s);
    s.chars().skip(total.saturating_sub(n)).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(split_text("", SourceKind::Text, 100, 10).is_empty());
        assert!(split_text("   \n\n  ", SourceKind::Text, 100, 10).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_text("one short paragraph", SourceKind::Text, 100, 10);
        assert_eq!(chunks, vec!["one short paragraph".to_owned()]);
    }

    #[test]
    fn test_splits_at_paragraphs() {
        let para_a = "a".repeat(80);
        let para_b = "b".repeat(80);
        let text = format!("{para_a}\n\n{para_b}");
        let chunks = split_text(&text, SourceKind::Text, 100, 0);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].contains(&para_a));
        assert!(chunks[1].contains(&para_b));
    }

    #[test]
    fn test_chunks_respect_budget() {
        let text = "word ".repeat(500);
        let chunks = split_text(&text, SourceKind::Text, 120, 20);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 140, "chunk over budget+overlap");
        }
    }

    #[test]
    fn test_overlap_carries_tail_forward() {
        let text = "abcdefghij ".repeat(40);
        let chunks = split_text(&text, SourceKind::Text, 100, 30);
        assert!(chunks.len() > 1);
        let tail = tail_chars(&chunks[0], 30);
        assert!(
            chunks[1].starts_with(&tail),
            "second chunk should start with the first chunk's tail"
        );
    }

    #[test]
    fn test_markdown_prefers_heading_boundaries() {
        let section_a = format!("\n## Alpha\n{}", "a".repeat(90));
        let section_b = format!("\n## Beta\n{}", "b".repeat(90));
        let text = format!("intro{section_a}{section_b}");
        let chunks = split_text(&text, SourceKind::Markdown, 120, 0);
        assert!(chunks.iter().any(|c| c.contains("## Alpha")));
        assert!(chunks.iter().any(|c| c.contains("## Beta")));
    }

    #[test]
    fn test_hard_split_long_unbroken_text() {
        let text = "x".repeat(1000);
        let chunks = split_text(&text, SourceKind::Text, 100, 0);
        assert_eq!(chunks.len(), 10);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn test_hard_split_respects_utf8_boundaries() {
        let text = "日本語のテキスト".repeat(100);
        let chunks = split_text(&text, SourceKind::Text, 50, 0);
        assert!(!chunks.is_empty());
        // Would panic on a non-boundary slice; reaching here is the assertion
        let rejoined: String = chunks.concat();
        assert!(rejoined.contains("日本語"));
    }
}
