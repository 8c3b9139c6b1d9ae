// ABOUTME: Plain-text extraction keyed by a closed source-kind enum
// ABOUTME: Handles text, Markdown, HTML, PDF, notebooks and source code
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::errors::{AppError, AppResult};

/// Source-code language recognized by extension
///
/// Drives language-aware split boundaries in the chunk splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeLanguage {
    /// Rust
    Rust,
    /// Python
    Python,
    /// JavaScript / TypeScript
    JavaScript,
    /// Go
    Go,
    /// Java
    Java,
    /// C / C++
    C,
}

/// Supported upload source kinds, keyed by file extension
///
/// A closed enum with an exhaustive mapping: rejecting an extension is an
/// explicit `None` from [`SourceKind::from_extension`], not a fallthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Plain text (`.txt`)
    Text,
    /// Markdown (`.md`)
    Markdown,
    /// HTML (`.html`, `.htm`)
    Html,
    /// PDF (`.pdf`)
    Pdf,
    /// Jupyter notebook (`.ipynb`)
    Notebook,
    /// Source code with a known language
    Code(CodeLanguage),
}

impl SourceKind {
    /// Map a file extension (without the dot) to its source kind
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "txt" => Some(Self::Text),
            "md" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            "pdf" => Some(Self::Pdf),
            "ipynb" => Some(Self::Notebook),
            "rs" => Some(Self::Code(CodeLanguage::Rust)),
            "py" => Some(Self::Code(CodeLanguage::Python)),
            "js" | "ts" => Some(Self::Code(CodeLanguage::JavaScript)),
            "go" => Some(Self::Code(CodeLanguage::Go)),
            "java" => Some(Self::Code(CodeLanguage::Java)),
            "c" | "h" | "cc" | "cpp" | "hpp" => Some(Self::Code(CodeLanguage::C)),
            _ => None,
        }
    }

    /// Map a file name to its source kind via its extension
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = name.rsplit_once('.').map(|(_, ext)| ext)?;
        Self::from_extension(extension)
    }
}

/// URL ingestion kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlKind {
    /// Fetch the page itself
    Plain,
    /// Fetch the page plus same-host links one level deep
    Recursive,
}

/// Extract plain text from raw source bytes
///
/// # Errors
///
/// Returns `invalid_input` when the bytes cannot be decoded for the kind
pub fn extract_text(kind: SourceKind, bytes: &[u8]) -> AppResult<String> {
    match kind {
        SourceKind::Text | SourceKind::Markdown | SourceKind::Code(_) => {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        SourceKind::Html => Ok(html_to_text(&String::from_utf8_lossy(bytes))),
        SourceKind::Pdf => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| AppError::invalid_input(format!("Failed to extract PDF text: {e}"))),
        SourceKind::Notebook => notebook_to_markdown(bytes),
    }
}

// ============================================================================
// HTML
// ============================================================================

fn script_style_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // literal pattern, checked by tests
        Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>").unwrap()
    })
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // literal pattern, checked by tests
        Regex::new(r"(?s)<[^>]+>").unwrap()
    })
}

/// Strip markup from an HTML page, keeping the visible text
fn html_to_text(html: &str) -> String {
    let without_blocks = script_style_pattern().replace_all(html, "");
    // Block-level closers become line breaks so headings stay separated
    let with_breaks = without_blocks
        .replace("</p>", "\n")
        .replace("</div>", "\n")
        .replace("</li>", "\n")
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("</h1>", "\n")
        .replace("</h2>", "\n")
        .replace("</h3>", "\n");
    let without_tags = tag_pattern().replace_all(&with_breaks, " ");
    let decoded = html_escape::decode_html_entities(without_tags.as_ref()).into_owned();

    decoded
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Notebook
// ============================================================================

#[derive(Deserialize)]
struct Notebook {
    cells: Vec<NotebookCell>,
}

#[derive(Deserialize)]
struct NotebookCell {
    cell_type: String,
    source: NotebookSource,
}

/// Notebook cell sources are either a string or a list of lines
#[derive(Deserialize)]
#[serde(untagged)]
enum NotebookSource {
    Joined(String),
    Lines(Vec<String>),
}

impl NotebookSource {
    fn into_text(self) -> String {
        match self {
            Self::Joined(text) => text,
            Self::Lines(lines) => lines.concat(),
        }
    }
}

/// Render notebook cells as Markdown: markdown cells verbatim, code cells
/// fenced
fn notebook_to_markdown(bytes: &[u8]) -> AppResult<String> {
    let notebook: Notebook = serde_json::from_slice(bytes)
        .map_err(|e| AppError::invalid_input(format!("Failed to parse notebook: {e}")))?;

    let mut sections = Vec::with_capacity(notebook.cells.len());
    for cell in notebook.cells {
        let text = cell.source.into_text();
        if text.trim().is_empty() {
            continue;
        }
        match cell.cell_type.as_str() {
            "markdown" => sections.push(text),
            "code" => sections.push(format!("```\n{}\n```", text.trim_end())),
            _ => {}
        }
    }

    Ok(sections.join("\n\n"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_mapping() {
        assert_eq!(SourceKind::from_extension("txt"), Some(SourceKind::Text));
        assert_eq!(SourceKind::from_extension("MD"), Some(SourceKind::Markdown));
        assert_eq!(SourceKind::from_extension("htm"), Some(SourceKind::Html));
        assert_eq!(
            SourceKind::from_extension("py"),
            Some(SourceKind::Code(CodeLanguage::Python))
        );
        assert_eq!(SourceKind::from_extension("exe"), None);
    }

    #[test]
    fn test_file_name_mapping() {
        assert_eq!(
            SourceKind::from_file_name("notes.final.md"),
            Some(SourceKind::Markdown)
        );
        assert_eq!(SourceKind::from_file_name("no-extension"), None);
    }

    #[test]
    fn test_plain_text_extraction() {
        let text = extract_text(SourceKind::Text, b"hello world").unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_html_strips_tags_and_scripts() {
        let html = r"<html><head><script>var x = 1;</script><style>p{}</style></head>
            <body><h1>Title</h1><p>First &amp; second.</p></body></html>";
        let text = extract_text(SourceKind::Html, html.as_bytes()).unwrap();
        assert!(text.contains("Title"));
        assert!(text.contains("First & second."));
        assert!(!text.contains("var x"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_notebook_extraction() {
        let nb = r##"{
            "cells": [
                {"cell_type": "markdown", "source": ["# Heading\n", "intro"]},
                {"cell_type": "code", "source": "print('hi')"},
                {"cell_type": "raw", "source": "skipped"}
            ]
        }"##;
        let text = extract_text(SourceKind::Notebook, nb.as_bytes()).unwrap();
        assert!(text.starts_with("# Heading\nintro"));
        assert!(text.contains("```\nprint('hi')\n```"));
        assert!(!text.contains("skipped"));
    }

    #[test]
    fn test_notebook_malformed_is_rejected() {
        assert!(extract_text(SourceKind::Notebook, b"not json").is_err());
    }
}
