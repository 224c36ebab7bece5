//! Source blocks
//!
//! The concrete cell type exchanged with language front-ends. A block
//! carries everything a UI needs to render one cell: its position, its
//! lexemes, the focus and highlight structure over them, hover text, and a
//! pre-rendered HTML body. The engine core never inspects any of this; it
//! only compares blocks for equality.

use cellflow_types::Span;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index of a lexeme within its block.
pub type LexemeId = u32;

/// How a highlighted span should be styled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HighlightKind {
    /// The span of a whole group the focused lexeme belongs to.
    HighlightGroup,
    /// The span of the focused lexeme itself.
    HighlightLeaf,
}

/// One token of a block, with its byte span in the source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lexeme {
    pub id: LexemeId,
    pub text: String,
    pub span: Span,
}

/// A top-level, independently evaluable fragment of the source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBlock {
    /// 1-based line number of the block's first line.
    pub line: usize,
    /// Position of the block within the file.
    pub block_id: u64,
    pub lexemes: Vec<Lexeme>,
    /// Child lexeme to the parent lexeme that owns its focus.
    pub focus_map: BTreeMap<LexemeId, LexemeId>,
    /// Focus target to the spans lit up when it is hovered.
    pub highlight_map: BTreeMap<LexemeId, Vec<(HighlightKind, Span)>>,
    /// Focus target to its hover text.
    pub hover_map: BTreeMap<LexemeId, String>,
    /// Pre-rendered HTML body of the block.
    pub html: String,
}

/// Minimal plain-text front-end.
///
/// Blocks are blank-line-separated runs of text, lexemes are whitespace
/// tokens, evaluation echoes the block back as escaped HTML. Exists so the
/// CLI works on any text file out of the box and so tests have a concrete
/// front-end; a real language supplies its own parse and eval functions.
pub mod plain {
    use super::*;
    use crate::evaluator::{CancelToken, EvalFn};
    use crate::parser::ParseFn;
    use crate::EngineConfig;
    use std::sync::Arc;

    /// Split text into blank-line-separated blocks.
    pub fn parse_blocks(text: &str) -> Vec<SourceBlock> {
        let mut blocks = Vec::new();
        let mut offset = 0;
        let mut line = 1;
        let mut current: Vec<(usize, usize, &str)> = Vec::new();
        let mut current_line = 1;

        for raw_line in text.split('\n') {
            if raw_line.trim().is_empty() {
                if !current.is_empty() {
                    blocks.push(build_block(blocks.len() as u64, current_line, &current));
                    current.clear();
                }
            } else {
                if current.is_empty() {
                    current_line = line;
                }
                current.push((offset, offset + raw_line.len(), raw_line));
            }
            offset += raw_line.len() + 1;
            line += 1;
        }
        if !current.is_empty() {
            blocks.push(build_block(blocks.len() as u64, current_line, &current));
        }
        blocks
    }

    fn build_block(block_id: u64, line: usize, lines: &[(usize, usize, &str)]) -> SourceBlock {
        let mut lexemes = Vec::new();
        for &(line_start, _, text) in lines {
            for (col, word) in split_words(text) {
                let start = line_start + col;
                lexemes.push(Lexeme {
                    id: lexemes.len() as LexemeId,
                    text: word.to_string(),
                    span: Span::new(start, start + word.len()),
                });
            }
        }

        let block_span = lexemes
            .iter()
            .map(|lexeme| lexeme.span)
            .reduce(|acc, span| acc.merge(&span))
            .unwrap_or_default();

        // Flat focus structure: every lexeme focuses the block head.
        let mut focus_map = BTreeMap::new();
        let mut highlight_map = BTreeMap::new();
        let mut hover_map = BTreeMap::new();
        if let Some(head) = lexemes.first() {
            for lexeme in &lexemes {
                focus_map.insert(lexeme.id, head.id);
                highlight_map
                    .insert(lexeme.id, vec![(HighlightKind::HighlightLeaf, lexeme.span)]);
            }
            highlight_map
                .get_mut(&head.id)
                .expect("head lexeme missing from highlight map")
                .push((HighlightKind::HighlightGroup, block_span));
            hover_map.insert(head.id, format!("{} lexemes", lexemes.len()));
        }

        let body: Vec<&str> = lines.iter().map(|(_, _, text)| *text).collect();
        let html = format!("<pre class=\"cell\">{}</pre>", escape_html(&body.join("\n")));

        SourceBlock {
            line,
            block_id,
            lexemes,
            focus_map,
            highlight_map,
            hover_map,
            html,
        }
    }

    fn split_words(line: &str) -> impl Iterator<Item = (usize, &str)> {
        line.split_whitespace()
            .map(move |word| (word.as_ptr() as usize - line.as_ptr() as usize, word))
    }

    /// Render an evaluation output as an HTML fragment.
    pub fn render_result(output: &str) -> String {
        format!("<div class=\"result\">{}</div>", escape_html(output))
    }

    fn escape_html(text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for ch in text.chars() {
            match ch {
                '&' => escaped.push_str("&amp;"),
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                '"' => escaped.push_str("&quot;"),
                '\'' => escaped.push_str("&#39;"),
                other => escaped.push(other),
            }
        }
        escaped
    }

    /// Engine configuration for the plain front-end: echo evaluation with
    /// a unit environment.
    pub fn engine_config() -> EngineConfig<SourceBlock, String, ()> {
        let parse: ParseFn<SourceBlock> = Arc::new(parse_blocks);
        let eval: EvalFn<SourceBlock, String, ()> =
            Arc::new(|env: (), block: &SourceBlock, _token: &CancelToken| {
                let text: Vec<&str> = block
                    .lexemes
                    .iter()
                    .map(|lexeme| lexeme.text.as_str())
                    .collect();
                (render_result(&text.join(" ")), env)
            });
        EngineConfig { parse, eval }
    }

}
