//! Text utilities for position conversion.
//!
//! Text documents are modelled as one block per line. This module builds those
//! snapshots and converts document positions to LSP positions (UTF-16 columns)
//! and back.

use tower_lsp::lsp_types::Position;

use super::snapshot::{DocumentSnapshot, Node, NodeKind};

/// Build a snapshot from a text document.
///
/// Each line becomes a `paragraph`; lines inside a ``` fence, fence lines
/// included, become `codeBlock`s. A trailing `\r` is dropped from each line.
pub fn snapshot_from_text(text: &str, version: u64) -> DocumentSnapshot {
    let mut in_fence = false;
    let blocks = text.split('\n').map(|line| {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let is_fence = line.trim_start().starts_with("```");
        let kind = if in_fence || is_fence {
            NodeKind::code_block()
        } else {
            NodeKind::paragraph()
        };
        if is_fence {
            in_fence = !in_fence;
        }
        (kind, line.to_string())
    });
    // Collect first: the closure above mutates `in_fence`.
    let blocks: Vec<_> = blocks.collect();
    DocumentSnapshot::from_blocks(version, blocks)
}

/// Render a line-per-block snapshot back to text, joining lines with `\n`.
pub fn text_from_snapshot(snapshot: &DocumentSnapshot) -> String {
    LineIndex::new(snapshot)
        .lines
        .iter()
        .map(|line| line.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone)]
struct Line {
    /// Document position of the first character of the line.
    start: usize,
    text: String,
    /// Length in characters (document positions).
    len: usize,
}

/// Pre-computed line table for a snapshot.
///
/// Every block that directly holds inline content is one line. Positions use
/// binary search over line starts, then a scan of the line for UTF-16 columns.
#[derive(Debug, Clone)]
pub struct LineIndex {
    lines: Vec<Line>,
}

impl LineIndex {
    /// Build a line index from a snapshot.
    pub fn new(snapshot: &DocumentSnapshot) -> Self {
        let nodes = snapshot.nodes();
        let mut lines = Vec::new();
        let mut current: Option<Line> = None;
        let mut position = 0;

        for (i, node) in nodes.iter().enumerate() {
            match node {
                Node::Open(_) => {
                    let holds_inline = !matches!(nodes.get(i + 1), Some(Node::Open(_)));
                    if holds_inline {
                        current = Some(Line {
                            start: position + 1,
                            text: String::new(),
                            len: 0,
                        });
                    }
                }
                Node::Close => {
                    if let Some(line) = current.take() {
                        lines.push(line);
                    }
                }
                Node::Text(text) => {
                    if let Some(line) = current.as_mut() {
                        line.text.push_str(text);
                        line.len += node.size();
                    }
                }
                Node::Atom(_) => {
                    // Atoms occupy a position but no text; keep columns aligned.
                    if let Some(line) = current.as_mut() {
                        line.text.push('\u{fffc}');
                        line.len += 1;
                    }
                }
            }
            position += node.size();
        }

        Self { lines }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Convert a document position to an LSP position.
    ///
    /// Positions on block boundaries clamp to the end of the preceding line.
    pub fn position_of(&self, position: usize) -> Position {
        if self.lines.is_empty() {
            return Position::new(0, 0);
        }
        let line = match self.lines.binary_search_by(|l| l.start.cmp(&position)) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };
        let entry = &self.lines[line];
        let chars = position.saturating_sub(entry.start).min(entry.len);

        let col: u32 = entry
            .text
            .chars()
            .take(chars)
            .map(|c| c.len_utf16() as u32)
            .sum();

        Position::new(line as u32, col)
    }

    /// Convert an LSP position to a document position.
    ///
    /// Returns None if the line is out of bounds; columns past the end of the
    /// line clamp to the line end.
    pub fn document_position(&self, position: Position) -> Option<usize> {
        let entry = self.lines.get(position.line as usize)?;

        let mut utf16_col = 0u32;
        for (i, c) in entry.text.chars().enumerate() {
            if utf16_col >= position.character {
                return Some(entry.start + i);
            }
            utf16_col += c.len_utf16() as u32;
        }

        Some(entry.start + entry.len)
    }

    /// Convert a document range to an LSP range.
    pub fn range_of(&self, range: &std::ops::Range<usize>) -> tower_lsp::lsp_types::Range {
        let start = self.position_of(range.start);
        let end = self.position_of(range.end);
        tower_lsp::lsp_types::Range::new(start, end)
    }
}
