//! Plain-text extraction and offset mapping.
//!
//! Proofreading capabilities only see a linear string. This module flattens a
//! snapshot into that string and keeps, for every character offset, the
//! document position it came from.

use std::collections::HashSet;
use std::ops::Range;

use super::snapshot::{DocumentSnapshot, Node, NodeKind};

/// Inserted between text that lives in different blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n";

/// Maps plain-text character offsets to document positions.
///
/// Holds one entry per character plus one for the end boundary, so every
/// offset in `0..=len` resolves. Entries are strictly increasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetMap {
    positions: Vec<usize>,
}

impl OffsetMap {
    /// Length of the plain text this map was built from, in characters.
    pub fn len(&self) -> usize {
        self.positions.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Document position of a plain-text offset; `offset == len()` is the end boundary.
    pub fn to_document_position(&self, offset: usize) -> Option<usize> {
        self.positions.get(offset).copied()
    }

    /// Plain-text offset whose character sits at exactly this document position.
    pub fn to_plain_offset(&self, position: usize) -> Option<usize> {
        self.positions.binary_search(&position).ok()
    }

    /// Document range covered by `length` characters starting at `offset`.
    pub fn span_to_document(&self, offset: usize, length: usize) -> Option<Range<usize>> {
        let end = offset.checked_add(length)?;
        if length == 0 {
            let position = self.to_document_position(offset)?;
            return Some(position..position);
        }
        let start = self.to_document_position(offset)?;
        // The last covered character ends one position after where it starts.
        let last = self.to_document_position(end - 1)?;
        self.to_document_position(end)?;
        Some(start..last + 1)
    }
}

/// Flatten a snapshot into plain text plus its offset map.
///
/// - Text in different blocks is separated by [`BLOCK_SEPARATOR`]; its two
///   characters map to the first and last block boundary crossed.
/// - Blocks and atoms whose kind is in `excluded` contribute no characters.
/// - A `hardBreak` atom contributes a single newline.
pub fn build_plain_text(
    snapshot: &DocumentSnapshot,
    excluded: &HashSet<NodeKind>,
) -> (String, OffsetMap) {
    let mut text = String::new();
    let mut positions = Vec::new();

    let mut position = 0;
    let mut depth = 0usize;
    // Depth of the outermost excluded block we are inside of.
    let mut excluded_from: Option<usize> = None;
    // First and last block boundary crossed since the last emitted character.
    let mut boundaries: Option<(usize, usize)> = None;
    let mut end = first_content_position(snapshot);

    for node in snapshot.nodes() {
        match node {
            Node::Open(kind) => {
                if excluded_from.is_none() && excluded.contains(kind) {
                    excluded_from = Some(depth);
                }
                cross(&mut boundaries, position);
                depth += 1;
            }
            Node::Close => {
                depth = depth.saturating_sub(1);
                if excluded_from == Some(depth) {
                    excluded_from = None;
                }
                cross(&mut boundaries, position);
            }
            Node::Text(run) => {
                if excluded_from.is_none() {
                    for (i, c) in run.chars().enumerate() {
                        emit(c, position + i, &mut text, &mut positions, &mut boundaries);
                    }
                    end = position + node.size();
                }
            }
            Node::Atom(kind) => {
                if excluded_from.is_none()
                    && !excluded.contains(kind)
                    && kind.as_str() == NodeKind::HARD_BREAK
                {
                    emit('\n', position, &mut text, &mut positions, &mut boundaries);
                    end = position + 1;
                }
            }
        }
        position += node.size();
    }

    positions.push(end);
    (text, OffsetMap { positions })
}

fn emit(
    c: char,
    at: usize,
    text: &mut String,
    positions: &mut Vec<usize>,
    boundaries: &mut Option<(usize, usize)>,
) {
    if let Some((first, last)) = boundaries.take() {
        if !positions.is_empty() && first < last {
            let mut separator = BLOCK_SEPARATOR.chars();
            if let (Some(a), Some(b)) = (separator.next(), separator.next()) {
                text.push(a);
                positions.push(first);
                text.push(b);
                positions.push(last);
            }
        }
    }
    text.push(c);
    positions.push(at);
}

fn cross(boundaries: &mut Option<(usize, usize)>, position: usize) {
    *boundaries = match *boundaries {
        None => Some((position, position)),
        Some((first, _)) => Some((first, position)),
    };
}

/// Where text would start in a document with no text at all.
fn first_content_position(snapshot: &DocumentSnapshot) -> usize {
    let mut position = 0;
    for node in snapshot.nodes() {
        match node {
            Node::Open(_) => position += 1,
            _ => break,
        }
    }
    position
}
