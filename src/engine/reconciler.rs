//! Decoration overlay reconciliation.
//!
//! Decorations are remapped through every edit and replaced wholesale when a
//! fresh analysis lands. They are never re-validated against the new text.

use std::fmt;
use std::sync::Arc;

use crate::document::{Bias, EditDescription};
use crate::proofread::FlaggedSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecorationId(u64);

impl DecorationId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DecorationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A flagged span anchored to a document range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub id: DecorationId,
    pub start: usize,
    pub end: usize,
    pub span: Arc<FlaggedSpan>,
}

impl Decoration {
    /// Whether a cursor at `position` touches this decoration (end inclusive).
    pub fn contains(&self, position: usize) -> bool {
        self.start <= position && position <= self.end
    }
}

/// Map decorations through one edit.
///
/// Starts map forward, ends map backward, so text inserted at either edge
/// stays outside. Decorations that collapse are dropped.
pub fn remap(decorations: &[Decoration], edit: &EditDescription) -> Vec<Decoration> {
    if edit.is_empty() {
        return decorations.to_vec();
    }
    decorations
        .iter()
        .filter_map(|decoration| {
            let start = edit.map(decoration.start, Bias::Forward);
            let end = edit.map(decoration.end, Bias::Backward);
            (start < end).then(|| Decoration {
                start,
                end,
                ..decoration.clone()
            })
        })
        .collect()
}

/// The live overlay of one session, ordered by start position.
#[derive(Debug, Clone, Default)]
pub struct DecorationSet {
    decorations: Arc<[Decoration]>,
}

impl DecorationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remap_through_edit(&mut self, edit: &EditDescription) {
        if edit.is_empty() || self.decorations.is_empty() {
            return;
        }
        self.decorations = remap(&self.decorations, edit).into();
    }

    /// Swap in a complete new set.
    pub fn replace_all(&mut self, mut decorations: Vec<Decoration>) {
        decorations.sort_by_key(|d| (d.start, d.end, d.id));
        self.decorations = decorations.into();
    }

    pub fn remove(&mut self, id: DecorationId) -> Option<Decoration> {
        let removed = self.get(id).cloned()?;
        self.decorations = self
            .decorations
            .iter()
            .filter(|d| d.id != id)
            .cloned()
            .collect();
        Some(removed)
    }

    pub fn get(&self, id: DecorationId) -> Option<&Decoration> {
        self.decorations.iter().find(|d| d.id == id)
    }

    /// The first decoration touching `position`.
    pub fn at_position(&self, position: usize) -> Option<&Decoration> {
        self.decorations.iter().find(|d| d.contains(position))
    }

    pub fn clear(&mut self) {
        self.decorations = Arc::from(Vec::new());
    }

    /// Cheap shared copy for publishing.
    pub fn snapshot(&self) -> Arc<[Decoration]> {
        Arc::clone(&self.decorations)
    }

    pub fn len(&self) -> usize {
        self.decorations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decorations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Decoration> {
        self.decorations.iter()
    }
}
