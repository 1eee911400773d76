//! Immutable document snapshots and the edits that move between them.
//!
//! A snapshot is a flat sequence of nodes: block boundaries (`Open`/`Close`),
//! text runs and inline atoms. Every boundary and atom occupies one document
//! position, every character of text occupies one position.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use thiserror::Error;

/// Kind tag for blocks and inline atoms (`paragraph`, `codeBlock`, `mention`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKind(Arc<str>);

impl NodeKind {
    pub const PARAGRAPH: &'static str = "paragraph";
    pub const CODE_BLOCK: &'static str = "codeBlock";
    pub const HARD_BREAK: &'static str = "hardBreak";

    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn paragraph() -> Self {
        Self::new(Self::PARAGRAPH)
    }

    pub fn code_block() -> Self {
        Self::new(Self::CODE_BLOCK)
    }

    pub fn hard_break() -> Self {
        Self::new(Self::HARD_BREAK)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single content node of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Start of a block of the given kind.
    Open(NodeKind),
    /// End of the innermost open block.
    Close,
    /// A run of text; one position per character.
    Text(String),
    /// A leaf inline node (mention, hard break, image, ...).
    Atom(NodeKind),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    /// Number of document positions this node occupies.
    pub fn size(&self) -> usize {
        match self {
            Node::Text(text) => text.chars().count(),
            Node::Open(_) | Node::Close | Node::Atom(_) => 1,
        }
    }
}

/// Structural problems detected while building or editing a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("unbalanced block boundary at position {position}")]
    Unbalanced { position: usize },
    #[error("inline content outside of any block at position {position}")]
    InlineAtRoot { position: usize },
    #[error("block mixes inline and block children at position {position}")]
    MixedContent { position: usize },
    #[error("edit range {from}..{to} is outside the document (size {size})")]
    RangeOutOfBounds { from: usize, to: usize, size: usize },
}

/// One position-sized piece of a document, used for splicing and diffing.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Unit {
    Char(char),
    Open(NodeKind),
    Close,
    Atom(NodeKind),
}

fn units_of(nodes: &[Node]) -> Vec<Unit> {
    let mut units = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Open(kind) => units.push(Unit::Open(kind.clone())),
            Node::Close => units.push(Unit::Close),
            Node::Atom(kind) => units.push(Unit::Atom(kind.clone())),
            Node::Text(text) => units.extend(text.chars().map(Unit::Char)),
        }
    }
    units
}

fn nodes_of(units: impl IntoIterator<Item = Unit>) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut text = String::new();
    for unit in units {
        let node = match unit {
            Unit::Char(c) => {
                text.push(c);
                continue;
            }
            Unit::Open(kind) => Node::Open(kind),
            Unit::Close => Node::Close,
            Unit::Atom(kind) => Node::Atom(kind),
        };
        if !text.is_empty() {
            nodes.push(Node::Text(std::mem::take(&mut text)));
        }
        nodes.push(node);
    }
    if !text.is_empty() {
        nodes.push(Node::Text(text));
    }
    nodes
}

/// Check block balance and the inline/block content rules.
///
/// A block holds either inline content (text, atoms) or other blocks, never
/// both; inline content never appears at the root. Together these guarantee
/// that two text runs in different blocks are separated by at least one
/// `Close` and one `Open`.
fn validate(nodes: &[Node]) -> Result<(), DocumentError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Content {
        Empty,
        Inline,
        Blocks,
    }

    let mut stack: Vec<Content> = Vec::new();
    let mut position = 0;
    for node in nodes {
        match node {
            Node::Open(_) => {
                if let Some(parent) = stack.last_mut() {
                    if *parent == Content::Inline {
                        return Err(DocumentError::MixedContent { position });
                    }
                    *parent = Content::Blocks;
                }
                stack.push(Content::Empty);
            }
            Node::Close => {
                if stack.pop().is_none() {
                    return Err(DocumentError::Unbalanced { position });
                }
            }
            Node::Text(_) | Node::Atom(_) => match stack.last_mut() {
                None => return Err(DocumentError::InlineAtRoot { position }),
                Some(Content::Blocks) => return Err(DocumentError::MixedContent { position }),
                Some(content) => *content = Content::Inline,
            },
        }
        position += node.size();
    }
    if stack.is_empty() {
        Ok(())
    } else {
        Err(DocumentError::Unbalanced { position })
    }
}

/// Immutable capture of a document at one version.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    version: u64,
    nodes: Arc<[Node]>,
    size: usize,
}

impl DocumentSnapshot {
    /// Build a snapshot from raw nodes, rejecting malformed structure.
    pub fn new(version: u64, nodes: Vec<Node>) -> Result<Self, DocumentError> {
        // Normalize adjacent/empty text runs so equal content compares equal.
        let nodes = nodes_of(units_of(&nodes));
        validate(&nodes)?;
        Ok(Self::from_valid(version, nodes))
    }

    /// Build a snapshot of flat text blocks; always well-formed.
    pub fn from_blocks<K, T>(version: u64, blocks: impl IntoIterator<Item = (K, T)>) -> Self
    where
        K: Into<NodeKind>,
        T: Into<String>,
    {
        let mut nodes = Vec::new();
        for (kind, text) in blocks {
            nodes.push(Node::Open(kind.into()));
            let text = text.into();
            if !text.is_empty() {
                nodes.push(Node::Text(text));
            }
            nodes.push(Node::Close);
        }
        Self::from_valid(version, nodes)
    }

    /// Build a snapshot of paragraphs.
    pub fn from_paragraphs<T: Into<String>>(
        version: u64,
        paragraphs: impl IntoIterator<Item = T>,
    ) -> Self {
        Self::from_blocks(
            version,
            paragraphs
                .into_iter()
                .map(|text| (NodeKind::paragraph(), text)),
        )
    }

    /// An empty document: a single empty paragraph.
    pub fn empty(version: u64) -> Self {
        Self::from_paragraphs(version, [""])
    }

    fn from_valid(version: u64, nodes: Vec<Node>) -> Self {
        let size = nodes.iter().map(Node::size).sum();
        Self {
            version,
            nodes: nodes.into(),
            size,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Total number of document positions.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether two snapshots hold the same content, regardless of version.
    pub fn same_content(&self, other: &DocumentSnapshot) -> bool {
        self.nodes == other.nodes
    }

    /// Text contained in a document range; boundaries and atoms contribute nothing.
    pub fn text_between(&self, range: Range<usize>) -> String {
        units_of(&self.nodes)
            .into_iter()
            .enumerate()
            .filter(|(position, _)| range.contains(position))
            .filter_map(|(_, unit)| match unit {
                Unit::Char(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    /// Apply an edit, producing the next version.
    pub fn apply(&self, edit: &DocumentEdit) -> Result<DocumentSnapshot, DocumentError> {
        let mut units = units_of(&self.nodes);
        for step in &edit.steps {
            if step.from > step.to || step.to > units.len() {
                return Err(DocumentError::RangeOutOfBounds {
                    from: step.from,
                    to: step.to,
                    size: units.len(),
                });
            }
            units.splice(step.from..step.to, units_of(&step.content));
        }
        let nodes = nodes_of(units);
        validate(&nodes)?;
        Ok(Self::from_valid(self.version + 1, nodes))
    }
}

/// Which side of an edited range a mapped position should stick to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    Backward,
    Forward,
}

/// One `{range_start, range_end, inserted_length}` triple of an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedRange {
    pub range_start: usize,
    pub range_end: usize,
    pub inserted_length: usize,
}

impl ChangedRange {
    pub fn new(range_start: usize, range_end: usize, inserted_length: usize) -> Self {
        Self {
            range_start,
            range_end,
            inserted_length,
        }
    }

    /// Map a position from before this change to after it.
    ///
    /// Positions inside a replaced range collapse to one of its ends according
    /// to `bias`. A position sitting exactly on the start or end of a non-empty
    /// replaced range stays outside of it; for a pure insertion `bias` decides.
    pub fn map(&self, position: usize, bias: Bias) -> usize {
        let (start, end) = (self.range_start, self.range_end);
        if position < start {
            return position;
        }
        if position > end {
            return position - (end - start) + self.inserted_length;
        }
        let side = if start == end {
            bias
        } else if position == start {
            Bias::Backward
        } else if position == end {
            Bias::Forward
        } else {
            bias
        };
        match side {
            Bias::Backward => start,
            Bias::Forward => start + self.inserted_length,
        }
    }
}

/// The position-level description of one atomic document change.
///
/// Ranges apply in order; each is expressed in the coordinates produced by
/// the ranges before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditDescription {
    ranges: Vec<ChangedRange>,
}

impl EditDescription {
    pub fn new(ranges: Vec<ChangedRange>) -> Self {
        Self { ranges }
    }

    pub fn ranges(&self) -> &[ChangedRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Map a position through every range of this change.
    pub fn map(&self, position: usize, bias: Bias) -> usize {
        self.ranges
            .iter()
            .fold(position, |position, range| range.map(position, bias))
    }
}

/// Replace `from..to` with `content`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditStep {
    pub from: usize,
    pub to: usize,
    pub content: Vec<Node>,
}

impl EditStep {
    pub fn inserted_length(&self) -> usize {
        self.content.iter().map(Node::size).sum()
    }
}

/// An atomic change made of ordered steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentEdit {
    steps: Vec<EditStep>,
}

impl DocumentEdit {
    pub fn new(steps: Vec<EditStep>) -> Self {
        Self { steps }
    }

    /// Replace a range with plain text.
    pub fn replace_text(from: usize, to: usize, text: &str) -> Self {
        let content = if text.is_empty() {
            Vec::new()
        } else {
            vec![Node::text(text)]
        };
        Self::new(vec![EditStep { from, to, content }])
    }

    pub fn insert_text(at: usize, text: &str) -> Self {
        Self::replace_text(at, at, text)
    }

    pub fn delete(from: usize, to: usize) -> Self {
        Self::replace_text(from, to, "")
    }

    pub fn steps(&self) -> &[EditStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn describe(&self) -> EditDescription {
        EditDescription::new(
            self.steps
                .iter()
                .map(|step| ChangedRange::new(step.from, step.to, step.inserted_length()))
                .collect(),
        )
    }

    /// The minimal single-step edit turning `old` into `new`.
    ///
    /// Returns an empty edit when both snapshots hold the same content.
    pub fn between(old: &DocumentSnapshot, new: &DocumentSnapshot) -> Self {
        let before = units_of(old.nodes());
        let after = units_of(new.nodes());

        let prefix = before
            .iter()
            .zip(&after)
            .take_while(|(a, b)| a == b)
            .count();
        if prefix == before.len() && prefix == after.len() {
            return Self::default();
        }
        let max_suffix = before.len().min(after.len()) - prefix;
        let suffix = before
            .iter()
            .rev()
            .zip(after.iter().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();

        let content = nodes_of(after[prefix..after.len() - suffix].iter().cloned());
        Self::new(vec![EditStep {
            from: prefix,
            to: before.len() - suffix,
            content,
        }])
    }
}
