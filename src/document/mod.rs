//! Document model, position mapping and document state.
//!
//! This module provides:
//! - `DocumentSnapshot` and `DocumentEdit`, the immutable node model and its edits
//! - `build_plain_text` and `OffsetMap` for plain-text <-> document positions
//! - `LineIndex` for document position <-> LSP position conversion
//! - `DocumentStore` for open text documents and their sessions

mod mapper;
mod snapshot;
mod state;
mod text;

pub use mapper::{build_plain_text, OffsetMap, BLOCK_SEPARATOR};
pub use snapshot::{
    Bias, ChangedRange, DocumentEdit, DocumentError, DocumentSnapshot, EditDescription, EditStep,
    Node, NodeKind,
};
pub use state::{DocumentEntry, DocumentStore};
pub use text::{snapshot_from_text, text_from_snapshot, LineIndex};
