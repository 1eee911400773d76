//! Open document state for the language server.

use std::sync::Arc;

use dashmap::DashMap;
use tower_lsp::lsp_types::Url;

use crate::engine::SessionHandle;

use super::snapshot::DocumentSnapshot;

/// State for a single open document.
#[derive(Debug, Clone)]
pub struct DocumentEntry {
    /// The proofreading session that owns the document.
    pub session: SessionHandle,
    /// Newest snapshot the session has reported back. The session owns the
    /// document; this copy only serves position lookups.
    pub snapshot: DocumentSnapshot,
    /// Document version from the client.
    pub lsp_version: i32,
}

impl DocumentEntry {
    pub fn new(session: SessionHandle, snapshot: DocumentSnapshot, lsp_version: i32) -> Self {
        Self {
            session,
            snapshot,
            lsp_version,
        }
    }
}

/// Thread-safe storage for open documents. Clones share the same map.
#[derive(Debug, Default, Clone)]
pub struct DocumentStore {
    documents: Arc<DashMap<Url, DocumentEntry>>,
}

impl DocumentStore {
    /// Create a new empty document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document, replacing any previous entry.
    pub fn open(&self, uri: Url, entry: DocumentEntry) -> Option<DocumentEntry> {
        self.documents.insert(uri, entry)
    }

    /// Close a document. Dropping the returned entry releases its session.
    pub fn close(&self, uri: &Url) -> Option<DocumentEntry> {
        self.documents.remove(uri).map(|(_, entry)| entry)
    }

    /// Get a copy of a document's state.
    pub fn get(&self, uri: &Url) -> Option<DocumentEntry> {
        self.documents.get(uri).map(|r| r.clone())
    }

    pub fn session(&self, uri: &Url) -> Option<SessionHandle> {
        self.documents.get(uri).map(|r| r.session.clone())
    }

    /// Record a snapshot returned by the session, unless a newer one is
    /// already mirrored. Replies to concurrent requests may arrive out of order.
    pub fn mirror(&self, uri: &Url, snapshot: DocumentSnapshot, lsp_version: Option<i32>) {
        self.update(uri, |entry| {
            if snapshot.version() >= entry.snapshot.version() {
                entry.snapshot = snapshot;
            }
            if let Some(version) = lsp_version {
                entry.lsp_version = entry.lsp_version.max(version);
            }
        });
    }

    /// Mutate a document's state in place. Must not be held across an await.
    pub fn update<R>(&self, uri: &Url, f: impl FnOnce(&mut DocumentEntry) -> R) -> Option<R> {
        self.documents.get_mut(uri).map(|mut r| f(r.value_mut()))
    }
}
