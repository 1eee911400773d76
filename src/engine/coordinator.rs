//! Analysis request bookkeeping.
//!
//! Every analysis gets a generation number. Only the most recently issued
//! generation may touch the overlay; anything older is discarded when it
//! arrives. In-flight calls are never aborted.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::document::{build_plain_text, DocumentSnapshot, EditDescription, NodeKind, OffsetMap};
use crate::proofread::{FlaggedSpan, ProofreadError};

use super::reconciler::{remap, Decoration, DecorationId};

/// What the session should do after [`AnalysisCoordinator::begin`].
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// Nothing to analyse: clear the overlay.
    Clear { generation: u64 },
    /// Call the proofreader with this request.
    Analyze(AnalysisRequest),
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub generation: u64,
    pub snapshot_version: u64,
    pub plain_text: Arc<str>,
    pub offset_map: Arc<OffsetMap>,
}

/// Result of feeding a proofreader response back in.
#[derive(Debug)]
pub enum Completion {
    /// Fresh decorations, already mapped to the current document.
    Apply(Vec<Decoration>),
    /// A newer request was issued since; the response was dropped.
    Superseded,
    /// The proofreader failed. The overlay stays as it is.
    Failed(ProofreadError),
}

#[derive(Debug)]
struct InFlight {
    generation: u64,
    snapshot_version: u64,
    offset_map: Arc<OffsetMap>,
}

#[derive(Debug)]
pub struct AnalysisCoordinator {
    current_generation: u64,
    excluded: HashSet<NodeKind>,
    in_flight: Option<InFlight>,
    /// Edits applied since the in-flight request's snapshot.
    edits: Vec<EditDescription>,
    next_decoration_id: u64,
}

impl AnalysisCoordinator {
    pub fn new(excluded: HashSet<NodeKind>) -> Self {
        Self {
            current_generation: 0,
            excluded,
            in_flight: None,
            edits: Vec::new(),
            next_decoration_id: 1,
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.current_generation
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Issue a new generation for `snapshot`, superseding every earlier one.
    pub fn begin(&mut self, snapshot: &DocumentSnapshot, enabled: bool) -> Dispatch {
        self.current_generation += 1;
        let generation = self.current_generation;
        self.edits.clear();

        if !enabled {
            self.in_flight = None;
            debug!(generation, "proofreading disabled, clearing overlay");
            return Dispatch::Clear { generation };
        }

        let (text, offset_map) = build_plain_text(snapshot, &self.excluded);
        if text.trim().is_empty() {
            self.in_flight = None;
            debug!(generation, "nothing to proofread, clearing overlay");
            return Dispatch::Clear { generation };
        }

        let offset_map = Arc::new(offset_map);
        self.in_flight = Some(InFlight {
            generation,
            snapshot_version: snapshot.version(),
            offset_map: Arc::clone(&offset_map),
        });
        debug!(
            generation,
            version = snapshot.version(),
            chars = offset_map.len(),
            "dispatching analysis"
        );
        Dispatch::Analyze(AnalysisRequest {
            generation,
            snapshot_version: snapshot.version(),
            plain_text: text.into(),
            offset_map,
        })
    }

    /// Note an edit applied to the document while a request may be in flight.
    pub fn record_edit(&mut self, edit: EditDescription) {
        if self.in_flight.is_some() && !edit.is_empty() {
            self.edits.push(edit);
        }
    }

    /// Accept the response for `generation`.
    pub fn complete(
        &mut self,
        generation: u64,
        result: Result<Vec<FlaggedSpan>, ProofreadError>,
    ) -> Completion {
        let Some(in_flight) = self
            .in_flight
            .take_if(|in_flight| in_flight.generation == generation)
        else {
            debug!(
                generation,
                current = self.current_generation,
                "discarding superseded analysis"
            );
            return Completion::Superseded;
        };
        let edits = std::mem::take(&mut self.edits);

        let spans = match result {
            Ok(spans) => spans,
            Err(e) => return Completion::Failed(e),
        };

        let mut decorations = Vec::with_capacity(spans.len());
        for span in spans {
            let range = in_flight
                .offset_map
                .span_to_document(span.offset, span.length);
            debug_assert!(
                range.is_some(),
                "span {}+{} outside of plain text",
                span.offset,
                span.length
            );
            let Some(range) = range else {
                warn!(
                    offset = span.offset,
                    length = span.length,
                    "dropping span outside of the analysed text"
                );
                continue;
            };
            if range.is_empty() {
                continue;
            }
            decorations.push(Decoration {
                id: DecorationId::new(self.next_decoration_id),
                start: range.start,
                end: range.end,
                span: Arc::new(span),
            });
            self.next_decoration_id += 1;
        }

        for edit in &edits {
            decorations = remap(&decorations, edit);
        }
        debug!(
            generation,
            snapshot_version = in_flight.snapshot_version,
            remapped_edits = edits.len(),
            decorations = decorations.len(),
            "analysis applied"
        );
        Completion::Apply(decorations)
    }
}
