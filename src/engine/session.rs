//! Per-editor proofreading session.
//!
//! A session is a single task that owns the document snapshot, the debounce
//! scheduler, the analysis coordinator, the decoration set and the popup.
//! Everything that touches that state arrives as an event on one channel and
//! is handled in arrival order. Proofreader calls run in separate tasks and
//! report back through a second channel, so generation checks and overlay
//! updates always happen on the session task.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::document::{DocumentEdit, DocumentError, DocumentSnapshot, Node, NodeKind};
use crate::proofread::{FlaggedSpan, ProofreadError, Proofreader};

use super::coordinator::{AnalysisCoordinator, Completion, Dispatch};
use super::enablement::{EnablementStore, Subscription};
use super::popup::{PopupIntent, PopupOptions, PopupView, ScreenPoint, SuggestionPopup};
use super::reconciler::{Decoration, DecorationId, DecorationSet};
use super::scheduler::{DebounceScheduler, PastePolicy, Trigger};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(1000);
pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub quiet_period: Duration,
    pub paste_policy: PastePolicy,
    /// Proofreader calls taking longer than this count as failed.
    pub analysis_timeout: Duration,
    /// Passed to the proofreader; `None` uses the backend default.
    pub locale: Option<String>,
    /// Block and atom kinds whose content is never proofread.
    pub excluded_kinds: HashSet<NodeKind>,
    pub popup: PopupOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
            paste_policy: PastePolicy::default(),
            analysis_timeout: DEFAULT_ANALYSIS_TIMEOUT,
            locale: None,
            excluded_kinds: HashSet::from([NodeKind::code_block()]),
            popup: PopupOptions::default(),
        }
    }
}

/// Where an edit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    Typing,
    Paste,
    /// An accepted suggestion. Does not schedule another analysis.
    Correction,
}

/// How the user pointed at a decoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Cursor or click at a document position.
    At(usize),
    Decoration(DecorationId),
}

/// Decorations aligned to a snapshot.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub snapshot: DocumentSnapshot,
    pub decorations: Arc<[Decoration]>,
}

/// An accepted suggestion, already applied to the session's document.
#[derive(Debug, Clone)]
pub struct Correction {
    pub edit: DocumentEdit,
    /// The document the edit applies to.
    pub base: DocumentSnapshot,
    /// The document after the edit.
    pub snapshot: DocumentSnapshot,
}

impl Correction {
    pub fn base_version(&self) -> u64 {
        self.base.version()
    }

    /// The replacement text, as inserted.
    pub fn inserted_text(&self) -> String {
        self.edit
            .steps()
            .iter()
            .flat_map(|step| step.content.iter())
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum SessionOutput {
    Overlay(Overlay),
    Popup(PopupIntent),
    ApplyEdit(Correction),
}

/// Point-in-time view of a session, for inspection.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub snapshot: DocumentSnapshot,
    pub decorations: Arc<[Decoration]>,
    pub popup: Option<PopupView>,
    pub generation: u64,
    pub analysis_pending: bool,
    pub analysis_scheduled: bool,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("proofreading session has shut down")]
    Closed,
    #[error(transparent)]
    Document(#[from] DocumentError),
}

enum SessionEvent {
    Edit {
        edit: DocumentEdit,
        origin: EditOrigin,
        reply: oneshot::Sender<Result<DocumentSnapshot, DocumentError>>,
    },
    Replace {
        next: DocumentSnapshot,
        origin: EditOrigin,
        reply: oneshot::Sender<Result<DocumentSnapshot, DocumentError>>,
    },
    Activate {
        target: Activation,
        point: ScreenPoint,
        reply: oneshot::Sender<Option<PopupView>>,
    },
    Accept {
        choice: usize,
        reply: oneshot::Sender<Option<Correction>>,
    },
    Ignore {
        reply: oneshot::Sender<Option<DecorationId>>,
    },
    ClosePopup,
    Scroll,
    ClickElsewhere,
    ProofreadNow,
    EnablementChanged(bool),
    Inspect {
        reply: oneshot::Sender<SessionState>,
    },
}

struct AnalysisDone {
    generation: u64,
    result: Result<Vec<FlaggedSpan>, ProofreadError>,
}

/// Cloneable handle to a running session. The session stops once every
/// handle is dropped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionEvent::Edit { .. } => "Edit",
            SessionEvent::Replace { .. } => "Replace",
            SessionEvent::Activate { .. } => "Activate",
            SessionEvent::Accept { .. } => "Accept",
            SessionEvent::Ignore { .. } => "Ignore",
            SessionEvent::ClosePopup => "ClosePopup",
            SessionEvent::Scroll => "Scroll",
            SessionEvent::ClickElsewhere => "ClickElsewhere",
            SessionEvent::ProofreadNow => "ProofreadNow",
            SessionEvent::EnablementChanged(_) => "EnablementChanged",
            SessionEvent::Inspect { .. } => "Inspect",
        };
        f.write_str(name)
    }
}

impl SessionHandle {
    fn send(&self, event: SessionEvent) -> Result<(), SessionError> {
        self.events.send(event).map_err(|_| SessionError::Closed)
    }

    async fn request<T>(
        &self,
        event: impl FnOnce(oneshot::Sender<T>) -> SessionEvent,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(event(reply))?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Apply an edit and return the resulting snapshot.
    pub async fn edit(
        &self,
        edit: DocumentEdit,
        origin: EditOrigin,
    ) -> Result<DocumentSnapshot, SessionError> {
        let result = self
            .request(|reply| SessionEvent::Edit {
                edit,
                origin,
                reply,
            })
            .await?;
        Ok(result?)
    }

    /// Bring the document to the content of `next`.
    ///
    /// The edit is computed against the session's own snapshot when the
    /// request is handled, so concurrent callers never diff against a stale
    /// base. Content equal to the current document is a no-op.
    pub async fn replace(
        &self,
        next: DocumentSnapshot,
        origin: EditOrigin,
    ) -> Result<DocumentSnapshot, SessionError> {
        let result = self
            .request(|reply| SessionEvent::Replace {
                next,
                origin,
                reply,
            })
            .await?;
        Ok(result?)
    }

    /// Open the popup for the decoration at `target`. Returns `None`, and
    /// hides any open popup, when nothing is decorated there.
    pub async fn activate(
        &self,
        target: Activation,
        point: ScreenPoint,
    ) -> Result<Option<PopupView>, SessionError> {
        self.request(|reply| SessionEvent::Activate {
            target,
            point,
            reply,
        })
        .await
    }

    /// Accept suggestion `choice` of the open popup.
    pub async fn accept(&self, choice: usize) -> Result<Option<Correction>, SessionError> {
        self.request(|reply| SessionEvent::Accept { choice, reply })
            .await
    }

    /// Drop the open popup's decoration without changing the document.
    pub async fn ignore(&self) -> Result<Option<DecorationId>, SessionError> {
        self.request(|reply| SessionEvent::Ignore { reply }).await
    }

    pub fn close_popup(&self) -> Result<(), SessionError> {
        self.send(SessionEvent::ClosePopup)
    }

    pub fn scroll(&self) -> Result<(), SessionError> {
        self.send(SessionEvent::Scroll)
    }

    pub fn click_elsewhere(&self) -> Result<(), SessionError> {
        self.send(SessionEvent::ClickElsewhere)
    }

    /// Skip the quiet period and analyse the current document now.
    pub fn proofread_now(&self) -> Result<(), SessionError> {
        self.send(SessionEvent::ProofreadNow)
    }

    pub async fn state(&self) -> Result<SessionState, SessionError> {
        self.request(|reply| SessionEvent::Inspect { reply }).await
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

/// Start a session for `snapshot` on the current tokio runtime.
///
/// If proofreading is enabled the initial document is analysed right away.
pub fn spawn(
    snapshot: DocumentSnapshot,
    proofreader: Arc<dyn Proofreader>,
    enablement: Arc<EnablementStore>,
    config: SessionConfig,
) -> (SessionHandle, mpsc::UnboundedReceiver<SessionOutput>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (outputs_tx, outputs_rx) = mpsc::unbounded_channel();
    let (completions_tx, completions_rx) = mpsc::unbounded_channel();

    let weak_events = events_tx.downgrade();
    let subscription = enablement.subscribe(move |enabled| {
        if let Some(events) = weak_events.upgrade() {
            let _ = events.send(SessionEvent::EnablementChanged(enabled));
        }
    });

    let session = Session {
        snapshot,
        scheduler: DebounceScheduler::new(config.quiet_period, config.paste_policy),
        coordinator: AnalysisCoordinator::new(config.excluded_kinds.clone()),
        decorations: DecorationSet::new(),
        popup: SuggestionPopup::new(config.popup.clone()),
        proofreader,
        enablement,
        config,
        outputs: outputs_tx,
        completions: completions_tx,
    };
    tokio::spawn(session.run(events_rx, completions_rx, subscription));

    (SessionHandle { events: events_tx }, outputs_rx)
}

struct Session {
    snapshot: DocumentSnapshot,
    scheduler: DebounceScheduler,
    coordinator: AnalysisCoordinator,
    decorations: DecorationSet,
    popup: SuggestionPopup,
    proofreader: Arc<dyn Proofreader>,
    enablement: Arc<EnablementStore>,
    config: SessionConfig,
    outputs: mpsc::UnboundedSender<SessionOutput>,
    completions: mpsc::UnboundedSender<AnalysisDone>,
}

impl Session {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        mut completions: mpsc::UnboundedReceiver<AnalysisDone>,
        _subscription: Subscription,
    ) {
        if self.enablement.get() {
            self.analyze_now();
        }

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                Some(done) = completions.recv() => self.finish_analysis(done),
                _ = self.scheduler.fired() => self.analyze_now(),
            }
        }
        debug!(version = self.snapshot.version(), "proofreading session closed");
    }

    fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Edit {
                edit,
                origin,
                reply,
            } => {
                let _ = reply.send(self.apply_edit(edit, origin));
            }
            SessionEvent::Replace {
                next,
                origin,
                reply,
            } => {
                let edit = DocumentEdit::between(&self.snapshot, &next);
                let _ = reply.send(self.apply_edit(edit, origin));
            }
            SessionEvent::Activate {
                target,
                point,
                reply,
            } => {
                let _ = reply.send(self.activate(target, point));
            }
            SessionEvent::Accept { choice, reply } => {
                let _ = reply.send(self.accept(choice));
            }
            SessionEvent::Ignore { reply } => {
                let _ = reply.send(self.ignore());
            }
            SessionEvent::ClosePopup => {
                let intent = self.popup.close();
                self.emit_popup(intent);
            }
            SessionEvent::Scroll => {
                let intent = self.popup.scroll();
                self.emit_popup(intent);
            }
            SessionEvent::ClickElsewhere => {
                let intent = self.popup.click_elsewhere();
                self.emit_popup(intent);
            }
            SessionEvent::ProofreadNow => self.analyze_now(),
            SessionEvent::EnablementChanged(enabled) => {
                debug!(enabled, "enablement changed");
                // Off: clears without calling the proofreader. On: full analysis.
                self.analyze_now();
            }
            SessionEvent::Inspect { reply } => {
                let _ = reply.send(SessionState {
                    snapshot: self.snapshot.clone(),
                    decorations: self.decorations.snapshot(),
                    popup: self.popup.view().cloned(),
                    generation: self.coordinator.current_generation(),
                    analysis_pending: self.coordinator.is_pending(),
                    analysis_scheduled: self.scheduler.is_armed(),
                });
            }
        }
    }

    fn apply_edit(
        &mut self,
        edit: DocumentEdit,
        origin: EditOrigin,
    ) -> Result<DocumentSnapshot, DocumentError> {
        if edit.is_empty() {
            return Ok(self.snapshot.clone());
        }
        let next = self.snapshot.apply(&edit)?;
        let description = edit.describe();
        self.snapshot = next;
        self.decorations.remap_through_edit(&description);
        self.coordinator.record_edit(description);

        let intent = self.popup.hide_if_target_missing(&self.decorations);
        self.emit_popup(intent);

        if self.enablement.get() {
            match origin {
                EditOrigin::Typing => self.scheduler.notify(Trigger::Edit),
                EditOrigin::Paste => self.scheduler.notify(Trigger::Paste),
                EditOrigin::Correction => {}
            }
        }
        self.emit_overlay();
        Ok(self.snapshot.clone())
    }

    fn activate(&mut self, target: Activation, point: ScreenPoint) -> Option<PopupView> {
        let decoration = match target {
            Activation::At(position) => self.decorations.at_position(position),
            Activation::Decoration(id) => self.decorations.get(id),
        }
        .cloned();

        let Some(decoration) = decoration else {
            let intent = self.popup.click_elsewhere();
            self.emit_popup(intent);
            return None;
        };

        for intent in self.popup.activate(&decoration, point) {
            self.emit(SessionOutput::Popup(intent));
        }
        self.popup.view().cloned()
    }

    fn accept(&mut self, choice: usize) -> Option<Correction> {
        let (accepted, intent) = self.popup.accept(choice)?;
        self.emit(SessionOutput::Popup(intent));

        // The target goes first so the correction does not remap it.
        let target = self.decorations.remove(accepted.decoration)?;
        let edit = DocumentEdit::replace_text(target.start, target.end, &accepted.replacement);
        let base = self.snapshot.clone();

        match self.apply_edit(edit.clone(), EditOrigin::Correction) {
            Ok(snapshot) => {
                let correction = Correction {
                    edit,
                    base,
                    snapshot,
                };
                self.emit(SessionOutput::ApplyEdit(correction.clone()));
                Some(correction)
            }
            Err(e) => {
                warn!(error = %e, "failed to apply accepted suggestion");
                self.emit_overlay();
                None
            }
        }
    }

    fn ignore(&mut self) -> Option<DecorationId> {
        let (id, intent) = self.popup.ignore()?;
        self.emit(SessionOutput::Popup(intent));
        self.decorations.remove(id);
        self.emit_overlay();
        Some(id)
    }

    fn analyze_now(&mut self) {
        self.scheduler.cancel();
        match self.coordinator.begin(&self.snapshot, self.enablement.get()) {
            Dispatch::Clear { .. } => {
                self.decorations.clear();
                let intent = self.popup.close();
                self.emit_popup(intent);
                self.emit_overlay();
            }
            Dispatch::Analyze(request) => {
                let proofreader = Arc::clone(&self.proofreader);
                let completions = self.completions.clone();
                let timeout = self.config.analysis_timeout;
                let locale = self.config.locale.clone();
                tokio::spawn(async move {
                    let analysis = proofreader.analyze(&request.plain_text, locale.as_deref());
                    let result = match tokio::time::timeout(timeout, analysis).await {
                        Ok(result) => result,
                        Err(_) => Err(ProofreadError::Timeout(timeout)),
                    };
                    let _ = completions.send(AnalysisDone {
                        generation: request.generation,
                        result,
                    });
                });
            }
        }
    }

    fn finish_analysis(&mut self, done: AnalysisDone) {
        match self.coordinator.complete(done.generation, done.result) {
            Completion::Apply(decorations) => {
                self.decorations.replace_all(decorations);
                let intent = self.popup.hide_if_target_missing(&self.decorations);
                self.emit_popup(intent);
                self.emit_overlay();
            }
            Completion::Superseded => {}
            Completion::Failed(e) => {
                warn!(generation = done.generation, error = %e, "proofreading failed");
            }
        }
    }

    fn emit_overlay(&self) {
        self.emit(SessionOutput::Overlay(Overlay {
            snapshot: self.snapshot.clone(),
            decorations: self.decorations.snapshot(),
        }));
    }

    fn emit_popup(&self, intent: Option<PopupIntent>) {
        if let Some(intent) = intent {
            self.emit(SessionOutput::Popup(intent));
        }
    }

    fn emit(&self, output: SessionOutput) {
        // The receiver may be gone; the session keeps serving its handles.
        let _ = self.outputs.send(output);
    }
}
