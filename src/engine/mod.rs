//! The asynchronous proofreading engine.
//!
//! - `scheduler`: debounces edit notifications
//! - `coordinator`: generation counter and stale result rejection
//! - `reconciler`: decoration overlay and its remapping through edits
//! - `popup`: single-active suggestion popup state machine
//! - `enablement`: shared on/off switch
//! - `session`: the per-editor task tying them together

mod coordinator;
mod enablement;
mod popup;
mod reconciler;
mod scheduler;
mod session;

pub use coordinator::{AnalysisCoordinator, AnalysisRequest, Completion, Dispatch};
pub use enablement::{EnablementStore, Subscription};
pub use popup::{
    AcceptedReplacement, Placement, PopupIntent, PopupOptions, PopupView, ScreenPoint,
    SuggestionPopup, DEFAULT_MAX_SUGGESTIONS, DEFAULT_NO_SUGGESTIONS_TEXT,
};
pub use reconciler::{remap, Decoration, DecorationId, DecorationSet};
pub use scheduler::{DebounceScheduler, PastePolicy, Trigger};
pub use session::{
    spawn, Activation, Correction, EditOrigin, Overlay, SessionConfig, SessionError,
    SessionHandle, SessionOutput, SessionState, DEFAULT_ANALYSIS_TIMEOUT, DEFAULT_QUIET_PERIOD,
};
