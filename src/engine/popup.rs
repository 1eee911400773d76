//! Single-active suggestion popup.
//!
//! The controller is a pure state machine. It emits [`PopupIntent`]s and leaves
//! rendering to whoever consumes them.

use serde::Deserialize;

use super::reconciler::{Decoration, DecorationId, DecorationSet};

pub const DEFAULT_MAX_SUGGESTIONS: usize = 3;
pub const DEFAULT_NO_SUGGESTIONS_TEXT: &str = "No replacements available";
/// Vertical distance between the activation point and the popup's bottom edge.
pub const DEFAULT_GAP: f64 = 7.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PopupOptions {
    pub max_suggestions: usize,
    pub no_suggestions_text: String,
    pub gap: f64,
}

impl Default for PopupOptions {
    fn default() -> Self {
        Self {
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
            no_suggestions_text: DEFAULT_NO_SUGGESTIONS_TEXT.to_string(),
            gap: DEFAULT_GAP,
        }
    }
}

/// Where the user activated a decoration, in viewport coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The popup is anchored by its left and bottom edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub left: f64,
    pub bottom: f64,
}

impl Placement {
    fn above(point: ScreenPoint, gap: f64) -> Self {
        Self {
            left: point.x.max(0.0),
            bottom: point.y - gap,
        }
    }
}

/// Everything needed to render a visible popup.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupView {
    pub decoration: DecorationId,
    pub message: String,
    /// Suggestions captured when the popup opened.
    pub choices: Vec<String>,
    /// Set when there is nothing to offer.
    pub empty_text: Option<String>,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PopupIntent {
    Show(PopupView),
    Hide,
}

/// A suggestion the user picked. The session turns this into an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedReplacement {
    pub decoration: DecorationId,
    pub replacement: String,
}

#[derive(Debug, Default)]
pub struct SuggestionPopup {
    options: PopupOptions,
    view: Option<PopupView>,
}

impl SuggestionPopup {
    pub fn new(options: PopupOptions) -> Self {
        Self {
            options,
            view: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.view.is_some()
    }

    pub fn view(&self) -> Option<&PopupView> {
        self.view.as_ref()
    }

    pub fn target(&self) -> Option<DecorationId> {
        self.view.as_ref().map(|v| v.decoration)
    }

    /// Open the popup for `decoration`, hiding any popup already open.
    pub fn activate(&mut self, decoration: &Decoration, point: ScreenPoint) -> Vec<PopupIntent> {
        let mut intents = Vec::with_capacity(2);
        if self.view.take().is_some() {
            intents.push(PopupIntent::Hide);
        }

        let choices: Vec<String> = decoration
            .span
            .replacements
            .iter()
            .take(self.options.max_suggestions)
            .cloned()
            .collect();
        let empty_text = choices
            .is_empty()
            .then(|| self.options.no_suggestions_text.clone());

        let view = PopupView {
            decoration: decoration.id,
            message: decoration.span.message.clone(),
            choices,
            empty_text,
            placement: Placement::above(point, self.options.gap),
        };
        self.view = Some(view.clone());
        intents.push(PopupIntent::Show(view));
        intents
    }

    /// Pick suggestion `choice`. Unknown choices leave the popup open.
    pub fn accept(&mut self, choice: usize) -> Option<(AcceptedReplacement, PopupIntent)> {
        let view = self.view.as_ref()?;
        let replacement = view.choices.get(choice)?.clone();
        let decoration = view.decoration;
        self.view = None;
        Some((
            AcceptedReplacement {
                decoration,
                replacement,
            },
            PopupIntent::Hide,
        ))
    }

    /// Dismiss the target decoration without touching the document.
    pub fn ignore(&mut self) -> Option<(DecorationId, PopupIntent)> {
        let view = self.view.take()?;
        Some((view.decoration, PopupIntent::Hide))
    }

    pub fn close(&mut self) -> Option<PopupIntent> {
        self.view.take().map(|_| PopupIntent::Hide)
    }

    pub fn scroll(&mut self) -> Option<PopupIntent> {
        self.close()
    }

    pub fn click_elsewhere(&mut self) -> Option<PopupIntent> {
        self.close()
    }

    /// Hide the popup if its decoration no longer exists.
    pub fn hide_if_target_missing(&mut self, decorations: &DecorationSet) -> Option<PopupIntent> {
        let target = self.target()?;
        if decorations.get(target).is_some() {
            return None;
        }
        self.close()
    }
}
