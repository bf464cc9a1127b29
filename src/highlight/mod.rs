//! Cross-view highlighting.
//!
//! A single selected learning model is broadcast to every categorical
//! view over a `watch` channel. The broker holds only the selection
//! token; each view derives its own mark opacity from it.

use crate::models::LearningModel;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;
use tracing::debug;

/// Opacity of marks that do not match the selected model.
pub const DEFAULT_DIMMED_OPACITY: f64 = 0.2;

/// The highlight selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "model", rename_all = "snake_case")]
pub enum HighlightState {
    #[default]
    Unselected,
    Selected(LearningModel),
}

impl HighlightState {
    /// Opacity of a mark of category `model` under this state.
    pub fn opacity_for(&self, model: &LearningModel, dimmed: f64) -> f64 {
        match self {
            HighlightState::Unselected => 1.0,
            HighlightState::Selected(selected) if selected == model => 1.0,
            HighlightState::Selected(_) => dimmed,
        }
    }

    pub fn selected(&self) -> Option<&LearningModel> {
        match self {
            HighlightState::Unselected => None,
            HighlightState::Selected(model) => Some(model),
        }
    }
}

impl fmt::Display for HighlightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HighlightState::Unselected => write!(f, "none"),
            HighlightState::Selected(model) => write!(f, "{}", model),
        }
    }
}

/// What a click landed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickTarget {
    /// A categorical mark (bar segment, bubble, heatmap cell, line).
    Mark(LearningModel),
    /// Anywhere else on the page.
    Background,
}

/// A click travelling from its target up to the document root.
#[derive(Debug, Clone)]
pub struct Click {
    pub target: ClickTarget,
    propagation_stopped: bool,
}

impl Click {
    pub fn new(target: ClickTarget) -> Self {
        Self {
            target,
            propagation_stopped: false,
        }
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

/// Which view a subscriber draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Bar,
    Bubble,
    Heatmap,
    Timeline,
}

impl ViewKind {
    pub const ALL: [ViewKind; 4] = [
        ViewKind::Bar,
        ViewKind::Bubble,
        ViewKind::Heatmap,
        ViewKind::Timeline,
    ];
}

/// Owns the selection and notifies subscribed views on every transition.
#[derive(Debug)]
pub struct HighlightBroker {
    sender: watch::Sender<HighlightState>,
}

impl Default for HighlightBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl HighlightBroker {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(HighlightState::Unselected);
        Self { sender }
    }

    pub fn state(&self) -> HighlightState {
        self.sender.borrow().clone()
    }

    /// Register a view; it starts from the current state.
    pub fn subscribe(&self, kind: ViewKind, dimmed_opacity: f64) -> ViewHighlight {
        ViewHighlight {
            kind,
            dimmed_opacity,
            receiver: self.sender.subscribe(),
        }
    }

    /// Route a click: mark handlers run first and stop propagation, the
    /// document-level handler clears only clicks that reach it.
    /// Returns whether the state changed.
    pub fn dispatch(&self, click: &mut Click) -> bool {
        let mut changed = false;

        if let ClickTarget::Mark(model) = &click.target {
            changed = self.select(model.clone());
            click.stop_propagation();
        }

        if !click.propagation_stopped() {
            changed = self.clear();
        }

        changed
    }

    /// Transition to `Selected(model)`.
    pub fn select(&self, model: LearningModel) -> bool {
        self.transition(HighlightState::Selected(model))
    }

    /// Transition to `Unselected`.
    pub fn clear(&self) -> bool {
        self.transition(HighlightState::Unselected)
    }

    fn transition(&self, next: HighlightState) -> bool {
        let changed = self.sender.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next.clone();
                true
            }
        });
        if changed {
            debug!("Highlight changed to {}", next);
        }
        changed
    }
}

/// A view's subscription to the highlight broadcast.
#[derive(Debug, Clone)]
pub struct ViewHighlight {
    kind: ViewKind,
    dimmed_opacity: f64,
    receiver: watch::Receiver<HighlightState>,
}

impl ViewHighlight {
    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    /// Opacity of a mark with category `model` in this view.
    pub fn opacity(&self, model: &LearningModel) -> f64 {
        self.receiver
            .borrow()
            .opacity_for(model, self.dimmed_opacity)
    }

    /// Whether a transition was broadcast since the last acknowledgement.
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Mark the current state as seen and return it.
    pub fn acknowledge(&mut self) -> HighlightState {
        self.receiver.borrow_and_update().clone()
    }
}
