//! Wizard phase state machine.
//!
//! All phase changes go through [`Phase::transition`], a pure function that
//! rejects events the current phase does not accept.

use std::fmt;

use adapt_shared::{AdaptError, Result};

/// Sub-step of the loading phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadingStep {
    Uploading = 0,
    Parsing = 1,
    Generating = 2,
    Ready = 3,
}

impl LoadingStep {
    pub fn index(self) -> u8 {
        self as u8
    }

    fn next(self) -> Option<Self> {
        match self {
            Self::Uploading => Some(Self::Parsing),
            Self::Parsing => Some(Self::Generating),
            Self::Generating => Some(Self::Ready),
            Self::Ready => None,
        }
    }
}

impl fmt::Display for LoadingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uploading => write!(f, "uploading"),
            Self::Parsing => write!(f, "parsing"),
            Self::Generating => write!(f, "generating"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Current wizard phase. Exactly one is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Form,
    Loading {
        step: LoadingStep,
        /// Set when generating again from `Editing`; failures return there.
        regenerating: bool,
    },
    Editing,
    Saving,
    /// The course was saved.
    Done,
}

/// Input to the phase machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    Submit,
    StepComplete,
    EnterEditing,
    Regenerate,
    Save,
    Fail,
    Cancel,
    Saved,
    Close,
}

impl fmt::Display for PhaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Submit => "submit",
            Self::StepComplete => "complete a step",
            Self::EnterEditing => "start editing",
            Self::Regenerate => "regenerate",
            Self::Save => "save",
            Self::Fail => "fail",
            Self::Cancel => "cancel",
            Self::Saved => "finish saving",
            Self::Close => "close",
        };
        f.write_str(name)
    }
}

impl Phase {
    /// Next phase for `event`, or `InvalidTransition`.
    pub fn transition(self, event: PhaseEvent) -> Result<Phase> {
        use PhaseEvent as E;

        let next = match (self, event) {
            (Phase::Form, E::Submit) => Phase::Loading {
                step: LoadingStep::Uploading,
                regenerating: false,
            },
            (Phase::Loading { step, regenerating }, E::StepComplete) => match step.next() {
                Some(step) => Phase::Loading { step, regenerating },
                None => return Err(self.reject(event)),
            },
            (
                Phase::Loading {
                    step: LoadingStep::Ready,
                    ..
                },
                E::EnterEditing,
            ) => Phase::Editing,
            (Phase::Loading { regenerating, .. }, E::Fail) => {
                if regenerating {
                    Phase::Editing
                } else {
                    Phase::Form
                }
            }
            (Phase::Loading { .. }, E::Cancel) => Phase::Form,
            (Phase::Editing, E::Regenerate) => Phase::Loading {
                step: LoadingStep::Generating,
                regenerating: true,
            },
            (Phase::Editing, E::Save) => Phase::Saving,
            (Phase::Saving, E::Fail) => Phase::Editing,
            (Phase::Saving, E::Saved) => Phase::Done,
            (Phase::Form | Phase::Editing | Phase::Done, E::Close) => Phase::Form,
            _ => return Err(self.reject(event)),
        };
        Ok(next)
    }

    pub fn loading_step(&self) -> Option<LoadingStep> {
        match self {
            Phase::Loading { step, .. } => Some(*step),
            _ => None,
        }
    }

    fn reject(self, event: PhaseEvent) -> AdaptError {
        AdaptError::InvalidTransition {
            phase: self.to_string(),
            event: event.to_string(),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Form => write!(f, "in the form"),
            Phase::Loading { step, .. } => write!(f, "loading ({step})"),
            Phase::Editing => write!(f, "editing"),
            Phase::Saving => write!(f, "saving"),
            Phase::Done => write!(f, "done"),
        }
    }
}
