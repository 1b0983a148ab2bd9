//! Finite state machine for a single unit invocation.
//!
//! A unit moves Idle → FetchingCurrent → FetchingDesired → Diffing → Applying →
//! Done. Canceled is a side exit from the fetching and applying phases; Failed
//! is reachable from every non-terminal phase. The resource set drives one
//! [`UnitRun`] per unit per pass and logs every transition.

use std::fmt;
use std::sync::LazyLock;

use tracing::{debug, warn};

/// Phase of a unit within one pass
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitPhase {
    Idle,
    FetchingCurrent,
    FetchingDesired,
    Diffing,
    Applying,
    Done,
    Canceled,
    Failed,
}

impl UnitPhase {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitPhase::Done | UnitPhase::Canceled | UnitPhase::Failed)
    }
}

impl fmt::Display for UnitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitPhase::Idle => write!(f, "Idle"),
            UnitPhase::FetchingCurrent => write!(f, "FetchingCurrent"),
            UnitPhase::FetchingDesired => write!(f, "FetchingDesired"),
            UnitPhase::Diffing => write!(f, "Diffing"),
            UnitPhase::Applying => write!(f, "Applying"),
            UnitPhase::Done => write!(f, "Done"),
            UnitPhase::Canceled => write!(f, "Canceled"),
            UnitPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Events that move a unit between phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitEvent {
    /// The pass reached this unit
    PassStarted,
    CurrentFetched,
    DesiredFetched,
    PatchComputed,
    ChangesApplied,
    /// A dependency was unreachable or the deadline passed
    DependencyUnavailable,
    /// A step returned an error
    StepFailed,
}

impl fmt::Display for UnitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitEvent::PassStarted => write!(f, "PassStarted"),
            UnitEvent::CurrentFetched => write!(f, "CurrentFetched"),
            UnitEvent::DesiredFetched => write!(f, "DesiredFetched"),
            UnitEvent::PatchComputed => write!(f, "PatchComputed"),
            UnitEvent::ChangesApplied => write!(f, "ChangesApplied"),
            UnitEvent::DependencyUnavailable => write!(f, "DependencyUnavailable"),
            UnitEvent::StepFailed => write!(f, "StepFailed"),
        }
    }
}

/// A state transition definition
#[derive(Debug)]
pub struct Transition {
    pub from: UnitPhase,
    pub to: UnitPhase,
    pub event: UnitEvent,
    pub description: &'static str,
}

impl Transition {
    const fn new(
        from: UnitPhase,
        to: UnitPhase,
        event: UnitEvent,
        description: &'static str,
    ) -> Self {
        Self {
            from,
            to,
            event,
            description,
        }
    }
}

/// Result of attempting a state transition
#[derive(Debug, PartialEq, Eq)]
pub enum TransitionResult {
    Success {
        from: UnitPhase,
        to: UnitPhase,
        event: UnitEvent,
        description: &'static str,
    },
    InvalidTransition {
        current: UnitPhase,
        event: UnitEvent,
    },
}

/// Transition table for unit invocations
pub struct UnitStateMachine {
    transitions: Vec<Transition>,
}

impl Default for UnitStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitStateMachine {
    pub fn new() -> Self {
        use UnitEvent as E;
        use UnitPhase as P;
        Self {
            transitions: vec![
                Transition::new(P::Idle, P::FetchingCurrent, E::PassStarted, "Pass reached unit"),
                // === FetchingCurrent ===
                Transition::new(
                    P::FetchingCurrent,
                    P::FetchingDesired,
                    E::CurrentFetched,
                    "Current state fetched",
                ),
                Transition::new(
                    P::FetchingCurrent,
                    P::Canceled,
                    E::DependencyUnavailable,
                    "Current state unreachable, deferring to next resync",
                ),
                Transition::new(
                    P::FetchingCurrent,
                    P::Failed,
                    E::StepFailed,
                    "Fetching current state failed",
                ),
                // === FetchingDesired ===
                Transition::new(
                    P::FetchingDesired,
                    P::Diffing,
                    E::DesiredFetched,
                    "Desired state rendered",
                ),
                Transition::new(
                    P::FetchingDesired,
                    P::Canceled,
                    E::DependencyUnavailable,
                    "Desired state unreachable, deferring to next resync",
                ),
                Transition::new(
                    P::FetchingDesired,
                    P::Failed,
                    E::StepFailed,
                    "Rendering desired state failed",
                ),
                // === Diffing ===
                Transition::new(P::Diffing, P::Applying, E::PatchComputed, "Patch computed"),
                Transition::new(P::Diffing, P::Failed, E::StepFailed, "Diff rejected state"),
                // === Applying ===
                Transition::new(P::Applying, P::Done, E::ChangesApplied, "Changes applied"),
                Transition::new(
                    P::Applying,
                    P::Canceled,
                    E::DependencyUnavailable,
                    "Target unreachable while applying, deferring to next resync",
                ),
                Transition::new(P::Applying, P::Failed, E::StepFailed, "Applying changes failed"),
            ],
        }
    }

    /// Attempt a transition from `current` on `event`
    pub fn transition(&self, current: &UnitPhase, event: UnitEvent) -> TransitionResult {
        match self
            .transitions
            .iter()
            .find(|t| t.from == *current && t.event == event)
        {
            Some(t) => TransitionResult::Success {
                from: t.from,
                to: t.to,
                event,
                description: t.description,
            },
            None => TransitionResult::InvalidTransition {
                current: *current,
                event,
            },
        }
    }

    /// Check if a transition is valid
    pub fn can_transition(&self, from: &UnitPhase, event: &UnitEvent) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == *from && t.event == *event)
    }

    /// Get all valid events for a given phase
    pub fn valid_events(&self, phase: &UnitPhase) -> Vec<&UnitEvent> {
        self.transitions
            .iter()
            .filter(|t| t.from == *phase)
            .map(|t| &t.event)
            .collect()
    }
}

static MACHINE: LazyLock<UnitStateMachine> = LazyLock::new(UnitStateMachine::new);

/// Phase tracker for one unit in one pass.
#[derive(Debug)]
pub struct UnitRun<'a> {
    unit: &'a str,
    phase: UnitPhase,
}

impl<'a> UnitRun<'a> {
    pub fn new(unit: &'a str) -> Self {
        Self {
            unit,
            phase: UnitPhase::Idle,
        }
    }

    pub fn phase(&self) -> UnitPhase {
        self.phase
    }

    /// Apply `event`. Invalid transitions are logged and leave the phase as is.
    pub fn fire(&mut self, event: UnitEvent) -> UnitPhase {
        match MACHINE.transition(&self.phase, event) {
            TransitionResult::Success {
                from,
                to,
                description,
                ..
            } => {
                debug!(
                    unit = %self.unit,
                    from = %from,
                    to = %to,
                    event = %event,
                    "{}",
                    description
                );
                self.phase = to;
            }
            TransitionResult::InvalidTransition { current, event } => {
                warn!(
                    unit = %self.unit,
                    phase = %current,
                    event = %event,
                    "Invalid unit transition"
                );
            }
        }
        self.phase
    }
}
