//! Explicit outcome of a fetch or apply step.
//!
//! A step either produces its value or reports that the pass should stop early
//! because a dependency is not reachable yet. Cancellation is not an error: the
//! object is simply re-evaluated at the next resync.

use std::fmt;

use crate::controller::error::Result;

/// Why a pass stopped early.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancelReason(pub String);

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a fetch or apply step that did not fail.
#[derive(Clone, Debug, PartialEq)]
pub enum Step<T> {
    Ready(T),
    Canceled(CancelReason),
}

impl<T> Step<T> {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Step::Canceled(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Step<U> {
        match self {
            Step::Ready(value) => Step::Ready(f(value)),
            Step::Canceled(reason) => Step::Canceled(reason),
        }
    }
}

/// Turn cancellation errors into [`Step::Canceled`]; everything else passes
/// through unchanged.
pub fn absorb_cancellation<T>(result: Result<T>) -> Result<Step<T>> {
    match result {
        Ok(value) => Ok(Step::Ready(value)),
        Err(e) if e.is_cancellation() => Ok(Step::Canceled(CancelReason(e.to_string()))),
        Err(e) => Err(e),
    }
}
