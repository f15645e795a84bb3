//! Capability contracts consumed by the core. These are the only
//! points where the engine calls out to host-supplied code; the core
//! never interprets what they do (§6).

use crate::types::Scalar;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// A shared cell the host can mutate out-of-band; reading it is the
/// "direct value" shortcut from Design Notes §9 (the original
/// language's `provider == arg` trick, made an explicit variant here
/// instead of a pointer-equality convention).
pub type DirectCell = Rc<Cell<Scalar>>;

/// Supplies an externally observed scalar for EXT tunables and MODEL
/// functions.
pub enum Provider {
    /// Read a shared cell directly; no function call.
    DirectValue(DirectCell),
    /// Invoke a host closure. `FnMut` so the closure may carry mutable
    /// capture state (e.g. a counter or a file handle).
    Callback(Box<dyn FnMut() -> Scalar>),
}

impl Provider {
    pub fn sample(&mut self) -> Scalar {
        match self {
            Provider::DirectValue(cell) => cell.get(),
            Provider::Callback(f) => f(),
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::DirectValue(_) => write!(f, "Provider::DirectValue(..)"),
            Provider::Callback(_) => write!(f, "Provider::Callback(..)"),
        }
    }
}

/// Commits a chosen configuration. Synchronous; return value ignored.
pub type Applier = Box<dyn FnMut(Scalar)>;

/// Fires once per append on a StateVar.
pub type AppendCallback = Box<dyn FnMut(Scalar)>;

/// Fires once per MET commit on an Objective. Receives the objective's
/// own name so one callback can be shared across objectives.
pub type ObjectiveCallback = Box<dyn FnMut(&str)>;
