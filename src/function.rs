//! `Function`: a `StateVar` whose values are either computed from other
//! Tunables (known kinds: log, abs, threshold, distance, gradient) or
//! sampled from a provider (model kinds); carries an input-index trace
//! recording which Tunable state each Function sample was paired with
//! (§3, §4.2 "Function schedule inheritance").

use crate::capability::Provider;
use crate::objective::ObjectiveId;
use crate::schedule::{PartialSchedule, Schedule};
use crate::statevar::StateVar;
use crate::status::EntityStatus;
use crate::tunable::TunableId;
use crate::types::{DataType, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub usize);

/// The known-operation arithmetic kinds are computed directly from the
/// active input Tunable's latest appended value plus `coefs`; MODEL and
/// MODEL_DIFF are sampled from their own provider instead (§4 "known
/// kinds... provider-sampled kinds").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Log,
    Abs,
    Threshold,
    Distance,
    Gradient,
    Model,
    ModelDiff,
}

impl FunctionKind {
    pub fn is_known_op(self) -> bool {
        !matches!(self, FunctionKind::Model | FunctionKind::ModelDiff)
    }
}

pub struct Function {
    pub state: StateVar,
    pub kind: FunctionKind,
    pub inputs: Vec<TunableId>,
    pub coefs: Vec<Scalar>,
    /// For each function sample `i`, the index into each input Tunable's
    /// state trace at the time `i` was appended (I2).
    pub input_trace: Vec<Vec<usize>>,
    pub active_var: Option<TunableId>,
    pub pending_updates: usize,
    pub schedule: PartialSchedule,
    pub objectives: Vec<ObjectiveId>,
    pub status: EntityStatus,
    /// Previous known-op value, needed by GRADIENT (`x[i] - x[i-1]`, 0 on
    /// the first sample).
    prev_value: Option<f64>,
}

impl Function {
    fn base(
        name: impl Into<String>,
        ty: DataType,
        total_capacity: usize,
        kind: FunctionKind,
        inputs: Vec<TunableId>,
        coefs: Vec<Scalar>,
    ) -> Self {
        Function {
            state: StateVar::new(name, ty, total_capacity),
            kind,
            inputs,
            coefs,
            input_trace: Vec::new(),
            active_var: None,
            pending_updates: 0,
            schedule: PartialSchedule::all_unset(),
            objectives: Vec::new(),
            status: EntityStatus::Created,
            prev_value: None,
        }
    }

    /// A known-operation function (LOG/ABS/THRESHOLD/DISTANCE/GRADIENT).
    /// `total_capacity` is the Cartesian product of its inputs'
    /// capacities (Open Question (d): the mature draft's correction over
    /// the original's summation).
    pub fn new_known(
        name: impl Into<String>,
        ty: DataType,
        total_capacity: usize,
        kind: FunctionKind,
        inputs: Vec<TunableId>,
        coefs: Vec<Scalar>,
    ) -> Self {
        debug_assert!(kind.is_known_op());
        Self::base(name, ty, total_capacity, kind, inputs, coefs)
    }

    /// A MODEL/MODEL_DIFF function: value comes from `provider`, updated
    /// under the same schedule protocol as an EXT Tunable.
    pub fn new_model(
        name: impl Into<String>,
        ty: DataType,
        total_capacity: usize,
        kind: FunctionKind,
        provider: Provider,
        inputs: Vec<TunableId>,
    ) -> Self {
        debug_assert!(!kind.is_known_op());
        let mut f = Self::base(name, ty, total_capacity, kind, inputs, Vec::new());
        f.state.set_provider(provider);
        f
    }

    pub fn set_update_schedule(&mut self, schedule: PartialSchedule) {
        self.schedule = schedule;
    }

    /// Resolves this function's fully-populated schedule given the
    /// active input Tunable's own schedule, re-derived every iteration
    /// (§4.2's "re-resolved each iteration").
    pub fn resolve_schedule(&self, active: &Schedule) -> Schedule {
        self.schedule.resolve(active)
    }

    /// Computes a known-op value from the active Tunable's latest
    /// appended scalar, per §4 COMPONENT DESIGN's conventional
    /// definitions: `LOG = ln(x)`, `ABS = |x|`,
    /// `THRESHOLD = if x >= coef[0] {1} else {0}`, `DISTANCE = x - coef[0]`,
    /// `GRADIENT = x[i] - x[i-1]` (0 on the first sample).
    pub fn compute_known(&mut self, active_value: Scalar) -> Option<Scalar> {
        let x = active_value.as_f64()?;
        let out_ty = self.state.data_type();
        let result = match self.kind {
            FunctionKind::Log => x.ln(),
            FunctionKind::Abs => x.abs(),
            FunctionKind::Threshold => {
                let cut = self.coefs.first().and_then(Scalar::as_f64).unwrap_or(0.0);
                if x >= cut {
                    1.0
                } else {
                    0.0
                }
            }
            FunctionKind::Distance => {
                let target = self.coefs.first().and_then(Scalar::as_f64).unwrap_or(0.0);
                x - target
            }
            FunctionKind::Gradient => {
                let prev = self.prev_value.unwrap_or(x);
                x - prev
            }
            FunctionKind::Model | FunctionKind::ModelDiff => unreachable!(),
        };
        self.prev_value = Some(x);
        Some(Scalar::from_f64(out_ty, result))
    }

    pub fn is_full(&self) -> bool {
        self.state.is_full()
    }

    /// Records the append's input snapshot and bumps `pending_updates`
    /// (called by the scheduler right after any function append, §4.2
    /// step 5).
    pub fn record_input_trace(&mut self, snapshot: Vec<usize>) {
        self.input_trace.push(snapshot);
        self.pending_updates += 1;
    }
}
