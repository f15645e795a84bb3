//! `StateVar`: the shared trace primitive embedded in every Tunable and
//! Function. A typed, bounded, append-only sequence of sampled scalars
//! plus the optional provider/applier/callback capabilities and the
//! pair of batch accumulators used by §4.3's accumulation protocol.

use crate::capability::{AppendCallback, Applier, Provider};
use crate::types::{DataType, Scalar};

pub struct StateVar {
    pub name: String,
    ty: DataType,
    total_capacity: usize,
    states: Vec<Scalar>,
    provider: Option<Provider>,
    applier: Option<Applier>,
    callback: Option<AppendCallback>,
    accum_begin: Scalar,
    accum_end: Scalar,
    pub current_apply_index: Option<usize>,
    pub last_apply_iteration: i64,
}

impl StateVar {
    pub fn new(name: impl Into<String>, ty: DataType, total_capacity: usize) -> Self {
        StateVar {
            name: name.into(),
            ty,
            total_capacity,
            states: Vec::with_capacity(total_capacity),
            provider: None,
            applier: None,
            callback: None,
            accum_begin: Scalar::zero(ty),
            accum_end: Scalar::zero(ty),
            current_apply_index: None,
            last_apply_iteration: -1,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.ty
    }

    pub fn total_capacity(&self) -> usize {
        self.total_capacity
    }

    pub fn count(&self) -> usize {
        self.states.len()
    }

    pub fn is_full(&self) -> bool {
        self.states.len() >= self.total_capacity
    }

    pub fn states(&self) -> &[Scalar] {
        &self.states
    }

    pub fn get(&self, index: usize) -> Option<Scalar> {
        self.states.get(index).copied()
    }

    pub fn current_value(&self) -> Option<Scalar> {
        self.states.last().copied()
    }

    pub fn set_provider(&mut self, provider: Provider) {
        self.provider = Some(provider);
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn sample_provider(&mut self) -> Option<Scalar> {
        self.provider.as_mut().map(|p| p.sample())
    }

    pub fn set_applier(&mut self, applier: Applier) {
        self.applier = Some(applier);
    }

    pub fn has_applier(&self) -> bool {
        self.applier.is_some()
    }

    pub fn apply(&mut self, value: Scalar) {
        if let Some(applier) = self.applier.as_mut() {
            applier(value);
        }
    }

    pub fn set_callback(&mut self, callback: AppendCallback) {
        self.callback = Some(callback);
    }

    /// Appends `value` if there is remaining capacity (I1), firing the
    /// append callback, and returns the new index. Silently does
    /// nothing and returns `None` once full — the engine never panics
    /// on capacity overflow (§7).
    pub fn append(&mut self, value: Scalar) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        self.states.push(value);
        let idx = self.states.len() - 1;
        if let Some(cb) = self.callback.as_mut() {
            cb(value);
        }
        Some(idx)
    }

    pub fn reset(&mut self) {
        self.states.clear();
        self.accum_begin = Scalar::zero(self.ty);
        self.accum_end = Scalar::zero(self.ty);
        self.current_apply_index = None;
        self.last_apply_iteration = -1;
    }

    pub fn accum_begin_add(&mut self, value: Scalar) {
        self.accum_begin = self.accum_begin.add(&value);
    }

    pub fn accum_end_add(&mut self, value: Scalar) {
        self.accum_end = self.accum_end.add(&value);
    }

    pub fn accum_begin(&self) -> Scalar {
        self.accum_begin
    }

    pub fn accum_end(&self) -> Scalar {
        self.accum_end
    }

    pub fn reset_accum_begin(&mut self) {
        self.accum_begin = Scalar::zero(self.ty);
    }

    pub fn reset_accum_end(&mut self) {
        self.accum_end = Scalar::zero(self.ty);
    }

    /// Overwrites the begin-side accumulator directly, used by the
    /// EXT_DIFF baseline protocol's BATCH_STRAIGHT case (§4.3).
    pub fn set_accum_begin(&mut self, value: Scalar) {
        self.accum_begin = value;
    }

    pub fn set_accum_end(&mut self, value: Scalar) {
        self.accum_end = value;
    }
}
