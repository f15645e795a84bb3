//! `Objective`: a target over one or more Functions, with a kind, a
//! search strategy, fidelity parameters, met-action, and a callback
//! (§3, §4.4, §4.5).

use crate::capability::ObjectiveCallback;
use crate::function::FunctionId;
use crate::schedule::ApplyPolicy;
use crate::tunable::TunableId;
use crate::types::Scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectiveId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveKind {
    Min,
    Max,
    Intersection,
    Threshold,
    ThresholdUp,
    ThresholdDown,
    SelectMin,
    SelectMax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    ExhaustiveAfterComplete,
    ExhaustiveOnTheFly,
    UnimodalGradientOnTheFly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetAction {
    NoAction,
    Reset,
    Config,
    ConfigReset,
    Retire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveStatus {
    Created,
    Evaluating,
    Met,
    Reset,
    Retired,
}

/// Per-function bookkeeping: the running best value/index for
/// on-the-fly search strategies, and what to do to this function once
/// the objective is met.
pub struct ObjFuncEntry {
    pub id: FunctionId,
    pub value_cache: Scalar,
    pub index_cache: Option<usize>,
    pub met_action: MetAction,
}

/// Per-variable bookkeeping for the transitive union of input Tunables
/// across `funcs` (§3's `vars[]`).
pub struct ObjVarEntry {
    pub id: TunableId,
    pub value_cache: Option<Scalar>,
    pub index_cache: Option<usize>,
    pub preference_right: bool,
    pub last_applied_iter: i64,
    pub apply_policy: ApplyPolicy,
    pub met_action: MetAction,
}

pub struct Objective {
    pub name: String,
    pub kind: ObjectiveKind,
    pub deviation_tolerance: f64,
    pub fidelity_window: usize,
    pub lookup_window: usize,
    pub search_strategy: SearchStrategy,
    pub max_num_mets: usize,
    pub num_mets: usize,
    pub funcs: Vec<ObjFuncEntry>,
    pub vars: Vec<ObjVarEntry>,
    pub callback: Option<ObjectiveCallback>,
    pub met_action: MetAction,
    pub status: ObjectiveStatus,
    /// Selection mask for SELECT_MIN/SELECT_MAX: `true` at the index of
    /// the currently-selected function.
    pub select_mask: Vec<bool>,
    /// The target scalar for THRESHOLD/THRESHOLD_UP/THRESHOLD_DOWN.
    pub threshold: Option<Scalar>,
}

const DEFAULT_DEVIATION_TOLERANCE: f64 = 0.05;
const DEFAULT_FIDELITY_WINDOW: usize = 3;
const DEFAULT_LOOKUP_WINDOW: usize = 8;

impl Objective {
    fn new(name: impl Into<String>, kind: ObjectiveKind, func_ids: Vec<FunctionId>) -> Self {
        let num_funcs = func_ids.len();
        Objective {
            name: name.into(),
            kind,
            deviation_tolerance: DEFAULT_DEVIATION_TOLERANCE,
            fidelity_window: DEFAULT_FIDELITY_WINDOW,
            lookup_window: DEFAULT_LOOKUP_WINDOW,
            search_strategy: SearchStrategy::ExhaustiveAfterComplete,
            max_num_mets: 1,
            num_mets: 0,
            funcs: func_ids
                .into_iter()
                .map(|id| ObjFuncEntry {
                    id,
                    value_cache: Scalar::Double(0.0),
                    index_cache: None,
                    met_action: MetAction::NoAction,
                })
                .collect(),
            vars: Vec::new(),
            callback: None,
            met_action: MetAction::NoAction,
            status: ObjectiveStatus::Created,
            select_mask: vec![false; num_funcs],
            threshold: None,
        }
    }

    pub fn new_min(name: impl Into<String>, func: FunctionId, func_type: crate::types::DataType) -> Self {
        let mut obj = Self::new(name, ObjectiveKind::Min, vec![func]);
        obj.funcs[0].value_cache = Scalar::max_value(func_type);
        obj
    }

    pub fn new_max(name: impl Into<String>, func: FunctionId, func_type: crate::types::DataType) -> Self {
        let mut obj = Self::new(name, ObjectiveKind::Max, vec![func]);
        obj.funcs[0].value_cache = Scalar::min_value(func_type);
        obj
    }

    pub fn new_intersection(name: impl Into<String>, f1: FunctionId, f2: FunctionId) -> Self {
        Self::new(name, ObjectiveKind::Intersection, vec![f1, f2])
    }

    pub fn new_threshold(
        name: impl Into<String>,
        kind: ObjectiveKind,
        func: FunctionId,
        threshold: Scalar,
    ) -> Option<Self> {
        if !matches!(
            kind,
            ObjectiveKind::Threshold | ObjectiveKind::ThresholdUp | ObjectiveKind::ThresholdDown
        ) {
            return None;
        }
        let mut obj = Self::new(name, kind, vec![func]);
        obj.threshold = Some(threshold);
        Some(obj)
    }

    pub fn new_select(
        name: impl Into<String>,
        kind: ObjectiveKind,
        funcs: Vec<FunctionId>,
    ) -> Option<Self> {
        if !matches!(kind, ObjectiveKind::SelectMin | ObjectiveKind::SelectMax) {
            return None;
        }
        Some(Self::new(name, kind, funcs))
    }

    pub fn set_fidelity(&mut self, tolerance: f64, fidelity_window: usize, lookup_window: usize) {
        self.deviation_tolerance = tolerance;
        self.fidelity_window = fidelity_window;
        self.lookup_window = lookup_window;
    }

    pub fn set_search_strategy(&mut self, strategy: SearchStrategy) {
        self.search_strategy = strategy;
    }

    pub fn set_met_action(&mut self, action: MetAction) {
        self.met_action = action;
    }

    pub fn set_max_num_mets(&mut self, max: usize) {
        self.max_num_mets = max;
    }

    pub fn add_callback(&mut self, callback: ObjectiveCallback) {
        self.callback = Some(callback);
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn min_objective_seeds_cache_at_max_value() {
        let obj = Objective::new_min("m", FunctionId(0), DataType::Double);
        assert_eq!(obj.funcs[0].value_cache, Scalar::max_value(DataType::Double));
    }

    #[test]
    fn max_objective_seeds_cache_at_min_value() {
        let obj = Objective::new_max("m", FunctionId(0), DataType::Double);
        assert_eq!(obj.funcs[0].value_cache, Scalar::min_value(DataType::Double));
    }

    #[test]
    fn threshold_rejects_non_threshold_kind() {
        assert!(Objective::new_threshold("t", ObjectiveKind::Min, FunctionId(0), Scalar::Double(1.0))
            .is_none());
    }

    #[test]
    fn select_rejects_non_select_kind() {
        assert!(Objective::new_select("s", ObjectiveKind::Max, vec![FunctionId(0)]).is_none());
    }
}
