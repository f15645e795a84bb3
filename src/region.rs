//! `Region`: owns the fixed-capacity Tunable/Function/Objective tables,
//! the engine's RNG, and the monotonic iteration counter; exposes the
//! construction API and the `begin`/`end` driver tying Phases A-C
//! together (§4.1, §6).

use crate::capability::{Applier, ObjectiveCallback, Provider};
use crate::error::RtuneError;
use crate::evaluator;
use crate::function::{Function, FunctionId, FunctionKind};
use crate::lifecycle;
use crate::objective::{MetAction, Objective, ObjectiveId, ObjectiveKind, SearchStrategy};
use crate::schedule::{ApplyPolicy, PartialSchedule, Schedule};
use crate::scheduler::{self, Side};
use crate::tunable::{Tunable, TunableId};
use crate::types::{DataType, Scalar};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Table capacities. The original bounds every region's tables with a
/// fixed-size C array whose `MAX_NUM_*` constants live in a header not
/// present in the retrieved source; these values are a judgment call
/// for this port, generous enough for any of the scenarios in §8 (see
/// DESIGN.md).
pub const MAX_TUNABLES: usize = 64;
pub const MAX_FUNCTIONS: usize = 64;
pub const MAX_OBJECTIVES: usize = 32;

pub struct Region {
    pub name: String,
    tunables: Vec<Tunable>,
    functions: Vec<Function>,
    objectives: Vec<Objective>,
    rng: SmallRng,
    count: i64,
    pub num_retired_objs: usize,
    retired: bool,
}

impl Region {
    /// Seeds the engine's internal RNG from entropy.
    pub fn new(name: impl Into<String>) -> Self {
        let seed: u64 = rand::rng().random();
        Self::with_rng(name, SmallRng::seed_from_u64(seed))
    }

    /// Seeds the engine's internal RNG deterministically, closing
    /// Open Question (e) by making seeding the caller's responsibility
    /// (§9 of SPEC_FULL).
    pub fn with_seed(name: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(name, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(name: impl Into<String>, rng: SmallRng) -> Self {
        Region {
            name: name.into(),
            tunables: Vec::with_capacity(MAX_TUNABLES),
            functions: Vec::with_capacity(MAX_FUNCTIONS),
            objectives: Vec::with_capacity(MAX_OBJECTIVES),
            rng,
            count: -1,
            num_retired_objs: 0,
            retired: false,
        }
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn tunable(&self, id: TunableId) -> &Tunable {
        &self.tunables[id.0]
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0]
    }

    pub fn objective(&self, id: ObjectiveId) -> &Objective {
        &self.objectives[id.0]
    }

    // ---- Tunable construction ------------------------------------

    pub fn tunable_add_list(
        &mut self,
        name: impl Into<String>,
        ty: DataType,
        total_capacity: usize,
        values: Vec<Scalar>,
        names: Option<Vec<String>>,
    ) -> Result<TunableId, RtuneError> {
        if self.tunables.len() >= MAX_TUNABLES {
            return Err(RtuneError::TableFull("tunables"));
        }
        let tunable = Tunable::new_list(name, ty, total_capacity, values, names)?;
        self.tunables.push(tunable);
        Ok(TunableId(self.tunables.len() - 1))
    }

    pub fn tunable_add_range(
        &mut self,
        name: impl Into<String>,
        ty: DataType,
        total_capacity: usize,
        begin: Scalar,
        end: Scalar,
        step: Scalar,
    ) -> Result<TunableId, RtuneError> {
        if self.tunables.len() >= MAX_TUNABLES {
            return Err(RtuneError::TableFull("tunables"));
        }
        let tunable = Tunable::new_range(name, ty, total_capacity, begin, end, step)?;
        self.tunables.push(tunable);
        Ok(TunableId(self.tunables.len() - 1))
    }

    pub fn tunable_add_ext(
        &mut self,
        name: impl Into<String>,
        ty: DataType,
        total_capacity: usize,
        provider: Provider,
    ) -> Result<TunableId, RtuneError> {
        if self.tunables.len() >= MAX_TUNABLES {
            return Err(RtuneError::TableFull("tunables"));
        }
        self.tunables.push(Tunable::new_ext(name, ty, total_capacity, provider));
        Ok(TunableId(self.tunables.len() - 1))
    }

    pub fn tunable_set_applier(&mut self, id: TunableId, applier: Applier, policy: ApplyPolicy) {
        let tunable = &mut self.tunables[id.0];
        tunable.state.set_applier(applier);
        tunable.apply_policy = policy;
    }

    pub fn tunable_set_update_schedule(&mut self, id: TunableId, schedule: Schedule) -> Result<(), RtuneError> {
        self.tunables[id.0].set_update_schedule(schedule)
    }

    pub fn tunable_reset(&mut self, id: TunableId) {
        self.tunables[id.0].state.reset();
        self.tunables[id.0].current_index = None;
    }

    // ---- Function construction -------------------------------------

    /// A known-operation function (LOG/ABS/THRESHOLD/DISTANCE/GRADIENT).
    /// `total_capacity` is the product of its inputs' capacities (Open
    /// Question (d)); every input also records this function in its
    /// `used_by_funcs` back-pointer.
    pub fn function_add(
        &mut self,
        name: impl Into<String>,
        ty: DataType,
        kind: FunctionKind,
        inputs: Vec<TunableId>,
        coefs: Vec<Scalar>,
    ) -> Result<FunctionId, RtuneError> {
        if inputs.is_empty() {
            return Err(RtuneError::NoInputs);
        }
        if self.functions.len() >= MAX_FUNCTIONS {
            return Err(RtuneError::TableFull("functions"));
        }
        let total_capacity: usize = inputs.iter().map(|id| self.tunables[id.0].state.total_capacity()).product();
        let id = FunctionId(self.functions.len());
        self.functions
            .push(Function::new_known(name, ty, total_capacity, kind, inputs.clone(), coefs));
        for input in inputs {
            self.tunables[input.0].used_by_funcs.push(id);
        }
        Ok(id)
    }

    pub fn function_add_log(&mut self, name: impl Into<String>, ty: DataType, input: TunableId) -> Result<FunctionId, RtuneError> {
        self.function_add(name, ty, FunctionKind::Log, vec![input], Vec::new())
    }

    pub fn function_add_abs(&mut self, name: impl Into<String>, ty: DataType, input: TunableId) -> Result<FunctionId, RtuneError> {
        self.function_add(name, ty, FunctionKind::Abs, vec![input], Vec::new())
    }

    pub fn function_add_threshold(
        &mut self,
        name: impl Into<String>,
        ty: DataType,
        input: TunableId,
        cutoff: Scalar,
    ) -> Result<FunctionId, RtuneError> {
        self.function_add(name, ty, FunctionKind::Threshold, vec![input], vec![cutoff])
    }

    pub fn function_add_distance(
        &mut self,
        name: impl Into<String>,
        ty: DataType,
        input: TunableId,
        target: Scalar,
    ) -> Result<FunctionId, RtuneError> {
        self.function_add(name, ty, FunctionKind::Distance, vec![input], vec![target])
    }

    pub fn function_add_gradient(&mut self, name: impl Into<String>, ty: DataType, input: TunableId) -> Result<FunctionId, RtuneError> {
        self.function_add(name, ty, FunctionKind::Gradient, vec![input], Vec::new())
    }

    /// A MODEL/MODEL_DIFF function, sampled from `provider` under the
    /// same schedule protocol as an EXT Tunable.
    pub fn function_add_model(
        &mut self,
        name: impl Into<String>,
        ty: DataType,
        kind: FunctionKind,
        provider: Provider,
        inputs: Vec<TunableId>,
    ) -> Result<FunctionId, RtuneError> {
        if inputs.is_empty() {
            return Err(RtuneError::NoInputs);
        }
        if self.functions.len() >= MAX_FUNCTIONS {
            return Err(RtuneError::TableFull("functions"));
        }
        let total_capacity: usize = inputs.iter().map(|id| self.tunables[id.0].state.total_capacity()).product();
        let id = FunctionId(self.functions.len());
        self.functions
            .push(Function::new_model(name, ty, total_capacity, kind, provider, inputs.clone()));
        for input in inputs {
            self.tunables[input.0].used_by_funcs.push(id);
        }
        Ok(id)
    }

    pub fn function_set_update_schedule(&mut self, id: FunctionId, schedule: PartialSchedule) {
        self.functions[id.0].set_update_schedule(schedule);
    }

    /// Schedule safety check (§4.2): `true` if any pair of this
    /// Function's input Tunables have overlapping schedules. Reported
    /// via `log::warn!`, never rejected — construction still succeeds
    /// (§7, scenario 4).
    pub fn function_schedule_check(&self, id: FunctionId) -> bool {
        let function = &self.functions[id.0];
        let mut overlap = false;
        for (i, a) in function.inputs.iter().enumerate() {
            for b in &function.inputs[i + 1..] {
                let ta = &self.tunables[a.0];
                let tb = &self.tunables[b.0];
                let (Some(sa), Some(sb)) = (ta.schedule, tb.schedule) else {
                    continue;
                };
                if sa.overlaps(&sb, ta.state.total_capacity().max(tb.state.total_capacity())) {
                    overlap = true;
                    log::warn!(
                        "function '{}' has overlapping input schedules ('{}', '{}')",
                        function.state.name,
                        ta.state.name,
                        tb.state.name
                    );
                }
            }
        }
        overlap
    }

    pub fn function_reset(&mut self, id: FunctionId) {
        self.functions[id.0].state.reset();
        self.functions[id.0].input_trace.clear();
        self.functions[id.0].pending_updates = 0;
    }

    // ---- Objective construction -------------------------------------

    pub fn objective_add_min(&mut self, name: impl Into<String>, func: FunctionId) -> Result<ObjectiveId, RtuneError> {
        let ty = self.functions[func.0].state.data_type();
        self.push_objective(Objective::new_min(name, func, ty))
    }

    pub fn objective_add_max(&mut self, name: impl Into<String>, func: FunctionId) -> Result<ObjectiveId, RtuneError> {
        let ty = self.functions[func.0].state.data_type();
        self.push_objective(Objective::new_max(name, func, ty))
    }

    pub fn objective_add_intersection(
        &mut self,
        name: impl Into<String>,
        f1: FunctionId,
        f2: FunctionId,
    ) -> Result<ObjectiveId, RtuneError> {
        self.push_objective(Objective::new_intersection(name, f1, f2))
    }

    pub fn objective_add_threshold(
        &mut self,
        name: impl Into<String>,
        kind: ObjectiveKind,
        func: FunctionId,
        threshold: Scalar,
    ) -> Result<ObjectiveId, RtuneError> {
        let obj = Objective::new_threshold(name, kind, func, threshold).ok_or(RtuneError::InvalidKind)?;
        self.push_objective(obj)
    }

    pub fn objective_add_select(
        &mut self,
        name: impl Into<String>,
        kind: ObjectiveKind,
        funcs: Vec<FunctionId>,
    ) -> Result<ObjectiveId, RtuneError> {
        let obj = Objective::new_select(name, kind, funcs).ok_or(RtuneError::InvalidKind)?;
        self.push_objective(obj)
    }

    fn push_objective(&mut self, objective: Objective) -> Result<ObjectiveId, RtuneError> {
        if self.objectives.len() >= MAX_OBJECTIVES {
            return Err(RtuneError::TableFull("objectives"));
        }
        let id = ObjectiveId(self.objectives.len());
        for entry in &objective.funcs {
            self.functions[entry.id.0].objectives.push(id);
        }
        self.objectives.push(objective);
        self.collect_objective_vars(id);
        Ok(id)
    }

    /// Populates `Objective.vars` with the transitive union of input
    /// Tunables across the objective's Functions (§3's `vars[]`),
    /// something only `Region` can do since it alone holds both tables.
    /// Called eagerly at construction time rather than deferred to the
    /// first `begin`, unlike the original's lazy
    /// `rtune_objective_collect_vars`.
    fn collect_objective_vars(&mut self, id: ObjectiveId) {
        let func_ids: Vec<FunctionId> = self.objectives[id.0].funcs.iter().map(|f| f.id).collect();
        let mut seen = std::collections::HashSet::new();
        let obj = &mut self.objectives[id.0];
        for func_id in func_ids {
            for &tunable_id in &self.functions[func_id.0].inputs {
                if seen.insert(tunable_id) {
                    let tunable = &self.tunables[tunable_id.0];
                    obj.vars.push(crate::objective::ObjVarEntry {
                        id: tunable_id,
                        value_cache: None,
                        index_cache: None,
                        preference_right: false,
                        last_applied_iter: -1,
                        apply_policy: tunable.apply_policy,
                        met_action: MetAction::NoAction,
                    });
                }
            }
        }
    }

    pub fn objective_set_fidelity(&mut self, id: ObjectiveId, tolerance: f64, fidelity_window: usize, lookup_window: usize) {
        self.objectives[id.0].set_fidelity(tolerance, fidelity_window, lookup_window);
    }

    pub fn objective_set_search_strategy(&mut self, id: ObjectiveId, strategy: SearchStrategy) {
        self.objectives[id.0].set_search_strategy(strategy);
    }

    pub fn objective_set_met_action(&mut self, id: ObjectiveId, action: MetAction) {
        self.objectives[id.0].set_met_action(action);
    }

    pub fn objective_set_max_num_mets(&mut self, id: ObjectiveId, max: usize) {
        self.objectives[id.0].set_max_num_mets(max);
    }

    pub fn objective_add_callback(&mut self, id: ObjectiveId, callback: ObjectiveCallback) {
        self.objectives[id.0].add_callback(callback);
    }

    /// Sets the per-function met-action entry (§3's `funcs[].met_action`)
    /// applied to this one Function when `obj` transitions to MET,
    /// independent of the objective's own top-level met-action. A no-op
    /// if `func` is not one of `obj`'s functions.
    pub fn objective_set_func_met_action(&mut self, obj: ObjectiveId, func: FunctionId, action: MetAction) {
        if let Some(entry) = self.objectives[obj.0].funcs.iter_mut().find(|f| f.id == func) {
            entry.met_action = action;
        }
    }

    /// Sets the per-variable met-action entry (§3's `vars[].met_action`)
    /// applied to this one Tunable when `obj` transitions to MET. A
    /// no-op if `var` is not in `obj`'s transitive variable set.
    pub fn objective_set_var_met_action(&mut self, obj: ObjectiveId, var: TunableId, action: MetAction) {
        if let Some(entry) = self.objectives[obj.0].vars.iter_mut().find(|v| v.id == var) {
            entry.met_action = action;
        }
    }

    pub fn objective_reset(&mut self, id: ObjectiveId) {
        self.objectives[id.0].status = crate::objective::ObjectiveStatus::Created;
    }

    // ---- Driver -------------------------------------------------------

    /// Brackets the start of an iteration: Phase A only (§4.1). A
    /// no-op past region retirement, except EACH_ITERATION appliers,
    /// which still fire every call (L1).
    pub fn begin(&mut self) {
        self.count += 1;
        self.apply_each_iteration();
        if self.retired {
            return;
        }
        log::trace!("region '{}' begin at count {}", self.name, self.count);
        scheduler::advance_tunables(&mut self.tunables, self.count, Side::Begin, &mut self.rng);
        scheduler::advance_functions(&mut self.functions, &self.tunables, self.count, Side::Begin);
    }

    /// Brackets the end of an iteration: Phase A (end side), then
    /// Phase B (objective evaluation), then Phase C (met-action
    /// propagation and retirement). A no-op past region retirement,
    /// except EACH_ITERATION appliers.
    pub fn end(&mut self) {
        self.apply_each_iteration();
        if self.retired {
            return;
        }
        log::trace!("region '{}' end at count {}", self.name, self.count);
        scheduler::advance_tunables(&mut self.tunables, self.count, Side::End, &mut self.rng);
        scheduler::advance_functions(&mut self.functions, &self.tunables, self.count, Side::End);

        let newly_met = evaluator::evaluate(&mut self.objectives, &mut self.functions, &mut self.tunables, self.count);
        if !newly_met.is_empty() {
            let region_retired = lifecycle::propagate(&newly_met, &mut self.objectives, &mut self.functions, &mut self.tunables);
            self.num_retired_objs = self
                .objectives
                .iter()
                .filter(|o| o.status == crate::objective::ObjectiveStatus::Retired)
                .count();
            if region_retired && !self.retired {
                self.retired = true;
                log::info!("region '{}' retired: every objective has retired", self.name);
            }
        }
    }

    /// Invokes the applier of every Tunable whose `apply_policy` is
    /// `EACH_ITERATION`, using its most recently appended value. Runs
    /// unconditionally from `begin`/`end`, even past region retirement
    /// (L1's carve-out).
    fn apply_each_iteration(&mut self) {
        for tunable in &mut self.tunables {
            if tunable.apply_policy == ApplyPolicy::EachIteration {
                if let Some(value) = tunable.state.current_value() {
                    tunable.state.apply(value);
                }
            }
        }
    }

    /// Signals that the host is done with this region, for parity with
    /// the original's `rtune_region_fini` and to let a host flush trace
    /// output before drop. Ordinary `Drop` still reclaims everything
    /// regardless of whether this is called.
    pub fn fini(&mut self) {
        log::debug!("region '{}' fini after {} iterations", self.name, self.count + 1);
    }

    /// Formats `id`'s entire state trace for diagnostic output (§8 of
    /// SPEC_FULL), the direct descendant of `rtune_var_print_list_range`.
    pub fn dump_tunable(&self, id: TunableId) -> String {
        crate::trace::dump_tunable(&self.tunables[id.0], self.count)
    }

    /// Formats `id`'s state trace alongside its input tunables' paired
    /// states, the direct descendant of
    /// `rtune_func_print_doubleFunc_shortVar`.
    pub fn dump_function(&self, id: FunctionId) -> String {
        let function = &self.functions[id.0];
        let inputs: Vec<&Tunable> = function.inputs.iter().map(|tid| &self.tunables[tid.0]).collect();
        crate::trace::dump_function(function, &inputs, self.count)
    }
}
