//! Phase C: met-action propagation and the tunable→function→objective
//! retirement cascade (§4.5).

use crate::function::Function;
use crate::objective::{MetAction, Objective, ObjectiveId, ObjectiveStatus};
use crate::status::EntityStatus;
use crate::tunable::Tunable;
use crate::types::Scalar;

/// Runs Phase C for the objectives that transitioned to MET this `end`
/// call. Returns `true` if every Objective in the region is now
/// RETIRED — the caller (`Region::end`) uses this to flip the region's
/// own retired flag.
pub fn propagate(
    newly_met: &[ObjectiveId],
    objectives: &mut [Objective],
    functions: &mut [Function],
    tunables: &mut [Tunable],
) -> bool {
    for &oid in newly_met {
        let obj = &mut objectives[oid.0];
        obj.num_mets += 1;
        log::debug!("objective '{}' num_mets now {}", obj.name, obj.num_mets);

        match obj.met_action {
            MetAction::Reset => reset_objective(obj, functions),
            MetAction::Retire => obj.status = ObjectiveStatus::Retired,
            MetAction::NoAction | MetAction::Config | MetAction::ConfigReset => {}
        }

        if obj.status != ObjectiveStatus::Retired && obj.num_mets >= obj.max_num_mets {
            obj.status = ObjectiveStatus::Retired;
            log::info!("objective '{}' retired after {} mets", obj.name, obj.num_mets);
        }

        apply_function_met_actions(obj, functions);
        apply_tunable_met_actions(obj, tunables);
    }

    retire_functions(objectives, functions);
    retire_tunables(functions, tunables);

    objectives.iter().all(|o| o.status == ObjectiveStatus::Retired)
}

/// Objective-level RESET (step 1): back to re-evaluable, per-function
/// caches reseeded the way `Objective::new_min`/`new_max` seed them
/// initially. `num_mets` itself is left untouched — it is the
/// retirement counter, not a per-evaluation scratch value.
fn reset_objective(obj: &mut Objective, functions: &[Function]) {
    obj.status = ObjectiveStatus::Created;
    let is_min = obj.kind == crate::objective::ObjectiveKind::Min;
    let is_max = obj.kind == crate::objective::ObjectiveKind::Max;
    for entry in &mut obj.funcs {
        entry.index_cache = None;
        if is_min {
            entry.value_cache = Scalar::max_value(functions[entry.id.0].state.data_type());
        } else if is_max {
            entry.value_cache = Scalar::min_value(functions[entry.id.0].state.data_type());
        }
    }
}

/// Step 3: each referenced Function's per-objective met-action. RESET
/// clears the Function's trace so it can be sampled afresh; RETIRE
/// force-retires it regardless of the natural cascade; CONFIG has no
/// meaning for a Function (only Tunables carry an applier) and is a
/// no-op here.
fn apply_function_met_actions(obj: &Objective, functions: &mut [Function]) {
    for entry in &obj.funcs {
        match entry.met_action {
            MetAction::Reset | MetAction::ConfigReset => {
                let f = &mut functions[entry.id.0];
                f.state.reset();
                f.input_trace.clear();
                f.pending_updates = 0;
                f.status = EntityStatus::Created;
            }
            MetAction::Retire => functions[entry.id.0].status = EntityStatus::Retired,
            MetAction::NoAction | MetAction::Config => {}
        }
    }
}

/// Step 4: each referenced Tunable's per-objective met-action. CONFIG
/// invokes the applier with the tunable's last-recorded winning value;
/// RESET clears its trace; CONFIG_RESET does both, applier first.
fn apply_tunable_met_actions(obj: &Objective, tunables: &mut [Tunable]) {
    for entry in &obj.vars {
        let tunable = &mut tunables[entry.id.0];
        match entry.met_action {
            MetAction::Config | MetAction::ConfigReset => {
                if let Some(value) = entry.value_cache.or_else(|| tunable.state.current_value()) {
                    tunable.state.apply(value);
                }
            }
            _ => {}
        }
        match entry.met_action {
            MetAction::Reset | MetAction::ConfigReset => {
                tunable.state.reset();
                tunable.current_index = None;
                tunable.status = EntityStatus::Created;
            }
            _ => {}
        }
    }
}

/// A Function retires once every Objective that references it has
/// retired (§4.5 step 5).
fn retire_functions(objectives: &[Objective], functions: &mut [Function]) {
    for function in functions.iter_mut() {
        if function.status.is_retired() || function.objectives.is_empty() {
            continue;
        }
        if function
            .objectives
            .iter()
            .all(|oid| objectives[oid.0].status == ObjectiveStatus::Retired)
        {
            function.status = EntityStatus::Retired;
            log::info!("function retired: every referencing objective has retired");
        }
    }
}

/// A Tunable retires once every Function that references it has
/// retired (§4.5 step 5).
fn retire_tunables(functions: &[Function], tunables: &mut [Tunable]) {
    for tunable in tunables.iter_mut() {
        if tunable.status.is_retired() || tunable.used_by_funcs.is_empty() {
            continue;
        }
        if tunable
            .used_by_funcs
            .iter()
            .all(|fid| functions[fid.0].status.is_retired())
        {
            tunable.status = EntityStatus::Retired;
            log::info!("tunable retired: every referencing function has retired");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{Function, FunctionId, FunctionKind};
    use crate::objective::{ObjVarEntry, Objective};
    use crate::tunable::{Tunable, TunableId};
    use crate::types::DataType;

    fn setup() -> (Vec<Objective>, Vec<Function>, Vec<Tunable>) {
        let t = Tunable::new_list(
            "t",
            DataType::Double,
            4,
            vec![Scalar::Double(1.0), Scalar::Double(2.0)],
            None,
        )
        .unwrap();
        let mut f = Function::new_known(
            "f",
            DataType::Double,
            4,
            FunctionKind::Distance,
            vec![TunableId(0)],
            vec![Scalar::Double(0.0)],
        );
        f.objectives.push(ObjectiveId(0));
        let mut obj = Objective::new_min("m", FunctionId(0), DataType::Double);
        obj.set_max_num_mets(1);
        obj.vars.push(ObjVarEntry {
            id: TunableId(0),
            value_cache: Some(Scalar::Double(2.0)),
            index_cache: Some(1),
            preference_right: false,
            last_applied_iter: 3,
            apply_policy: crate::schedule::ApplyPolicy::OnRead,
            met_action: MetAction::NoAction,
        });
        (vec![obj], vec![f], vec![t])
    }

    #[test]
    fn max_num_mets_reached_retires_objective_and_cascades() {
        let (mut objectives, mut functions, mut tunables) = setup();
        tunables[0].used_by_funcs.push(FunctionId(0));

        let region_retired = propagate(&[ObjectiveId(0)], &mut objectives, &mut functions, &mut tunables);
        assert!(region_retired);
        assert_eq!(objectives[0].status, ObjectiveStatus::Retired);
        assert_eq!(functions[0].status, EntityStatus::Retired);
        assert_eq!(tunables[0].status, EntityStatus::Retired);
    }

    #[test]
    fn reset_action_keeps_objective_alive_for_more_mets() {
        let (mut objectives, mut functions, mut tunables) = setup();
        objectives[0].set_max_num_mets(2);
        objectives[0].set_met_action(MetAction::Reset);
        tunables[0].used_by_funcs.push(FunctionId(0));

        let region_retired = propagate(&[ObjectiveId(0)], &mut objectives, &mut functions, &mut tunables);
        assert!(!region_retired);
        assert_eq!(objectives[0].status, ObjectiveStatus::Created);
        assert_eq!(objectives[0].num_mets, 1);
        assert_eq!(
            objectives[0].funcs[0].value_cache,
            Scalar::max_value(DataType::Double)
        );
    }

    #[test]
    fn tunable_config_met_action_invokes_applier() {
        let (mut objectives, mut functions, mut tunables) = setup();
        objectives[0].vars[0].met_action = MetAction::Config;
        tunables[0].used_by_funcs.push(FunctionId(0));

        use std::cell::Cell;
        use std::rc::Rc;
        let applied = Rc::new(Cell::new(None));
        let applied2 = applied.clone();
        tunables[0]
            .state
            .set_applier(Box::new(move |v| applied2.set(Some(v))));

        propagate(&[ObjectiveId(0)], &mut objectives, &mut functions, &mut tunables);
        assert_eq!(applied.get(), Some(Scalar::Double(2.0)));
    }
}
