//! Phase B: the objective evaluator (§4.4). Dispatches each non-retired
//! Objective with at least one pending-update input Function to a
//! kind-specific recognition predicate, then runs the shared MET-commit
//! flow: record the winning Tunable index, invoke its applier, record
//! the winning Function value, fire the objective callback, and clear
//! the Function's `pending_updates`.

use crate::function::{Function, FunctionId};
use crate::objective::{ObjVarEntry, Objective, ObjectiveId, ObjectiveKind, ObjectiveStatus, SearchStrategy};
use crate::status::EntityStatus;
use crate::tunable::{Tunable, TunableId};
use crate::types::Scalar;

/// Runs Phase B over every objective, returning the ids of objectives
/// that transitioned to MET this call (the input to Phase C).
pub fn evaluate(
    objectives: &mut [Objective],
    functions: &mut [Function],
    tunables: &mut [Tunable],
    count: i64,
) -> Vec<ObjectiveId> {
    let mut newly_met = Vec::new();
    for (idx, obj) in objectives.iter_mut().enumerate() {
        if obj.status == ObjectiveStatus::Retired {
            continue;
        }
        let pending = obj.funcs.iter().any(|f| functions[f.id.0].pending_updates > 0);
        if !pending {
            continue;
        }
        obj.status = ObjectiveStatus::Evaluating;
        log::trace!("objective '{}' evaluating at count {count}", obj.name);

        let met = match obj.kind {
            ObjectiveKind::Min | ObjectiveKind::Max => evaluate_min_max(obj, functions, tunables, count),
            ObjectiveKind::Intersection => evaluate_intersection(obj, functions, tunables, count),
            ObjectiveKind::Threshold | ObjectiveKind::ThresholdUp | ObjectiveKind::ThresholdDown => {
                evaluate_threshold(obj, functions, tunables, count)
            }
            ObjectiveKind::SelectMin | ObjectiveKind::SelectMax => {
                evaluate_select(obj, functions, tunables, count)
            }
        };

        if met {
            log::info!("objective '{}' met at count {count}", obj.name);
            newly_met.push(ObjectiveId(idx));
        }
    }
    newly_met
}

/// MIN/MAX: dispatches on the objective's search strategy (§4.4).
fn evaluate_min_max(obj: &mut Objective, functions: &mut [Function], tunables: &mut [Tunable], count: i64) -> bool {
    let is_min = obj.kind == ObjectiveKind::Min;
    let func_id = obj.funcs[0].id;
    let function_status = functions[func_id.0].status;

    let decision = match obj.search_strategy {
        SearchStrategy::ExhaustiveAfterComplete => {
            if function_status != EntityStatus::UpdateComplete {
                None
            } else {
                best_index(functions[func_id.0].state.states(), is_min)
            }
        }
        SearchStrategy::ExhaustiveOnTheFly => {
            let function = &functions[func_id.0];
            if let Some(last) = function.state.current_value() {
                let idx = function.state.count() - 1;
                let entry = &mut obj.funcs[0];
                if better(last, entry.value_cache, is_min) {
                    entry.value_cache = last;
                    entry.index_cache = Some(idx);
                }
            }
            if function_status == EntityStatus::UpdateComplete {
                obj.funcs[0].index_cache.map(|i| (i, obj.funcs[0].value_cache))
            } else {
                None
            }
        }
        SearchStrategy::UnimodalGradientOnTheFly => unimodal_decision(
            functions[func_id.0].state.states(),
            obj.lookup_window,
            obj.fidelity_window,
            obj.deviation_tolerance,
            is_min,
        ),
    };

    let Some((win_index, win_value)) = decision else {
        return false;
    };
    commit(obj, 0, func_id, win_index, win_value, functions, tunables, count);
    true
}

/// INTERSECTION: MET at the first index where the sign of `f1 - f2`
/// flips relative to the previous index (§4.4).
fn evaluate_intersection(
    obj: &mut Objective,
    functions: &mut [Function],
    tunables: &mut [Tunable],
    count: i64,
) -> bool {
    let id1 = obj.funcs[0].id;
    let id2 = obj.funcs[1].id;
    let n = functions[id1.0].state.count().min(functions[id2.0].state.count());
    if n < 2 {
        return false;
    }

    let s1 = functions[id1.0].state.states();
    let s2 = functions[id2.0].state.states();
    let mut flip = None;
    for i in 1..n {
        let prev = sign_of_diff(s1[i - 1], s2[i - 1]);
        let cur = sign_of_diff(s1[i], s2[i]);
        if let (Some(prev), Some(cur)) = (prev, cur) {
            if prev != cur {
                flip = Some(i);
                break;
            }
        }
    }

    let Some(win_index) = flip else {
        return false;
    };
    let win_value = functions[id1.0].state.states()[win_index];
    commit(obj, 0, id1, win_index, win_value, functions, tunables, count);
    functions[id2.0].pending_updates = 0;
    true
}

fn sign_of_diff(a: Scalar, b: Scalar) -> Option<std::cmp::Ordering> {
    Some(a.as_f64()?.partial_cmp(&b.as_f64()?)?)
}

/// THRESHOLD / THRESHOLD_UP / THRESHOLD_DOWN (§4.4).
fn evaluate_threshold(
    obj: &mut Objective,
    functions: &mut [Function],
    tunables: &mut [Tunable],
    count: i64,
) -> bool {
    let func_id = obj.funcs[0].id;
    let Some(target) = obj.threshold.and_then(|t| t.as_f64()) else {
        return false;
    };
    let states = functions[func_id.0].state.states();
    let n = states.len();
    let fw = obj.fidelity_window;
    if n < fw {
        return false;
    }

    let decision = match obj.kind {
        ObjectiveKind::Threshold => {
            let window = &states[n - fw..];
            let ok = window.iter().all(|s| {
                s.as_f64()
                    .map_or(false, |v| (v - target).abs() <= obj.deviation_tolerance * target.abs())
            });
            if ok {
                Some((n - 1, states[n - 1]))
            } else {
                None
            }
        }
        ObjectiveKind::ThresholdUp | ObjectiveKind::ThresholdDown => {
            let is_up = obj.kind == ObjectiveKind::ThresholdUp;
            let mut crossing = None;
            for i in 1..n {
                let (Some(prev), Some(cur)) = (states[i - 1].as_f64(), states[i].as_f64()) else {
                    continue;
                };
                let crossed = if is_up {
                    prev < target && cur >= target
                } else {
                    prev > target && cur <= target
                };
                if crossed && i + fw <= n {
                    let stays = states[i..i + fw].iter().all(|s| {
                        s.as_f64()
                            .map_or(false, |v| if is_up { v >= target } else { v <= target })
                    });
                    if stays {
                        crossing = Some(i);
                        break;
                    }
                }
            }
            crossing.map(|i| (i, states[i]))
        }
        _ => None,
    };

    let Some((win_index, win_value)) = decision else {
        return false;
    };
    commit(obj, 0, func_id, win_index, win_value, functions, tunables, count);
    true
}

/// SELECT_MIN / SELECT_MAX: once every candidate function completes,
/// pick the function whose best value dominates and mark `select_mask`
/// (§4.4). Candidate functions are scanned exhaustively, matching
/// EXHAUSTIVE_AFTER_COMPLETE's cross-function generalization.
fn evaluate_select(obj: &mut Objective, functions: &mut [Function], tunables: &mut [Tunable], count: i64) -> bool {
    let is_min = obj.kind == ObjectiveKind::SelectMin;
    let all_complete = obj
        .funcs
        .iter()
        .all(|f| functions[f.id.0].status == EntityStatus::UpdateComplete);
    if !all_complete {
        return false;
    }

    let mut winner: Option<(usize, usize, Scalar)> = None;
    for (pos, entry) in obj.funcs.iter().enumerate() {
        let states = functions[entry.id.0].state.states();
        if let Some((idx, value)) = best_index(states, is_min) {
            let improves = match winner {
                None => true,
                Some((_, _, best)) => better(value, best, is_min),
            };
            if improves {
                winner = Some((pos, idx, value));
            }
        }
    }

    let Some((pos, win_index, win_value)) = winner else {
        return false;
    };
    for (k, flag) in obj.select_mask.iter_mut().enumerate() {
        *flag = k == pos;
    }

    let win_func_id = obj.funcs[pos].id;
    commit(obj, pos, win_func_id, win_index, win_value, functions, tunables, count);
    for entry in &obj.funcs {
        functions[entry.id.0].pending_updates = 0;
    }
    true
}

/// Index of the minimum (or maximum) entry in `states`, `None` on an
/// empty trace or a trace of non-comparable (`OpaquePointer`) scalars.
fn best_index(states: &[Scalar], is_min: bool) -> Option<(usize, Scalar)> {
    states.iter().enumerate().fold(None, |acc, (i, &v)| match acc {
        None => v.as_f64().map(|_| (i, v)),
        Some((_, best)) if better(v, best, is_min) => Some((i, v)),
        some => some,
    })
}

/// A tie between `candidate` and `current` favors `candidate` — the
/// later-sampled index wins (§3's `preference_right`), so a scan over a
/// trace with repeated extrema settles on its last occurrence.
fn better(candidate: Scalar, current: Scalar, is_min: bool) -> bool {
    match (candidate.as_f64(), current.as_f64()) {
        (Some(c), Some(b)) => {
            if is_min {
                c <= b
            } else {
                c >= b
            }
        }
        _ => false,
    }
}

/// UNIMODAL_GRADIENT_ON_THE_FLY's turning-point detector (§4.4): counts
/// consecutive adverse-trend pairs walking the last `lookup_window`
/// samples from newest to oldest, stopping at the first pair that
/// doesn't qualify. MET once that count reaches `fidelity_window`.
fn unimodal_decision(
    states: &[Scalar],
    lookup_window: usize,
    fidelity_window: usize,
    tolerance: f64,
    is_min: bool,
) -> Option<(usize, Scalar)> {
    let count = states.len();
    if count < lookup_window {
        return None;
    }
    let start = count - lookup_window;
    let mut trend = 0usize;
    for i in (start + 1..count).rev() {
        let (Some(prev), Some(cur)) = (states[i - 1].as_f64(), states[i].as_f64()) else {
            break;
        };
        if prev == 0.0 {
            break;
        }
        let rel = (cur - prev).abs() / prev.abs();
        let adverse = if is_min { cur > prev } else { cur < prev };
        if rel >= tolerance && adverse {
            trend += 1;
        } else {
            break;
        }
    }
    if trend >= fidelity_window {
        let index = count - trend - 1;
        Some((index, states[index]))
    } else {
        None
    }
}

/// The shared MET-commit flow (§4.4 "After a MET decision"): records
/// the winning Function value, resolves and applies the winning
/// Tunable, fires the objective callback, and marks the objective MET.
fn commit(
    obj: &mut Objective,
    func_pos: usize,
    func_id: FunctionId,
    win_index: usize,
    win_value: Scalar,
    functions: &mut [Function],
    tunables: &mut [Tunable],
    count: i64,
) {
    obj.funcs[func_pos].value_cache = win_value;
    obj.funcs[func_pos].index_cache = Some(win_index);

    match winning_var(&functions[func_id.0], win_index) {
        Some((tunable_id, tvar_index)) => apply_winner(obj, tunable_id, tvar_index, tunables, count),
        None => log::warn!(
            "objective '{}' met but no active input tunable could be resolved for the winning sample",
            obj.name
        ),
    }

    if let Some(cb) = obj.callback.as_mut() {
        cb(&obj.name);
    }

    obj.status = ObjectiveStatus::Met;
    functions[func_id.0].pending_updates = 0;
}

/// The Tunable whose sample was active when `win_index` was appended to
/// `function`'s trace, and that Tunable's own trace index at the time
/// (via `Function::input_trace`'s per-append input snapshot).
fn winning_var(function: &Function, win_index: usize) -> Option<(TunableId, usize)> {
    let active = function.active_var?;
    let pos = function.inputs.iter().position(|&id| id == active)?;
    let tvar_index = *function.input_trace.get(win_index)?.get(pos)?;
    Some((active, tvar_index))
}

/// Records the winning Tunable's value/index/iteration into the
/// objective's per-var cache (creating the entry if `Region` hasn't
/// pre-populated it) and invokes the Tunable's applier.
fn apply_winner(obj: &mut Objective, tunable_id: TunableId, tvar_index: usize, tunables: &mut [Tunable], count: i64) {
    let tunable = &mut tunables[tunable_id.0];
    let Some(value) = tunable.state.get(tvar_index) else {
        return;
    };
    tunable.state.apply(value);

    match obj.vars.iter_mut().find(|v| v.id == tunable_id) {
        Some(entry) => {
            entry.value_cache = Some(value);
            entry.index_cache = Some(tvar_index);
            entry.last_applied_iter = count;
        }
        None => obj.vars.push(ObjVarEntry {
            id: tunable_id,
            value_cache: Some(value),
            index_cache: Some(tvar_index),
            preference_right: false,
            last_applied_iter: count,
            apply_policy: tunable.apply_policy,
            met_action: crate::objective::MetAction::NoAction,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{Function, FunctionKind};
    use crate::objective::Objective;
    use crate::schedule::ApplyPolicy;
    use crate::tunable::Tunable;
    use crate::types::DataType;

    fn complete_function(values: &[f64]) -> Function {
        let mut f = Function::new_known(
            "f",
            DataType::Double,
            values.len(),
            FunctionKind::Distance,
            vec![TunableId(0)],
            vec![Scalar::Double(0.0)],
        );
        for &v in values {
            let idx = f.state.append(Scalar::Double(v)).unwrap();
            f.record_input_trace(vec![idx]);
        }
        f.active_var = Some(TunableId(0));
        f.status = EntityStatus::UpdateComplete;
        f
    }

    fn driving_tunable(n: usize) -> Tunable {
        let mut t = Tunable::new_list(
            "t",
            DataType::Double,
            n,
            (0..n).map(|i| Scalar::Double(i as f64)).collect(),
            None,
        )
        .unwrap();
        for i in 0..n {
            t.state.append(Scalar::Double(i as f64)).unwrap();
        }
        t.apply_policy = ApplyPolicy::OnRead;
        t
    }

    #[test]
    fn exhaustive_after_complete_picks_global_minimum() {
        let mut functions = vec![complete_function(&[5.0, 1.0, 4.0, 9.0])];
        functions[0].pending_updates = 1;
        let mut tunables = vec![driving_tunable(4)];
        let mut obj = Objective::new_min("m", FunctionId(0), DataType::Double);
        let met = evaluate_min_max(&mut obj, &mut functions, &mut tunables, 10);
        assert!(met);
        assert_eq!(obj.funcs[0].index_cache, Some(1));
        assert_eq!(obj.funcs[0].value_cache, Scalar::Double(1.0));
        assert_eq!(obj.status, ObjectiveStatus::Met);
    }

    #[test]
    fn exhaustive_on_the_fly_tracks_best_until_complete() {
        let mut f = Function::new_known(
            "f",
            DataType::Double,
            3,
            FunctionKind::Distance,
            vec![TunableId(0)],
            vec![Scalar::Double(0.0)],
        );
        f.active_var = Some(TunableId(0));
        f.status = EntityStatus::Sampling;
        let mut tunables = vec![driving_tunable(3)];
        let mut obj = Objective::new_min("m", FunctionId(0), DataType::Double);
        obj.set_search_strategy(SearchStrategy::ExhaustiveOnTheFly);

        // Sample 1: 5.0 becomes the best-so-far, not yet complete.
        let idx = f.state.append(Scalar::Double(5.0)).unwrap();
        f.record_input_trace(vec![idx]);
        f.pending_updates = 1;
        let mut functions = vec![f];
        assert!(!evaluate_min_max(&mut obj, &mut functions, &mut tunables, 0));
        assert_eq!(obj.funcs[0].value_cache, Scalar::Double(5.0));

        // Sample 2: 1.0 improves the cache, still not complete.
        let idx = functions[0].state.append(Scalar::Double(1.0)).unwrap();
        functions[0].record_input_trace(vec![idx]);
        functions[0].pending_updates = 1;
        assert!(!evaluate_min_max(&mut obj, &mut functions, &mut tunables, 1));
        assert_eq!(obj.funcs[0].value_cache, Scalar::Double(1.0));

        // Sample 3: 4.0 does not improve 1.0, but completion now decides.
        let idx = functions[0].state.append(Scalar::Double(4.0)).unwrap();
        functions[0].record_input_trace(vec![idx]);
        functions[0].status = EntityStatus::UpdateComplete;
        functions[0].pending_updates = 1;
        let met = evaluate_min_max(&mut obj, &mut functions, &mut tunables, 2);
        assert!(met);
        assert_eq!(obj.funcs[0].value_cache, Scalar::Double(1.0));
        assert_eq!(obj.funcs[0].index_cache, Some(1));
    }

    #[test]
    fn unimodal_detects_turning_point_for_min() {
        // Decreasing to a minimum at index 3 (value 1), then a confirmed
        // increasing trend for 3 consecutive pairs.
        let states: Vec<Scalar> = [5.0, 3.0, 2.0, 1.0, 2.0, 3.0, 5.0, 8.0]
            .into_iter()
            .map(Scalar::Double)
            .collect();
        let decision = unimodal_decision(&states, 8, 3, 0.05, true);
        assert_eq!(decision, Some((3, Scalar::Double(1.0))));
    }

    #[test]
    fn intersection_detects_first_sign_flip() {
        let mut functions = vec![
            complete_function(&[1.0, 2.0, 3.0, 4.0]),
            complete_function(&[4.0, 3.0, 1.0, 0.0]),
        ];
        functions[0].pending_updates = 1;
        let mut tunables = vec![driving_tunable(4)];
        let mut obj = Objective::new_intersection("x", FunctionId(0), FunctionId(1));
        let met = evaluate_intersection(&mut obj, &mut functions, &mut tunables, 5);
        assert!(met);
        assert_eq!(obj.funcs[0].index_cache, Some(2));
    }

    #[test]
    fn threshold_requires_fidelity_window_of_stable_samples() {
        let mut functions = vec![complete_function(&[1.0, 9.0, 10.0, 10.1, 9.9])];
        functions[0].pending_updates = 1;
        let mut tunables = vec![driving_tunable(5)];
        let mut obj = Objective::new_threshold("th", ObjectiveKind::Threshold, FunctionId(0), Scalar::Double(10.0))
            .unwrap();
        obj.set_fidelity(0.05, 3, 8);
        let met = evaluate_threshold(&mut obj, &mut functions, &mut tunables, 0);
        assert!(met);
        assert_eq!(obj.funcs[0].index_cache, Some(4));
    }

    #[test]
    fn threshold_up_requires_persistence_past_crossing() {
        let mut functions = vec![complete_function(&[1.0, 2.0, 6.0, 7.0, 8.0])];
        functions[0].pending_updates = 1;
        let mut tunables = vec![driving_tunable(5)];
        let mut obj =
            Objective::new_threshold("tu", ObjectiveKind::ThresholdUp, FunctionId(0), Scalar::Double(5.0)).unwrap();
        obj.set_fidelity(0.05, 3, 8);
        let met = evaluate_threshold(&mut obj, &mut functions, &mut tunables, 0);
        assert!(met);
        assert_eq!(obj.funcs[0].index_cache, Some(2));
    }

    #[test]
    fn select_min_picks_dominating_function() {
        let mut functions = vec![complete_function(&[5.0, 4.0]), complete_function(&[1.0, 9.0])];
        functions[0].pending_updates = 1;
        let mut tunables = vec![driving_tunable(2)];
        let mut obj = Objective::new_select("s", ObjectiveKind::SelectMin, vec![FunctionId(0), FunctionId(1)])
            .unwrap();
        let met = evaluate_select(&mut obj, &mut functions, &mut tunables, 0);
        assert!(met);
        assert_eq!(obj.select_mask, vec![false, true]);
    }
}
