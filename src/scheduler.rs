//! Phase A: the sampling scheduler. Drives Tunable and Function advances
//! on the `begin`/`end` sides of a region iteration (§4.2, §4.3).

use crate::function::{Function, FunctionKind};
use crate::schedule::{ApplyPolicy, Schedule, UpdatePolicy};
use crate::statevar::StateVar;
use crate::status::EntityStatus;
use crate::tunable::{Tunable, TunableKind};
use rand::Rng;

/// Which half of a `begin`/`end` pair is currently driving the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Begin,
    End,
}

/// Computes `(slot, just_started)` for an entity at `iteration_count`
/// against `schedule`, or `None` if this side doesn't apply yet (offset
/// negative) or the entity is in the stride gap (§4.2 steps 1-2).
fn slot_for(schedule: &Schedule, count: i64) -> Option<(usize, bool)> {
    let offset = count - schedule.iter_start;
    if offset < 0 {
        return None;
    }
    let period = (schedule.batch_size + schedule.stride) as i64;
    let slot = (offset % period) as usize;
    if slot >= schedule.batch_size {
        return None;
    }
    Some((slot, offset == 0))
}

fn fires_on(schedule: &Schedule, side: Side) -> bool {
    match side {
        Side::Begin => schedule.lifetime.fires_on_begin(),
        Side::End => schedule.lifetime.fires_on_end(),
    }
}

/// Advances every eligible Tunable one schedule step on `side`. Returns
/// the set of tunables that appended a fresh sample this call (their
/// indices into `tunables`), which the caller uses to drive dependent
/// Function advances and applier invocation.
pub fn advance_tunables(tunables: &mut [Tunable], count: i64, side: Side, rng: &mut impl Rng) -> Vec<usize> {
    let mut advanced = Vec::new();
    for (i, tunable) in tunables.iter_mut().enumerate() {
        if !tunable.status.is_advance_eligible() {
            continue;
        }
        let Some(schedule) = tunable.schedule else {
            continue;
        };
        if !fires_on(&schedule, side) {
            continue;
        }
        let Some((slot, _just_started)) = slot_for(&schedule, count) else {
            continue;
        };
        // A freshly-constructed entity flips Created -> Sampling the
        // first time its schedule makes it eligible to advance. This is
        // also what re-activates an entity a RESET met-action cleared
        // back to Created mid-region: its `iter_start` doesn't move, but
        // the schedule keeps admitting it every period, so the next
        // eligible slot picks status back up (§4.2 step 1).
        if tunable.status == EntityStatus::Created {
            tunable.status = EntityStatus::Sampling;
        }

        let appended = match tunable.kind {
            TunableKind::List { .. } | TunableKind::Range { .. } => {
                if slot == 0 {
                    tunable.advance_list_range(schedule.policy, rng)
                } else {
                    None
                }
            }
            TunableKind::Ext => advance_ext(&mut tunable.state, schedule, side, slot),
        };

        if let Some(idx) = appended {
            // ON_READ fires the applier right here, at sampling time;
            // EACH_ITERATION is driven once per iteration by
            // `Region::apply_each_iteration` instead, and ONCE_ON_MET
            // only ever fires from the evaluator's MET-commit flow.
            if tunable.apply_policy == ApplyPolicy::OnRead {
                if let Some(value) = tunable.state.get(idx) {
                    tunable.state.apply(value);
                }
            }
            tunable.current_apply_index = Some(idx);
            tunable.last_apply_iteration = count;
            advanced.push(i);
        }

        if tunable.is_full() {
            tunable.status = EntityStatus::UpdateComplete;
        }
    }
    advanced
}

/// Advances every eligible Function one schedule step on `side`,
/// resolving `DEFAULT_NONE` schedule fields from the currently active
/// input Tunable, re-derived every call (§4.2 "Function schedule
/// inheritance").
pub fn advance_functions(functions: &mut [Function], tunables: &[Tunable], count: i64, side: Side) {
    for function in functions.iter_mut() {
        if !function.status.is_advance_eligible() {
            continue;
        }

        let active_id = resolve_active_var(function, tunables);
        function.active_var = active_id;
        let Some(active_id) = active_id else {
            continue;
        };
        let active = &tunables[active_id.0];
        let Some(active_schedule) = active.schedule else {
            continue;
        };
        let resolved = function.resolve_schedule(&active_schedule);
        if !fires_on(&resolved, side) {
            continue;
        }
        let Some((slot, _just_started)) = slot_for(&resolved, count) else {
            continue;
        };
        if function.status == EntityStatus::Created {
            function.status = EntityStatus::Sampling;
        }

        let appended = if function.kind.is_known_op() {
            if slot == 0 {
                active
                    .state
                    .current_value()
                    .and_then(|v| function.compute_known(v))
                    .and_then(|value| function.state.append(value))
            } else {
                None
            }
        } else {
            advance_ext(&mut function.state, resolved, side, slot)
        };

        if let Some(idx) = appended {
            let snapshot: Vec<usize> = function
                .inputs
                .iter()
                .map(|id| tunables[id.0].state.count().saturating_sub(1))
                .collect();
            debug_assert_eq!(function.input_trace.len(), idx);
            function.record_input_trace(snapshot);
        }

        if function.is_full() {
            function.status = EntityStatus::UpdateComplete;
        }
    }
}

/// The function's currently active input Tunable: the one whose status
/// is SAMPLING or UPDATE_COMPLETE, picked in declaration order (§4.2).
/// Sticks with the previously active Tunable while it remains eligible,
/// matching the original's "doing nothing" fast path.
fn resolve_active_var(function: &Function, tunables: &[Tunable]) -> Option<crate::tunable::TunableId> {
    if let Some(id) = function.active_var {
        let t = &tunables[id.0];
        if matches!(t.status, EntityStatus::Sampling | EntityStatus::UpdateComplete) {
            return Some(id);
        }
    }
    function
        .inputs
        .iter()
        .find(|id| {
            matches!(
                tunables[id.0].status,
                EntityStatus::Sampling | EntityStatus::UpdateComplete
            )
        })
        .copied()
}

/// EXT advance protocol shared by EXT Tunables and MODEL/MODEL_DIFF
/// Functions (§4.3): BATCH_STRAIGHT appends once at `slot == 0`;
/// BATCH_ACCUMULATE sums the provider's value across the whole batch,
/// appending the total on the last slot. `DIFF` lifetimes route through
/// the begin/end baseline-and-difference protocol instead.
fn advance_ext(state: &mut StateVar, schedule: Schedule, side: Side, slot: usize) -> Option<usize> {
    if schedule.lifetime.is_diff() {
        return match side {
            Side::Begin => {
                advance_ext_diff_begin(state, schedule.policy, slot);
                None
            }
            Side::End => advance_ext_diff_end(state, schedule.policy, slot, schedule.batch_size),
        };
    }
    match schedule.policy {
        UpdatePolicy::BatchStraight => {
            if slot == 0 {
                let v = state.sample_provider()?;
                state.append(v)
            } else {
                None
            }
        }
        UpdatePolicy::BatchAccumulate => {
            let v = state.sample_provider()?;
            match side {
                Side::Begin => state.accum_begin_add(v),
                Side::End => state.accum_end_add(v),
            }
            if slot == schedule.batch_size - 1 {
                let total = match side {
                    Side::Begin => state.accum_begin(),
                    Side::End => state.accum_end(),
                };
                match side {
                    Side::Begin => state.reset_accum_begin(),
                    Side::End => state.reset_accum_end(),
                };
                state.append(total)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// BEGIN side of an EXT_DIFF schedule: stores (straight) or accumulates
/// (accumulate) the baseline into `accum_begin`, never appending.
fn advance_ext_diff_begin(state: &mut StateVar, policy: UpdatePolicy, slot: usize) {
    match policy {
        UpdatePolicy::BatchStraight => {
            if slot == 0 {
                if let Some(v) = state.sample_provider() {
                    state.set_accum_begin(v);
                }
            }
        }
        UpdatePolicy::BatchAccumulate => {
            if let Some(v) = state.sample_provider() {
                state.accum_begin_add(v);
            }
        }
        _ => {}
    }
}

/// END side of an EXT_DIFF schedule: appends
/// `end_value - begin_baseline (+ running end-side accumulation)`,
/// then resets both accumulators (§4.3's EXT_DIFF lifetimes).
fn advance_ext_diff_end(
    state: &mut StateVar,
    policy: UpdatePolicy,
    slot: usize,
    batch_size: usize,
) -> Option<usize> {
    match policy {
        UpdatePolicy::BatchStraight => {
            if slot == 0 {
                let v = state.sample_provider()?;
                let result = v.sub(&state.accum_begin());
                state.reset_accum_begin();
                state.reset_accum_end();
                state.append(result)
            } else {
                None
            }
        }
        UpdatePolicy::BatchAccumulate => {
            let v = state.sample_provider()?;
            let diff = v.sub(&state.accum_begin()).add(&state.accum_end());
            state.set_accum_end(diff);
            if slot == batch_size - 1 {
                let total = state.accum_end();
                state.reset_accum_begin();
                state.reset_accum_end();
                state.append(total)
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{ApplyPolicy, Schedule, UpdateLifetime, UpdatePolicy};
    use crate::types::{DataType, Scalar};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn list_tunable(values: &[i32], batch: usize, stride: usize) -> Tunable {
        let mut t = Tunable::new_list(
            "t",
            DataType::Int,
            values.len(),
            values.iter().map(|&v| Scalar::Int(v)).collect(),
            None,
        )
        .unwrap();
        t.set_update_schedule(Schedule {
            lifetime: UpdateLifetime::RegionBegin,
            policy: UpdatePolicy::ListSeries,
            iter_start: 0,
            batch_size: batch,
            stride,
        })
        .unwrap();
        t.apply_policy = ApplyPolicy::OnRead;
        t
    }

    #[test]
    fn list_series_advances_once_per_iteration_with_batch_one_stride_zero() {
        let mut tunables = vec![list_tunable(&[1, 2, 4, 8], 1, 0)];
        let mut rng = SmallRng::seed_from_u64(1);
        for (count, expected) in [1, 2, 4, 8].into_iter().enumerate() {
            let advanced = advance_tunables(&mut tunables, count as i64, Side::Begin, &mut rng);
            assert_eq!(advanced, vec![0]);
            assert_eq!(tunables[0].state.current_value(), Some(Scalar::Int(expected)));
        }
        assert_eq!(tunables[0].status, EntityStatus::UpdateComplete);
    }

    #[test]
    fn stride_gap_is_skipped() {
        let mut tunables = vec![list_tunable(&[1, 2, 3], 1, 1)];
        let mut rng = SmallRng::seed_from_u64(1);
        // iteration 0: batch slot -> append 1
        let a0 = advance_tunables(&mut tunables, 0, Side::Begin, &mut rng);
        assert_eq!(a0, vec![0]);
        // iteration 1: stride gap -> no append
        let a1 = advance_tunables(&mut tunables, 1, Side::Begin, &mut rng);
        assert!(a1.is_empty());
        // iteration 2: next batch slot -> append 2
        let a2 = advance_tunables(&mut tunables, 2, Side::Begin, &mut rng);
        assert_eq!(a2, vec![0]);
        assert_eq!(tunables[0].state.current_value(), Some(Scalar::Int(2)));
    }

    #[test]
    fn batch_accumulate_sums_constant_provider_over_batch() {
        use std::cell::Cell;
        use std::rc::Rc;
        use crate::capability::Provider;
        let cell = Rc::new(Cell::new(Scalar::Double(5.0)));
        let mut t = Tunable::new_ext("ext", DataType::Double, 4, Provider::DirectValue(cell));
        t.set_update_schedule(Schedule {
            lifetime: UpdateLifetime::RegionBeginEnd,
            policy: UpdatePolicy::BatchAccumulate,
            iter_start: 0,
            batch_size: 4,
            stride: 1,
        })
        .unwrap();
        let mut tunables = vec![t];
        let mut rng = SmallRng::seed_from_u64(1);
        for i in 0..4 {
            advance_tunables(&mut tunables, i, Side::Begin, &mut rng);
        }
        assert_eq!(tunables[0].state.current_value(), Some(Scalar::Double(20.0)));
        assert_eq!(tunables[0].state.accum_begin(), Scalar::Double(0.0));
    }
}
