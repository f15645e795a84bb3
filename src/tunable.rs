//! `Tunable`: a `StateVar` extended with a kind (list, range, or
//! externally sampled) and the update schedule that drives it (§3, §4.2,
//! §4.3).

use crate::capability::Provider;
use crate::error::RtuneError;
use crate::schedule::{Schedule, UpdatePolicy};
use crate::statevar::StateVar;
use crate::status::EntityStatus;
use crate::types::{DataType, Scalar};
use rand::Rng;

/// Index of a `Tunable` within its owning `Region`'s table. Back-pointers
/// (`Function::inputs`, `Objective::vars`) are modeled as these indices
/// rather than owning references, per Design Notes §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TunableId(pub usize);

/// Which family of values a Tunable enumerates.
pub enum TunableKind {
    /// An ordered sequence of candidate values, with optional names.
    List {
        values: Vec<Scalar>,
        names: Option<Vec<String>>,
    },
    /// `begin + index * step` for `index` in `0..num_unique`.
    Range {
        begin: Scalar,
        end: Scalar,
        step: Scalar,
    },
    /// Sampled from a provider; schedule policy must be one of the
    /// `BATCH_*` family rather than `LIST_*`.
    Ext,
}

pub struct Tunable {
    pub state: StateVar,
    pub kind: TunableKind,
    pub num_unique: usize,
    pub current_index: Option<usize>,
    /// RANDOM_UNIQUE visit histogram, sized to `num_unique`. Allocated
    /// lazily at `set_update_schedule` time, not at construction — a
    /// LIST/RANGE tunable with no schedule attached never needs it.
    value_count: Vec<usize>,
    pub schedule: Option<Schedule>,
    pub apply_policy: crate::schedule::ApplyPolicy,
    pub used_by_funcs: Vec<crate::function::FunctionId>,
    pub status: EntityStatus,
}

impl Tunable {
    pub fn new_list(
        name: impl Into<String>,
        ty: DataType,
        total_capacity: usize,
        values: Vec<Scalar>,
        names: Option<Vec<String>>,
    ) -> Result<Self, RtuneError> {
        if values.is_empty() {
            return Err(RtuneError::EmptyList);
        }
        let num_unique = values.len();
        Ok(Tunable {
            state: StateVar::new(name, ty, total_capacity),
            kind: TunableKind::List { values, names },
            num_unique,
            current_index: None,
            value_count: Vec::new(),
            schedule: None,
            apply_policy: crate::schedule::ApplyPolicy::OnRead,
            used_by_funcs: Vec::new(),
            status: EntityStatus::Created,
        })
    }

    pub fn new_range(
        name: impl Into<String>,
        ty: DataType,
        total_capacity: usize,
        begin: Scalar,
        end: Scalar,
        step: Scalar,
    ) -> Result<Self, RtuneError> {
        let step_f = step.as_f64().unwrap_or(0.0);
        if step_f == 0.0 {
            return Err(RtuneError::ZeroStep);
        }
        let begin_f = begin.as_f64().unwrap_or(0.0);
        let end_f = end.as_f64().unwrap_or(0.0);
        let num_unique = ((end_f - begin_f).abs() / step_f.abs()).floor() as usize + 1;
        Ok(Tunable {
            state: StateVar::new(name, ty, total_capacity),
            kind: TunableKind::Range { begin, end, step },
            num_unique,
            current_index: None,
            value_count: Vec::new(),
            schedule: None,
            apply_policy: crate::schedule::ApplyPolicy::OnRead,
            used_by_funcs: Vec::new(),
            status: EntityStatus::Created,
        })
    }

    pub fn new_ext(
        name: impl Into<String>,
        ty: DataType,
        total_capacity: usize,
        provider: Provider,
    ) -> Self {
        let mut state = StateVar::new(name, ty, total_capacity);
        state.set_provider(provider);
        Tunable {
            state,
            kind: TunableKind::Ext,
            num_unique: 0,
            current_index: None,
            value_count: Vec::new(),
            schedule: None,
            apply_policy: crate::schedule::ApplyPolicy::OnRead,
            used_by_funcs: Vec::new(),
            status: EntityStatus::Created,
        }
    }

    /// Attaches the schedule tuple, allocating the RANDOM_UNIQUE visit
    /// histogram for LIST/RANGE kinds at this point (matching
    /// `rtune_var_set_update_schedule_attr`'s lazy allocation).
    pub fn set_update_schedule(&mut self, schedule: Schedule) -> Result<(), RtuneError> {
        if schedule.batch_size == 0 {
            return Err(RtuneError::EmptyBatch);
        }
        if !matches!(self.kind, TunableKind::Ext) {
            self.value_count = vec![0; self.num_unique];
        }
        self.schedule = Some(schedule);
        Ok(())
    }

    /// Materializes the value at `index` for LIST/RANGE kinds.
    fn materialize(&self, index: usize) -> Scalar {
        match &self.kind {
            TunableKind::List { values, .. } => values[index],
            TunableKind::Range { begin, step, .. } => {
                let b = begin.as_f64().unwrap_or(0.0);
                let s = step.as_f64().unwrap_or(0.0);
                Scalar::from_f64(self.state.data_type(), b + index as f64 * s)
            }
            TunableKind::Ext => unreachable!("materialize is only for LIST/RANGE kinds"),
        }
    }

    /// Picks the next value index per `update_policy` (§4.3's LIST/RANGE
    /// advance policies) and appends the materialized value. Returns the
    /// new state index, or `None` if the append was rejected — either
    /// capacity is exhausted, or RANDOM_UNIQUE has visited every index
    /// (§4.3's "fail, no append" case).
    pub fn advance_list_range(&mut self, policy: UpdatePolicy, rng: &mut impl Rng) -> Option<usize> {
        let index = match policy {
            UpdatePolicy::ListSeries => self.current_index.map_or(0, |i| i + 1),
            UpdatePolicy::ListSeriesCyclic => {
                self.current_index.map_or(0, |i| (i + 1) % self.num_unique)
            }
            UpdatePolicy::ListRandom => rng.random_range(0..self.num_unique),
            UpdatePolicy::ListRandomUnique => {
                if self.value_count.iter().all(|&c| c > 0) {
                    return None;
                }
                loop {
                    let candidate = rng.random_range(0..self.num_unique);
                    if self.value_count[candidate] == 0 {
                        break candidate;
                    }
                }
            }
            _ => return None,
        };
        if index >= self.num_unique {
            return None;
        }
        let value = self.materialize(index);
        let new_idx = self.state.append(value)?;
        self.current_index = Some(index);
        self.value_count[index] += 1;
        Some(new_idx)
    }

    pub fn is_full(&self) -> bool {
        self.state.is_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{ApplyPolicy, Schedule, UpdateLifetime, UpdatePolicy};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn schedule(policy: UpdatePolicy) -> Schedule {
        Schedule {
            lifetime: UpdateLifetime::RegionBegin,
            policy,
            iter_start: 0,
            batch_size: 1,
            stride: 0,
        }
    }

    #[test]
    fn list_series_advances_in_order() {
        let mut t = Tunable::new_list(
            "x",
            DataType::Int,
            4,
            vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(4), Scalar::Int(8)],
            None,
        )
        .unwrap();
        t.set_update_schedule(schedule(UpdatePolicy::ListSeries)).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        for expected in [1, 2, 4, 8] {
            t.advance_list_range(UpdatePolicy::ListSeries, &mut rng);
            assert_eq!(t.state.current_value(), Some(Scalar::Int(expected)));
        }
    }

    #[test]
    fn list_series_cyclic_wraps() {
        let mut t = Tunable::new_list(
            "x",
            DataType::Int,
            6,
            vec![Scalar::Int(10), Scalar::Int(20), Scalar::Int(30)],
            None,
        )
        .unwrap();
        t.set_update_schedule(schedule(UpdatePolicy::ListSeriesCyclic))
            .unwrap();
        let mut rng = SmallRng::seed_from_u64(2);
        let expected = [10, 20, 30, 10, 20, 30];
        for e in expected {
            t.advance_list_range(UpdatePolicy::ListSeriesCyclic, &mut rng);
            assert_eq!(t.state.current_value(), Some(Scalar::Int(e)));
        }
    }

    #[test]
    fn random_unique_exhausts_after_covering_all_indices() {
        let mut t = Tunable::new_list(
            "x",
            DataType::Int,
            10,
            vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)],
            None,
        )
        .unwrap();
        t.set_update_schedule(schedule(UpdatePolicy::ListRandomUnique))
            .unwrap();
        let mut rng = SmallRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..3 {
            let idx = t
                .advance_list_range(UpdatePolicy::ListRandomUnique, &mut rng)
                .expect("must succeed while indices remain");
            seen.insert(t.current_index.unwrap());
            let _ = idx;
        }
        assert_eq!(seen.len(), 3);
        assert!(t
            .advance_list_range(UpdatePolicy::ListRandomUnique, &mut rng)
            .is_none());
    }

    #[test]
    fn range_materializes_begin_plus_index_times_step() {
        let t = Tunable::new_range(
            "r",
            DataType::Double,
            16,
            Scalar::Double(1.0),
            Scalar::Double(16.0),
            Scalar::Double(1.0),
        )
        .unwrap();
        assert_eq!(t.num_unique, 16);
        assert_eq!(t.materialize(6), Scalar::Double(7.0));
    }

    #[test]
    fn zero_step_range_rejected() {
        let r = Tunable::new_range(
            "r",
            DataType::Int,
            4,
            Scalar::Int(0),
            Scalar::Int(4),
            Scalar::Int(0),
        );
        assert_eq!(r.err(), Some(RtuneError::ZeroStep));
    }

    #[test]
    fn empty_list_rejected() {
        let r = Tunable::new_list("l", DataType::Int, 4, vec![], None);
        assert_eq!(r.err(), Some(RtuneError::EmptyList));
    }

    #[test]
    fn apply_policy_defaults_to_on_read() {
        let t = Tunable::new_list("l", DataType::Int, 2, vec![Scalar::Int(1)], None).unwrap();
        assert!(matches!(t.apply_policy, ApplyPolicy::OnRead));
    }
}
