//! The `(iter_start, batch_size, stride, lifetime, policy)` schedule
//! tuple (§4.2) shared by Tunables and Functions, plus the partial form
//! Functions use to model `DEFAULT_NONE` inheritance from their active
//! input Tunable (Design Notes §9).

/// Which side(s) of a `begin`/`end` pair an entity's schedule advances
/// on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateLifetime {
    RegionBegin,
    RegionEnd,
    RegionBeginEnd,
    RegionBeginEndDiff,
}

impl UpdateLifetime {
    pub fn fires_on_begin(self) -> bool {
        matches!(
            self,
            UpdateLifetime::RegionBegin
                | UpdateLifetime::RegionBeginEnd
                | UpdateLifetime::RegionBeginEndDiff
        )
    }

    pub fn fires_on_end(self) -> bool {
        matches!(
            self,
            UpdateLifetime::RegionEnd
                | UpdateLifetime::RegionBeginEnd
                | UpdateLifetime::RegionBeginEndDiff
        )
    }

    pub fn is_diff(self) -> bool {
        matches!(self, UpdateLifetime::RegionBeginEndDiff)
    }
}

/// How the next value in a batch slot is produced (§4.3). LIST_* apply
/// to LIST/RANGE tunables; BATCH_* apply to EXT tunables and to
/// Functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    ListSeries,
    ListSeriesCyclic,
    ListRandom,
    ListRandomUnique,
    BatchStraight,
    BatchAccumulate,
}

/// When an applier fires relative to sampling (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPolicy {
    OnRead,
    EachIteration,
    OnceOnMet,
}

/// A fully resolved schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub lifetime: UpdateLifetime,
    pub policy: UpdatePolicy,
    pub iter_start: i64,
    pub batch_size: usize,
    pub stride: usize,
}

impl Schedule {
    /// `last_end = iter_start + num_batches * (batch_size + stride) - stride`
    /// (§4.2's schedule safety check). `num_batches` is `ceil(total/2)`
    /// for BEGIN_END-kind lifetimes, `total` otherwise.
    pub fn last_end(&self, total_capacity: usize) -> i64 {
        let num_batches = if matches!(
            self.lifetime,
            UpdateLifetime::RegionBeginEnd | UpdateLifetime::RegionBeginEndDiff
        ) {
            total_capacity.div_ceil(2)
        } else {
            total_capacity
        } as i64;
        let period = (self.batch_size + self.stride) as i64;
        self.iter_start + num_batches * period - self.stride as i64
    }

    /// `true` if this schedule overlaps `other` — i.e. the intervals
    /// `[iter_start, last_end]` intersect. Used by the schedule safety
    /// check (§4.2); overlap is reported, not rejected (§7).
    pub fn overlaps(&self, other: &Schedule, total_capacity: usize) -> bool {
        let a_end = self.last_end(total_capacity);
        let b_end = other.last_end(total_capacity);
        self.iter_start <= b_end && other.iter_start <= a_end
    }
}

/// A Function's schedule with any field possibly left unset
/// (`DEFAULT_NONE`), inherited from the currently active input Tunable
/// and re-resolved every iteration (§4.2 "Function schedule
/// inheritance").
#[derive(Debug, Clone, Copy, Default)]
pub struct PartialSchedule {
    pub lifetime: Option<UpdateLifetime>,
    pub policy: Option<UpdatePolicy>,
    pub iter_start: Option<i64>,
    pub batch_size: Option<usize>,
    pub stride: Option<usize>,
}

impl PartialSchedule {
    pub fn all_unset() -> Self {
        Self::default()
    }

    pub fn resolve(&self, active: &Schedule) -> Schedule {
        Schedule {
            lifetime: self.lifetime.unwrap_or(active.lifetime),
            policy: self.policy.unwrap_or(active.policy),
            iter_start: self.iter_start.unwrap_or(active.iter_start),
            batch_size: self.batch_size.unwrap_or(active.batch_size),
            stride: self.stride.unwrap_or(active.stride),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_schedule_has_no_gap() {
        let s = Schedule {
            lifetime: UpdateLifetime::RegionBegin,
            policy: UpdatePolicy::ListSeries,
            iter_start: 0,
            batch_size: 1,
            stride: 0,
        };
        assert_eq!(s.last_end(4), 3);
    }

    #[test]
    fn overlapping_schedules_detected() {
        let a = Schedule {
            lifetime: UpdateLifetime::RegionBegin,
            policy: UpdatePolicy::ListSeries,
            iter_start: 0,
            batch_size: 3,
            stride: 0,
        };
        let b = Schedule {
            lifetime: UpdateLifetime::RegionBegin,
            policy: UpdatePolicy::ListSeries,
            iter_start: 2,
            batch_size: 3,
            stride: 0,
        };
        assert!(a.overlaps(&b, 6));
    }

    #[test]
    fn disjoint_schedules_not_flagged() {
        let a = Schedule {
            lifetime: UpdateLifetime::RegionBegin,
            policy: UpdatePolicy::ListSeries,
            iter_start: 0,
            batch_size: 3,
            stride: 0,
        };
        let b = Schedule {
            lifetime: UpdateLifetime::RegionBegin,
            policy: UpdatePolicy::ListSeries,
            iter_start: 3,
            batch_size: 3,
            stride: 0,
        };
        assert!(!a.overlaps(&b, 6));
    }
}
