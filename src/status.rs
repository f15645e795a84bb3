//! Lifecycle statuses shared by Tunable and Function (spec §3); the
//! Objective's own status machine lives in `objective.rs` since its
//! vocabulary differs (`EVALUATING`/`MET` rather than
//! `SAMPLING`/`UPDATE_COMPLETE`).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityStatus {
    Created,
    Sampling,
    UpdateComplete,
    Retired,
    Reset,
}

impl EntityStatus {
    /// Eligible for a Phase-A schedule advance this iteration (§4.2).
    pub fn is_advance_eligible(self) -> bool {
        matches!(self, EntityStatus::Created | EntityStatus::Sampling)
    }

    pub fn is_retired(self) -> bool {
        matches!(self, EntityStatus::Retired)
    }
}
