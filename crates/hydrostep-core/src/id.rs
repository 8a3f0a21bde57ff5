//! Strongly-typed identifiers.

use std::fmt;

/// Identifies one refinement level of the mesh hierarchy.
///
/// Level 0 is the coarsest. Flux-register contributions only flow from
/// a level to the level below it, so level 0 never refluxes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LevelId(pub u32);

impl LevelId {
    /// Whether a coarser level exists below this one.
    pub fn has_coarser(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for LevelId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a tracked state type on a level.
///
/// `StateTypeId(0)` is always the hydrodynamic state advanced by the
/// integrator. Higher ids are auxiliary containers that ride along with
/// every swap, snapshot and restore.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateTypeId(pub u32);

impl StateTypeId {
    /// The hydrodynamic state.
    pub const HYDRO: StateTypeId = StateTypeId(0);
}

impl fmt::Display for StateTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StateTypeId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Monotonically increasing count of coarse steps taken on a level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub u64);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StepId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
