//! Error types for hydrostep.
//!
//! Organised by subsystem: kernel (per-block physics operators),
//! collective (cross-rank reductions) and advance (the level-advance
//! controller). Every [`AdvanceError`] is fatal for the run; transient
//! instabilities are recovered by sub-cycling and never surface here.

use std::error::Error;
use std::fmt;

use crate::id::LevelId;

/// Which buffer a diagnostic refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateSlot {
    /// Old-time data of the hydro state.
    Old,
    /// New-time data of the hydro state.
    New,
    /// Ghost-padded working state of one stage.
    Expanded,
}

impl fmt::Display for StateSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Old => write!(f, "old state"),
            Self::New => write!(f, "new state"),
            Self::Expanded => write!(f, "expanded state"),
        }
    }
}

/// Errors raised by a physics kernel on one block.
///
/// Wrapped in [`AdvanceError::KernelFailed`] by the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum KernelError {
    /// The kernel could not run on the supplied block.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The equation of state could not be closed for a cell.
    EosFailed {
        /// Global cell index.
        cell: usize,
        /// Density at the failing cell.
        density: f64,
        /// Specific internal energy at the failing cell.
        energy: f64,
    },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
            Self::EosFailed {
                cell,
                density,
                energy,
            } => write!(
                f,
                "EOS failed at cell {cell} (rho = {density:e}, e = {energy:e})"
            ),
        }
    }
}

impl Error for KernelError {}

/// Errors from a blocking collective.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectiveError {
    /// A peer rank hung up before contributing to the collective.
    PeerDisconnected {
        /// The rank that observed the failure.
        rank: usize,
        /// The peer that disappeared.
        peer: usize,
    },
    /// Ranks contributed arrays of different lengths to a sum.
    LengthMismatch {
        /// Length contributed by this rank.
        expected: usize,
        /// Length received from a peer.
        received: usize,
    },
    /// This rank left the group after a fatal error.
    Aborted {
        /// The rank that aborted.
        rank: usize,
    },
}

impl fmt::Display for CollectiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerDisconnected { rank, peer } => {
                write!(f, "rank {rank}: peer {peer} disconnected during collective")
            }
            Self::LengthMismatch { expected, received } => write!(
                f,
                "collective length mismatch: expected {expected}, received {received}"
            ),
            Self::Aborted { rank } => {
                write!(f, "rank {rank}: collective used after abort")
            }
        }
    }
}

impl Error for CollectiveError {}

/// Fatal errors from advancing a level.
///
/// Each variant names the violated criterion together with the offending
/// numeric values and the level, so the message alone is enough to
/// diagnose the abort.
#[derive(Clone, Debug, PartialEq)]
pub enum AdvanceError {
    /// A physics kernel failed on some block.
    KernelFailed {
        /// Name of the kernel set.
        kernel: String,
        /// The underlying kernel error.
        reason: KernelError,
    },
    /// Non-finite data was found after sanitization.
    NonFiniteState {
        /// Level being advanced.
        level: LevelId,
        /// Buffer holding the bad value.
        slot: StateSlot,
        /// Component index.
        component: usize,
        /// Global cell index.
        cell: usize,
        /// The offending value.
        value: f64,
    },
    /// The requested sub-cycle count does not fit the sub-cycle counter.
    SubcycleOverflow {
        /// Level being advanced.
        level: LevelId,
        /// Step size that was rejected.
        dt: f64,
        /// Maximum stable sub-step.
        dt_subcycle: f64,
    },
    /// More sub-cycles are needed than the configured ceiling permits.
    TooManySubcycles {
        /// Level being advanced.
        level: LevelId,
        /// Step size that was rejected.
        dt: f64,
        /// Maximum stable sub-step.
        dt_subcycle: f64,
        /// Sub-cycles required.
        subcycles: u32,
        /// Configured ceiling.
        max_subcycles: u32,
    },
    /// The stable sub-step is below the configured minimum step size.
    SubcycleTooShort {
        /// Level being advanced.
        level: LevelId,
        /// Step size that was rejected.
        dt: f64,
        /// Maximum stable sub-step.
        dt_subcycle: f64,
        /// Sub-cycles required.
        subcycles: u32,
        /// Configured minimum step size.
        dt_cutoff: f64,
    },
    /// The step size handed to the advance is not finite and positive.
    InvalidTimestep {
        /// Level being advanced.
        level: LevelId,
        /// The rejected step size.
        dt: f64,
    },
    /// Level state could not be read at the requested time or halo.
    StateAccess {
        /// Level being advanced.
        level: LevelId,
        /// Description from the state container.
        reason: String,
    },
    /// A cross-rank reduction failed.
    Collective(CollectiveError),
    /// The level already aborted; no further advances are permitted.
    Aborted {
        /// Level that aborted.
        level: LevelId,
    },
}

impl AdvanceError {
    /// Configuration advice printed alongside the abort, if any applies.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::SubcycleOverflow { .. } => Some(
                "consider decreasing the CFL number to avoid unstable timesteps",
            ),
            Self::TooManySubcycles { .. } => Some(
                "consider decreasing the CFL number to avoid unstable timesteps, \
                 or increasing retry_max_subcycles to permit more subcycled timesteps",
            ),
            Self::SubcycleTooShort { .. } => Some(
                "the retry timestep is shorter than the user-defined minimum dt_cutoff",
            ),
            Self::NonFiniteState { .. } => {
                Some("non-finite state indicates a defect in the kernels or the setup")
            }
            _ => None,
        }
    }
}

impl fmt::Display for AdvanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KernelFailed { kernel, reason } => {
                write!(f, "kernel '{kernel}' failed: {reason}")
            }
            Self::NonFiniteState {
                level,
                slot,
                component,
                cell,
                value,
            } => write!(
                f,
                "non-finite value {value} in {slot} at level {level}, component {component}, cell {cell}"
            ),
            Self::SubcycleOverflow {
                level,
                dt,
                dt_subcycle,
            } => write!(
                f,
                "timestep {dt} rejected at level {level}: retry requested subcycled \
                 timesteps of maximum length {dt_subcycle}, which overflows the subcycle counter"
            ),
            Self::TooManySubcycles {
                level,
                dt,
                dt_subcycle,
                subcycles,
                max_subcycles,
            } => write!(
                f,
                "timestep {dt} rejected at level {level}: retry requested {subcycles} subcycled \
                 timesteps of maximum length {dt_subcycle}, more than the permitted {max_subcycles}"
            ),
            Self::SubcycleTooShort {
                level,
                dt,
                dt_subcycle,
                subcycles,
                dt_cutoff,
            } => write!(
                f,
                "timestep {dt} rejected at level {level}: retry requested {subcycles} subcycled \
                 timesteps of maximum length {dt_subcycle}, shorter than dt_cutoff = {dt_cutoff}"
            ),
            Self::InvalidTimestep { level, dt } => {
                write!(f, "invalid timestep {dt} at level {level}")
            }
            Self::StateAccess { level, reason } => {
                write!(f, "state access failed at level {level}: {reason}")
            }
            Self::Collective(e) => write!(f, "collective: {e}"),
            Self::Aborted { level } => write!(f, "level {level} aborted earlier in this run"),
        }
    }
}

impl Error for AdvanceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::KernelFailed { reason, .. } => Some(reason),
            Self::Collective(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CollectiveError> for AdvanceError {
    fn from(e: CollectiveError) -> Self {
        Self::Collective(e)
    }
}
