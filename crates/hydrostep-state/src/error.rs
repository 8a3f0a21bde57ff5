//! State-container error types.

use std::error::Error;
use std::fmt;

/// Errors that can occur while building or reading level state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateError {
    /// A level must contain at least one cell.
    EmptyDomain,
    /// Blocks must contain at least one cell.
    ZeroBlockSize,
    /// The physical extent is empty, inverted or non-finite.
    InvalidExtent {
        /// Lower domain edge.
        xlo: f64,
        /// Upper domain edge.
        xhi: f64,
    },
    /// The requested halo is wider than the domain itself.
    GhostTooWide {
        /// Requested ghost width.
        ghost: usize,
        /// Number of cells on the level.
        ncell: usize,
    },
    /// Data was requested at a time outside the old/new bracket.
    TimeOutOfRange {
        /// Requested time.
        time: f64,
        /// Old-time stamp.
        prev_time: f64,
        /// New-time stamp.
        cur_time: f64,
    },
    /// Initial data does not match the buffer shape.
    ShapeMismatch {
        /// Values expected.
        expected: usize,
        /// Values supplied.
        got: usize,
    },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyDomain => write!(f, "level has no cells"),
            Self::ZeroBlockSize => write!(f, "block size must be at least one cell"),
            Self::InvalidExtent { xlo, xhi } => {
                write!(f, "invalid domain extent [{xlo}, {xhi}]")
            }
            Self::GhostTooWide { ghost, ncell } => {
                write!(f, "ghost width {ghost} exceeds domain of {ncell} cells")
            }
            Self::TimeOutOfRange {
                time,
                prev_time,
                cur_time,
            } => write!(
                f,
                "time {time} outside state time bracket [{prev_time}, {cur_time}]"
            ),
            Self::ShapeMismatch { expected, got } => {
                write!(f, "expected {expected} values, got {got}")
            }
        }
    }
}

impl Error for StateError {}
