//! Value-copy snapshots of a [`StateData`](crate::StateData).

use crate::buffer::StateBuffer;

/// An owned copy of both time slots of a state container and their time
/// stamps. Restoring from it reproduces the captured data bit for bit.
#[derive(Clone, Debug, PartialEq)]
pub struct StateSnapshot {
    pub(crate) old: StateBuffer,
    pub(crate) new: StateBuffer,
    pub(crate) prev_time: f64,
    pub(crate) cur_time: f64,
}

impl StateSnapshot {
    /// Captured old-time data.
    pub fn old(&self) -> &StateBuffer {
        &self.old
    }

    /// Captured new-time data.
    pub fn new_data(&self) -> &StateBuffer {
        &self.new
    }

    /// Old-time stamp at capture.
    pub fn prev_time(&self) -> f64 {
        self.prev_time
    }

    /// New-time stamp at capture.
    pub fn cur_time(&self) -> f64 {
        self.cur_time
    }
}
