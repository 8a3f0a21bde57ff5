//! Double-buffered level state with explicit time stamps.
//!
//! [`StateData`] holds an old-time and a new-time [`StateBuffer`] for one
//! state type on one level. [`StateData::swap_time_levels`] exchanges the
//! two slots, so the data computed last step becomes the old data and the
//! stale buffer is recycled as the next new slot:
//!
//! ```text
//!           swap_time_levels(dt)
//! old ◄──────────────────────────── new   (prev_time := cur_time)
//! new ────────────────────────────► old   (cur_time  += dt)
//! ```

use smallvec::SmallVec;

use crate::buffer::StateBuffer;
use crate::error::StateError;
use crate::geometry::LevelGeometry;
use crate::ghost;
use crate::snapshot::StateSnapshot;

/// Old/new state pair for one state type on one level.
#[derive(Clone, Debug)]
pub struct StateData {
    geom: LevelGeometry,
    odd: SmallVec<[usize; 2]>,
    old: StateBuffer,
    new: StateBuffer,
    prev_time: f64,
    cur_time: f64,
}

impl StateData {
    /// Zero-filled state with both time stamps at `time`.
    pub fn new(geom: LevelGeometry, ncomp: usize, time: f64) -> Self {
        let old = StateBuffer::new(&geom, ncomp, 0);
        let new = old.clone();
        Self {
            geom,
            odd: SmallVec::new(),
            old,
            new,
            prev_time: time,
            cur_time: time,
        }
    }

    /// Components that change sign across a reflecting boundary.
    pub fn with_odd_components(mut self, odd: &[usize]) -> Self {
        self.odd = odd.iter().copied().collect();
        self
    }

    /// Set the new-time data cell by cell from cell-centre coordinates,
    /// and mirror it into the old slot.
    pub fn initialize(&mut self, mut init: impl FnMut(f64, &mut [f64])) {
        let geom = self.geom;
        for blk in self.new.blocks_mut() {
            let lo = blk.lo();
            for (i, cell) in blk.interior_cells_mut().enumerate() {
                init(geom.cell_center(lo + i), cell);
            }
        }
        self.old.copy_from(&self.new);
    }

    /// Set the new-time data from a flat cell-major array and mirror it
    /// into the old slot.
    pub fn load(&mut self, values: &[f64]) -> Result<(), StateError> {
        let ncomp = self.ncomp();
        let expected = self.geom.ncell() * ncomp;
        if values.len() != expected {
            return Err(StateError::ShapeMismatch {
                expected,
                got: values.len(),
            });
        }
        for blk in self.new.blocks_mut() {
            let start = blk.lo() * ncomp;
            let n = blk.len() * ncomp;
            blk.interior_mut()
                .copy_from_slice(&values[start..start + n]);
        }
        self.old.copy_from(&self.new);
        Ok(())
    }

    /// Level geometry.
    pub fn geometry(&self) -> &LevelGeometry {
        &self.geom
    }

    /// Components per cell.
    pub fn ncomp(&self) -> usize {
        self.old.ncomp()
    }

    /// Time stamp of the old slot.
    pub fn prev_time(&self) -> f64 {
        self.prev_time
    }

    /// Time stamp of the new slot.
    pub fn cur_time(&self) -> f64 {
        self.cur_time
    }

    /// Old-time data.
    pub fn old(&self) -> &StateBuffer {
        &self.old
    }

    /// New-time data.
    pub fn new_data(&self) -> &StateBuffer {
        &self.new
    }

    /// Old-time data, mutably.
    pub fn old_mut(&mut self) -> &mut StateBuffer {
        &mut self.old
    }

    /// New-time data, mutably.
    pub fn new_mut(&mut self) -> &mut StateBuffer {
        &mut self.new
    }

    /// Exchange the time slots and advance the bracket by `dt`.
    pub fn swap_time_levels(&mut self, dt: f64) {
        std::mem::swap(&mut self.old, &mut self.new);
        self.prev_time = self.cur_time;
        self.cur_time += dt;
    }

    /// Set both time stamps explicitly.
    pub fn set_time_level(&mut self, prev_time: f64, cur_time: f64) {
        self.prev_time = prev_time;
        self.cur_time = cur_time;
    }

    /// Copy the old slot into the new slot.
    pub fn carry_forward(&mut self) {
        self.new.copy_from(&self.old);
    }

    /// Build a ghost-padded copy of the state at `time`.
    ///
    /// `time` matching a stamp (to within a small fraction of the bracket)
    /// selects that slot; a time strictly inside the bracket interpolates
    /// linearly between the slots.
    pub fn expand(&self, time: f64, ghost: usize) -> Result<StateBuffer, StateError> {
        if ghost > self.geom.ncell() {
            return Err(StateError::GhostTooWide {
                ghost,
                ncell: self.geom.ncell(),
            });
        }
        let span = self.cur_time - self.prev_time;
        let teps = (1.0e-3 * span.abs()).max(f64::EPSILON * self.cur_time.abs().max(1.0));

        let mut out = self.old.zeros_like(ghost);
        if time == self.prev_time && time != self.cur_time {
            out.copy_from(&self.old);
        } else if (time - self.cur_time).abs() <= teps {
            out.copy_from(&self.new);
        } else if (time - self.prev_time).abs() <= teps {
            out.copy_from(&self.old);
        } else if time > self.prev_time && time < self.cur_time {
            let w = (time - self.prev_time) / span;
            out.interpolate_from(&self.old, &self.new, w);
        } else {
            return Err(StateError::TimeOutOfRange {
                time,
                prev_time: self.prev_time,
                cur_time: self.cur_time,
            });
        }
        self.fill_ghosts(&mut out);
        Ok(out)
    }

    /// Fill the halo of a buffer built on this level.
    pub fn fill_ghosts(&self, buf: &mut StateBuffer) {
        ghost::fill_ghosts(buf, &self.geom, &self.odd);
    }

    /// Capture both slots and their time stamps.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            old: self.old.clone(),
            new: self.new.clone(),
            prev_time: self.prev_time,
            cur_time: self.cur_time,
        }
    }

    /// Overwrite the old slot's data from `snap`. Time stamps are untouched.
    pub fn restore_old_from(&mut self, snap: &StateSnapshot) {
        self.old.clone_from(&snap.old);
    }

    /// Overwrite the new slot's data from `snap`. Time stamps are untouched.
    pub fn restore_new_from(&mut self, snap: &StateSnapshot) {
        self.new.clone_from(&snap.new);
    }
}
