//! Face-flux accumulation and the flux-register interface.

use crate::id::LevelId;

// ── FaceFluxes ─────────────────────────────────────────────────────

/// Time-weighted fluxes through every face of a level, accumulated over
/// one step.
///
/// Face `f` is the left face of cell `f`; face `ncell` is the upper
/// domain boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceFluxes {
    ncomp: usize,
    nface: usize,
    data: Vec<f64>,
}

impl FaceFluxes {
    /// Zeroed fluxes for `ncell` cells of `ncomp` components.
    pub fn new(ncell: usize, ncomp: usize) -> Self {
        Self {
            ncomp,
            nface: ncell + 1,
            data: vec![0.0; (ncell + 1) * ncomp],
        }
    }

    /// Number of faces (`ncell + 1`).
    pub fn nface(&self) -> usize {
        self.nface
    }

    /// Components per face.
    pub fn ncomp(&self) -> usize {
        self.ncomp
    }

    /// Accumulated flux through face `f`.
    pub fn face(&self, f: usize) -> &[f64] {
        &self.data[f * self.ncomp..(f + 1) * self.ncomp]
    }

    /// Reset to zero.
    pub fn zero(&mut self) {
        self.data.fill(0.0);
    }

    /// Add `weight` times a block's face fluxes.
    ///
    /// A block owns its left faces; the block ending at the upper domain
    /// boundary also owns the final face, so shared faces are counted once.
    pub fn accumulate_block(&mut self, lo: usize, len: usize, weight: f64, faces: &[f64]) {
        let owned = if lo + len + 1 == self.nface { len + 1 } else { len };
        let dst = &mut self.data[lo * self.ncomp..(lo + owned) * self.ncomp];
        for (d, f) in dst.iter_mut().zip(&faces[..owned * self.ncomp]) {
            *d += weight * f;
        }
    }
}

// ── FluxRegister ───────────────────────────────────────────────────

/// Receiver for coarse/fine face-flux corrections across refinement
/// levels.
///
/// The engine calls both methods once per accepted step when refluxing
/// is enabled and the level has a coarser parent.
pub trait FluxRegister: Send {
    /// Record this level's fluxes as the coarse side of the register
    /// shared with the next finer level.
    fn init_coarse_contribution(&mut self, level: LevelId, fluxes: &FaceFluxes);

    /// Add this level's fluxes as the fine side of the register shared
    /// with its coarser parent.
    fn add_fine_contribution(&mut self, level: LevelId, fluxes: &FaceFluxes);
}
