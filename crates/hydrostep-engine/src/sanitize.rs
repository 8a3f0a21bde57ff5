//! Post-update invariant enforcement and finiteness audit.

use rayon::prelude::*;

use hydrostep_core::{AdvanceError, KernelError, LevelId, StateSlot};
use hydrostep_kernel::{HydroKernels, KernelContext};
use hydrostep_state::{Block, StateBuffer};

/// Applies the kernel set's repair operators to a state buffer.
///
/// Per block, in fixed order: density floor, species renormalisation,
/// internal/total energy repair, temperature from the EOS. Blocks run in
/// parallel; results combine in block order.
pub struct SanitizerGate<'k> {
    kernels: &'k dyn HydroKernels,
}

impl<'k> SanitizerGate<'k> {
    /// Gate over `kernels`.
    pub fn new(kernels: &'k dyn HydroKernels) -> Self {
        Self { kernels }
    }

    /// Sanitize `state` in place.
    ///
    /// Returns the most negative fractional density change relative to
    /// `reference` among floored cells, or `1.0` when nothing was floored
    /// or no reference was supplied.
    pub fn clean_state(
        &self,
        ctx: &KernelContext,
        state: &mut StateBuffer,
        reference: Option<&StateBuffer>,
    ) -> Result<f64, AdvanceError> {
        let kernels = self.kernels;
        let results: Vec<Result<f64, KernelError>> = match reference {
            Some(r) => state
                .blocks_mut()
                .par_iter_mut()
                .zip(r.blocks().par_iter())
                .map(|(b, rb)| clean_block(kernels, ctx, b, Some(rb)))
                .collect(),
            None => state
                .blocks_mut()
                .par_iter_mut()
                .map(|b| clean_block(kernels, ctx, b, None))
                .collect(),
        };
        let mut frac = 1.0_f64;
        for r in results {
            let f = r.map_err(|reason| AdvanceError::KernelFailed {
                kernel: kernels.name().to_string(),
                reason,
            })?;
            frac = frac.min(f);
        }
        Ok(frac)
    }

    /// Fail with [`AdvanceError::NonFiniteState`] on the first non-finite
    /// interior value of `state`.
    pub fn audit(level: LevelId, slot: StateSlot, state: &StateBuffer) -> Result<(), AdvanceError> {
        match state.first_non_finite() {
            None => Ok(()),
            Some(nf) => Err(AdvanceError::NonFiniteState {
                level,
                slot,
                component: nf.component,
                cell: nf.cell,
                value: nf.value,
            }),
        }
    }
}

fn clean_block(
    kernels: &dyn HydroKernels,
    ctx: &KernelContext,
    block: &mut Block,
    reference: Option<&Block>,
) -> Result<f64, KernelError> {
    let frac = kernels.enforce_density_floor(ctx, block, reference);
    kernels.normalize_species(ctx, block);
    kernels.reset_internal_energy(ctx, block);
    kernels.compute_temperature(ctx, block)?;
    Ok(frac)
}
