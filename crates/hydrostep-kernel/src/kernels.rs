//! The [`HydroKernels`] trait.
//!
//! A kernel set bundles the stateless per-block physics operators the
//! engine sequences each step. Every operator sees one [`Block`] at a
//! time and must not assume anything about other blocks, so the engine
//! is free to dispatch blocks in parallel.

use hydrostep_core::{KernelError, StateLayout, UMX};
use hydrostep_state::Block;

use crate::context::KernelContext;

/// Stateless per-block physics operators.
///
/// # Contract
///
/// - Every operator MUST be deterministic: the same block and context
///   produce identical output regardless of which thread runs it.
/// - `&self`: kernel sets hold only configuration (EOS constants,
///   floors); all evolving data lives in the blocks.
/// - Operators write interior cells only. Ghost cells of `state` inputs
///   are already filled by the engine.
///
/// # Object safety
///
/// This trait is object-safe; the engine stores the kernel set as
/// `Box<dyn HydroKernels>`.
///
/// # Examples
///
/// A kernel set that never changes the state:
///
/// ```
/// use hydrostep_core::{KernelError, StateLayout};
/// use hydrostep_kernel::{HydroKernels, KernelContext};
/// use hydrostep_state::Block;
///
/// struct Frozen;
///
/// impl HydroKernels for Frozen {
///     fn name(&self) -> &str { "frozen" }
///
///     fn layout(&self) -> StateLayout { StateLayout::new(0) }
///
///     fn ghost_width(&self) -> usize { 1 }
///
///     fn flux_divergence(
///         &self,
///         _ctx: &KernelContext,
///         _state: &Block,
///         _q: &Block,
///         divergence: &mut Block,
///         face_flux: &mut [f64],
///     ) -> Result<(), KernelError> {
///         divergence.interior_mut().fill(0.0);
///         face_flux.fill(0.0);
///         Ok(())
///     }
///
///     fn stable_dt(&self, _ctx: &KernelContext, _state: &Block) -> Result<f64, KernelError> {
///         Ok(f64::INFINITY)
///     }
/// }
///
/// let k = Frozen;
/// assert_eq!(k.layout().ncomp(), 5);
/// assert_eq!(k.nprim(), 5);
/// ```
pub trait HydroKernels: Send + Sync + 'static {
    /// Human-readable name for error reporting.
    fn name(&self) -> &str;

    /// Component layout of the state this kernel set operates on.
    fn layout(&self) -> StateLayout;

    /// Halo width `flux_divergence` reads on each side of a block.
    fn ghost_width(&self) -> usize;

    /// Components that change sign across a reflecting boundary.
    fn odd_components(&self) -> &[usize] {
        &[UMX]
    }

    /// Number of primitive variables per cell produced by `primitives`.
    fn nprim(&self) -> usize {
        self.layout().ncomp()
    }

    /// Pre-hydro reaction substep, applied in place to the ghost-padded
    /// working state of the first stage.
    fn burn(&self, _ctx: &KernelContext, _state: &mut Block) -> Result<(), KernelError> {
        Ok(())
    }

    /// Convert conserved `state` to primitive variables in `q`, including
    /// ghost cells.
    ///
    /// The default copies the conserved state unchanged.
    fn primitives(
        &self,
        _ctx: &KernelContext,
        state: &Block,
        q: &mut Block,
    ) -> Result<(), KernelError> {
        q.data_mut().copy_from_slice(state.data());
        Ok(())
    }

    /// Right-hand side `-dF/dx` of the conserved equations on the block
    /// interior.
    ///
    /// `face_flux` receives the flux through each of the `len + 1` faces of
    /// the block, face `f` being the left face of interior cell `f`,
    /// stored as `face_flux[f * ncomp + c]`.
    fn flux_divergence(
        &self,
        ctx: &KernelContext,
        state: &Block,
        q: &Block,
        divergence: &mut Block,
        face_flux: &mut [f64],
    ) -> Result<(), KernelError>;

    /// Clamp density to the floor.
    ///
    /// When `reference` is supplied, returns the most negative fractional
    /// density change `(rho - rho_ref) / rho_ref` among cells whose
    /// density was floored; otherwise, or when nothing was floored,
    /// returns `1.0`.
    fn enforce_density_floor(
        &self,
        _ctx: &KernelContext,
        _state: &mut Block,
        _reference: Option<&Block>,
    ) -> f64 {
        1.0
    }

    /// Rescale species partial densities so mass fractions sum to one.
    fn normalize_species(&self, _ctx: &KernelContext, _state: &mut Block) {}

    /// Restore consistency between internal and total energy.
    fn reset_internal_energy(&self, _ctx: &KernelContext, _state: &mut Block) {}

    /// Recompute temperature from the equation of state.
    fn compute_temperature(
        &self,
        _ctx: &KernelContext,
        _state: &mut Block,
    ) -> Result<(), KernelError> {
        Ok(())
    }

    /// Smallest signal-crossing time `dx / (|u| + c)` over the block
    /// interior, without any CFL factor.
    fn stable_dt(&self, ctx: &KernelContext, state: &Block) -> Result<f64, KernelError>;
}
