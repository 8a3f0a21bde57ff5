//! Reference physics kernels for hydrostep.
//!
//! Provides a complete, if low-order, implementation of
//! [`HydroKernels`](hydrostep_kernel::HydroKernels) that exercises the
//! whole level advance: [`GammaLawHydro`] (ideal gas, Rusanov fluxes,
//! optional two-species burn) and a handful of problem setups in
//! [`problems`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod gamma_law;
pub mod problems;

pub use gamma_law::{GammaLawHydro, GammaLawHydroBuilder};
pub use problems::{blast_wave, density_wave, sod_shock_tube, total_mass};
