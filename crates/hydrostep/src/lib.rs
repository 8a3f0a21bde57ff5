//! Hydrostep: advance one level of a compressible-hydro mesh by one step.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all hydrostep sub-crates. For most users, adding `hydrostep` as a
//! single dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use hydrostep::prelude::*;
//! use hydrostep::kernels::{sod_shock_tube, GammaLawHydro};
//!
//! let hydro = GammaLawHydro::builder().gamma(1.4).build().unwrap();
//! let state = sod_shock_tube(&hydro, 64, 16).unwrap();
//!
//! let mut level = LevelAdvancer::new(
//!     LevelId(0),
//!     AdvanceConfig::default(),
//!     Box::new(hydro),
//!     state,
//!     Box::new(SerialCollective),
//! )
//! .unwrap();
//!
//! let dt = level.estimate_timestep().unwrap();
//! let out = level.step(dt).unwrap();
//! assert_eq!(level.time(), dt);
//! assert!(out.dt_new > 0.0);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `hydrostep-core` | IDs, layout constants, errors, collective and flux-register traits |
//! | [`state`] | `hydrostep-state` | Blocked state buffers, time-level pairs, snapshots |
//! | [`kernel`] | `hydrostep-kernel` | The physics-kernel trait and its context |
//! | [`kernels`] | `hydrostep-kernels` | Reference gamma-law kernels and problem setups |
//! | [`engine`] | `hydrostep-engine` | Level advance, integrators, retry controller, driver |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`hydrostep-core`).
///
/// Contains the conserved-component layout, [`types::AdvanceError`], and
/// the [`types::Collective`] and [`types::FluxRegister`] seams.
pub use hydrostep_core as types;

/// State storage (`hydrostep-state`).
///
/// [`state::StateData`] holds the old/new time-level pair of one state
/// type on one level.
pub use hydrostep_state as state;

/// Physics-kernel trait (`hydrostep-kernel`).
///
/// [`kernel::HydroKernels`] is the main extension point for user physics.
pub use hydrostep_kernel as kernel;

/// Reference kernels (`hydrostep-kernels`).
pub use hydrostep_kernels as kernels;

/// Level advance (`hydrostep-engine`).
///
/// [`engine::LevelAdvancer`] for single advances,
/// [`engine::LevelDriver`] for running to a stop time.
pub use hydrostep_engine as engine;

/// Common imports for typical hydrostep usage.
///
/// ```rust
/// use hydrostep::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use hydrostep_core::{
        AdvanceError, Collective, IntegrationScheme, LevelId, MolTableau, StateLayout,
        StateTypeId, UEDEN, UEINT, UFS, UMX, URHO, UTEMP,
    };

    // State
    pub use hydrostep_state::{BoundaryKind, LevelGeometry, StateData};

    // Kernels
    pub use hydrostep_kernel::{HydroKernels, KernelContext};

    // Engine
    pub use hydrostep_engine::{
        AdvanceConfig, AdvanceOutcome, DriverConfig, LevelAdvancer, LevelDriver, RetryReport,
        RetryState, SerialCollective,
    };
}
