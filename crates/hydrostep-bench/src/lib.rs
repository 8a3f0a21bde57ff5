//! Benchmark profiles and utilities for hydrostep.
//!
//! Provides pre-built [`LevelAdvancer`] profiles for benchmarking:
//!
//! - [`reference_profile`]: 10K-cell Sod shock tube
//! - [`stress_profile`]: 100K-cell Sod shock tube
//! - [`retry_profile`]: 4K-cell blast wave paired with a step long enough
//!   to force a sub-cycled retry

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use hydrostep_core::{IntegrationScheme, LevelId};
use hydrostep_engine::{AdvanceConfig, LevelAdvancer, SerialCollective};
use hydrostep_kernels::{blast_wave, sod_shock_tube, GammaLawHydro};
use hydrostep_state::StateData;

/// Cells per block in every profile.
pub const BLOCK_SIZE: usize = 250;

/// Ratio of the retry profile's step to the stable estimate.
pub const RETRY_OVERSHOOT: f64 = 1.8;

/// Build a reference benchmark profile: 10K-cell Sod shock tube.
pub fn reference_profile(scheme: IntegrationScheme) -> LevelAdvancer {
    sod_level(10_000, scheme)
}

/// Build a stress benchmark profile: 100K-cell Sod shock tube.
///
/// Same problem as [`reference_profile`] at 10x the cell count.
pub fn stress_profile(scheme: IntegrationScheme) -> LevelAdvancer {
    sod_level(100_000, scheme)
}

/// Build a retry benchmark profile: 4K-cell blast wave.
///
/// Returns the advancer and a step [`RETRY_OVERSHOOT`] times the stable
/// estimate, so that the first advance is rejected and sub-cycled.
pub fn retry_profile(scheme: IntegrationScheme) -> (LevelAdvancer, f64) {
    let hydro = gamma_law();
    let state = blast_wave(&hydro, 4_000, BLOCK_SIZE, 1.0, 16).unwrap();
    let mut level = level(hydro, state, scheme);
    let dt = RETRY_OVERSHOOT * level.estimate_timestep().unwrap();
    (level, dt)
}

/// Sod state without an advancer, for state-container benchmarks.
pub fn sod_state(ncell: usize) -> StateData {
    sod_shock_tube(&gamma_law(), ncell, BLOCK_SIZE).unwrap()
}

fn gamma_law() -> GammaLawHydro {
    GammaLawHydro::builder().gamma(1.4).build().unwrap()
}

fn sod_level(ncell: usize, scheme: IntegrationScheme) -> LevelAdvancer {
    let hydro = gamma_law();
    let state = sod_shock_tube(&hydro, ncell, BLOCK_SIZE).unwrap();
    level(hydro, state, scheme)
}

fn level(hydro: GammaLawHydro, state: StateData, scheme: IntegrationScheme) -> LevelAdvancer {
    let config = AdvanceConfig {
        scheme,
        retry_max_subcycles: 0,
        ..AdvanceConfig::default()
    };
    LevelAdvancer::new(
        LevelId(0),
        config,
        Box::new(hydro),
        state,
        Box::new(SerialCollective),
    )
    .unwrap()
}
