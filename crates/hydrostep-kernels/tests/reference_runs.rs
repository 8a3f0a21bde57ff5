//! End-to-end runs of the gamma-law kernels through the level advance.
//!
//! Each test drives a classic 1-D problem with both integrators and checks
//! a physical property that must hold to round-off: conservation against
//! the boundary-loss tallies, bounds preservation, and exact landing on
//! the step end after a retry.

use hydrostep_core::{IntegrationScheme, LevelId, MolTableau, UEDEN, UFS, UMX, URHO};
use hydrostep_engine::{
    AdvanceConfig, DriverConfig, LevelAdvancer, LevelDriver, RetryState, SerialCollective,
};
use hydrostep_kernels::{blast_wave, density_wave, sod_shock_tube, total_mass, GammaLawHydro};
use hydrostep_state::StateData;

const SCHEMES: [IntegrationScheme; 3] = [
    IntegrationScheme::Ctu,
    IntegrationScheme::MethodOfLines(MolTableau::Heun),
    IntegrationScheme::MethodOfLines(MolTableau::SspRk3),
];

fn advancer(hydro: GammaLawHydro, state: StateData, config: AdvanceConfig) -> LevelAdvancer {
    LevelAdvancer::new(
        LevelId(0),
        config,
        Box::new(hydro),
        state,
        Box::new(SerialCollective),
    )
    .unwrap()
}

fn totals(state: &StateData) -> [f64; 3] {
    let dx = state.geometry().dx();
    let new = state.new_data();
    [URHO, UMX, UEDEN].map(|c| new.sum(c) * dx)
}

#[test]
fn sod_conserves_against_boundary_losses() {
    for scheme in SCHEMES {
        let hydro = GammaLawHydro::builder().build().unwrap();
        let state = sod_shock_tube(&hydro, 128, 32).unwrap();
        let before = totals(&state);
        let level = advancer(
            hydro,
            state,
            AdvanceConfig {
                scheme,
                ..AdvanceConfig::default()
            },
        );
        // The shock leaves through the right boundary near t = 0.29.
        let mut driver = LevelDriver::new(
            level,
            DriverConfig {
                stop_time: Some(0.35),
                ..DriverConfig::default()
            },
        )
        .unwrap();
        let summary = driver.run().unwrap();
        assert!((summary.time - 0.35).abs() < 1e-12);

        let level = driver.advancer();
        let after = totals(level.hydro());
        let lost = level.cumulative_losses().values();
        assert!(lost[0] > 0.0, "{scheme:?}: no mass left the domain");
        for c in 0..3 {
            let drift = after[c] - before[c] + lost[c];
            assert!(
                drift.abs() < 1e-11 * before[c].abs().max(1.0),
                "{scheme:?}: component {c} drifted by {drift:e}"
            );
        }
    }
}

#[test]
fn periodic_wave_conserves_mass_and_stays_bounded() {
    const AMP: f64 = 0.2;
    for scheme in SCHEMES {
        let hydro = GammaLawHydro::builder().build().unwrap();
        let state = density_wave(&hydro, 100, 25, AMP, 1.0).unwrap();
        let mass0 = total_mass(&state);
        let level = advancer(
            hydro,
            state,
            AdvanceConfig {
                scheme,
                ..AdvanceConfig::default()
            },
        );
        let mut driver = LevelDriver::new(
            level,
            DriverConfig {
                stop_time: Some(0.5),
                ..DriverConfig::default()
            },
        )
        .unwrap();
        driver.run().unwrap();

        let level = driver.advancer();
        let mass = total_mass(level.hydro());
        assert!((mass - mass0).abs() < 1e-12, "{scheme:?}: {mass} vs {mass0}");
        // Matching periodic faces cancel exactly.
        assert_eq!(level.cumulative_losses().mass(), 0.0);

        let new = level.hydro().new_data();
        for i in 0..new.ncell() {
            let rho = new.get(i, URHO);
            assert!(
                rho <= 1.0 + AMP + 1e-12 && rho >= 1.0 - AMP - 1e-12,
                "{scheme:?}: cell {i} left the initial bounds: {rho}"
            );
        }
    }
}

#[test]
fn overlong_blast_step_is_retried_and_lands_exactly() {
    for scheme in SCHEMES {
        let hydro = GammaLawHydro::builder().build().unwrap();
        let state = blast_wave(&hydro, 256, 32, 1.0, 4).unwrap();
        let mass0 = total_mass(&state);
        let mut level = advancer(
            hydro,
            state,
            AdvanceConfig {
                scheme,
                ..AdvanceConfig::default()
            },
        );

        let dt = 1.5 * level.estimate_timestep().unwrap();
        let out = level.step(dt).unwrap();
        let report = &out.report;
        assert!(report.retried(), "{scheme:?}: step was not retried");
        assert_eq!(report.final_state(), Some(RetryState::Accepted));
        assert!(report.subcycles >= 2);
        assert!(out.dt_new < dt);
        assert_eq!(level.time(), dt);

        let state = level.hydro();
        assert!(state.new_data().first_non_finite().is_none());
        let mass = total_mass(state);
        assert!((mass - mass0).abs() < 1e-12 * mass0, "{scheme:?}");
        assert_eq!(level.cumulative_losses().mass(), 0.0);
    }
}

#[test]
fn half_burn_releases_energy_once_per_step() {
    let (rate, q) = (1.0, 2.0);
    let hydro = GammaLawHydro::builder()
        .nspec(2)
        .burn(rate, q)
        .build()
        .unwrap();
    let state = density_wave(&hydro, 64, 16, 0.0, 0.0).unwrap();
    let e0 = totals(&state)[2];
    let mut level = advancer(
        hydro,
        state,
        AdvanceConfig {
            do_react: true,
            ..AdvanceConfig::default()
        },
    );

    let (dt, nstep) = (0.005, 100);
    for _ in 0..nstep {
        level.step(dt).unwrap();
    }
    let t = dt * nstep as f64;
    let burned = 1.0 - (-0.5 * rate * t).exp();

    let new = level.hydro().new_data();
    for i in [0, 31, 63] {
        assert!((new.get(i, UFS + 1) - burned).abs() < 1e-10);
        assert!((new.get(i, UFS) + new.get(i, UFS + 1) - 1.0).abs() < 1e-12);
    }
    let e = totals(level.hydro())[2];
    assert!((e - e0 - q * burned).abs() < 1e-10, "{e} vs {}", e0 + q * burned);
}
