//! Initial conditions for reference runs.

use hydrostep_core::URHO;
use hydrostep_kernel::HydroKernels;
use hydrostep_state::{BoundaryKind, LevelGeometry, StateData, StateError};

use crate::gamma_law::GammaLawHydro;

/// Sod shock tube on `[0, 1]`, diaphragm at `x = 0.5`, outflow ends.
///
/// Left: `rho = 1, p = 1`. Right: `rho = 0.125, p = 0.1`. Gas at rest.
pub fn sod_shock_tube(
    hydro: &GammaLawHydro,
    ncell: usize,
    block_size: usize,
) -> Result<StateData, StateError> {
    let geom = LevelGeometry::new(ncell, block_size, 0.0, 1.0, BoundaryKind::Outflow)?;
    let mut state = hydro_state(hydro, geom);
    state.initialize(|x, cell| {
        if x < 0.5 {
            hydro.conserved(1.0, 0.0, 1.0, &[], cell);
        } else {
            hydro.conserved(0.125, 0.0, 0.1, &[], cell);
        }
    });
    Ok(state)
}

/// Near-vacuum blast: cold uniform gas with `energy` deposited in the
/// central `width` cells, reflecting walls.
///
/// The pressure jump is large enough that a timestep chosen from the
/// initial sound speed is far too long once the blast is moving.
pub fn blast_wave(
    hydro: &GammaLawHydro,
    ncell: usize,
    block_size: usize,
    energy: f64,
    width: usize,
) -> Result<StateData, StateError> {
    let geom = LevelGeometry::new(ncell, block_size, 0.0, 1.0, BoundaryKind::Reflect)?;
    let lo = ncell.saturating_sub(width) / 2;
    let hot = lo..lo + width.max(1);
    let dx = geom.dx();
    let p_hot = (hydro.gamma() - 1.0) * energy / (width.max(1) as f64 * dx);
    let mut state = hydro_state(hydro, geom);
    state.initialize(|x, cell| {
        let i = (x / dx) as usize;
        let p = if hot.contains(&i) { p_hot } else { 1.0e-5 };
        hydro.conserved(1.0, 0.0, p, &[], cell);
    });
    Ok(state)
}

/// Periodic density wave `rho = 1 + amplitude * sin(2 pi x)` advected at
/// velocity `u` in pressure equilibrium.
pub fn density_wave(
    hydro: &GammaLawHydro,
    ncell: usize,
    block_size: usize,
    amplitude: f64,
    u: f64,
) -> Result<StateData, StateError> {
    let geom = LevelGeometry::new(ncell, block_size, 0.0, 1.0, BoundaryKind::Periodic)?;
    let mut state = hydro_state(hydro, geom);
    state.initialize(|x, cell| {
        let rho = 1.0 + amplitude * (2.0 * std::f64::consts::PI * x).sin();
        hydro.conserved(rho, u, 1.0, &[], cell);
    });
    Ok(state)
}

/// Total mass on the new-time slot.
pub fn total_mass(state: &StateData) -> f64 {
    state.new_data().sum(URHO) * state.geometry().dx()
}

fn hydro_state(hydro: &GammaLawHydro, geom: LevelGeometry) -> StateData {
    StateData::new(geom, hydro.layout().ncomp(), 0.0).with_odd_components(hydro.odd_components())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydrostep_core::{UEDEN, UFS};

    fn hydro() -> GammaLawHydro {
        GammaLawHydro::builder().build().unwrap()
    }

    #[test]
    fn sod_left_and_right_states() {
        let h = hydro();
        let s = sod_shock_tube(&h, 100, 25).unwrap();
        assert_eq!(s.new_data().get(10, URHO), 1.0);
        assert_eq!(s.new_data().get(90, URHO), 0.125);
        assert!((h.pressure(s.new_data().blocks()[3].cell(5)) - 0.1).abs() < 1e-12);
        assert_eq!(s.new_data().get(90, UFS), 0.125);
        assert!((total_mass(&s) - 0.5625).abs() < 1e-12);
    }

    #[test]
    fn blast_is_centred() {
        let h = hydro();
        let s = blast_wave(&h, 64, 16, 1.0, 4).unwrap();
        let e_hot = s.new_data().get(31, UEDEN);
        let e_cold = s.new_data().get(0, UEDEN);
        assert!(e_hot > 1.0e4 * e_cold);
        assert_eq!(s.new_data().get(30, UEDEN), e_hot);
        assert_eq!(s.new_data().get(27, UEDEN), e_cold);
    }

    #[test]
    fn density_wave_mean_is_one() {
        let h = hydro();
        let s = density_wave(&h, 64, 16, 0.2, 1.0).unwrap();
        assert!((total_mass(&s) - 1.0).abs() < 1e-12);
    }
}
