//! Sod shock tube on one level, end to end.
//!
//! Demonstrates:
//!   1. Building the reference gamma-law kernels and the initial state
//!   2. Assembling a LevelAdvancer with the SSP-RK3 method of lines
//!   3. Driving it to a stop time with automatic step-size control
//!   4. Reading the boundary losses and the figure of merit
//!
//! Run with:
//!   RUST_LOG=info cargo run --example sod_shock_tube

use hydrostep_core::{IntegrationScheme, LevelId, MolTableau, URHO};
use hydrostep_engine::{AdvanceConfig, DriverConfig, LevelAdvancer, LevelDriver, SerialCollective};
use hydrostep_kernels::{sod_shock_tube, total_mass, GammaLawHydro};

const NCELL: usize = 256;
const BLOCK_SIZE: usize = 32;
const STOP_TIME: f64 = 0.2;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let hydro = GammaLawHydro::builder().gamma(1.4).build()?;
    let state = sod_shock_tube(&hydro, NCELL, BLOCK_SIZE)?;
    let mass0 = total_mass(&state);

    let config = AdvanceConfig {
        scheme: IntegrationScheme::MethodOfLines(MolTableau::SspRk3),
        cfl: 0.8,
        ..AdvanceConfig::default()
    };
    let level = LevelAdvancer::new(
        LevelId(0),
        config,
        Box::new(hydro),
        state,
        Box::new(SerialCollective),
    )?;
    let mut driver = LevelDriver::new(
        level,
        DriverConfig {
            stop_time: Some(STOP_TIME),
            init_shrink: 0.1,
            ..DriverConfig::default()
        },
    )?;

    let summary = driver.run()?;
    let level = driver.advancer();
    let losses = level.cumulative_losses();

    println!("reached t = {:.4} in {} steps", summary.time, summary.steps);
    println!("retried steps: {}", summary.retried_steps);
    println!(
        "mass: initial {:.12}, final {:.12}, lost through boundary {:.3e}",
        mass0,
        total_mass(level.hydro()),
        losses.mass()
    );
    println!("figure of merit: {:.3} zones/us", summary.figure_of_merit());

    println!("\ndensity profile (every 16th cell):");
    let new = level.hydro().new_data();
    for i in (0..NCELL).step_by(16) {
        let rho = new.get(i, URHO);
        let bar = "#".repeat((rho * 40.0) as usize);
        println!("{:>4} {:6.3} {bar}", i, rho);
    }
    Ok(())
}
