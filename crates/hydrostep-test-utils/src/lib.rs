//! Test utilities and mock types for hydrostep development.
//!
//! Provides scripted kernels ([`ScriptedKernels`]), recording
//! implementations of the engine's outward interfaces
//! ([`RecordingFluxRegister`], [`RecordingCollective`]), and state
//! fixtures with seeded perturbation.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{SanitizeLog, ScriptedKernels};

use std::sync::{Arc, Mutex};

use hydrostep_core::{
    min_or_nan, Collective, CollectiveError, FaceFluxes, FluxRegister, LevelId, StateLayout,
    URHO,
};
use hydrostep_state::{BoundaryKind, LevelGeometry, StateBuffer, StateData};
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

// ── Flux register ──────────────────────────────────────────────────

/// Which side of a flux register a call contributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefluxSide {
    Coarse,
    Fine,
}

/// One recorded flux-register call.
#[derive(Clone, Debug, PartialEq)]
pub struct RefluxCall {
    pub side: RefluxSide,
    pub level: LevelId,
    pub fluxes: FaceFluxes,
}

/// Shared log of flux-register calls, readable after the register has
/// been handed to the code under test.
#[derive(Clone, Default)]
pub struct RefluxLog(Arc<Mutex<Vec<RefluxCall>>>);

impl RefluxLog {
    /// All calls so far, in call order.
    pub fn calls(&self) -> Vec<RefluxCall> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Flux register that records every contribution.
pub struct RecordingFluxRegister {
    log: RefluxLog,
}

impl RecordingFluxRegister {
    /// A register and a handle to its log.
    pub fn new() -> (Self, RefluxLog) {
        let log = RefluxLog::default();
        (Self { log: log.clone() }, log)
    }

    fn push(&self, side: RefluxSide, level: LevelId, fluxes: &FaceFluxes) {
        self.log.0.lock().unwrap().push(RefluxCall {
            side,
            level,
            fluxes: fluxes.clone(),
        });
    }
}

impl FluxRegister for RecordingFluxRegister {
    fn init_coarse_contribution(&mut self, level: LevelId, fluxes: &FaceFluxes) {
        self.push(RefluxSide::Coarse, level, fluxes);
    }

    fn add_fine_contribution(&mut self, level: LevelId, fluxes: &FaceFluxes) {
        self.push(RefluxSide::Fine, level, fluxes);
    }
}

// ── Collective ─────────────────────────────────────────────────────

/// A recorded reduction.
#[derive(Clone, Debug, PartialEq)]
pub enum Reduction {
    Min(f64),
    Sum(Vec<f64>),
}

/// Single-process collective that pretends to have peers.
///
/// `reduce_min` folds in a scripted peer minimum, so a test can force
/// the global stable step below the local one. Sums pass through.
pub struct RecordingCollective {
    rank: usize,
    size: usize,
    peer_min: f64,
    log: Arc<Mutex<Vec<Reduction>>>,
}

impl RecordingCollective {
    /// Rank 0 of a group of one.
    pub fn new() -> Self {
        Self {
            rank: 0,
            size: 1,
            peer_min: f64::INFINITY,
            log: Arc::default(),
        }
    }

    /// Pretend to be `rank` of `size`.
    pub fn as_rank(mut self, rank: usize, size: usize) -> Self {
        self.rank = rank;
        self.size = size;
        self
    }

    /// Every `reduce_min` returns at most `value`.
    pub fn with_peer_min(mut self, value: f64) -> Self {
        self.peer_min = value;
        self
    }

    /// Handle to the reduction log.
    pub fn log(&self) -> Arc<Mutex<Vec<Reduction>>> {
        Arc::clone(&self.log)
    }
}

impl Default for RecordingCollective {
    fn default() -> Self {
        Self::new()
    }
}

impl Collective for RecordingCollective {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn reduce_min(&mut self, value: f64) -> Result<f64, CollectiveError> {
        self.log.lock().unwrap().push(Reduction::Min(value));
        Ok(min_or_nan(value, self.peer_min))
    }

    fn reduce_sum(&mut self, values: &mut [f64]) -> Result<(), CollectiveError> {
        self.log.lock().unwrap().push(Reduction::Sum(values.to_vec()));
        Ok(())
    }
}

// ── State fixtures ─────────────────────────────────────────────────

/// A smooth, strictly positive periodic state on `[0, 1]`.
pub fn decay_state(ncell: usize, block_size: usize, layout: StateLayout) -> StateData {
    let geom = LevelGeometry::new(ncell, block_size, 0.0, 1.0, BoundaryKind::Periodic).unwrap();
    let mut state = StateData::new(geom, layout.ncomp(), 0.0);
    state.initialize(|x, cell| {
        for (c, v) in cell.iter_mut().enumerate() {
            *v = 1.0 + 0.5 * (std::f64::consts::TAU * x).sin() + 0.1 * c as f64;
        }
    });
    state
}

/// Multiply component `comp` of every interior cell by `1 + amplitude * r`
/// with `r` uniform in `[-1, 1)`, drawn from a ChaCha8 stream seeded
/// with `seed`.
pub fn perturb(buf: &mut StateBuffer, comp: usize, amplitude: f64, seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for i in 0..buf.ncell() {
        let r = 2.0 * unit_f64(&mut rng) - 1.0;
        let v = buf.get(i, comp);
        buf.set(i, comp, v * (1.0 + amplitude * r));
    }
}

/// Perturb the density of a state's old and new slots identically.
pub fn perturb_density(state: &mut StateData, amplitude: f64, seed: u64) {
    perturb(state.new_mut(), URHO, amplitude, seed);
    let snapshot = state.new_data().clone();
    state.old_mut().copy_from(&snapshot);
}

fn unit_f64(rng: &mut ChaCha8Rng) -> f64 {
    (rng.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

/// Panic with the first differing cell unless both interiors are
/// bit-for-bit identical.
pub fn assert_bits_eq(a: &StateBuffer, b: &StateBuffer) {
    assert_eq!(a.ncomp(), b.ncomp(), "component count differs");
    for i in 0..a.ncell() {
        for c in 0..a.ncomp() {
            let (x, y) = (a.get(i, c), b.get(i, c));
            assert!(
                x.to_bits() == y.to_bits(),
                "cell {i} component {c}: {x:e} != {y:e}"
            );
        }
    }
}
