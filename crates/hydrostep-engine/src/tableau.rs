//! Butcher tableaus for the method-of-lines integrator.

use hydrostep_core::{IntegrationScheme, MolTableau};

/// Largest number of stages any provided tableau uses.
pub const MAX_STAGES: usize = 4;

/// Fixed-size explicit Runge-Kutta tableau.
///
/// `a` is strictly lower triangular, `b` sums to one and `c[i]` is the
/// row sum of `a[i]`. Entries beyond `stages` are zero.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ButcherTableau {
    stages: usize,
    a: [[f64; MAX_STAGES]; MAX_STAGES],
    b: [f64; MAX_STAGES],
    c: [f64; MAX_STAGES],
}

impl ButcherTableau {
    /// One-stage forward Euler.
    pub const FORWARD_EULER: Self = Self::new(
        1,
        [[0.0; MAX_STAGES]; MAX_STAGES],
        [1.0, 0.0, 0.0, 0.0],
    );

    /// Two-stage Heun method (SSP-RK2).
    pub const HEUN: Self = Self::new(
        2,
        [
            [0.0, 0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0],
        ],
        [0.5, 0.5, 0.0, 0.0],
    );

    /// Three-stage strong-stability-preserving RK3.
    pub const SSP_RK3: Self = Self::new(
        3,
        [
            [0.0, 0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0, 0.0],
            [0.25, 0.25, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0],
        ],
        [1.0 / 6.0, 1.0 / 6.0, 2.0 / 3.0, 0.0],
    );

    /// Classic four-stage RK4.
    pub const CLASSIC_RK4: Self = Self::new(
        4,
        [
            [0.0, 0.0, 0.0, 0.0],
            [0.5, 0.0, 0.0, 0.0],
            [0.0, 0.5, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ],
        [1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0],
    );

    const fn new(stages: usize, a: [[f64; MAX_STAGES]; MAX_STAGES], b: [f64; MAX_STAGES]) -> Self {
        let mut c = [0.0; MAX_STAGES];
        let mut i = 0;
        while i < MAX_STAGES {
            let mut j = 0;
            while j < i {
                c[i] += a[i][j];
                j += 1;
            }
            i += 1;
        }
        Self { stages, a, b, c }
    }

    /// The tableau for a method-of-lines variant.
    pub fn for_mol(tableau: MolTableau) -> Self {
        match tableau {
            MolTableau::ForwardEuler => Self::FORWARD_EULER,
            MolTableau::Heun => Self::HEUN,
            MolTableau::SspRk3 => Self::SSP_RK3,
            MolTableau::ClassicRk4 => Self::CLASSIC_RK4,
        }
    }

    /// The tableau a scheme executes. CTU is a single forward-Euler pass.
    pub fn for_scheme(scheme: IntegrationScheme) -> Self {
        match scheme {
            IntegrationScheme::Ctu => Self::FORWARD_EULER,
            IntegrationScheme::MethodOfLines(t) => Self::for_mol(t),
        }
    }

    /// Number of stages.
    pub fn stages(&self) -> usize {
        self.stages
    }

    /// Coupling coefficient of stage `j` into stage `i`.
    pub fn a(&self, i: usize, j: usize) -> f64 {
        self.a[i][j]
    }

    /// Final weight of stage `i`.
    pub fn b(&self, i: usize) -> f64 {
        self.b[i]
    }

    /// Time node of stage `i`, as a fraction of the step.
    pub fn c(&self, i: usize) -> f64 {
        self.c[i]
    }
}
