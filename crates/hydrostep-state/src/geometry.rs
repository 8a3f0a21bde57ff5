//! Level geometry and block decomposition.

use crate::error::StateError;

/// How ghost cells beyond the physical domain are filled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BoundaryKind {
    /// Ghosts wrap to the opposite side of the domain.
    #[default]
    Periodic,
    /// Ghosts copy the nearest interior cell (zero-gradient).
    Outflow,
    /// Ghosts mirror the interior; odd components change sign.
    Reflect,
}

/// Uniform one-dimensional level geometry split into fixed-size blocks.
///
/// Block `b` covers global cells `[b * block_size, min((b + 1) * block_size, ncell))`.
/// The last block is shorter when `block_size` does not divide `ncell`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelGeometry {
    ncell: usize,
    block_size: usize,
    xlo: f64,
    xhi: f64,
    boundary: BoundaryKind,
}

impl LevelGeometry {
    /// Create a geometry of `ncell` cells over `[xlo, xhi]`.
    ///
    /// Returns `Err` for an empty domain, a zero block size or a
    /// degenerate physical extent.
    pub fn new(
        ncell: usize,
        block_size: usize,
        xlo: f64,
        xhi: f64,
        boundary: BoundaryKind,
    ) -> Result<Self, StateError> {
        if ncell == 0 {
            return Err(StateError::EmptyDomain);
        }
        if block_size == 0 {
            return Err(StateError::ZeroBlockSize);
        }
        if !(xlo.is_finite() && xhi.is_finite() && xhi > xlo) {
            return Err(StateError::InvalidExtent { xlo, xhi });
        }
        Ok(Self {
            ncell,
            block_size,
            xlo,
            xhi,
            boundary,
        })
    }

    /// Number of cells on the level.
    pub fn ncell(&self) -> usize {
        self.ncell
    }

    /// Nominal cells per block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks.
    pub fn nblocks(&self) -> usize {
        self.ncell.div_ceil(self.block_size)
    }

    /// `(lo, len)` of block `b` in global cell indices.
    pub fn block_extent(&self, b: usize) -> (usize, usize) {
        let lo = b * self.block_size;
        let len = self.block_size.min(self.ncell.saturating_sub(lo));
        (lo, len)
    }

    /// Cell width.
    pub fn dx(&self) -> f64 {
        (self.xhi - self.xlo) / self.ncell as f64
    }

    /// Lower domain edge.
    pub fn xlo(&self) -> f64 {
        self.xlo
    }

    /// Upper domain edge.
    pub fn xhi(&self) -> f64 {
        self.xhi
    }

    /// Boundary treatment at both domain ends.
    pub fn boundary(&self) -> BoundaryKind {
        self.boundary
    }

    /// Whether the domain wraps.
    pub fn is_periodic(&self) -> bool {
        self.boundary == BoundaryKind::Periodic
    }

    /// Cell-centre coordinate of global cell `i`.
    pub fn cell_center(&self, i: usize) -> f64 {
        self.xlo + (i as f64 + 0.5) * self.dx()
    }

    /// Map a possibly out-of-domain global index to the interior cell
    /// supplying its value, and whether odd components flip sign.
    pub(crate) fn source_cell(&self, g: isize) -> (usize, bool) {
        let n = self.ncell as isize;
        if (0..n).contains(&g) {
            return (g as usize, false);
        }
        match self.boundary {
            BoundaryKind::Periodic => (g.rem_euclid(n) as usize, false),
            BoundaryKind::Outflow => (g.clamp(0, n - 1) as usize, false),
            BoundaryKind::Reflect => {
                let mirrored = if g < 0 { -1 - g } else { 2 * n - 1 - g };
                (mirrored.clamp(0, n - 1) as usize, true)
            }
        }
    }
}
