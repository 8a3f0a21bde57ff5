//! Level-wide multi-block buffers.

use rayon::prelude::*;

use crate::block::Block;
use crate::geometry::LevelGeometry;

/// Location and value of a non-finite entry found by
/// [`StateBuffer::first_non_finite`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NonFinite {
    /// Component index.
    pub component: usize,
    /// Global cell index.
    pub cell: usize,
    /// The offending value.
    pub value: f64,
}

/// One level's worth of cell data: every block of the level geometry,
/// each padded by the same ghost width.
///
/// Element-wise operations act on the interior only and run in parallel
/// over blocks. Operands must come from the same geometry and component
/// count; ghost widths may differ.
#[derive(Clone, Debug, PartialEq)]
pub struct StateBuffer {
    ncomp: usize,
    ghost: usize,
    ncell: usize,
    blocks: Vec<Block>,
}

impl StateBuffer {
    /// A zero-filled buffer covering `geom`.
    pub fn new(geom: &LevelGeometry, ncomp: usize, ghost: usize) -> Self {
        let blocks = (0..geom.nblocks())
            .map(|b| {
                let (lo, len) = geom.block_extent(b);
                Block::zeroed(b, lo, len, ghost, ncomp)
            })
            .collect();
        Self {
            ncomp,
            ghost,
            ncell: geom.ncell(),
            blocks,
        }
    }

    /// A zero-filled buffer with the same blocks and components but a
    /// different ghost width.
    pub fn zeros_like(&self, ghost: usize) -> Self {
        let blocks = self
            .blocks
            .iter()
            .map(|b| Block::zeroed(b.index(), b.lo(), b.len(), ghost, self.ncomp))
            .collect();
        Self {
            ncomp: self.ncomp,
            ghost,
            ncell: self.ncell,
            blocks,
        }
    }

    /// A zero-filled buffer over the same blocks with its own component
    /// count and ghost width (e.g. primitive variables).
    pub fn reshaped(&self, ncomp: usize, ghost: usize) -> Self {
        let blocks = self
            .blocks
            .iter()
            .map(|b| Block::zeroed(b.index(), b.lo(), b.len(), ghost, ncomp))
            .collect();
        Self {
            ncomp,
            ghost,
            ncell: self.ncell,
            blocks,
        }
    }

    /// Components per cell.
    pub fn ncomp(&self) -> usize {
        self.ncomp
    }

    /// Halo width.
    pub fn ghost(&self) -> usize {
        self.ghost
    }

    /// Total interior cells.
    pub fn ncell(&self) -> usize {
        self.ncell
    }

    /// All blocks in order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// All blocks in order, mutably.
    pub fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    /// Locate global cell `i`: `(block, local index)`.
    pub fn locate(&self, i: usize) -> Option<(usize, isize)> {
        let b = self.blocks.partition_point(|blk| blk.hi() <= i);
        let blk = self.blocks.get(b)?;
        (i >= blk.lo()).then(|| (b, (i - blk.lo()) as isize))
    }

    /// Interior value at global cell `i`, component `c`.
    ///
    /// # Panics
    ///
    /// Panics if `i` or `c` is out of range.
    pub fn get(&self, i: usize, c: usize) -> f64 {
        let (b, li) = self.locate(i).expect("cell index out of range");
        self.blocks[b].cell(li)[c]
    }

    /// Overwrite the interior value at global cell `i`, component `c`.
    ///
    /// # Panics
    ///
    /// Panics if `i` or `c` is out of range.
    pub fn set(&mut self, i: usize, c: usize, value: f64) {
        let (b, li) = self.locate(i).expect("cell index out of range");
        self.blocks[b].cell_mut(li)[c] = value;
    }

    /// Set every entry, ghosts included.
    pub fn set_val(&mut self, value: f64) {
        self.blocks
            .par_iter_mut()
            .for_each(|b| b.data_mut().fill(value));
    }

    /// Copy the interior of `src` into this buffer's interior.
    pub fn copy_from(&mut self, src: &StateBuffer) {
        self.assert_compatible(src);
        self.blocks
            .par_iter_mut()
            .zip(src.blocks.par_iter())
            .for_each(|(dst, s)| dst.interior_mut().copy_from_slice(s.interior()));
    }

    /// `self += a * x` over the interior.
    pub fn saxpy(&mut self, a: f64, x: &StateBuffer) {
        self.assert_compatible(x);
        self.blocks
            .par_iter_mut()
            .zip(x.blocks.par_iter())
            .for_each(|(dst, xb)| {
                for (d, v) in dst.interior_mut().iter_mut().zip(xb.interior()) {
                    *d += a * v;
                }
            });
    }

    /// `self += x` over the interior.
    pub fn add(&mut self, x: &StateBuffer) {
        self.assert_compatible(x);
        self.blocks
            .par_iter_mut()
            .zip(x.blocks.par_iter())
            .for_each(|(dst, xb)| {
                for (d, v) in dst.interior_mut().iter_mut().zip(xb.interior()) {
                    *d += v;
                }
            });
    }

    /// `self = (1 - w) * a + w * b` over the interior.
    pub fn interpolate_from(&mut self, a: &StateBuffer, b: &StateBuffer, w: f64) {
        self.assert_compatible(a);
        self.assert_compatible(b);
        self.blocks
            .par_iter_mut()
            .zip(a.blocks.par_iter().zip(b.blocks.par_iter()))
            .for_each(|(dst, (ab, bb))| {
                for ((d, x), y) in dst
                    .interior_mut()
                    .iter_mut()
                    .zip(ab.interior())
                    .zip(bb.interior())
                {
                    *d = (1.0 - w) * x + w * y;
                }
            });
    }

    /// Interior sum of component `c`, accumulated in block order.
    pub fn sum(&self, c: usize) -> f64 {
        let partial: Vec<f64> = self
            .blocks
            .par_iter()
            .map(|b| b.interior_cells().map(|cell| cell[c]).sum::<f64>())
            .collect();
        partial.into_iter().sum()
    }

    /// First non-finite interior value, scanning blocks, cells and
    /// components in order.
    pub fn first_non_finite(&self) -> Option<NonFinite> {
        self.blocks.iter().find_map(|b| {
            b.interior_cells().enumerate().find_map(|(i, cell)| {
                cell.iter().enumerate().find_map(|(c, &v)| {
                    (!v.is_finite()).then_some(NonFinite {
                        component: c,
                        cell: b.lo() + i,
                        value: v,
                    })
                })
            })
        })
    }

    /// Whether the interiors of both buffers are bit-for-bit identical.
    pub fn interior_bits_eq(&self, other: &StateBuffer) -> bool {
        self.ncomp == other.ncomp
            && self.blocks.len() == other.blocks.len()
            && self.blocks.iter().zip(&other.blocks).all(|(a, b)| {
                a.interior()
                    .iter()
                    .zip(b.interior())
                    .all(|(x, y)| x.to_bits() == y.to_bits())
            })
    }

    fn assert_compatible(&self, other: &StateBuffer) {
        assert_eq!(self.ncomp, other.ncomp, "component count mismatch");
        assert_eq!(self.ncell, other.ncell, "buffers cover different levels");
        assert_eq!(self.blocks.len(), other.blocks.len(), "block count mismatch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundaryKind;

    fn geom() -> LevelGeometry {
        LevelGeometry::new(10, 4, 0.0, 1.0, BoundaryKind::Periodic).unwrap()
    }

    fn ramp(ghost: usize) -> StateBuffer {
        let mut buf = StateBuffer::new(&geom(), 2, ghost);
        for i in 0..10 {
            buf.set(i, 0, i as f64);
            buf.set(i, 1, -(i as f64));
        }
        buf
    }

    #[test]
    fn locate_spans_ragged_blocks() {
        let buf = StateBuffer::new(&geom(), 1, 0);
        assert_eq!(buf.locate(0), Some((0, 0)));
        assert_eq!(buf.locate(5), Some((1, 1)));
        assert_eq!(buf.locate(9), Some((2, 1)));
        assert_eq!(buf.locate(10), None);
    }

    #[test]
    fn copy_across_ghost_widths() {
        let src = ramp(0);
        let mut dst = src.zeros_like(3);
        dst.copy_from(&src);
        assert!(dst.interior_bits_eq(&src));
        assert_eq!(dst.blocks()[0].cell(-1), &[0.0, 0.0]);
    }

    #[test]
    fn saxpy_and_sum() {
        let x = ramp(0);
        let mut y = x.zeros_like(0);
        y.saxpy(2.0, &x);
        y.add(&x);
        assert_eq!(y.get(4, 0), 12.0);
        assert_eq!(y.sum(0), 3.0 * 45.0);
    }

    #[test]
    fn interpolation_midpoint() {
        let a = ramp(0);
        let mut b = a.zeros_like(0);
        b.set_val(1.0);
        let mut out = a.zeros_like(0);
        out.interpolate_from(&a, &b, 0.5);
        assert_eq!(out.get(3, 0), 2.0);
    }

    #[test]
    fn first_non_finite_reports_location() {
        let mut buf = ramp(1);
        assert!(buf.first_non_finite().is_none());
        buf.set(6, 1, f64::INFINITY);
        buf.set(8, 0, f64::NAN);
        let nf = buf.first_non_finite().unwrap();
        assert_eq!((nf.cell, nf.component), (6, 1));
    }

    #[test]
    fn ghost_nan_is_not_audited() {
        let mut buf = ramp(2);
        buf.blocks_mut()[0].cell_mut(-1)[0] = f64::NAN;
        assert!(buf.first_non_finite().is_none());
    }
}
