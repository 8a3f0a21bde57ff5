//! A single block of cells with a ghost halo.

/// Cell-major storage for one block: `ncomp` values per cell, interior
/// cells padded by `ghost` cells on each side.
///
/// Cells are addressed by local index `i` in `-ghost..len + ghost`;
/// `0..len` is the interior.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    index: usize,
    lo: usize,
    len: usize,
    ghost: usize,
    ncomp: usize,
    data: Vec<f64>,
}

impl Block {
    pub(crate) fn zeroed(index: usize, lo: usize, len: usize, ghost: usize, ncomp: usize) -> Self {
        Self {
            index,
            lo,
            len,
            ghost,
            ncomp,
            data: vec![0.0; (len + 2 * ghost) * ncomp],
        }
    }

    /// Position of this block in its buffer.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Global index of the first interior cell.
    pub fn lo(&self) -> usize {
        self.lo
    }

    /// Global index one past the last interior cell.
    pub fn hi(&self) -> usize {
        self.lo + self.len
    }

    /// Number of interior cells.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the block has no interior cells.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Halo width on each side.
    pub fn ghost(&self) -> usize {
        self.ghost
    }

    /// Components per cell.
    pub fn ncomp(&self) -> usize {
        self.ncomp
    }

    fn offset(&self, i: isize) -> usize {
        (i + self.ghost as isize) as usize * self.ncomp
    }

    /// Components of local cell `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` lies outside `-ghost..len + ghost`.
    pub fn cell(&self, i: isize) -> &[f64] {
        let off = self.offset(i);
        &self.data[off..off + self.ncomp]
    }

    /// Mutable components of local cell `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` lies outside `-ghost..len + ghost`.
    pub fn cell_mut(&mut self, i: isize) -> &mut [f64] {
        let off = self.offset(i);
        let n = self.ncomp;
        &mut self.data[off..off + n]
    }

    /// Interior cells as one contiguous slice.
    pub fn interior(&self) -> &[f64] {
        let off = self.ghost * self.ncomp;
        &self.data[off..off + self.len * self.ncomp]
    }

    /// Mutable interior cells as one contiguous slice.
    pub fn interior_mut(&mut self) -> &mut [f64] {
        let off = self.ghost * self.ncomp;
        let n = self.len * self.ncomp;
        &mut self.data[off..off + n]
    }

    /// Iterate interior cells in order.
    pub fn interior_cells(&self) -> std::slice::ChunksExact<'_, f64> {
        self.interior().chunks_exact(self.ncomp)
    }

    /// Iterate interior cells mutably in order.
    pub fn interior_cells_mut(&mut self) -> std::slice::ChunksExactMut<'_, f64> {
        let n = self.ncomp;
        self.interior_mut().chunks_exact_mut(n)
    }

    /// The whole padded storage.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// The whole padded storage, mutably.
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghost_and_interior_addressing() {
        let mut b = Block::zeroed(0, 8, 3, 2, 2);
        assert_eq!(b.data().len(), (3 + 4) * 2);
        b.cell_mut(-2)[0] = 1.0;
        b.cell_mut(0)[1] = 2.0;
        b.cell_mut(4)[1] = 3.0;
        assert_eq!(b.data()[0], 1.0);
        assert_eq!(b.interior()[1], 2.0);
        assert_eq!(*b.data().last().unwrap(), 3.0);
        assert_eq!(b.hi(), 11);
        assert_eq!(b.interior_cells().count(), 3);
    }
}
