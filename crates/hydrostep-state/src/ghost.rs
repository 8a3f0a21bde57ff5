//! Ghost-cell fill.
//!
//! Halo values come either from neighbouring blocks of the same buffer
//! or, beyond the domain edge, from the boundary treatment of the
//! geometry. The fill gathers every halo value first and writes them
//! afterwards, so blocks never read a halo another block is writing.

use rayon::prelude::*;

use crate::buffer::StateBuffer;
use crate::geometry::LevelGeometry;

/// Fill every ghost cell of `buf` from interior data.
///
/// `odd` lists components that change sign under reflection.
pub fn fill_ghosts(buf: &mut StateBuffer, geom: &LevelGeometry, odd: &[usize]) {
    let ghost = buf.ghost() as isize;
    if ghost == 0 {
        return;
    }
    let ncomp = buf.ncomp();

    let halos: Vec<Vec<f64>> = {
        let src: &StateBuffer = buf;
        src.blocks()
            .par_iter()
            .map(|blk| {
                let lo = blk.lo() as isize;
                let len = blk.len() as isize;
                let mut out = Vec::with_capacity(2 * ghost as usize * ncomp);
                let cells = (-ghost..0).chain(len..len + ghost);
                for i in cells {
                    let (g, flip) = geom.source_cell(lo + i);
                    let (b, li) = src
                        .locate(g)
                        .unwrap_or_else(|| unreachable!("source cell {g} inside domain"));
                    let cell = src.blocks()[b].cell(li);
                    out.extend(cell.iter().enumerate().map(|(c, &v)| {
                        if flip && odd.contains(&c) {
                            -v
                        } else {
                            v
                        }
                    }));
                }
                out
            })
            .collect()
    };

    buf.blocks_mut()
        .par_iter_mut()
        .zip(halos.par_iter())
        .for_each(|(blk, halo)| {
            let len = blk.len() as isize;
            let cells = (-ghost..0).chain(len..len + ghost);
            for (i, vals) in cells.zip(halo.chunks_exact(ncomp)) {
                blk.cell_mut(i).copy_from_slice(vals);
            }
        });
}
