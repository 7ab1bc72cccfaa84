//! The discrete Laplacian operator and the three smoothers sharing its stencil. Uniform
//! spacing `dr_ℓ` per level, standard 2D 5-point / 3D 7-point stencil:
//! `(Σ_neighbors φ − 2D·φ) / dr²`.

use mg_types::{BlockId, Var};
use ndarray::IxDyn;

use crate::store::BlockStore;
use crate::tree::Tree;
use crate::util::for_each_interior;

/// Relaxation factor for weighted Jacobi.
const JACOBI_W: f64 = 2.0 / 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Smoother {
    Jacobi,
    GaussSeidel,
    GaussSeidelRedBlack,
}

/// Writes `L φ` into `out_var` for one owned block.
#[tracing::instrument(skip(tree, store))]
pub fn box_lpl(tree: &Tree, store: &mut BlockStore, id: BlockId, in_var: Var, out_var: Var) {
    let ndim = tree.dim().axes();
    let b = tree.b();
    let dr = tree.dr(tree.meta(id).lvl);
    let inv_dr2 = 1.0 / (dr * dr);
    let phi = store.cc(id, in_var).clone();

    for_each_interior(ndim, b, |idx| {
        let center = phi[IxDyn(idx)];
        let mut sum = 0.0;
        for axis in 0..ndim {
            let mut lo = idx.to_vec();
            lo[axis] -= 1;
            let mut hi = idx.to_vec();
            hi[axis] += 1;
            sum += phi[IxDyn(&lo)] + phi[IxDyn(&hi)];
        }
        let lpl = (sum - 2.0 * ndim as f64 * center) * inv_dr2;
        store.cc_mut(id, out_var)[IxDyn(idx)] = lpl;
    });
}

/// Runs one smoother sweep over one owned block's interior, relaxing `Var::Phi` against
/// `Var::Rho`. For `GaussSeidelRedBlack`, `color` selects which parity sweeps this call
/// (the driver alternates `color` and refills ghosts between calls — see §4.4).
pub fn smooth_block(tree: &Tree, store: &mut BlockStore, id: BlockId, kind: Smoother, color: bool) {
    let ndim = tree.dim().axes();
    let b = tree.b();
    let dr = tree.dr(tree.meta(id).lvl);
    let dr2 = dr * dr;
    let inv_2d = 1.0 / (2.0 * ndim as f64);

    match kind {
        Smoother::Jacobi => {
            let phi = store.cc(id, Var::Phi).clone();
            let rho = store.cc(id, Var::Rho).clone();
            for_each_interior(ndim, b, |idx| {
                let updated = jacobi_update(&phi, &rho, idx, ndim, dr2, inv_2d);
                let center = phi[IxDyn(idx)];
                store.cc_mut(id, Var::Phi)[IxDyn(idx)] = (1.0 - JACOBI_W) * center + JACOBI_W * updated;
            });
        }
        Smoother::GaussSeidel => {
            for_each_interior(ndim, b, |idx| {
                let phi = store.cc(id, Var::Phi);
                let mut sum = 0.0;
                for axis in 0..ndim {
                    let mut lo = idx.to_vec();
                    lo[axis] -= 1;
                    let mut hi = idx.to_vec();
                    hi[axis] += 1;
                    sum += phi[IxDyn(&lo)] + phi[IxDyn(&hi)];
                }
                let rho_here = store.cc(id, Var::Rho)[IxDyn(idx)];
                store.cc_mut(id, Var::Phi)[IxDyn(idx)] = (sum - dr2 * rho_here) * inv_2d;
            });
        }
        Smoother::GaussSeidelRedBlack => {
            for_each_interior(ndim, b, |idx| {
                let parity_even = idx.iter().sum::<usize>() % 2 == 0;
                if parity_even != color {
                    return;
                }
                let phi = store.cc(id, Var::Phi);
                let mut sum = 0.0;
                for axis in 0..ndim {
                    let mut lo = idx.to_vec();
                    lo[axis] -= 1;
                    let mut hi = idx.to_vec();
                    hi[axis] += 1;
                    sum += phi[IxDyn(&lo)] + phi[IxDyn(&hi)];
                }
                let rho_here = store.cc(id, Var::Rho)[IxDyn(idx)];
                store.cc_mut(id, Var::Phi)[IxDyn(idx)] = (sum - dr2 * rho_here) * inv_2d;
            });
        }
    }
}

fn jacobi_update(
    phi: &ndarray::ArrayD<f64>,
    rho: &ndarray::ArrayD<f64>,
    idx: &[usize],
    ndim: usize,
    dr2: f64,
    inv_2d: f64,
) -> f64 {
    let mut sum = 0.0;
    for axis in 0..ndim {
        let mut lo = idx.to_vec();
        lo[axis] -= 1;
        let mut hi = idx.to_vec();
        hi[axis] += 1;
        sum += phi[IxDyn(&lo)] + phi[IxDyn(&hi)];
    }
    (sum - dr2 * rho[IxDyn(idx)]) * inv_2d
}
