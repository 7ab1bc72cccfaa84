//! Direct coarse solve via fast diagonalization (discrete sine transform): the
//! `Dirichlet`-only alternative to iterating the smoother down to the root block the
//! design doc calls out as optional. Non-Dirichlet roots fall back to the iterative
//! coarse solve, which is always available.

use std::f64::consts::PI;

use mg_types::{BoundaryEntry, BoundaryKind, Dim};
use ndarray::{Array2, ArrayD, Axis, Dimension};

use crate::errors::NumericsError;

/// Solves `-laplacian(phi) = rho` on a single block's interior with homogeneous
/// Dirichlet boundaries, using a separable sine-transform diagonalization of the
/// discrete 5-/7-point Laplacian. Any non-zero Dirichlet datum must already be folded
/// into `rho`'s border cells by the caller (the usual `-2*g/dr^2` ghost contribution);
/// this routine itself only ever sees a homogeneous problem.
pub fn coarse_solve_direct(
    dim: Dim,
    rho: &ArrayD<f64>,
    dr: f64,
    boundary: &[BoundaryEntry],
) -> Result<ArrayD<f64>, NumericsError> {
    if rho.ndim() != dim.axes() {
        return Err(NumericsError::DimensionMismatch {
            expected: dim.axes(),
            got: rho.ndim(),
        });
    }
    if boundary.iter().any(|e| e.kind != BoundaryKind::Dirichlet) {
        return Err(NumericsError::UnsupportedBoundaryForDirectSolve);
    }

    let n = rho.shape()[0];
    let basis = sine_basis(n);
    let eigen = sine_eigenvalues(n, dr);

    let mut hat = rho.clone();
    for axis in 0..dim.axes() {
        transform_along_axis(&mut hat, &basis, Axis(axis));
    }

    for (idx, v) in hat.indexed_iter_mut() {
        let total_eigen: f64 = idx.slice().iter().map(|&k| eigen[k]).sum();
        *v /= total_eigen;
    }

    for axis in 0..dim.axes() {
        transform_along_axis(&mut hat, &basis, Axis(axis));
    }
    Ok(hat)
}

/// Orthonormal DST-I basis: `basis[i][k] = sqrt(2/(n+1)) * sin((i+1)(k+1)*pi/(n+1))`.
/// Symmetric, so the same matrix serves as both the forward and inverse transform.
fn sine_basis(n: usize) -> Array2<f64> {
    let scale = (2.0 / (n as f64 + 1.0)).sqrt();
    Array2::from_shape_fn((n, n), |(i, k)| {
        scale * (((i + 1) * (k + 1)) as f64 * PI / (n as f64 + 1.0)).sin()
    })
}

/// Eigenvalues of the 1D second-order Dirichlet Laplacian `(phi[i-1] - 2phi[i] + phi[i+1])/dr^2`
/// in the sine basis.
fn sine_eigenvalues(n: usize, dr: f64) -> Vec<f64> {
    (0..n)
        .map(|k| {
            let theta = (k + 1) as f64 * PI / (n as f64 + 1.0);
            (2.0 * theta.cos() - 2.0) / (dr * dr)
        })
        .collect()
}

/// Applies `basis` to every 1D lane along `axis`, in place.
fn transform_along_axis(arr: &mut ArrayD<f64>, basis: &Array2<f64>, axis: Axis) {
    let n = basis.nrows();
    for mut lane in arr.lanes_mut(axis) {
        let mut out = vec![0.0; n];
        for (k, slot) in out.iter_mut().enumerate() {
            let mut sum = 0.0;
            for i in 0..n {
                sum += basis[[i, k]] * lane[i];
            }
            *slot = sum;
        }
        for (k, &v) in out.iter().enumerate() {
            lane[k] = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mg_types::BoundaryEntry;
    use ndarray::IxDyn;

    fn laplacian_2d(phi: &ArrayD<f64>, dr: f64) -> ArrayD<f64> {
        let n = phi.shape()[0];
        ArrayD::from_shape_fn(IxDyn(&[n, n]), |idx| {
            let i = idx.slice();
            let (x, y) = (i[0] as i64, i[1] as i64);
            let at = |xi: i64, yi: i64| -> f64 {
                if xi < 0 || yi < 0 || xi >= n as i64 || yi >= n as i64 {
                    0.0
                } else {
                    phi[IxDyn(&[xi as usize, yi as usize])]
                }
            };
            -(at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y)) / (dr * dr)
        })
    }

    #[test]
    fn direct_solve_matches_laplacian_of_rho_round_trip() {
        let n = 5;
        let dr = 0.1;
        let boundary = vec![BoundaryEntry::dirichlet(0.0); 4];
        let rho = ArrayD::from_shape_fn(IxDyn(&[n, n]), |idx| {
            let i = idx.slice();
            ((i[0] + 1) as f64) * ((i[1] + 1) as f64) * 0.01
        });
        let phi = coarse_solve_direct(Dim::D2, &rho, dr, &boundary).unwrap();
        let back = laplacian_2d(&phi, dr);
        for (a, b) in back.iter().zip(rho.iter()) {
            assert!((a - b).abs() < 1e-6, "{} vs {}", a, b);
        }
    }

    #[test]
    fn non_dirichlet_boundary_is_rejected() {
        let rho = ArrayD::zeros(IxDyn(&[3, 3]));
        let boundary = vec![BoundaryEntry::neumann(0.0)];
        let err = coarse_solve_direct(Dim::D2, &rho, 0.1, &boundary).unwrap_err();
        assert!(matches!(err, NumericsError::UnsupportedBoundaryForDirectSolve));
    }
}
