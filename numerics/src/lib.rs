//! Restriction, prolongation and the direct coarse solve: the three numerical
//! collaborators the multigrid driver is compiled against but never reimplements
//! itself (per the design doc's module boundary). Every routine here is generic over
//! `Dim` through `ndarray`'s dynamic-rank arrays rather than hand-unrolled 2D/3D pairs.

pub mod coarse;
pub mod errors;

pub use coarse::coarse_solve_direct;
pub use errors::NumericsError;

use mg_types::Dim;
use ndarray::{ArrayD, Dimension, IxDyn};

fn check_ndim(a: &ArrayD<f64>, dim: Dim) -> Result<(), NumericsError> {
    if a.ndim() != dim.axes() {
        return Err(NumericsError::DimensionMismatch {
            expected: dim.axes(),
            got: a.ndim(),
        });
    }
    Ok(())
}

/// Full-weighting restriction of one fine child block's interior (`B` cells per axis)
/// down to the `(B/2)`-cell quadrant of the parent block it occupies. Every coarse cell
/// is the unweighted average of the `2^D` fine cells it covers.
pub fn restrict(dim: Dim, fine_interior: &ArrayD<f64>) -> Result<ArrayD<f64>, NumericsError> {
    check_ndim(fine_interior, dim)?;
    let ndim = dim.axes();
    let b = fine_interior.shape()[0];
    if b % 2 != 0 {
        return Err(NumericsError::OddBlockExtent(b));
    }
    let bc = b / 2;
    let num_subcells = dim.num_children();
    let out = ArrayD::from_shape_fn(IxDyn(&vec![bc; ndim]), |coarse_idx| {
        let coarse_idx = coarse_idx.slice();
        let mut sum = 0.0;
        for sub in 0..num_subcells {
            let mut fine_idx = [0usize; 3];
            for axis in 0..ndim {
                fine_idx[axis] = 2 * coarse_idx[axis] + ((sub >> axis) & 1);
            }
            sum += fine_interior[IxDyn(&fine_idx[..ndim])];
        }
        sum / num_subcells as f64
    });
    Ok(out)
}

/// Piecewise-constant prolongation of a `(B/2)`-cell coarse correction into a `B`-cell
/// fine array, ready to be *added* into the fine block's `cc` (additive/error-correction
/// semantics, never an overwrite).
pub fn prolong_additive(dim: Dim, coarse: &ArrayD<f64>) -> Result<ArrayD<f64>, NumericsError> {
    check_ndim(coarse, dim)?;
    let ndim = dim.axes();
    let bc = coarse.shape()[0];
    let bf = bc * 2;
    let out = ArrayD::from_shape_fn(IxDyn(&vec![bf; ndim]), |fine_idx| {
        let fine_idx = fine_idx.slice();
        let mut coarse_idx = [0usize; 3];
        for axis in 0..ndim {
            coarse_idx[axis] = fine_idx[axis] / 2;
        }
        coarse[IxDyn(&coarse_idx[..ndim])]
    });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restrict_averages_2x2_blocks_2d() {
        // 4x4 fine block, all rows identical: restrict collapses each 2x2 to its mean.
        let fine = ArrayD::from_shape_fn(IxDyn(&[4, 4]), |idx| {
            let i = idx.slice();
            (i[0] + i[1]) as f64
        });
        let coarse = restrict(Dim::D2, &fine).unwrap();
        assert_eq!(coarse.shape(), &[2, 2]);
        // cell (0,0) averages fine (0,0),(1,0),(0,1),(1,1) = 0,1,1,2 -> 1.0
        assert!((coarse[IxDyn(&[0, 0])] - 1.0).abs() < 1e-12);
        // cell (1,1) averages fine (2,2),(3,2),(2,3),(3,3) = 4,5,5,6 -> 5.0
        assert!((coarse[IxDyn(&[1, 1])] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn prolong_injects_constant_into_each_child_cell() {
        let coarse = ArrayD::from_shape_fn(IxDyn(&[2, 2]), |idx| {
            let i = idx.slice();
            (i[0] * 10 + i[1]) as f64
        });
        let fine = prolong_additive(Dim::D2, &coarse).unwrap();
        assert_eq!(fine.shape(), &[4, 4]);
        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(fine[IxDyn(&[i, j])], coarse[IxDyn(&[i / 2, j / 2])]);
            }
        }
    }

    #[test]
    fn restrict_then_prolong_round_trips_constant_fields() {
        let fine = ArrayD::from_elem(IxDyn(&[4, 4, 4]), 3.5);
        let coarse = restrict(Dim::D3, &fine).unwrap();
        assert!(coarse.iter().all(|&v| (v - 3.5).abs() < 1e-12));
        let back = prolong_additive(Dim::D3, &coarse).unwrap();
        assert!(back.iter().all(|&v| (v - 3.5).abs() < 1e-12));
    }

    #[test]
    fn odd_block_extent_is_rejected() {
        let fine = ArrayD::zeros(IxDyn(&[3, 3]));
        let err = restrict(Dim::D2, &fine).unwrap_err();
        assert!(matches!(err, NumericsError::OddBlockExtent(3)));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let fine = ArrayD::zeros(IxDyn(&[4, 4, 4]));
        let err = restrict(Dim::D2, &fine).unwrap_err();
        assert!(matches!(err, NumericsError::DimensionMismatch { expected: 2, got: 3 }));
    }
}
