//! Reading and writing one face's cell slab, generic over dimension via nested
//! perpendicular-axis iteration rather than a hand-unrolled 2D/3D pair.

use mg_types::geom::axis_of;
use ndarray::{ArrayD, IxDyn};

/// Number of floats in one face slab: `B^(D-1)`.
pub fn slab_len(b: usize, ndim: usize) -> usize {
    b.pow((ndim - 1) as u32)
}

fn perp_axes(ndim: usize, axis: usize) -> Vec<usize> {
    (0..ndim).filter(|&a| a != axis).collect()
}

fn for_each_perp_coord(perp: &[usize], b: usize, mut f: impl FnMut(&[usize])) {
    match perp.len() {
        1 => {
            for i in 0..b {
                f(&[i]);
            }
        }
        2 => {
            for i in 0..b {
                for j in 0..b {
                    f(&[i, j]);
                }
            }
        }
        n => unreachable!("blocks are 2D or 3D, got {n} perpendicular axes"),
    }
}

fn full_index(ndim: usize, axis: usize, axis_val: usize, perp: &[usize], coords: &[usize]) -> Vec<usize> {
    let mut idx = vec![0usize; ndim];
    idx[axis] = axis_val;
    for (slot, &a) in perp.iter().enumerate() {
        idx[a] = coords[slot];
    }
    idx
}

/// Reads the `face`'s slab at logical axis coordinate `axis_val` into `out`, in a fixed
/// nested-perpendicular-coordinate order shared by every caller (pack and unpack always
/// agree on this order, so it never needs to be a *canonical* cross-process order).
pub fn read_slab(arr: &ArrayD<f64>, face: usize, axis_val: usize, b: usize, out: &mut [f64]) {
    let ndim = arr.ndim();
    let axis = axis_of(face);
    let perp = perp_axes(ndim, axis);
    let mut i = 0;
    for_each_perp_coord(&perp, b, |coords| {
        let idx = full_index(ndim, axis, axis_val, &perp, coords);
        out[i] = arr[IxDyn(&idx)];
        i += 1;
    });
}

pub fn write_slab(arr: &mut ArrayD<f64>, face: usize, axis_val: usize, b: usize, data: &[f64]) {
    let ndim = arr.ndim();
    let axis = axis_of(face);
    let perp = perp_axes(ndim, axis);
    let mut i = 0;
    for_each_perp_coord(&perp, b, |coords| {
        let idx = full_index(ndim, axis, axis_val, &perp, coords);
        arr[IxDyn(&idx)] = data[i];
        i += 1;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use mg_types::Dim;
    use ndarray::Dimension;

    #[test]
    fn round_trips_through_read_write() {
        let mut arr = ArrayD::from_shape_fn(IxDyn(&[4, 4]), |idx| {
            let i = idx.slice();
            (i[0] * 10 + i[1]) as f64
        });
        let mut slab = vec![0.0; slab_len(4, Dim::D2.axes())];
        read_slab(&arr, 1, 3, 4, &mut slab); // high-x face, axis val = B+1-1... here 3
        let mut dest = ArrayD::zeros(IxDyn(&[4, 4]));
        write_slab(&mut dest, 1, 0, 4, &slab);
        let mut back = vec![0.0; slab.len()];
        read_slab(&dest, 1, 0, 4, &mut back);
        assert_eq!(slab, back);
        let _ = &mut arr;
    }
}
