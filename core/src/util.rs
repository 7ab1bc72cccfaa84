//! Small index-iteration helpers shared by the operator and the driver: generic over
//! dimension (2 or 3) rather than hand-unrolled per-axis loops.

/// Visits every interior cell index (1-indexed, `[1, B]` per axis) in ascending
/// lexicographic order.
pub fn for_each_interior(ndim: usize, b: usize, mut f: impl FnMut(&[usize])) {
    match ndim {
        2 => {
            for i in 1..=b {
                for j in 1..=b {
                    f(&[i, j]);
                }
            }
        }
        3 => {
            for i in 1..=b {
                for j in 1..=b {
                    for k in 1..=b {
                        f(&[i, j, k]);
                    }
                }
            }
        }
        n => unreachable!("blocks are 2D or 3D, got {n} axes"),
    }
}
