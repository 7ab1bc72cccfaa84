//! Compile-time face/child metadata, parameterized by `Dim` rather than hand-unrolled
//! per-axis tables. Faces are numbered low-x=0, high-x=1, low-y=2, high-y=3,
//! [low-z=4, high-z=5]; children are numbered by the bits of their in-parent offset,
//! bit `a` set meaning "high half along axis `a`".

use crate::block::BlockId;
use crate::dim::Dim;

/// In-parent coordinate offset (0 or 1 per axis), z unused outside `Dim::D3`.
pub type Offset = [i32; 3];

/// `neighb_dim[k]`: the axis a face index varies along.
pub const fn axis_of(face: usize) -> usize {
    face >> 1
}

/// `neighb_low[k]`: whether a face is the low-side face of its axis.
pub const fn is_low_face(face: usize) -> bool {
    face & 1 == 0
}

/// `neighb_rev[k]`: the opposite face on the same axis.
pub const fn rev_face(face: usize) -> usize {
    face ^ 1
}

/// Whether `child` (by its bit-packed offset index) touches parent face `face`.
pub fn child_touches_face(child: usize, face: usize) -> bool {
    let axis = axis_of(face);
    let high_half = (child >> axis) & 1 == 1;
    high_half != is_low_face(face)
}

/// `child_adj_nb[·, k]`: which children touch face `k`, in ascending child-index order.
pub fn children_on_face(dim: Dim, face: usize) -> Vec<usize> {
    (0..dim.num_children())
        .filter(|&c| child_touches_face(c, face))
        .collect()
}

/// `get_child_offset(id)`: a child's in-parent offset vector, derived from the bits of
/// its child index.
pub fn child_offset(dim: Dim, child: usize) -> Offset {
    let mut offset = [0i32; 3];
    for (axis, slot) in offset.iter_mut().enumerate().take(dim.axes()) {
        *slot = ((child >> axis) & 1) as i32;
    }
    offset
}

/// The sort key a send-side record is tagged with: `num_neighbors · nb_id + rev(k_local)`.
/// Deterministic given only the remote block id and the local face, so senders never
/// need a handshake with receivers to agree on ordering.
pub fn pack_key(dim: Dim, nb_id: BlockId, local_face: usize) -> i64 {
    dim.num_faces() as i64 * nb_id as i64 + rev_face(local_face) as i64
}
