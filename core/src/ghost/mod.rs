//! Ghost-cell exchange engine: after `fill_ghost_cells_lvl(lvl, v)` returns, every
//! interior-touching ghost cell of every owned block at `lvl` holds the value dictated
//! by its neighbor policy — same-level copy (local or shipped over the transport),
//! refinement-boundary reconstruction, or a physical boundary condition.

pub mod bc;
pub mod faceslab;
pub mod rb;

use mg_types::geom::{axis_of, child_offset, children_on_face, is_low_face, pack_key, rev_face};
use mg_types::{BlockId, Neighbor, RankId, Var};
use mg_transport::{BufferPool, DryRunCounters, Transport};
use ndarray::IxDyn;

use crate::errors::SolverError;
use crate::store::BlockStore;
use crate::tree::Tree;
use bc::BoundaryRegistry;
use rb::RbStencil;

fn ghost_axis_val(face: usize, b: usize) -> usize {
    if is_low_face(face) {
        0
    } else {
        b + 1
    }
}

fn interior1_axis_val(face: usize, b: usize) -> usize {
    if is_low_face(face) {
        1
    } else {
        b
    }
}

fn interior2_axis_val(face: usize, b: usize) -> usize {
    if is_low_face(face) {
        2
    } else {
        b - 1
    }
}

/// Rank owning the coarse neighbor a fine block's refinement-boundary `face` reconstructs
/// from: the fine block's parent's same-level neighbor on the same face. `None` when the
/// parent has no block there (the parent itself sits on a physical boundary).
fn coarse_neighbor_rank(tree: &Tree, id: BlockId, face: usize) -> Option<RankId> {
    let parent_id = tree.meta(id).parent?;
    match tree.meta(parent_id).neighbors[face] {
        Neighbor::Id(nb_id) => Some(tree.meta(nb_id).rank),
        _ => None,
    }
}

/// Visits every `(child_id, face_n)` pair a coarse ref-bnd supplier `coarse_id` ships its
/// face slab to: for each of its own faces `face_n` whose same-level neighbor has
/// children, the children adjacent to that neighbor's face toward `coarse_id` are exactly
/// `children_on_face(dim, rev_face(face_n))` of that neighbor.
fn for_each_ref_bnd_child(tree: &Tree, coarse_id: BlockId, mut f: impl FnMut(BlockId, usize)) {
    let dim = tree.dim();
    let meta = tree.meta(coarse_id);
    for face_n in 0..dim.num_faces() {
        if let Neighbor::Id(nb_id) = meta.neighbors[face_n] {
            let nb_meta = tree.meta(nb_id);
            if nb_meta.has_children() {
                for child_idx in children_on_face(dim, rev_face(face_n)) {
                    f(nb_meta.children[child_idx], face_n);
                }
            }
        }
    }
}

/// Owns the per-rank buffer pool, sized once from the two-pass dry run over every level
/// this tree uses. Every subsequent exchange reuses these buffers.
pub struct GhostEngine {
    dsize: usize,
    pool: BufferPool,
}

impl GhostEngine {
    /// Dry-run sizing pass (§4.2.1): because block size `B` is uniform per level, `dsize`
    /// never changes across levels, so the per-peer capacity collapses to the float-count
    /// high-water mark across every level. Three passes per level mirror exactly what the
    /// real pack/consume loops in `fill_ghost_cells_lvl` will later do: (1) same-level
    /// remote sends, (2) refinement-boundary sends from this level's coarse ref-bnd
    /// suppliers down to remote fine children, (3) a unified recv count covering both
    /// same-level-remote and refinement-boundary-from-a-remote-coarse-parent records.
    pub fn build(tree: &Tree) -> Self {
        let dim = tree.dim();
        let b = tree.b();
        let dsize = faceslab::slab_len(b, dim.axes());
        let n_ranks = tree.n_ranks();
        let my_rank = tree.my_rank();

        let mut cap_send = vec![0usize; n_ranks];
        let mut cap_recv = vec![0usize; n_ranks];

        for lvl in tree.lowest_lvl()..=tree.highest_lvl() {
            let mut counters = DryRunCounters::new(n_ranks);

            // Step 1: same-level remote sends.
            for &id in &tree.level(lvl).my_ids {
                let meta = tree.meta(id);
                for face in 0..dim.num_faces() {
                    if let Neighbor::Id(nb_id) = meta.neighbors[face] {
                        let nb_rank = tree.meta(nb_id).rank;
                        if nb_rank != my_rank {
                            counters.reserve_send(nb_rank, dsize);
                        }
                    }
                }
            }

            // Step 2: refinement-boundary sends, one coarse face slab shipped to every
            // remote fine child that reconstructs a NoBox ghost from it.
            if lvl > tree.lowest_lvl() {
                for &coarse_id in &tree.level(lvl - 1).my_ref_bnds {
                    for_each_ref_bnd_child(tree, coarse_id, |child_id, _face_n| {
                        let child_rank = tree.meta(child_id).rank;
                        if child_rank != my_rank {
                            counters.reserve_send(child_rank, dsize);
                        }
                    });
                }
            }

            // Step 3: unified recv count — same-level-remote neighbors plus
            // refinement-boundary faces whose parent's same-level neighbor is remote.
            for &id in &tree.level(lvl).my_ids {
                let meta = tree.meta(id);
                for face in 0..dim.num_faces() {
                    match meta.neighbors[face] {
                        Neighbor::Id(nb_id) => {
                            let nb_rank = tree.meta(nb_id).rank;
                            if nb_rank != my_rank {
                                counters.reserve_recv(nb_rank, dsize);
                            }
                        }
                        Neighbor::NoBox => {
                            if let Some(coarse_rank) = coarse_neighbor_rank(tree, id, face) {
                                if coarse_rank != my_rank {
                                    counters.reserve_recv(coarse_rank, dsize);
                                }
                            }
                        }
                        Neighbor::Physical => {}
                    }
                }
            }

            counters.fold_into_capacity(&mut cap_send, &mut cap_recv);
        }

        let pool = BufferPool::with_capacities(my_rank, &cap_send, &cap_recv, dsize);
        Self { dsize, pool }
    }

    #[tracing::instrument(skip(self, tree, store, boundary, transport))]
    pub fn fill_ghost_cells(
        &mut self,
        tree: &Tree,
        store: &mut BlockStore,
        boundary: &BoundaryRegistry,
        transport: &dyn Transport,
        v: Var,
    ) -> Result<(), SolverError> {
        for lvl in tree.lowest_lvl()..=tree.highest_lvl() {
            self.fill_ghost_cells_lvl(tree, store, boundary, transport, lvl, v)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, tree, store, boundary, transport))]
    pub fn fill_ghost_cells_lvl(
        &mut self,
        tree: &Tree,
        store: &mut BlockStore,
        boundary: &BoundaryRegistry,
        transport: &dyn Transport,
        lvl: u32,
        v: Var,
    ) -> Result<(), SolverError> {
        let dim = tree.dim();
        let b = tree.b();
        let my_rank = tree.my_rank();
        let dsize = self.dsize;

        self.pool.reset_cursors();

        let mut buf = vec![0.0; dsize];

        // Pack: same-level remote sends (§4.2.2 step 1/2 of the pack pass).
        for &id in &tree.level(lvl).my_ids {
            let meta = tree.meta(id);
            for face in 0..dim.num_faces() {
                if let Neighbor::Id(nb_id) = meta.neighbors[face] {
                    let nb_rank = tree.meta(nb_id).rank;
                    if nb_rank != my_rank {
                        faceslab::read_slab(store.cc(id, v), face, interior1_axis_val(face, b), b, &mut buf);
                        let key = pack_key(dim, nb_id, face);
                        self.pool.push_record(nb_rank, &buf, key);
                    }
                }
            }
        }

        // Pack: refinement-boundary sends (§4.2.2 step 3) — every coarse ref-bnd supplier
        // at the level below ships its face slab once per remote fine child.
        if lvl > tree.lowest_lvl() {
            for &coarse_id in &tree.level(lvl - 1).my_ref_bnds {
                for_each_ref_bnd_child(tree, coarse_id, |child_id, face_n| {
                    let child_rank = tree.meta(child_id).rank;
                    if child_rank != my_rank {
                        faceslab::read_slab(store.cc(coarse_id, v), face_n, interior1_axis_val(face_n, b), b, &mut buf);
                        let key = pack_key(dim, child_id, face_n);
                        self.pool.push_record(child_rank, &buf, key);
                    }
                });
            }
        }

        // Unified recv sizing (§4.2.1 step 3): same-level-remote neighbors plus
        // refinement-boundary faces whose parent's same-level neighbor is remote.
        let mut n_recv = vec![0usize; tree.n_ranks()];
        for &id in &tree.level(lvl).my_ids {
            let meta = tree.meta(id);
            for face in 0..dim.num_faces() {
                match meta.neighbors[face] {
                    Neighbor::Id(nb_id) => {
                        let nb_rank = tree.meta(nb_id).rank;
                        if nb_rank != my_rank {
                            n_recv[nb_rank as usize] += 1;
                        }
                    }
                    Neighbor::NoBox => {
                        if let Some(coarse_rank) = coarse_neighbor_rank(tree, id, face) {
                            if coarse_rank != my_rank {
                                n_recv[coarse_rank as usize] += 1;
                            }
                        }
                    }
                    Neighbor::Physical => {}
                }
            }
        }
        for (peer, &n) in n_recv.iter().enumerate() {
            if n > 0 {
                self.pool.set_expected_recv(peer as u32, n, dsize);
            }
        }

        self.pool.sort_and_transfer(dsize, transport)?;

        for &id in &tree.level(lvl).my_ids {
            let meta = tree.meta(id).clone();
            for face in 0..dim.num_faces() {
                match meta.neighbors[face] {
                    Neighbor::Id(nb_id) => {
                        let nb_rank = tree.meta(nb_id).rank;
                        if nb_rank == my_rank {
                            let mut slab = vec![0.0; dsize];
                            faceslab::read_slab(
                                store.cc(nb_id, v),
                                rev_face(face),
                                interior1_axis_val(rev_face(face), b),
                                b,
                                &mut slab,
                            );
                            faceslab::write_slab(store.cc_mut(id, v), face, ghost_axis_val(face, b), b, &slab);
                        } else {
                            let slab = self.pool.take_recv(nb_rank, dsize).to_vec();
                            faceslab::write_slab(store.cc_mut(id, v), face, ghost_axis_val(face, b), b, &slab);
                        }
                    }
                    Neighbor::NoBox => {
                        let coarse_rank = coarse_neighbor_rank(tree, id, face);
                        let remote_slab = match coarse_rank {
                            Some(rank) if rank != my_rank => Some(self.pool.take_recv(rank, dsize).to_vec()),
                            _ => None,
                        };
                        fill_refinement_boundary(tree, store, id, face, v, remote_slab.as_deref());
                    }
                    Neighbor::Physical => {
                        fill_physical_boundary(tree, store, boundary, id, face, v, lvl)?;
                    }
                }
            }
        }

        Ok(())
    }
}

fn fill_physical_boundary(
    tree: &Tree,
    store: &mut BlockStore,
    boundary: &BoundaryRegistry,
    id: BlockId,
    face: usize,
    v: Var,
    lvl: u32,
) -> Result<(), SolverError> {
    let dim = tree.dim();
    let b = tree.b();
    let ndim = dim.axes();
    let axis = axis_of(face);
    let dr = tree.dr(lvl);
    let origin = tree.origin(id);

    let entry = boundary.get(face, v).map_err(|_| SolverError::MissingBoundaryEntry { block: id, face })?;

    let ghost_val = ghost_axis_val(face, b);
    let i1_val = interior1_axis_val(face, b);
    let i2_val = interior2_axis_val(face, b);

    let perp: Vec<usize> = (0..ndim).filter(|&a| a != axis).collect();
    let mut coords = vec![0usize; perp.len().max(1)];
    let n_perp_combos = b.pow(perp.len() as u32);
    for flat in 0..n_perp_combos {
        let mut rem = flat;
        for slot in coords.iter_mut().take(perp.len()) {
            *slot = rem % b;
            rem /= b;
        }

        let mut x1_idx = vec![0usize; ndim];
        x1_idx[axis] = i1_val;
        let mut x2_idx = x1_idx.clone();
        x2_idx[axis] = i2_val;
        let mut g_idx = x1_idx.clone();
        g_idx[axis] = ghost_val;

        let mut pos = origin;
        pos[axis] = if is_low_face(face) { 0.0 } else { 1.0 };
        for (slot_i, &a) in perp.iter().enumerate() {
            let c = coords[slot_i];
            x1_idx[a] = c + 1;
            x2_idx[a] = c + 1;
            g_idx[a] = c + 1;
            pos[a] = origin[a] + (c as f64 + 0.5) * dr;
        }

        let datum = entry.datum.evaluate(pos);
        let x1 = store.cc(id, v)[IxDyn(&x1_idx)];
        let x2 = store.cc(id, v)[IxDyn(&x2_idx)];
        let ghost = bc::bc_to_gc(entry, face, datum, x1, x2, dr);
        store.cc_mut(id, v)[IxDyn(&g_idx)] = ghost;
    }
    Ok(())
}

/// Reads the coarse neighbor's value at in-plane coordinate `coords` (0-indexed fine-side
/// perpendicular coordinates, already mapped to coarse indices by the caller): from
/// `remote_slab` when the coarse block lives on another rank (shipped in the pack pass's
/// refinement-boundary step), otherwise directly from `store` (§4.2.3).
fn coarse_value(
    remote_slab: Option<&[f64]>,
    store: &BlockStore,
    coarse_nb_id: BlockId,
    v: Var,
    ndim: usize,
    axis: usize,
    coarse_face_val: usize,
    perp: &[usize],
    coords: &[usize],
    b: usize,
) -> f64 {
    match remote_slab {
        Some(slab) => match perp.len() {
            1 => slab[coords[0]],
            2 => slab[coords[0] * b + coords[1]],
            n => unreachable!("blocks are 2D or 3D, got {n} perpendicular axes"),
        },
        None => {
            let mut idx = vec![0usize; ndim];
            idx[axis] = coarse_face_val;
            for (slot, &a) in perp.iter().enumerate() {
                idx[a] = coords[slot] + 1;
            }
            store.cc(coarse_nb_id, v)[IxDyn(&idx)]
        }
    }
}

/// Reconstructs a fine block's ghost layer on a refinement-boundary face from its
/// parent's same-face neighbor, whose data is either locally resident in `store` or, when
/// owned by another rank, already sitting in `remote_slab` (shipped by the pack pass's
/// refinement-boundary step and drained from the pool by the caller before this is
/// invoked).
fn fill_refinement_boundary(
    tree: &Tree,
    store: &mut BlockStore,
    id: BlockId,
    face: usize,
    v: Var,
    remote_slab: Option<&[f64]>,
) {
    let dim = tree.dim();
    let b = tree.b();
    let ndim = dim.axes();
    let meta = tree.meta(id).clone();
    let parent_id = match meta.parent {
        Some(p) => p,
        None => return,
    };
    let parent_meta = tree.meta(parent_id).clone();
    let coarse_nb_id = match parent_meta.neighbors[face] {
        Neighbor::Id(nb_id) => nb_id,
        _ => return,
    };
    let child_index = parent_meta.children.iter().position(|&c| c == id).expect("id is a child of its parent");
    let offset = child_offset(dim, child_index);
    let axis = axis_of(face);
    let perp: Vec<usize> = (0..ndim).filter(|&a| a != axis).collect();

    // The coarse neighbor's own face toward this child's parent is the reverse of the
    // child's face (they sit on opposite sides of the same boundary), so its adjacent
    // interior layer is `interior1_axis_val` evaluated at that reversed face.
    let coarse_face_val = interior1_axis_val(rev_face(face), b);
    let fine_ghost_val = ghost_axis_val(face, b);
    let fine_i1_val = interior1_axis_val(face, b);
    let fine_i2_val = interior2_axis_val(face, b);

    match RbStencil::for_dim(dim) {
        RbStencil::ThreePointTwoD => {
            let pa = perp[0];
            for i in 0..b {
                let ci = rb::coarse_inplane_index(i, offset[pa], b);
                let c = coarse_value(remote_slab, store, coarse_nb_id, v, ndim, axis, coarse_face_val, &perp, &[ci], b);

                let mut x1_idx = vec![0usize; ndim];
                x1_idx[axis] = fine_i1_val;
                x1_idx[pa] = i + 1;
                let x1 = store.cc(id, v)[IxDyn(&x1_idx)];

                let shifted = rb::parity_shift(i, b);
                let mut perp1_idx = x1_idx.clone();
                perp1_idx[pa] = shifted + 1;
                let x_perp1 = store.cc(id, v)[IxDyn(&perp1_idx)];
                let mut perp2_idx = perp1_idx.clone();
                perp2_idx[axis] = fine_i2_val;
                let x_perp2 = store.cc(id, v)[IxDyn(&perp2_idx)];

                let ghost_val = rb::reconstruct_2d(c, x1, x_perp1, x_perp2);
                let mut g_idx = vec![0usize; ndim];
                g_idx[axis] = fine_ghost_val;
                g_idx[pa] = i + 1;
                store.cc_mut(id, v)[IxDyn(&g_idx)] = ghost_val;
            }
        }
        RbStencil::TwoPointThreeD => {
            let (pa, pb) = (perp[0], perp[1]);
            for i in 0..b {
                for j in 0..b {
                    let ci = rb::coarse_inplane_index(i, offset[pa], b);
                    let cj = rb::coarse_inplane_index(j, offset[pb], b);
                    let c = coarse_value(
                        remote_slab,
                        store,
                        coarse_nb_id,
                        v,
                        ndim,
                        axis,
                        coarse_face_val,
                        &perp,
                        &[ci, cj],
                        b,
                    );

                    let mut x1_idx = vec![0usize; ndim];
                    x1_idx[axis] = fine_i1_val;
                    x1_idx[pa] = i + 1;
                    x1_idx[pb] = j + 1;
                    let x1 = store.cc(id, v)[IxDyn(&x1_idx)];

                    let si = rb::parity_shift(i, b);
                    let sj = rb::parity_shift(j, b);
                    let mut diag_idx = x1_idx.clone();
                    diag_idx[pa] = si + 1;
                    diag_idx[pb] = sj + 1;
                    let x_diag = store.cc(id, v)[IxDyn(&diag_idx)];

                    let ghost_val = rb::reconstruct_3d(c, x1, x_diag);
                    let mut g_idx = vec![0usize; ndim];
                    g_idx[axis] = fine_ghost_val;
                    g_idx[pa] = i + 1;
                    g_idx[pb] = j + 1;
                    store.cc_mut(id, v)[IxDyn(&g_idx)] = ghost_val;
                }
            }
        }
    }
}
