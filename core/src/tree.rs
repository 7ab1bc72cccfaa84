//! Tree index: the block topology (`BlockMeta`) plus the per-level, per-rank derived
//! views (`Level`) the ghost engine and driver iterate over. Built once per rank by
//! the partitioner fixtures below — a real partitioner is an external collaborator this
//! repository does not implement.

use std::collections::HashMap;
use std::sync::Arc;

use mg_types::geom::{axis_of, child_offset, is_low_face};
use mg_types::{BlockId, BlockMeta, Dim, Level, Neighbor, RankId};

/// Physical domain is always the unit cube/square; block linear size `B` is uniform per
/// level so spacing halves once per level: `dr(lvl) = 1 / (B * 2^lvl)`.
pub struct Tree {
    dim: Dim,
    b: usize,
    my_rank: RankId,
    n_ranks: usize,
    lowest_lvl: u32,
    highest_lvl: u32,
    meta: Arc<HashMap<BlockId, BlockMeta>>,
    levels: Vec<Level>,
    origins: Arc<HashMap<BlockId, [f64; 3]>>,
}

impl Tree {
    pub fn dim(&self) -> Dim {
        self.dim
    }

    pub fn b(&self) -> usize {
        self.b
    }

    pub fn my_rank(&self) -> RankId {
        self.my_rank
    }

    pub fn n_ranks(&self) -> usize {
        self.n_ranks
    }

    pub fn lowest_lvl(&self) -> u32 {
        self.lowest_lvl
    }

    pub fn highest_lvl(&self) -> u32 {
        self.highest_lvl
    }

    pub fn dr(&self, lvl: u32) -> f64 {
        1.0 / (self.b as f64 * (1u64 << lvl) as f64)
    }

    pub fn meta(&self, id: BlockId) -> &BlockMeta {
        self.meta.get(&id).unwrap_or_else(|| panic!("block {id} not present in tree"))
    }

    pub fn level(&self, lvl: u32) -> &Level {
        &self.levels[lvl as usize]
    }

    /// Every block id known anywhere in the tree (used to size the block store).
    pub fn all_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.meta.keys().copied()
    }

    /// Physical coordinate of this block's low corner in the unit cube/square, `z`
    /// unused outside `Dim::D3`. Used only to evaluate position-dependent boundary
    /// callbacks; the core otherwise never needs absolute coordinates.
    pub fn origin(&self, id: BlockId) -> [f64; 3] {
        self.origins[&id]
    }
}

/// Fills in same-level neighbors for every block at `lvl` from `grid_to_id`: a grid cell
/// outside the domain extent is `Physical`; a grid cell inside the extent but absent from
/// this level's grid map is a refinement boundary (`NoBox`) as seen from the fine side —
/// the region is occupied by a coarser block instead. This is what lets a sparse (partial
/// refinement) level produce real `NoBox` faces while a dense (uniform) level never does.
fn fill_same_level_neighbors(
    dim: Dim,
    meta: &mut HashMap<BlockId, BlockMeta>,
    grid_map: &HashMap<[i64; 3], BlockId>,
    id_to_grid: &HashMap<BlockId, [i64; 3]>,
    ids: &[BlockId],
    lvl: u32,
) {
    let extent = 1i64 << lvl;
    for &id in ids {
        let grid = id_to_grid[&id];
        let mut neighbors = Vec::with_capacity(dim.num_faces());
        for face in 0..dim.num_faces() {
            let axis = axis_of(face);
            let delta = if is_low_face(face) { -1 } else { 1 };
            let mut nb_grid = grid;
            nb_grid[axis] += delta;
            if nb_grid[axis] < 0 || nb_grid[axis] >= extent {
                neighbors.push(Neighbor::Physical);
            } else if let Some(&nb_id) = grid_map.get(&nb_grid) {
                neighbors.push(Neighbor::Id(nb_id));
            } else {
                neighbors.push(Neighbor::NoBox);
            }
        }
        meta.get_mut(&id).unwrap().neighbors = neighbors;
    }
}

/// An owned block belongs in its level's `my_ref_bnds` iff it has no children of its own
/// but sits next to a same-level neighbor that does — exactly the blocks whose ghost data
/// a fine neighbor's children will need to reconstruct a `NoBox` face from. A block that
/// is itself refined never qualifies: its neighbor's children see *its* children as an
/// ordinary same-level `Id`, never `NoBox`, so shipping data for them would be pure waste
/// and, worse, would desynchronize the receiver's expected record count (§4.2.1).
fn compute_ref_bnds(meta: &HashMap<BlockId, BlockMeta>, ids: &[BlockId], my_rank: RankId) -> Vec<BlockId> {
    let mut bnds: Vec<BlockId> = ids
        .iter()
        .copied()
        .filter(|id| meta[id].rank == my_rank && !meta[id].has_children())
        .filter(|id| {
            meta[id]
                .neighbors
                .iter()
                .any(|n| matches!(n, Neighbor::Id(nb) if meta[nb].has_children()))
        })
        .collect();
    bnds.sort_unstable();
    bnds
}

fn assemble_levels(
    dim: Dim,
    b: usize,
    n_ranks: usize,
    lowest_lvl: u32,
    highest_lvl: u32,
    meta: Arc<HashMap<BlockId, BlockMeta>>,
    ids_per_level: &[Vec<BlockId>],
    origins: Arc<HashMap<BlockId, [f64; 3]>>,
) -> Vec<Tree> {
    (0..n_ranks)
        .map(|rank| {
            let my_rank = rank as RankId;
            let levels = ids_per_level
                .iter()
                .map(|ids| {
                    let my_ids: Vec<BlockId> =
                        ids.iter().copied().filter(|id| meta[id].rank == my_rank).collect();
                    let my_parents: Vec<BlockId> =
                        my_ids.iter().copied().filter(|id| meta[id].has_children()).collect();
                    let my_ref_bnds = compute_ref_bnds(&meta, ids, my_rank);
                    Level {
                        ids: ids.clone(),
                        my_ids,
                        my_ref_bnds,
                        my_parents,
                    }
                })
                .collect();
            Tree {
                dim,
                b,
                my_rank,
                n_ranks,
                lowest_lvl,
                highest_lvl,
                meta: meta.clone(),
                levels,
                origins: origins.clone(),
            }
        })
        .collect()
}

/// Breadth-first dense quad/oct-tree: one root at level 0, every block at level `lvl`
/// fully refined into `2^D` children through level `root_refined_levels`. Ownership is
/// round-robin over `n_ranks` in ascending id order, except level 0, which rank 0 always
/// owns in full (the structural invariant the coarse solve depends on). Because every
/// region is refined to the same depth, every level's grid map is dense and no face is
/// ever a refinement boundary — this fixture cannot express partial refinement; use
/// `build_partial_refinement_tree` for that.
pub fn build_uniform_tree(dim: Dim, b: usize, root_refined_levels: u32, n_ranks: usize) -> Vec<Tree> {
    assert!(n_ranks > 0, "a tree needs at least one rank");
    let side = dim.axes();

    let mut meta: HashMap<BlockId, BlockMeta> = HashMap::new();
    let mut id_to_grid: HashMap<BlockId, [i64; 3]> = HashMap::new();
    let mut grid_to_id: Vec<HashMap<[i64; 3], BlockId>> = Vec::new();
    let mut ids_per_level: Vec<Vec<BlockId>> = Vec::new();
    let mut next_id: BlockId = 0;

    // Level 0: single root block at grid coordinate (0,0,0).
    let root_id = next_id;
    next_id += 1;
    grid_to_id.push(HashMap::from([([0, 0, 0], root_id)]));
    id_to_grid.insert(root_id, [0, 0, 0]);
    ids_per_level.push(vec![root_id]);
    meta.insert(
        root_id,
        BlockMeta::new(dim, root_id, 0, 0, None, vec![], vec![Neighbor::Physical; dim.num_faces()]).unwrap(),
    );

    for lvl in 1..=root_refined_levels {
        let mut grid_map = HashMap::new();
        let mut ids = Vec::new();
        let parent_ids = ids_per_level[(lvl - 1) as usize].clone();
        for &parent_id in &parent_ids {
            let parent_grid = id_to_grid[&parent_id];
            let mut children = Vec::with_capacity(dim.num_children());
            for child_idx in 0..dim.num_children() {
                let id = next_id;
                next_id += 1;
                let offset = child_offset(dim, child_idx);
                let mut grid = [0i64; 3];
                for axis in 0..side {
                    grid[axis] = parent_grid[axis] * 2 + offset[axis] as i64;
                }
                grid_map.insert(grid, id);
                id_to_grid.insert(id, grid);
                ids.push(id);
                children.push(id);
                meta.insert(
                    id,
                    BlockMeta::new(dim, id, 0, lvl, Some(parent_id), vec![], vec![Neighbor::Physical; dim.num_faces()])
                        .unwrap(),
                );
            }
            meta.get_mut(&parent_id).unwrap().children = children;
        }
        grid_to_id.push(grid_map);
        ids_per_level.push(ids);
    }

    for lvl in 0..=root_refined_levels {
        let ids = ids_per_level[lvl as usize].clone();
        fill_same_level_neighbors(dim, &mut meta, &grid_to_id[lvl as usize], &id_to_grid, &ids, lvl);
    }

    // Ownership: round-robin over ranks by ascending id, except level 0 which rank 0
    // owns outright.
    let mut flat_non_root: Vec<BlockId> = ids_per_level[1..].iter().flatten().copied().collect();
    flat_non_root.sort_unstable();
    for (i, id) in flat_non_root.iter().enumerate() {
        meta.get_mut(id).unwrap().rank = (i % n_ranks) as RankId;
    }

    let mut origins: HashMap<BlockId, [f64; 3]> = HashMap::new();
    for (lvl, ids) in ids_per_level.iter().enumerate() {
        let extent = (1u64 << lvl) as f64;
        for &id in ids {
            let grid = id_to_grid[&id];
            let mut origin = [0.0; 3];
            for axis in 0..side {
                origin[axis] = grid[axis] as f64 / extent;
            }
            origins.insert(id, origin);
        }
    }

    let origins = Arc::new(origins);
    let meta = Arc::new(meta);
    assemble_levels(dim, b, n_ranks, 0, root_refined_levels, meta, &ids_per_level, origins)
}

/// Partitioner fixture producing one actual refinement boundary: the root refines
/// uniformly to level 1, then only its low-corner child (grid origin `(0,…,0)`) refines
/// once more to level 2. Every level-2 face that would otherwise look at a level-1
/// sibling outside that child's footprint is `NoBox` instead, and the level-1 siblings
/// bordering the refined child end up in `level(1).my_ref_bnds` — the shape §4.2 needs to
/// actually exercise the refinement-boundary subsystem end to end.
pub fn build_partial_refinement_tree(dim: Dim, b: usize, n_ranks: usize) -> Vec<Tree> {
    assert!(n_ranks > 0, "a tree needs at least one rank");
    let side = dim.axes();

    let mut meta: HashMap<BlockId, BlockMeta> = HashMap::new();
    let mut id_to_grid: HashMap<BlockId, [i64; 3]> = HashMap::new();
    let mut grid_to_id: Vec<HashMap<[i64; 3], BlockId>> = Vec::new();
    let mut ids_per_level: Vec<Vec<BlockId>> = Vec::new();
    let mut next_id: BlockId = 0;

    let root_id = next_id;
    next_id += 1;
    grid_to_id.push(HashMap::from([([0, 0, 0], root_id)]));
    id_to_grid.insert(root_id, [0, 0, 0]);
    ids_per_level.push(vec![root_id]);
    meta.insert(
        root_id,
        BlockMeta::new(dim, root_id, 0, 0, None, vec![], vec![Neighbor::Physical; dim.num_faces()]).unwrap(),
    );

    // Level 1: refine the root uniformly, exactly as build_uniform_tree's first step.
    let mut lvl1_grid_map = HashMap::new();
    let mut lvl1_ids = Vec::new();
    let mut lvl1_children = Vec::with_capacity(dim.num_children());
    for child_idx in 0..dim.num_children() {
        let id = next_id;
        next_id += 1;
        let offset = child_offset(dim, child_idx);
        let mut grid = [0i64; 3];
        for axis in 0..side {
            grid[axis] = offset[axis] as i64;
        }
        lvl1_grid_map.insert(grid, id);
        id_to_grid.insert(id, grid);
        lvl1_ids.push(id);
        lvl1_children.push(id);
        meta.insert(
            id,
            BlockMeta::new(dim, id, 0, 1, Some(root_id), vec![], vec![Neighbor::Physical; dim.num_faces()]).unwrap(),
        );
    }
    meta.get_mut(&root_id).unwrap().children = lvl1_children;
    grid_to_id.push(lvl1_grid_map.clone());
    ids_per_level.push(lvl1_ids.clone());

    // Level 2: refine only the low-corner level-1 child (grid (0,…,0)) into its own
    // children. Every other level-1 block stays a leaf, so the level-2 grid map only
    // covers a quarter (2D) / eighth (3D) of the full level-2 extent.
    let refined_parent = lvl1_grid_map[&[0i64; 3]];
    let mut lvl2_grid_map = HashMap::new();
    let mut lvl2_ids = Vec::new();
    let mut lvl2_children = Vec::with_capacity(dim.num_children());
    let parent_grid = id_to_grid[&refined_parent];
    for child_idx in 0..dim.num_children() {
        let id = next_id;
        next_id += 1;
        let offset = child_offset(dim, child_idx);
        let mut grid = [0i64; 3];
        for axis in 0..side {
            grid[axis] = parent_grid[axis] * 2 + offset[axis] as i64;
        }
        lvl2_grid_map.insert(grid, id);
        id_to_grid.insert(id, grid);
        lvl2_ids.push(id);
        lvl2_children.push(id);
        meta.insert(
            id,
            BlockMeta::new(dim, id, 0, 2, Some(refined_parent), vec![], vec![Neighbor::Physical; dim.num_faces()])
                .unwrap(),
        );
    }
    meta.get_mut(&refined_parent).unwrap().children = lvl2_children;
    grid_to_id.push(lvl2_grid_map);
    ids_per_level.push(lvl2_ids);

    fill_same_level_neighbors(dim, &mut meta, &grid_to_id[0], &id_to_grid, &ids_per_level[0], 0);
    fill_same_level_neighbors(dim, &mut meta, &grid_to_id[1], &id_to_grid, &ids_per_level[1], 1);
    fill_same_level_neighbors(dim, &mut meta, &grid_to_id[2], &id_to_grid, &ids_per_level[2], 2);

    let mut flat_non_root: Vec<BlockId> = ids_per_level[1..].iter().flatten().copied().collect();
    flat_non_root.sort_unstable();
    for (i, id) in flat_non_root.iter().enumerate() {
        meta.get_mut(id).unwrap().rank = (i % n_ranks) as RankId;
    }

    let mut origins: HashMap<BlockId, [f64; 3]> = HashMap::new();
    for (lvl, ids) in ids_per_level.iter().enumerate() {
        let extent = (1u64 << lvl) as f64;
        for &id in ids {
            let grid = id_to_grid[&id];
            let mut origin = [0.0; 3];
            for axis in 0..side {
                origin[axis] = grid[axis] as f64 / extent;
            }
            origins.insert(id, origin);
        }
    }

    let origins = Arc::new(origins);
    let meta = Arc::new(meta);
    assemble_levels(dim, b, n_ranks, 0, 2, meta, &ids_per_level, origins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mg_types::Neighbor;

    #[test]
    fn single_root_has_no_children_and_physical_faces() {
        let trees = build_uniform_tree(Dim::D2, 4, 0, 1);
        let tree = &trees[0];
        let root = tree.meta(0);
        assert!(!root.has_children());
        assert!(root.neighbors.iter().all(|n| matches!(n, Neighbor::Physical)));
    }

    #[test]
    fn one_refinement_level_gives_four_children_with_sibling_neighbors() {
        let trees = build_uniform_tree(Dim::D2, 4, 1, 1);
        let tree = &trees[0];
        assert_eq!(tree.meta(0).children.len(), 4);
        assert_eq!(tree.level(1).ids.len(), 4);
        // child 0 is the low-x,low-y quadrant: its high-x neighbor is a sibling, its
        // low-x/low-y faces are physical.
        let child0 = tree.meta(tree.meta(0).children[0]);
        assert!(matches!(child0.neighbors[0], Neighbor::Physical)); // low-x
        assert!(matches!(child0.neighbors[1], Neighbor::Id(_))); // high-x sibling
        assert!(matches!(child0.neighbors[2], Neighbor::Physical)); // low-y
    }

    #[test]
    fn level_zero_is_owned_entirely_by_rank_zero() {
        let trees = build_uniform_tree(Dim::D3, 2, 2, 4);
        for tree in &trees {
            if tree.my_rank() != 0 {
                assert!(tree.level(0).my_ids.is_empty());
            } else {
                assert_eq!(tree.level(0).my_ids, vec![0]);
            }
        }
    }

    #[test]
    fn ownership_is_round_robin_and_covers_every_block() {
        let trees = build_uniform_tree(Dim::D2, 2, 2, 3);
        let mut seen = std::collections::HashSet::new();
        for tree in &trees {
            for lvl in 0..=tree.highest_lvl() {
                for &id in &tree.level(lvl).my_ids {
                    assert!(seen.insert(id), "block {id} owned by more than one rank");
                }
            }
        }
        assert_eq!(seen.len(), trees[0].all_ids().count());
    }

    #[test]
    fn dr_halves_each_level() {
        let trees = build_uniform_tree(Dim::D2, 8, 2, 1);
        let tree = &trees[0];
        assert!((tree.dr(0) - 1.0 / 8.0).abs() < 1e-12);
        assert!((tree.dr(1) - 1.0 / 16.0).abs() < 1e-12);
        assert!((tree.dr(2) - 1.0 / 32.0).abs() < 1e-12);
    }

    #[test]
    fn uniform_tree_never_produces_a_refinement_boundary() {
        let trees = build_uniform_tree(Dim::D2, 4, 2, 1);
        let tree = &trees[0];
        for lvl in 0..=tree.highest_lvl() {
            assert!(tree.level(lvl).my_ref_bnds.is_empty());
            for &id in &tree.level(lvl).ids {
                assert!(tree.meta(id).neighbors.iter().all(|n| !n.is_refinement_boundary()));
            }
        }
    }

    #[test]
    fn partial_refinement_tree_produces_no_box_faces_on_the_fine_side() {
        let trees = build_partial_refinement_tree(Dim::D2, 4, 1);
        let tree = &trees[0];
        assert_eq!(tree.level(2).ids.len(), 4);

        let refined_parent = tree.meta(0).children[0];
        let lvl2_children = tree.meta(refined_parent).children.clone();
        assert_eq!(lvl2_children.len(), 4);

        // The refined region is one quarter of the level-2 domain, so only the
        // high-x,high-y grandchild (offset (1,1)) has both its outward faces border the
        // unrefined siblings; its low-x/low-y faces border the other two grandchildren
        // instead, so those stay ordinary same-level `Id` neighbors.
        let outer_corner = tree.meta(lvl2_children[3]);
        assert!(matches!(outer_corner.neighbors[0], Neighbor::Id(_)));
        assert!(matches!(outer_corner.neighbors[1], Neighbor::NoBox));
        assert!(matches!(outer_corner.neighbors[2], Neighbor::Id(_)));
        assert!(matches!(outer_corner.neighbors[3], Neighbor::NoBox));

        // The inner corner (offset (0,0)) sits entirely inside the refined quadrant: its
        // low faces hit the domain boundary and its high faces hit its own siblings, so
        // it never touches the refinement boundary at all.
        let inner_corner = tree.meta(lvl2_children[0]);
        assert!(inner_corner.neighbors.iter().all(|n| !n.is_refinement_boundary()));
    }

    #[test]
    fn partial_refinement_tree_populates_my_ref_bnds_on_the_coarse_side() {
        let trees = build_partial_refinement_tree(Dim::D2, 4, 1);
        let tree = &trees[0];
        let root_children = tree.meta(0).children.clone();
        let refined_parent = root_children[0];

        // Of the refined child's three level-1 siblings, only the two that are
        // face-adjacent to it (offsets (1,0) and (0,1)) ever see it as a same-level
        // neighbor with children; the diagonal sibling (offset (1,1)) never touches it
        // face-to-face in a 2x2 grid, so it has nothing to ship.
        assert!(tree.level(1).my_ref_bnds.contains(&root_children[1]));
        assert!(tree.level(1).my_ref_bnds.contains(&root_children[2]));
        assert!(!tree.level(1).my_ref_bnds.contains(&root_children[3]));
        assert!(!tree.level(1).my_ref_bnds.contains(&refined_parent));
    }
}
