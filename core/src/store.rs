//! Flat block store: cell data for every block this process knows about, keyed by
//! integer id. Topology (`BlockMeta`) lives in `mg_types` and is immutable once built;
//! this store is the only thing the core is allowed to mutate.

use std::collections::HashMap;

use mg_types::{BlockId, Dim, Var, NUM_VARS};
use ndarray::{ArrayD, Dimension, IxDyn};

/// One block's cell data: `NUM_VARS` arrays of shape `(B+2)^D`, logical index range
/// `[0, B+1]` per axis with interior `[1, B]`.
#[derive(Debug, Clone)]
pub struct BlockData {
    cc: [ArrayD<f64>; NUM_VARS],
}

impl BlockData {
    fn zeros(dim: Dim, b: usize) -> Self {
        let shape = vec![b + 2; dim.axes()];
        Self {
            cc: std::array::from_fn(|_| ArrayD::zeros(IxDyn(&shape))),
        }
    }

    pub fn var(&self, v: Var) -> &ArrayD<f64> {
        &self.cc[v.index()]
    }

    pub fn var_mut(&mut self, v: Var) -> &mut ArrayD<f64> {
        &mut self.cc[v.index()]
    }
}

/// Owns every block's `cc` data this process holds — its own blocks plus any ghost
/// copies shipped in from remote neighbors during an exchange. Every block known to the
/// tree is allocated up front so the ghost engine never has to branch on presence.
pub struct BlockStore {
    dim: Dim,
    b: usize,
    blocks: HashMap<BlockId, BlockData>,
}

impl BlockStore {
    pub fn new(dim: Dim, b: usize, ids: impl IntoIterator<Item = BlockId>) -> Self {
        let blocks = ids.into_iter().map(|id| (id, BlockData::zeros(dim, b))).collect();
        Self { dim, b, blocks }
    }

    pub fn dim(&self) -> Dim {
        self.dim
    }

    pub fn b(&self) -> usize {
        self.b
    }

    pub fn block(&self, id: BlockId) -> &BlockData {
        self.blocks.get(&id).unwrap_or_else(|| panic!("block {id} not present in store"))
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BlockData {
        self.blocks.get_mut(&id).unwrap_or_else(|| panic!("block {id} not present in store"))
    }

    pub fn cc(&self, id: BlockId, v: Var) -> &ArrayD<f64> {
        self.block(id).var(v)
    }

    pub fn cc_mut(&mut self, id: BlockId, v: Var) -> &mut ArrayD<f64> {
        self.block_mut(id).var_mut(v)
    }

    /// The full interior sub-array `[1, B]^D` for `v`, as an owned copy (used by
    /// restriction/prolongation, which operate on contiguous dimension-generic arrays).
    pub fn interior(&self, id: BlockId, v: Var) -> ArrayD<f64> {
        let b = self.b;
        let ndim = self.dim.axes();
        ArrayD::from_shape_fn(IxDyn(&vec![b; ndim]), |idx| {
            let mut full = vec![0usize; ndim];
            for (axis, slot) in full.iter_mut().enumerate() {
                *slot = idx.slice()[axis] + 1;
            }
            self.cc(id, v)[IxDyn(&full)]
        })
    }

    /// Writes an interior-shaped `(B)^D` array back into `[1, B]^D` of `v`.
    pub fn set_interior(&mut self, id: BlockId, v: Var, values: &ArrayD<f64>) {
        let ndim = self.dim.axes();
        let arr = self.cc_mut(id, v);
        for (idx, &val) in values.indexed_iter() {
            let mut full = vec![0usize; ndim];
            for (axis, slot) in full.iter_mut().enumerate() {
                *slot = idx.slice()[axis] + 1;
            }
            arr[IxDyn(&full)] = val;
        }
    }

    /// Adds an interior-shaped `(B)^D` correction into `[1, B]^D` of `v` (the additive
    /// semantics the coarse-grid correction requires).
    pub fn add_interior(&mut self, id: BlockId, v: Var, correction: &ArrayD<f64>) {
        let ndim = self.dim.axes();
        let arr = self.cc_mut(id, v);
        for (idx, &val) in correction.indexed_iter() {
            let mut full = vec![0usize; ndim];
            for (axis, slot) in full.iter_mut().enumerate() {
                *slot = idx.slice()[axis] + 1;
            }
            arr[IxDyn(&full)] += val;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_store_is_zeroed_and_sized() {
        let store = BlockStore::new(Dim::D2, 4, [0, 1]);
        let cc = store.cc(0, Var::Phi);
        assert_eq!(cc.shape(), &[6, 6]);
        assert!(cc.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn interior_round_trips_through_set_interior() {
        let mut store = BlockStore::new(Dim::D2, 2, [0]);
        let values = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        store.set_interior(0, Var::Phi, &values);
        assert_eq!(store.interior(0, Var::Phi), values);
        assert_eq!(store.cc(0, Var::Phi)[IxDyn(&[0, 0])], 0.0);
    }

    #[test]
    fn add_interior_accumulates() {
        let mut store = BlockStore::new(Dim::D2, 2, [0]);
        let ones = ArrayD::from_elem(IxDyn(&[2, 2]), 1.0);
        store.add_interior(0, Var::Phi, &ones);
        store.add_interior(0, Var::Phi, &ones);
        assert!(store.interior(0, Var::Phi).iter().all(|&v| v == 2.0));
    }
}
