use crate::dim::Dim;
use crate::errors::TypesError;

pub type BlockId = u64;
pub type RankId = u32;

/// A face's neighbor slot. `Id` is a valid same-level block id; the two sentinels share
/// the slot with real ids so a face can be told apart from a valid neighbor at a glance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighbor {
    /// A same-level block, possibly on a different rank.
    Id(BlockId),
    /// The face abuts a coarser region: a refinement boundary as seen from the fine side.
    NoBox,
    /// The face abuts the domain boundary.
    Physical,
}

impl Neighbor {
    pub fn same_level_id(self) -> Option<BlockId> {
        match self {
            Neighbor::Id(id) => Some(id),
            Neighbor::NoBox | Neighbor::Physical => None,
        }
    }

    pub fn is_refinement_boundary(self) -> bool {
        matches!(self, Neighbor::NoBox)
    }

    pub fn is_physical_boundary(self) -> bool {
        matches!(self, Neighbor::Physical)
    }
}

/// Topology of one block: everything the tree/partitioner fixes before the solver runs.
/// Cell data itself lives in the block store, not here — a block's `cc` contents are the
/// only thing the core is allowed to mutate.
#[derive(Debug, Clone)]
pub struct BlockMeta {
    pub id: BlockId,
    pub rank: RankId,
    pub lvl: u32,
    pub parent: Option<BlockId>,
    /// Empty when this block has no children (a leaf of the refinement tree).
    pub children: Vec<BlockId>,
    /// Always has exactly `dim.num_faces()` entries, in face order
    /// low-x, high-x, low-y, high-y, [low-z, high-z].
    pub neighbors: Vec<Neighbor>,
}

impl BlockMeta {
    pub fn new(
        dim: Dim,
        id: BlockId,
        rank: RankId,
        lvl: u32,
        parent: Option<BlockId>,
        children: Vec<BlockId>,
        neighbors: Vec<Neighbor>,
    ) -> Result<Self, TypesError> {
        if !children.is_empty() && children.len() != dim.num_children() {
            return Err(TypesError::ChildCountMismatch {
                found: children.len(),
                expected: dim.num_children(),
            });
        }
        if neighbors.len() != dim.num_faces() {
            return Err(TypesError::NeighborCountMismatch {
                found: neighbors.len(),
                expected: dim.num_faces(),
            });
        }
        Ok(Self {
            id,
            rank,
            lvl,
            parent,
            children,
            neighbors,
        })
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// One refinement level: the global ordered id sequence plus the per-rank derived views
/// the ghost engine and the MG driver iterate over.
#[derive(Debug, Clone, Default)]
pub struct Level {
    /// All block ids at this level, across every rank, in ascending order.
    pub ids: Vec<BlockId>,
    /// Blocks this rank owns at this level.
    pub my_ids: Vec<BlockId>,
    /// Owned blocks whose face touches a refined child at level + 1.
    pub my_ref_bnds: Vec<BlockId>,
    /// Owned blocks that have any children at level + 1.
    pub my_parents: Vec<BlockId>,
}
