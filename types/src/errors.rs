use thiserror::Error;

/// Errors raised while constructing domain values. These are all structural: they
/// indicate the tree/partitioner handed the core malformed topology, which is a fatal
/// precondition violation rather than something the core can recover from.
#[derive(Error, Debug, Eq, PartialEq)]
pub enum TypesError {
    #[error("block metadata declares {found} children, expected {expected} for this dimension")]
    ChildCountMismatch { found: usize, expected: usize },
    #[error("block metadata declares {found} neighbor faces, expected {expected} for this dimension")]
    NeighborCountMismatch { found: usize, expected: usize },
}
