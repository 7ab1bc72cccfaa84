use thiserror::Error;

#[derive(Debug, Error)]
pub enum NumericsError {
    #[error("expected a {expected}-d array, got {got}-d")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("restrict/prolong operate on even block extents, got {0}")]
    OddBlockExtent(usize),

    #[error("direct coarse solve only supports Dirichlet boundaries")]
    UnsupportedBoundaryForDirectSolve,
}
