use mg_numerics::NumericsError;
use mg_transport::TransportError;
use thiserror::Error;

/// Every one of these is fatal and propagates with `?` to the CLI's `main`: the core
/// does not retry, does not continue past a structural violation, and never returns a
/// partial success.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("level {level} is out of range [{min}, {max}]")]
    LevelOutOfRange { level: u32, min: u32, max: u32 },

    #[error("block {0} is not owned by this rank")]
    NotOwned(mg_types::BlockId),

    #[error("level 1 is partially owned by rank {rank}: {owned} of {total} blocks")]
    PartialCoarseOwnership {
        rank: mg_types::RankId,
        owned: usize,
        total: usize,
    },

    #[error("no boundary entry registered for face {face} of block {block}")]
    MissingBoundaryEntry { block: mg_types::BlockId, face: usize },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Numerics(#[from] NumericsError),
}
