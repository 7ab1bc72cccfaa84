use mg_types::RankId;
use thiserror::Error;

/// Transport failures are always fatal to the core: a failed peer or message is a
/// process-wide abort, never a retry.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("peer rank {0} is not part of this transport's cluster")]
    UnknownPeer(RankId),
    #[error("channel to/from peer rank {0} has been closed")]
    ChannelClosed(RankId),
    #[error("received {received} floats from peer {peer}, expected {expected}")]
    SizeMismatch {
        peer: RankId,
        expected: usize,
        received: usize,
    },
}
