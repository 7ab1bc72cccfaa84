//! Point-to-point send/recv transport abstraction plus the per-rank buffer pool the
//! ghost-cell engine stages halo records through. The core is compiled only against
//! the `Transport` trait; `ChannelTransport` is this workspace's one implementation,
//! standing in for a real network library.

pub mod channel;
pub mod errors;
pub mod pool;

pub use channel::ChannelTransport;
pub use errors::TransportError;
pub use pool::{BufferPool, DryRunCounters};

use mg_types::RankId;

/// Narrow point-to-point messaging interface the ghost-cell engine is compiled
/// against: one send, one recv, one collective barrier. No handshake primitive is
/// offered deliberately — both sides precompute exact sizes from the dry-run pass.
pub trait Transport: Send + Sync {
    fn send(&self, peer: RankId, bytes: &[f64]) -> Result<(), TransportError>;
    fn recv_into(&self, peer: RankId, out: &mut [f64]) -> Result<(), TransportError>;
    fn barrier(&self) -> Result<(), TransportError>;
    fn my_rank(&self) -> RankId;
    fn n_ranks(&self) -> usize;
}
