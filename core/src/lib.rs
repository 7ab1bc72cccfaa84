//! The solver core: block storage, tree topology, ghost-cell exchange, the discrete
//! operator and smoothers, and the FAS multigrid driver tying them together. Compiled
//! only against `mg_types`, `mg_transport::Transport`, and `mg_numerics` — it never
//! constructs a transport or a tree itself; those are handed in by the caller (the CLI).

pub mod driver;
pub mod errors;
pub mod ghost;
pub mod op;
pub mod store;
pub mod tree;
pub mod util;

pub use driver::{CoarseSolveReport, Solver, SolverConfig};
pub use errors::SolverError;
pub use ghost::bc::{bc_to_gc, BoundaryRegistry};
pub use ghost::GhostEngine;
pub use op::{box_lpl, smooth_block, Smoother};
pub use store::{BlockData, BlockStore};
pub use tree::{build_uniform_tree, Tree};
