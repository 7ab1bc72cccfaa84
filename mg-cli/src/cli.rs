use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use mg_core::{Smoother, SolverConfig};

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Assembles the scenario's tree, spawns one task per simulated rank, and runs it
    /// to completion, reporting residuals as JSON.
    RunScenario(ScenarioCommand),
}

#[derive(Args, Debug, Clone)]
pub struct ScenarioCommand {
    /// Which canonical end-to-end scenario to run.
    #[arg(value_enum)]
    pub scenario: ScenarioName,
    #[clap(flatten)]
    pub config: ScenarioConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioName {
    /// Single-level 1x1 block, flat Dirichlet(0), rho=1.
    S1,
    /// Two-level tree, manufactured sin(pi x) sin(pi y) solution.
    S2,
    /// Halo symmetry check on a 4x4 level-2 block grid.
    S3,
    /// Cross-rank determinism: S2's tree run on 1 rank vs 4 ranks.
    S4,
    /// Boundary-condition sweep: Dirichlet/Neumann/Continuous on a flat field.
    S5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SmootherArg {
    Jacobi,
    GaussSeidel,
    GaussSeidelRedBlack,
}

impl From<SmootherArg> for Smoother {
    fn from(s: SmootherArg) -> Self {
        match s {
            SmootherArg::Jacobi => Smoother::Jacobi,
            SmootherArg::GaussSeidel => Smoother::GaussSeidel,
            SmootherArg::GaussSeidelRedBlack => Smoother::GaussSeidelRedBlack,
        }
    }
}

/// Mirrors the teacher's `ServerConfig`/`CommandLineConfig` split: one `clap::Args`
/// struct, flattened into the subcommand, with a `Default` impl matching the struct
/// literal so library callers (and tests) don't have to go through argv.
#[derive(Args, Debug, Clone)]
pub struct ScenarioConfig {
    /// Block linear size B.
    #[arg(long, default_value_t = 8)]
    pub b: usize,

    /// Number of simulated ranks the tree is partitioned across.
    #[arg(long, default_value_t = 1)]
    pub ranks: usize,

    /// Relaxation sweep kind used by the smoother.
    #[arg(long, value_enum, default_value_t = SmootherArg::GaussSeidelRedBlack)]
    pub smoother: SmootherArg,

    #[arg(long, default_value_t = 2)]
    pub n_cycle_down: usize,

    #[arg(long, default_value_t = 2)]
    pub n_cycle_up: usize,

    #[arg(long, default_value_t = 50)]
    pub max_coarse_cycles: usize,

    #[arg(long, default_value_t = 1e-10)]
    pub residual_coarse_rel: f64,

    #[arg(long, default_value_t = 1e-12)]
    pub residual_coarse_abs: f64,

    /// Use the direct (DST) coarse solve instead of iterative sweeps when the
    /// coarsest level is a single block.
    #[arg(long, action = ArgAction::SetTrue)]
    pub use_direct_coarse_solve: bool,

    /// Tracing/log level, e.g. "info", "debug", "trace".
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            b: 8,
            ranks: 1,
            smoother: SmootherArg::GaussSeidelRedBlack,
            n_cycle_down: 2,
            n_cycle_up: 2,
            max_coarse_cycles: 50,
            residual_coarse_rel: 1e-10,
            residual_coarse_abs: 1e-12,
            use_direct_coarse_solve: false,
            log_level: String::from("info"),
        }
    }
}

impl ScenarioConfig {
    pub fn solver_config(&self) -> SolverConfig {
        SolverConfig {
            smoother: self.smoother.into(),
            n_cycle_down: self.n_cycle_down,
            n_cycle_up: self.n_cycle_up,
            max_coarse_cycles: self.max_coarse_cycles,
            residual_coarse_rel: self.residual_coarse_rel,
            residual_coarse_abs: self.residual_coarse_abs,
            use_direct_coarse_solve: self.use_direct_coarse_solve,
        }
    }
}
