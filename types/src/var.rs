/// Closed enumeration of the per-cell variables a block stores. Kept small and
/// compile-time checked rather than a loose integer index so the operator and the MG
/// driver can only ever touch the variables they declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Var {
    /// The unknown, φ.
    Phi,
    /// The right-hand side, ρ.
    Rho,
    /// The residual, ρ − Lφ.
    Res,
    /// Pre-correction snapshot of φ, used by the coarse-grid correction.
    Old,
}

pub const NUM_VARS: usize = 4;

impl Var {
    pub const ALL: [Var; NUM_VARS] = [Var::Phi, Var::Rho, Var::Res, Var::Old];

    pub const fn index(self) -> usize {
        match self {
            Var::Phi => 0,
            Var::Rho => 1,
            Var::Res => 2,
            Var::Old => 3,
        }
    }
}
