use std::fmt;
use std::sync::Arc;

/// Kind of physical boundary condition applied to a (face, variable) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    Dirichlet,
    Neumann,
    Continuous,
}

/// Either a constant boundary datum or a callback evaluated at the ghost cell's
/// physical coordinate (`[x, y, z]`, z unused in 2D).
#[derive(Clone)]
pub enum BoundaryValue {
    Scalar(f64),
    Callback(Arc<dyn Fn([f64; 3]) -> f64 + Send + Sync>),
}

impl fmt::Debug for BoundaryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryValue::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            BoundaryValue::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

impl BoundaryValue {
    pub fn evaluate(&self, coord: [f64; 3]) -> f64 {
        match self {
            BoundaryValue::Scalar(v) => *v,
            BoundaryValue::Callback(cb) => cb(coord),
        }
    }
}

/// A registered boundary condition for one (face, variable) pair.
#[derive(Debug, Clone)]
pub struct BoundaryEntry {
    pub kind: BoundaryKind,
    pub datum: BoundaryValue,
}

impl BoundaryEntry {
    pub fn dirichlet(value: f64) -> Self {
        Self {
            kind: BoundaryKind::Dirichlet,
            datum: BoundaryValue::Scalar(value),
        }
    }

    pub fn neumann(derivative: f64) -> Self {
        Self {
            kind: BoundaryKind::Neumann,
            datum: BoundaryValue::Scalar(derivative),
        }
    }

    pub fn continuous() -> Self {
        Self {
            kind: BoundaryKind::Continuous,
            datum: BoundaryValue::Scalar(0.0),
        }
    }

    pub fn dirichlet_fn(f: impl Fn([f64; 3]) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            kind: BoundaryKind::Dirichlet,
            datum: BoundaryValue::Callback(Arc::new(f)),
        }
    }
}
