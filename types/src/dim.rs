/// Spatial dimensionality the solver is compiled for. Refinement ratio is always 2 and
/// block linear size `B` is uniform per level regardless of `Dim`; only the face/child
/// counts and stencils change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    D2,
    D3,
}

impl Dim {
    /// Number of spatial axes: 2 or 3.
    pub const fn axes(self) -> usize {
        match self {
            Dim::D2 => 2,
            Dim::D3 => 3,
        }
    }

    /// `num_neighbors = 2D`.
    pub const fn num_faces(self) -> usize {
        2 * self.axes()
    }

    /// `num_children = 2^D`.
    pub const fn num_children(self) -> usize {
        1 << self.axes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_and_child_counts() {
        assert_eq!(Dim::D2.axes(), 2);
        assert_eq!(Dim::D2.num_faces(), 4);
        assert_eq!(Dim::D2.num_children(), 4);
        assert_eq!(Dim::D3.axes(), 3);
        assert_eq!(Dim::D3.num_faces(), 6);
        assert_eq!(Dim::D3.num_children(), 8);
    }
}
