use super::geometry::SimulationBox;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prime factors the underlying transform handles efficiently.
const TRANSFORM_RADICES: [usize; 4] = [2, 3, 5, 7];

/// Mesh resolution along the three box vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshDims {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl MeshDims {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nz]
    }

    /// Total number of mesh points.
    pub fn points(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    pub fn min_dim(&self) -> usize {
        self.nx.min(self.ny).min(self.nz)
    }
}

impl fmt::Display for MeshDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.nx, self.ny, self.nz)
    }
}

/// Whether a transform of length `n` decomposes into the supported radices.
pub fn is_transform_friendly(n: usize) -> bool {
    if n == 0 {
        return false;
    }
    let mut rem = n;
    for radix in TRANSFORM_RADICES {
        while rem % radix == 0 {
            rem /= radix;
        }
    }
    rem == 1
}

/// The smallest transform-friendly size that is at least `min`.
pub fn next_transform_friendly(min: usize) -> usize {
    let mut n = min.max(1);
    while !is_transform_friendly(n) {
        n += 1;
    }
    n
}

/// Choose mesh dimensions for a box so that the spacing along each axis does
/// not exceed `max_spacing`, and return them together with the coarsest
/// per-axis spacing actually realized.
///
/// Each dimension is rounded up to a transform-friendly size, so the realized
/// spacing can be noticeably below the request when the request falls between
/// two usable sizes.
pub fn mesh_for_spacing(bx: &SimulationBox, max_spacing: f64) -> (MeshDims, f64) {
    debug_assert!(max_spacing > 0.0);
    let edges = bx.edge_norms();
    let mut dims = [0usize; 3];
    let mut coarsest = 0.0f64;
    for d in 0..3 {
        let at_least = (edges[d] / max_spacing).ceil() as usize;
        dims[d] = next_transform_friendly(at_least);
        coarsest = coarsest.max(edges[d] / dims[d] as f64);
    }
    (MeshDims::new(dims[0], dims[1], dims[2]), coarsest)
}
