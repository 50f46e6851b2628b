use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Periodicity of the simulated volume.
///
/// The admissible-cutoff bound is only defined for boundaries that are
/// periodic in at least one plane; fully open systems place no geometric
/// limit on the interaction radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryKind {
    /// Periodic along all three box vectors.
    #[default]
    Periodic,
    /// Periodic in the x/y plane only (slab geometry).
    Slab,
    /// No periodicity.
    Open,
}

/// A triclinic simulation box, stored as three row vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationBox {
    rows: [Vector3<f64>; 3],
}

impl SimulationBox {
    pub fn from_vectors(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> Self {
        Self { rows: [a, b, c] }
    }

    /// A rectangular box with the given edge lengths.
    pub fn orthorhombic(lx: f64, ly: f64, lz: f64) -> Self {
        Self::from_vectors(
            Vector3::new(lx, 0.0, 0.0),
            Vector3::new(0.0, ly, 0.0),
            Vector3::new(0.0, 0.0, lz),
        )
    }

    pub fn row(&self, d: usize) -> Vector3<f64> {
        self.rows[d]
    }

    /// Lengths of the three box vectors.
    pub fn edge_norms(&self) -> [f64; 3] {
        [
            self.rows[0].norm(),
            self.rows[1].norm(),
            self.rows[2].norm(),
        ]
    }

    pub fn volume(&self) -> f64 {
        self.rows[0].dot(&self.rows[1].cross(&self.rows[2])).abs()
    }

    /// Scale the z box vector, used for slab systems with two walls where
    /// the mesh solver works on an elongated virtual box.
    pub fn scale_z(&mut self, factor: f64) {
        self.rows[2] *= factor;
    }

    /// Perpendicular distance between the two faces spanned by the other
    /// two box vectors, for each axis.
    pub fn perpendicular_widths(&self) -> [f64; 3] {
        let volume = self.volume();
        let [a, b, c] = self.rows;
        [
            volume / b.cross(&c).norm(),
            volume / c.cross(&a).norm(),
            volume / a.cross(&b).norm(),
        ]
    }

    /// Upper bound on the squared pair-list cutoff admissible under the
    /// minimum-image convention, or `None` for fully open boundaries.
    pub fn max_cutoff_squared(&self, boundary: BoundaryKind) -> Option<f64> {
        let widths = self.perpendicular_widths();
        let half_min = match boundary {
            BoundaryKind::Periodic => widths[0].min(widths[1]).min(widths[2]) * 0.5,
            BoundaryKind::Slab => widths[0].min(widths[1]) * 0.5,
            BoundaryKind::Open => return None,
        };
        Some(half_min * half_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orthorhombic_edges_and_volume() {
        let bx = SimulationBox::orthorhombic(3.0, 4.0, 5.0);
        assert_eq!(bx.edge_norms(), [3.0, 4.0, 5.0]);
        assert!((bx.volume() - 60.0).abs() < 1e-12);
    }

    #[test]
    fn orthorhombic_widths_equal_edges() {
        let bx = SimulationBox::orthorhombic(3.0, 4.0, 5.0);
        let widths = bx.perpendicular_widths();
        for (w, e) in widths.iter().zip(bx.edge_norms()) {
            assert!((w - e).abs() < 1e-12);
        }
    }

    #[test]
    fn triclinic_width_is_smaller_than_edge() {
        let bx = SimulationBox::from_vectors(
            Vector3::new(4.0, 0.0, 0.0),
            Vector3::new(2.0, 4.0, 0.0),
            Vector3::new(0.0, 0.0, 4.0),
        );
        let widths = bx.perpendicular_widths();
        // The skewed b vector is longer than the slab it spans.
        assert!(widths[1] < bx.edge_norms()[1]);
        assert!((widths[1] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn periodic_cutoff_bound_is_half_shortest_width() {
        let bx = SimulationBox::orthorhombic(3.0, 4.0, 5.0);
        let max_sq = bx.max_cutoff_squared(BoundaryKind::Periodic).unwrap();
        assert!((max_sq - 2.25).abs() < 1e-12);
    }

    #[test]
    fn slab_cutoff_bound_ignores_z() {
        let bx = SimulationBox::orthorhombic(4.0, 5.0, 1.0);
        let max_sq = bx.max_cutoff_squared(BoundaryKind::Slab).unwrap();
        assert!((max_sq - 4.0).abs() < 1e-12);
    }

    #[test]
    fn open_boundary_has_no_bound() {
        let bx = SimulationBox::orthorhombic(1.0, 1.0, 1.0);
        assert!(bx.max_cutoff_squared(BoundaryKind::Open).is_none());
    }

    #[test]
    fn scale_z_stretches_only_z() {
        let mut bx = SimulationBox::orthorhombic(2.0, 2.0, 2.0);
        bx.scale_z(3.0);
        assert_eq!(bx.edge_norms(), [2.0, 2.0, 6.0]);
    }
}
