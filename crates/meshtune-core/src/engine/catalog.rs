use super::context::MeshSolver;
use super::error::BalanceError;
use crate::core::geometry::SimulationBox;
use crate::core::mesh::{self, MeshDims};
use std::fmt;
use std::ops::{Index, IndexMut};
use tracing::debug;

/// Multiplicative step applied to the spacing while searching for the next
/// distinct mesh.
const COARSEN_STEP: f64 = 1.01;
/// A candidate only counts as distinct once its spacing clears this factor,
/// guarding against floating-point plateaus that reproduce the same mesh.
const SPACING_PLATEAU_GUARD: f64 = 1.001;

/// One candidate configuration: an interaction cutoff paired with the mesh
/// resolution and splitting coefficient that keep the overall accuracy
/// constant.
pub struct MeshSetup {
    pub cutoff: f64,
    pub list_cutoff: f64,
    pub grid: MeshDims,
    /// Coarsest per-axis mesh spacing.
    pub spacing: f64,
    /// Uniform-spacing inefficiency factor: 1 for a perfectly uniform mesh,
    /// larger when the per-axis spacings diverge.
    pub grid_efficiency: f64,
    pub splitting_coefficient: f64,
    /// Lazily built solver instance; present only once this setup has been
    /// activated on a worker with local mesh duty.
    pub(crate) solver: Option<Box<dyn MeshSolver>>,
    /// Number of times this setup has been timed, warm-up samples included.
    pub(crate) count: u32,
    /// Fastest post-warm-up sample; zero until the first eligible sample.
    pub(crate) cycles: f64,
}

impl MeshSetup {
    pub fn times_sampled(&self) -> u32 {
        self.count
    }

    pub fn best_cycles(&self) -> f64 {
        self.cycles
    }

    pub fn has_solver(&self) -> bool {
        self.solver.is_some()
    }

    pub fn solver(&self) -> Option<&dyn MeshSolver> {
        self.solver.as_deref()
    }
}

impl fmt::Debug for MeshSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshSetup")
            .field("cutoff", &self.cutoff)
            .field("list_cutoff", &self.list_cutoff)
            .field("grid", &self.grid)
            .field("spacing", &self.spacing)
            .field("grid_efficiency", &self.grid_efficiency)
            .field("splitting_coefficient", &self.splitting_coefficient)
            .field("solver", &self.solver.is_some())
            .field("count", &self.count)
            .field("cycles", &self.cycles)
            .finish()
    }
}

/// Ordered, append-only list of candidate setups plus everything needed to
/// derive the next, coarser one. Entries are only ever appended or truncated
/// from the tail, so plain indices stay valid for the balancer's lifetime.
#[derive(Debug)]
pub struct SetupCatalog {
    setups: Vec<MeshSetup>,
    box_start: SimulationBox,
    /// Cutoff over mesh spacing, held constant across candidates so coarser
    /// meshes shift work to the pair side at fixed accuracy.
    cutoff_spacing_ratio: f64,
    buffer: f64,
    order: u32,
}

impl SetupCatalog {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn bootstrap(
        box_start: SimulationBox,
        cutoff: f64,
        buffer: f64,
        order: u32,
        target_spacing: Option<f64>,
        grid: MeshDims,
        splitting_coefficient: f64,
        solver: Option<Box<dyn MeshSolver>>,
    ) -> Result<Self, BalanceError> {
        if box_start.volume() <= 0.0 {
            return Err(BalanceError::Initialization(
                "simulation box has non-positive volume".to_string(),
            ));
        }
        if grid.min_dim() <= 2 * order as usize {
            return Err(BalanceError::MeshTooSmall {
                dim: grid.min_dim(),
                order,
            });
        }
        if splitting_coefficient <= 0.0 {
            return Err(BalanceError::Initialization(
                "splitting coefficient must be positive".to_string(),
            ));
        }

        let edges = box_start.edge_norms();
        let mut spacing = 0.0f64;
        for (n, edge) in grid.dims().iter().zip(edges) {
            spacing = spacing.max(edge / *n as f64);
        }

        let cutoff_spacing_ratio = cutoff / target_spacing.unwrap_or(spacing);

        let initial = MeshSetup {
            cutoff,
            list_cutoff: cutoff + buffer,
            grid,
            spacing,
            // Zero here; the first advance's shape check compares against it
            // and never stops on the immediate neighbor.
            grid_efficiency: 0.0,
            splitting_coefficient,
            solver,
            count: 0,
            cycles: 0.0,
        };

        Ok(Self {
            setups: vec![initial],
            box_start,
            cutoff_spacing_ratio,
            buffer,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.setups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setups.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MeshSetup> {
        self.setups.iter()
    }

    pub fn box_start(&self) -> &SimulationBox {
        &self.box_start
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.setups.truncate(len);
    }

    pub(crate) fn split_first_mut(&mut self) -> (&mut MeshSetup, &mut [MeshSetup]) {
        let (first, rest) = self.setups.split_first_mut().expect("catalog is never empty");
        (first, rest)
    }

    /// Try to append the next setup with a measurably coarser mesh and the
    /// matching larger cutoff. Returns `false`, leaving the catalog
    /// untouched, once the mesh cannot shrink further without dropping below
    /// the interpolation stencil.
    pub(crate) fn append_coarser(&mut self, cur: usize) -> bool {
        let base_spacing = self.setups[cur].spacing;
        let mut factor = 1.0f64;
        let (grid, spacing) = loop {
            factor *= COARSEN_STEP;
            let (grid, spacing) = mesh::mesh_for_spacing(&self.box_start, factor * base_spacing);
            if grid.min_dim() <= 2 * self.order as usize {
                return false;
            }
            if spacing > SPACING_PLATEAU_GUARD * base_spacing {
                break (grid, spacing);
            }
        };

        let cutoff = self.cutoff_spacing_ratio * spacing;
        let edges = self.box_start.edge_norms();
        let mut grid_efficiency = 1.0;
        for (n, edge) in grid.dims().iter().zip(edges) {
            grid_efficiency *= *n as f64 * spacing / edge;
        }
        let first = &self.setups[0];
        let splitting_coefficient = first.splitting_coefficient * first.cutoff / cutoff;

        debug!(%grid, cutoff, spacing, "generated coarser candidate");

        self.setups.push(MeshSetup {
            cutoff,
            list_cutoff: cutoff + self.buffer,
            grid,
            spacing,
            grid_efficiency,
            splitting_coefficient,
            solver: None,
            count: 0,
            cycles: 0.0,
        });
        true
    }
}

impl Index<usize> for SetupCatalog {
    type Output = MeshSetup;
    fn index(&self, index: usize) -> &MeshSetup {
        &self.setups[index]
    }
}

impl IndexMut<usize> for SetupCatalog {
    fn index_mut(&mut self, index: usize) -> &mut MeshSetup {
        &mut self.setups[index]
    }
}
