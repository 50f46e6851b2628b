use crate::config::CostSection;
use meshtune::engine::context::{
    DecompositionControl, InteractionParams, InterpolationTables, MeshSolver, MeshSolverFactory,
    WorkerCollective,
};
use meshtune::MeshDims;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// In-process stand-in for the worker collective: every replica would feed
/// the same sample, so the mean is the sample itself.
pub struct DemoCollective {
    pub workers: usize,
}

impl WorkerCollective for DemoCollective {
    fn worker_count(&self) -> usize {
        self.workers
    }

    fn reduce_mean(&mut self, value: f64) -> f64 {
        value
    }
}

/// Synthetic decomposition layer that accepts any cutoff up to a fixed
/// ceiling, as a worker grid with a given cell size would.
pub struct DemoDecomposition {
    pub max_list_cutoff: Option<f64>,
    pub requests: u32,
}

impl DemoDecomposition {
    pub fn new(max_list_cutoff: Option<f64>) -> Self {
        Self {
            max_list_cutoff,
            requests: 0,
        }
    }
}

impl DecompositionControl for DemoDecomposition {
    fn try_set_cutoff(&mut self, list_cutoff: f64) -> bool {
        self.requests += 1;
        self.max_list_cutoff.is_none_or(|max| list_cutoff <= max)
    }
}

/// Mesh solver stand-in; only its grid identity matters to the balancer.
pub struct DemoSolver {
    grid: MeshDims,
}

impl DemoSolver {
    pub fn new(grid: MeshDims) -> Self {
        Self { grid }
    }
}

impl MeshSolver for DemoSolver {
    fn grid(&self) -> MeshDims {
        self.grid
    }
}

#[derive(Default)]
pub struct DemoSolverFactory {
    pub builds: u32,
}

impl MeshSolverFactory for DemoSolverFactory {
    fn build(
        &mut self,
        grid: MeshDims,
        _splitting_coefficient: f64,
        _seed: Option<&dyn MeshSolver>,
    ) -> Box<dyn MeshSolver> {
        self.builds += 1;
        Box::new(DemoSolver::new(grid))
    }
}

#[derive(Default)]
pub struct DemoTables {
    pub rebuilds: u32,
}

impl InterpolationTables for DemoTables {
    fn rebuild_tables(&mut self, _params: &InteractionParams) {
        self.rebuilds += 1;
    }
}

/// Analytic per-step cost: pair work grows with the cubed list cutoff, mesh
/// work with the point count, plus seeded relative jitter standing in for
/// wall-clock noise. Returned in cycles.
pub struct CostModel {
    pair: f64,
    mesh: f64,
    noise: f64,
    rng: StdRng,
}

impl CostModel {
    pub fn new(cost: &CostSection, seed: u64) -> Self {
        Self {
            pair: cost.pair,
            mesh: cost.mesh,
            noise: cost.noise,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn sample(&mut self, params: &InteractionParams, grid: MeshDims) -> f64 {
        let base = self.pair * params.list_cutoff.powi(3) + self.mesh * grid.points() as f64;
        let jitter = 1.0 + self.noise * (self.rng.random::<f64>() * 2.0 - 1.0);
        base * jitter * 1.0e6
    }
}
