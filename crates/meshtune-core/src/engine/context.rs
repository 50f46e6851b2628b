use super::progress::ProgressReporter;
use crate::core::geometry::SimulationBox;
use crate::core::mesh::MeshDims;

/// The live interaction parameters consumed by the force kernels. The
/// balancer rewrites this record whenever it activates a setup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionParams {
    pub cutoff: f64,
    pub list_cutoff: f64,
    /// Short/long-range splitting coefficient, inversely proportional to the
    /// cutoff.
    pub splitting_coefficient: f64,
}

/// Collective timing aggregation across the cooperating workers.
///
/// `reduce_mean` is invoked exactly once per balancing step when
/// `worker_count() > 1`; every worker must feed it the same step's sample so
/// all replicas observe the same scalar.
pub trait WorkerCollective {
    fn worker_count(&self) -> usize;
    fn reduce_mean(&mut self, value: f64) -> f64;
}

/// Negotiation with the spatial decomposition layer. A rejection is
/// authoritative and uniform across workers; the balancer rolls back
/// deterministically.
pub trait DecompositionControl {
    fn try_set_cutoff(&mut self, list_cutoff: f64) -> bool;
}

/// Handle to one long-range mesh solver instance, sized for a fixed mesh.
pub trait MeshSolver {
    fn grid(&self) -> MeshDims;
}

/// Builds mesh solver instances on workers that carry the mesh duty. `seed`
/// is the very first instance; implementations may share its immutable
/// resources instead of recomputing them.
pub trait MeshSolverFactory {
    fn build(
        &mut self,
        grid: MeshDims,
        splitting_coefficient: f64,
        seed: Option<&dyn MeshSolver>,
    ) -> Box<dyn MeshSolver>;
}

/// One-way switch signal for workers whose mesh duty lives elsewhere.
pub trait RemoteMeshLink {
    fn switch_grid(&mut self, grid: MeshDims, splitting_coefficient: f64);
}

/// Where this worker's long-range mesh work happens.
pub enum SolverRole<'a> {
    /// The mesh solver runs on this worker; instances are built locally.
    Local(&'a mut dyn MeshSolverFactory),
    /// A dedicated mesh worker is told to switch grids instead.
    Remote(&'a mut dyn RemoteMeshLink),
}

impl SolverRole<'_> {
    pub fn reborrow(&mut self) -> SolverRole<'_> {
        match self {
            SolverRole::Local(factory) => SolverRole::Local(&mut **factory),
            SolverRole::Remote(link) => SolverRole::Remote(&mut **link),
        }
    }
}

/// Accelerator-resident kernel parameters, updated in place on the device.
pub trait AcceleratorKernels {
    fn upload_parameters(&mut self, params: &InteractionParams);
}

/// CPU-side interpolation tables, recomputed for new parameters.
pub trait InterpolationTables {
    fn rebuild_tables(&mut self, params: &InteractionParams);
}

/// Anything that must learn about new interaction parameters when a setup is
/// activated.
pub trait KernelParameterSink {
    fn apply(&mut self, params: &InteractionParams);
}

/// One kernel group's parameter destination.
pub enum KernelTarget<'a> {
    Accelerator(&'a mut dyn AcceleratorKernels),
    Tabulated(&'a mut dyn InterpolationTables),
}

impl KernelParameterSink for KernelTarget<'_> {
    fn apply(&mut self, params: &InteractionParams) {
        match self {
            KernelTarget::Accelerator(device) => device.upload_parameters(params),
            KernelTarget::Tabulated(tables) => tables.rebuild_tables(params),
        }
    }
}

impl KernelParameterSink for [KernelTarget<'_>] {
    fn apply(&mut self, params: &InteractionParams) {
        for target in self.iter_mut() {
            target.apply(params);
        }
    }
}

impl<const N: usize> KernelParameterSink for [KernelTarget<'_>; N] {
    fn apply(&mut self, params: &InteractionParams) {
        self.as_mut_slice().apply(params);
    }
}

/// Per-step bundle of everything the balancer touches outside itself.
pub struct TuningContext<'a> {
    pub collective: &'a mut dyn WorkerCollective,
    /// Absent when the simulation runs without spatial decomposition.
    pub decomposition: Option<&'a mut dyn DecompositionControl>,
    pub solver: SolverRole<'a>,
    pub kernels: &'a mut dyn KernelParameterSink,
    pub params: &'a mut InteractionParams,
    /// The current box, which may have drifted from the one captured at
    /// construction (e.g. under pressure coupling).
    pub current_box: &'a SimulationBox,
    pub reporter: &'a ProgressReporter<'a>,
}
