use super::catalog::{MeshSetup, SetupCatalog};
use super::config::BalancerConfig;
use super::context::{InteractionParams, MeshSolver, SolverRole, TuningContext};
use super::error::BalanceError;
use super::history::{TimingHistory, TimingRecord};
use super::progress::Progress;
use super::report::{ScanLimit, SetupSummary, TuningReport};
use crate::core::geometry::{BoundaryKind, SimulationBox};
use crate::core::mesh::MeshDims;
use tracing::{debug, info};

/// In the scan, only stop on grids at least this factor smaller than the one
/// the advance started from.
const GRID_SCALE_STEP: f64 = 0.8;
/// Scan past candidates whose shape degraded by more than this relative to
/// the previous one.
const GRID_EFFICIENCY_TOLERANCE: f64 = 1.05;
/// Rerun setups up to this factor slower than the fastest one seen.
const SLOW_TOLERANCE: f64 = 1.12;
/// A sample this much faster than the recorded best earns one more stage.
const RESCAN_SPEEDUP_TOLERANCE: f64 = 1.02;

/// What the caller should do after feeding a step's timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Balancing is still running; keep feeding step timings.
    Continuing,
    /// The winner is active and further calls are no-ops.
    Concluded,
}

/// Online pair/mesh load balancer.
///
/// Fed the measured cost of each completed simulation step, it walks an
/// ordered catalog of cutoff/mesh candidates: stage 0 scans increasingly
/// coarse meshes, later stages re-time the surviving range until the winner
/// is confirmed, which is then left active in the live interaction
/// parameters. Candidates the box or the spatial decomposition cannot accept
/// end the scan early and are recorded for the final report.
#[derive(Debug)]
pub struct MeshBalancer {
    catalog: SetupCatalog,
    boundary: BoundaryKind,
    /// Stage budget; grows when a suspicious speed-up demands a rescan.
    nstage: u32,
    stage: u32,
    cur: usize,
    fastest: usize,
    /// Refinement range `[start, end)`; `end == 0` means the whole catalog.
    start: usize,
    end: usize,
    limit: ScanLimit,
    /// Set on entering refinement so the next advance lands exactly on
    /// `start` before moving on.
    pending_entry: bool,
    history: TimingHistory,
}

impl MeshBalancer {
    pub fn new(
        config: &BalancerConfig,
        box_start: SimulationBox,
        initial_grid: MeshDims,
        initial_splitting_coefficient: f64,
        initial_solver: Option<Box<dyn MeshSolver>>,
    ) -> Result<Self, BalanceError> {
        let mut box_start = box_start;
        if config.boundary == BoundaryKind::Slab {
            if let Some(factor) = config.wall_factor {
                // Two-wall slab systems solve on a z-elongated virtual box.
                box_start.scale_z(factor);
            }
        }

        let catalog = SetupCatalog::bootstrap(
            box_start,
            config.cutoff,
            config.list_buffer,
            config.order,
            config.target_spacing,
            initial_grid,
            initial_splitting_coefficient,
            initial_solver,
        )?;

        Ok(Self {
            catalog,
            boundary: config.boundary,
            nstage: config.stages,
            stage: 0,
            cur: 0,
            fastest: 0,
            start: 0,
            end: 0,
            limit: ScanLimit::Unconstrained,
            pending_entry: false,
            history: TimingHistory::new(),
        })
    }

    /// Consume the measured cost of the step just completed, advance the
    /// search, and commit the chosen setup into the live simulation state.
    pub fn step(
        &mut self,
        local_cycles: f64,
        step_index: u64,
        ctx: &mut TuningContext<'_>,
    ) -> StepOutcome {
        if self.stage == self.nstage {
            return StepOutcome::Concluded;
        }

        let cycles = if ctx.collective.worker_count() > 1 {
            ctx.collective.reduce_mean(local_cycles)
        } else {
            local_cycles
        };

        let previously_active = self.cur;

        {
            let set = &mut self.catalog[self.cur];
            set.count += 1;
            if set.count % 2 == 1 {
                // The first step after a switch is dominated by allocation
                // and caching effects; discard it.
                return StepOutcome::Continuing;
            }
        }

        let (grid, cutoff) = {
            let set = &self.catalog[self.cur];
            (set.grid, set.cutoff)
        };
        let m_cycles = cycles * 1e-6;
        info!(step = step_index, %grid, cutoff, m_cycles, "timed with");
        ctx.reporter.report(Progress::SetupTimed {
            step: step_index,
            grid,
            cutoff,
            m_cycles,
        });
        self.history.push(TimingRecord {
            step: step_index,
            setup: self.cur,
            nx: grid.nx,
            ny: grid.ny,
            nz: grid.nz,
            cutoff,
            m_cycles,
        });

        {
            let set = &mut self.catalog[self.cur];
            if set.count <= 2 {
                set.cycles = cycles;
            } else {
                if cycles * RESCAN_SPEEDUP_TOLERANCE < set.cycles
                    && self.stage == self.nstage - 1
                {
                    // The performance went up a lot, e.g. because the
                    // decomposition rebalanced elsewhere. Add a stage and
                    // rescan rather than trust a single fast sample.
                    self.nstage += 1;
                    debug!(
                        %grid,
                        stages = self.nstage,
                        "large speed-up observed, granting an extra stage"
                    );
                }
                set.cycles = set.cycles.min(cycles);
            }
        }

        if self.catalog[self.cur].cycles < self.catalog[self.fastest].cycles {
            self.fastest = self.cur;
        }
        let fastest_cycles = self.catalog[self.fastest].cycles;

        // Stop scanning once the timings clearly rise past the optimum.
        if self.stage == 0 && self.cur > 0 && cycles > fastest_cycles * SLOW_TOLERANCE {
            self.catalog.truncate(self.cur + 1);
            self.enter_refinement();
        }

        if self.stage == 0 {
            let points_at_entry = self.catalog[self.cur].grid.points() as f64;
            loop {
                let mut ok = if self.cur + 1 < self.catalog.len() {
                    // The next candidate was already generated earlier.
                    true
                } else {
                    self.catalog.append_coarser(self.cur)
                };

                if ok {
                    if let Some(max_sq) = ctx.current_box.max_cutoff_squared(self.boundary) {
                        let next_list = self.catalog[self.cur + 1].list_cutoff;
                        if next_list * next_list > max_sq {
                            self.limit = ScanLimit::BoxSize;
                            ok = false;
                        }
                    }
                }

                if ok {
                    self.cur += 1;
                    if let Some(dd) = ctx.decomposition.as_deref_mut() {
                        if !dd.try_set_cutoff(self.catalog[self.cur].list_cutoff) {
                            // The decomposition cannot honor this cutoff;
                            // drop the candidate again.
                            self.cur -= 1;
                            self.limit = ScanLimit::Decomposition;
                            ok = false;
                        }
                    }
                }

                if !ok {
                    // The cutoff cannot grow past the current setup.
                    self.catalog.truncate(self.cur + 1);
                    self.report_limited(step_index, ctx);
                    self.enter_refinement();
                    break;
                }

                let cur_set = &self.catalog[self.cur];
                let prev_set = &self.catalog[self.cur - 1];
                let distinct_enough = (cur_set.grid.points() as f64)
                    < points_at_entry * GRID_SCALE_STEP
                    && cur_set.grid_efficiency
                        < prev_set.grid_efficiency * GRID_EFFICIENCY_TOLERANCE;
                if distinct_enough {
                    break;
                }
            }
        }

        if self.stage > 0 && self.end == 1 {
            self.pending_entry = false;
            self.cur = 0;
            self.stage = self.nstage;
        } else if self.stage > 0 && self.end > 1 {
            // In the last stage, rerun only the setups that are not much
            // slower than the fastest; otherwise just take the next one.
            loop {
                if self.pending_entry {
                    self.pending_entry = false;
                    if self.cur == self.end {
                        self.stage += 1;
                    }
                } else {
                    self.cur += 1;
                    if self.cur == self.end {
                        self.stage += 1;
                        self.cur = self.start;
                    }
                }
                let set = &self.catalog[self.cur];
                let skip = self.stage == self.nstage - 1
                    && set.count > 0
                    && set.cycles > fastest_cycles * SLOW_TOLERANCE;
                if !skip {
                    break;
                }
            }

            if self.stage == self.nstage {
                // Done optimizing; activate the fastest setup found.
                self.cur = self.fastest;
            }
        }

        if self.stage > 0 {
            if let Some(dd) = ctx.decomposition.as_deref_mut() {
                if !dd.try_set_cutoff(self.catalog[self.cur].list_cutoff) {
                    // Failsafe: retreat to the front of the range and
                    // re-time from there.
                    if self.cur > 1 && self.stage == self.nstage {
                        self.stage -= 1;
                    }
                    self.fastest = 0;
                    self.start = 0;
                    self.end = self.cur;
                    self.cur = self.start;
                    self.limit = ScanLimit::Decomposition;
                    self.report_limited(step_index, ctx);
                }
            }
        }

        self.commit_active(ctx);

        if self.cur != previously_active {
            let set = &self.catalog[self.cur];
            ctx.reporter.report(Progress::SetupActivated {
                grid: set.grid,
                cutoff: set.cutoff,
            });
        }

        if self.stage == self.nstage {
            let set = &self.catalog[self.cur];
            info!(grid = %set.grid, cutoff = set.cutoff, "optimal setup chosen");
            ctx.reporter.report(Progress::OptimumChosen {
                grid: set.grid,
                cutoff: set.cutoff,
            });
            StepOutcome::Concluded
        } else {
            StepOutcome::Continuing
        }
    }

    /// Grant additional refinement stages, e.g. after an external
    /// reconfiguration invalidated earlier timings. Resumes a concluded
    /// balancer from its current setup.
    pub fn extend_stages(&mut self, additional: u32) {
        self.nstage += additional;
    }

    /// Narrow the considered range to the candidates worth re-timing and
    /// move to the first refinement stage.
    fn enter_refinement(&mut self) {
        let n = self.catalog.len();
        let fastest_cycles = self.catalog[self.fastest].cycles;

        self.start = 0;
        while self.start + 1 < n
            && (self.catalog[self.start].count == 0
                || self.catalog[self.start].cycles > fastest_cycles * SLOW_TOLERANCE)
        {
            self.start += 1;
        }
        // Pull untimed earlier neighbors back in; they may be borderline
        // fast.
        while self.start > 0 && self.catalog[self.start - 1].cycles == 0.0 {
            self.start -= 1;
        }

        self.end = n;
        if self.catalog[self.end - 1].count > 0
            && self.catalog[self.end - 1].cycles > fastest_cycles * SLOW_TOLERANCE
        {
            self.end -= 1;
        }

        self.stage = 1;
        self.cur = self.start;
        self.pending_entry = true;
    }

    fn effective_end(&self) -> usize {
        if self.end > 0 {
            self.end
        } else {
            self.catalog.len()
        }
    }

    fn report_limited(&self, step_index: u64, ctx: &mut TuningContext<'_>) {
        let cutoff = self.catalog[self.effective_end() - 1].cutoff;
        info!(
            step = step_index,
            limit = self.limit.describe(),
            cutoff,
            "the load balancing was limited"
        );
        ctx.reporter.report(Progress::ScanLimited {
            step: step_index,
            limit: self.limit,
            cutoff,
        });
    }

    /// Push the chosen setup into the live interaction parameters, the
    /// kernel parameter targets, and the mesh solver side.
    fn commit_active(&mut self, ctx: &mut TuningContext<'_>) {
        let params = {
            let set = &self.catalog[self.cur];
            InteractionParams {
                cutoff: set.cutoff,
                list_cutoff: set.list_cutoff,
                splitting_coefficient: set.splitting_coefficient,
            }
        };
        *ctx.params = params;
        ctx.kernels.apply(&params);

        match &mut ctx.solver {
            SolverRole::Local(factory) => {
                if self.catalog[self.cur].solver.is_none() {
                    let cur = self.cur;
                    let (first, rest) = self.catalog.split_first_mut();
                    if cur == 0 {
                        first.solver =
                            Some(factory.build(first.grid, first.splitting_coefficient, None));
                    } else {
                        // New instances share the immutable resources of the
                        // very first one.
                        let seed = first.solver.as_deref();
                        let target = &mut rest[cur - 1];
                        target.solver =
                            Some(factory.build(target.grid, target.splitting_coefficient, seed));
                    }
                }
            }
            SolverRole::Remote(link) => {
                let set = &self.catalog[self.cur];
                link.switch_grid(set.grid, set.splitting_coefficient);
            }
        }

        let set = &self.catalog[self.cur];
        debug!(grid = %set.grid, cutoff = set.cutoff, "switched to");
    }

    pub fn is_concluded(&self) -> bool {
        self.stage == self.nstage
    }

    pub fn stage(&self) -> u32 {
        self.stage
    }

    pub fn planned_stages(&self) -> u32 {
        self.nstage
    }

    pub fn limit(&self) -> ScanLimit {
        self.limit
    }

    pub fn active_index(&self) -> usize {
        self.cur
    }

    pub fn active_setup(&self) -> &MeshSetup {
        &self.catalog[self.cur]
    }

    /// The solver instance backing the active setup, when this worker builds
    /// them locally and the setup has been activated at least once.
    pub fn active_solver(&self) -> Option<&dyn MeshSolver> {
        self.catalog[self.cur].solver()
    }

    pub fn catalog(&self) -> &SetupCatalog {
        &self.catalog
    }

    pub fn history(&self) -> &TimingHistory {
        &self.history
    }

    /// Compare the initial and the finally active setup for reporting.
    /// `None` when balancing never moved off the initial setup and was never
    /// constrained.
    pub fn finalize(&self) -> Option<TuningReport> {
        if self.cur == 0 && self.limit == ScanLimit::Unconstrained {
            return None;
        }

        let summarize = |s: &MeshSetup| SetupSummary {
            cutoff: s.cutoff,
            list_cutoff: s.list_cutoff,
            grid: s.grid,
            spacing: s.spacing,
            splitting_coefficient: s.splitting_coefficient,
        };
        let initial = summarize(&self.catalog[0]);
        let chosen = summarize(&self.catalog[self.cur]);

        Some(TuningReport {
            initial,
            chosen,
            pair_cost_ratio: (chosen.list_cutoff / initial.list_cutoff).powi(3),
            mesh_cost_ratio: chosen.grid.points() as f64 / initial.grid.points() as f64,
            limit: self.limit,
            limited_at_chosen: self.limit != ScanLimit::Unconstrained
                && self.cur == self.effective_end() - 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::BalancerConfigBuilder;
    use crate::engine::context::{
        AcceleratorKernels, DecompositionControl, InterpolationTables, KernelTarget,
        MeshSolverFactory, RemoteMeshLink, WorkerCollective,
    };
    use crate::engine::progress::ProgressReporter;

    struct MeanCollective {
        workers: usize,
        calls: u32,
    }
    impl WorkerCollective for MeanCollective {
        fn worker_count(&self) -> usize {
            self.workers
        }
        fn reduce_mean(&mut self, value: f64) -> f64 {
            self.calls += 1;
            value
        }
    }

    struct Decomposition {
        max_list_cutoff: f64,
        requests: Vec<f64>,
    }
    impl DecompositionControl for Decomposition {
        fn try_set_cutoff(&mut self, list_cutoff: f64) -> bool {
            self.requests.push(list_cutoff);
            list_cutoff <= self.max_list_cutoff
        }
    }

    struct StubSolver {
        grid: MeshDims,
    }
    impl MeshSolver for StubSolver {
        fn grid(&self) -> MeshDims {
            self.grid
        }
    }

    #[derive(Default)]
    struct StubFactory {
        builds: Vec<(MeshDims, bool)>,
    }
    impl MeshSolverFactory for StubFactory {
        fn build(
            &mut self,
            grid: MeshDims,
            _splitting_coefficient: f64,
            seed: Option<&dyn MeshSolver>,
        ) -> Box<dyn MeshSolver> {
            self.builds.push((grid, seed.is_some()));
            Box::new(StubSolver { grid })
        }
    }

    #[derive(Default)]
    struct RecordingLink {
        switches: Vec<(MeshDims, f64)>,
    }
    impl RemoteMeshLink for RecordingLink {
        fn switch_grid(&mut self, grid: MeshDims, splitting_coefficient: f64) {
            self.switches.push((grid, splitting_coefficient));
        }
    }

    #[derive(Default)]
    struct Tables {
        last: Option<InteractionParams>,
        rebuilds: u32,
    }
    impl InterpolationTables for Tables {
        fn rebuild_tables(&mut self, params: &InteractionParams) {
            self.last = Some(*params);
            self.rebuilds += 1;
        }
    }

    #[derive(Default)]
    struct Device {
        uploads: u32,
    }
    impl AcceleratorKernels for Device {
        fn upload_parameters(&mut self, _params: &InteractionParams) {
            self.uploads += 1;
        }
    }

    const COEFF: f64 = 3.12;

    fn balancer(boundary: BoundaryKind, cutoff: f64, buffer: f64) -> MeshBalancer {
        let config = BalancerConfigBuilder::new()
            .cutoff(cutoff)
            .list_buffer(buffer)
            .order(4)
            .boundary(boundary)
            .build()
            .unwrap();
        MeshBalancer::new(
            &config,
            SimulationBox::orthorhombic(3.2, 3.2, 3.2),
            MeshDims::new(32, 32, 32),
            COEFF,
            Some(Box::new(StubSolver {
                grid: MeshDims::new(32, 32, 32),
            })),
        )
        .unwrap()
    }

    struct Harness {
        collective: MeanCollective,
        decomposition: Option<Decomposition>,
        factory: StubFactory,
        tables: Tables,
        device: Device,
        params: InteractionParams,
        current_box: SimulationBox,
        next_step: u64,
    }

    impl Harness {
        fn new(decomposition: Option<Decomposition>) -> Self {
            Self {
                collective: MeanCollective {
                    workers: 1,
                    calls: 0,
                },
                decomposition,
                factory: StubFactory::default(),
                tables: Tables::default(),
                device: Device::default(),
                params: InteractionParams {
                    cutoff: 1.0,
                    list_cutoff: 1.1,
                    splitting_coefficient: COEFF,
                },
                current_box: SimulationBox::orthorhombic(3.2, 3.2, 3.2),
                next_step: 0,
            }
        }

        fn step(&mut self, balancer: &mut MeshBalancer, cycles: f64) -> StepOutcome {
            let reporter = ProgressReporter::new();
            let mut kernels = [
                KernelTarget::Accelerator(&mut self.device),
                KernelTarget::Tabulated(&mut self.tables),
            ];
            let mut ctx = TuningContext {
                collective: &mut self.collective,
                decomposition: self
                    .decomposition
                    .as_mut()
                    .map(|d| d as &mut dyn DecompositionControl),
                solver: SolverRole::Local(&mut self.factory),
                kernels: &mut kernels,
                params: &mut self.params,
                current_box: &self.current_box,
                reporter: &reporter,
            };
            let step_index = self.next_step;
            self.next_step += 1;
            balancer.step(cycles, step_index, &mut ctx)
        }

        /// Feed per-setup costs until the balancer concludes.
        fn run_with_costs(
            &mut self,
            balancer: &mut MeshBalancer,
            cost_of: impl Fn(usize) -> f64,
            max_steps: u64,
        ) -> u64 {
            for taken in 1..=max_steps {
                let cost = cost_of(balancer.active_index());
                if self.step(balancer, cost) == StepOutcome::Concluded {
                    return taken;
                }
            }
            panic!("balancer did not conclude within {max_steps} steps");
        }
    }

    /// Cost table for the catalog generated from the 3.2 nm cubic box: the
    /// scan visits setups 0 (32^3), 2 (28^3) and 4 (25^3), skipping over the
    /// too-similar meshes in between.
    fn bowl_costs(index: usize) -> f64 {
        [100.0, 98.0, 90.0, 93.0, 115.0][index]
    }

    #[test]
    fn warm_up_sample_is_discarded() {
        let mut balancer = balancer(BoundaryKind::Open, 1.0, 0.1);
        let mut harness = Harness::new(None);

        assert_eq!(harness.step(&mut balancer, 100.0), StepOutcome::Continuing);

        assert_eq!(balancer.active_index(), 0);
        assert_eq!(balancer.catalog()[0].times_sampled(), 1);
        assert_eq!(balancer.catalog()[0].best_cycles(), 0.0);
        assert!(balancer.history().is_empty());
        // No reconfiguration happens on a discarded sample.
        assert_eq!(harness.tables.rebuilds, 0);
        assert_eq!(harness.device.uploads, 0);
    }

    #[test]
    fn second_sample_records_best_and_scans_ahead() {
        let mut balancer = balancer(BoundaryKind::Open, 1.0, 0.1);
        let mut harness = Harness::new(None);

        harness.step(&mut balancer, 100.0);
        harness.step(&mut balancer, 100.0);

        assert_eq!(balancer.catalog()[0].best_cycles(), 100.0);
        // The scan jumped past the nearly identical 30^3 mesh to 28^3.
        assert_eq!(balancer.active_index(), 2);
        assert_eq!(balancer.active_setup().grid, MeshDims::new(28, 28, 28));
        assert_eq!(balancer.catalog().len(), 3);
        assert_eq!(balancer.history().len(), 1);

        // The live parameters and every kernel group follow the switch.
        assert!((harness.params.cutoff - balancer.active_setup().cutoff).abs() < 1e-12);
        assert_eq!(harness.tables.last, Some(harness.params));
        assert_eq!(harness.tables.rebuilds, 1);
        assert_eq!(harness.device.uploads, 1);

        // The newly active setup got a solver seeded from the first one.
        assert!(balancer.active_setup().has_solver());
        assert_eq!(
            harness.factory.builds,
            vec![(MeshDims::new(28, 28, 28), true)]
        );
    }

    #[test]
    fn rising_cost_enters_refinement_from_the_scan() {
        let mut balancer = balancer(BoundaryKind::Open, 1.0, 0.1);
        let mut harness = Harness::new(None);

        // Setups 0, 2, 4 timed at 100, 90, 115: the third distinct setup is
        // more than 12% slower than the fastest, ending the scan.
        for cost in [100.0, 100.0, 90.0, 90.0, 115.0, 115.0] {
            assert_eq!(harness.step(&mut balancer, cost), StepOutcome::Continuing);
        }

        assert_eq!(balancer.stage(), 1);
        assert!(!balancer.is_concluded());
        // Refinement restarts at the first setup; the slow tail entry was
        // dropped from the considered range.
        assert_eq!(balancer.active_index(), 0);
        assert_eq!(balancer.end, 4);
        assert_eq!(balancer.start, 0);
        assert_eq!(balancer.limit(), ScanLimit::Unconstrained);
    }

    #[test]
    fn refinement_confirms_the_fastest_setup() {
        let mut balancer = balancer(BoundaryKind::Open, 1.0, 0.1);
        let mut harness = Harness::new(None);

        let steps = harness.run_with_costs(&mut balancer, bowl_costs, 50);

        assert!(balancer.is_concluded());
        assert_eq!(steps, 14);
        assert_eq!(balancer.active_index(), 2);
        assert_eq!(balancer.active_setup().grid, MeshDims::new(28, 28, 28));
        assert_eq!(balancer.active_setup().best_cycles(), 90.0);
        // The slow fifth setup ended the scan; the considered range drops
        // that tail entry.
        assert_eq!(balancer.catalog().len(), 5);
        assert_eq!(balancer.end, 4);

        let report = balancer.finalize().unwrap();
        assert_eq!(report.chosen.grid, MeshDims::new(28, 28, 28));
        assert!(!report.limited_at_chosen);
        assert!(report.pair_cost_ratio > 1.0);
        assert!(report.mesh_cost_ratio < 1.0);
    }

    #[test]
    fn best_cycles_never_increase_for_a_setup() {
        let mut balancer = balancer(BoundaryKind::Open, 1.0, 0.1);
        let mut harness = Harness::new(None);

        // Scan: setup 0 at 100, setup 2 at 90, setup 4 slow.
        for cost in [100.0, 100.0, 90.0, 90.0, 115.0, 115.0] {
            harness.step(&mut balancer, cost);
        }
        // Re-timing setup 0 slower than before keeps the recorded best.
        harness.step(&mut balancer, 104.0);
        harness.step(&mut balancer, 104.0);
        assert_eq!(balancer.catalog()[0].best_cycles(), 100.0);
    }

    #[test]
    fn concluded_balancer_ignores_further_steps() {
        let mut balancer = balancer(BoundaryKind::Open, 1.0, 0.1);
        let mut harness = Harness::new(None);
        harness.run_with_costs(&mut balancer, bowl_costs, 50);

        let chosen = balancer.active_index();
        let rebuilds = harness.tables.rebuilds;
        let samples = balancer.catalog()[chosen].times_sampled();

        for _ in 0..5 {
            assert_eq!(harness.step(&mut balancer, 5.0), StepOutcome::Concluded);
        }
        assert_eq!(balancer.active_index(), chosen);
        assert_eq!(balancer.catalog()[chosen].times_sampled(), samples);
        assert_eq!(harness.tables.rebuilds, rebuilds);
    }

    #[test]
    fn box_bound_freezes_the_scan_on_the_initial_setup() {
        // 3.2 nm box: half the minimum width is 1.6 nm. The first coarser
        // candidate needs a 1.68 nm list cutoff and is rejected.
        let mut balancer = balancer(BoundaryKind::Periodic, 1.5, 0.08);
        let mut harness = Harness::new(None);

        assert_eq!(harness.step(&mut balancer, 100.0), StepOutcome::Continuing);
        assert_eq!(harness.step(&mut balancer, 100.0), StepOutcome::Concluded);

        assert_eq!(balancer.limit(), ScanLimit::BoxSize);
        assert_eq!(balancer.catalog().len(), 1);
        assert_eq!(balancer.active_index(), 0);
        assert!(balancer.is_concluded());

        let report = balancer.finalize().unwrap();
        assert!(report.limited_at_chosen);
        assert!(report.to_string().contains("box size"));
    }

    #[test]
    fn decomposition_rejection_rolls_the_candidate_back() {
        let decomposition = Decomposition {
            max_list_cutoff: 1.15,
            requests: Vec::new(),
        };
        let mut balancer = balancer(BoundaryKind::Open, 1.0, 0.1);
        let mut harness = Harness::new(Some(decomposition));

        harness.step(&mut balancer, 100.0);
        assert_eq!(harness.step(&mut balancer, 100.0), StepOutcome::Concluded);

        // The candidate's 1.167 nm list cutoff was rejected and `cur` rolled
        // back; the re-assertion for the surviving setup succeeded.
        assert_eq!(balancer.active_index(), 0);
        assert_eq!(balancer.limit(), ScanLimit::Decomposition);
        let requests = &harness.decomposition.as_ref().unwrap().requests;
        assert_eq!(requests.len(), 2);
        assert!(requests[0] > 1.15);
        assert!((requests[1] - 1.1).abs() < 1e-12);
    }

    #[test]
    fn late_decomposition_rejection_triggers_the_failsafe() {
        let decomposition = Decomposition {
            max_list_cutoff: 10.0,
            requests: Vec::new(),
        };
        let mut balancer = balancer(BoundaryKind::Open, 1.0, 0.1);
        let mut harness = Harness::new(Some(decomposition));
        harness.run_with_costs(&mut balancer, bowl_costs, 50);
        assert!(balancer.is_concluded());
        assert_eq!(balancer.active_index(), 2);

        // The worker layout changes; re-timings must start over.
        balancer.extend_stages(1);
        harness.decomposition.as_mut().unwrap().max_list_cutoff = 0.5;

        // Warm-up sample first, then the eligible one that renegotiates.
        assert_eq!(harness.step(&mut balancer, 90.0), StepOutcome::Continuing);
        assert_eq!(harness.step(&mut balancer, 90.0), StepOutcome::Continuing);

        assert_eq!(balancer.limit(), ScanLimit::Decomposition);
        assert_eq!(balancer.active_index(), 0);
        assert_eq!(balancer.fastest, 0);
        assert_eq!(balancer.start, 0);
        assert!(balancer.end >= 1);
        assert!(!balancer.is_concluded());
    }

    #[test]
    fn extend_stages_resumes_a_concluded_balancer() {
        let mut balancer = balancer(BoundaryKind::Open, 1.0, 0.1);
        let mut harness = Harness::new(None);
        harness.run_with_costs(&mut balancer, bowl_costs, 50);
        assert!(balancer.is_concluded());
        assert_eq!(balancer.planned_stages(), 2);

        balancer.extend_stages(1);
        assert!(!balancer.is_concluded());
        assert_eq!(balancer.planned_stages(), 3);
        assert_eq!(balancer.stage(), 2);

        // The rescan re-times the surviving range and concludes again on the
        // same winner.
        let steps = harness.run_with_costs(&mut balancer, bowl_costs, 50);
        assert!(balancer.is_concluded());
        assert!(steps <= 8);
        assert_eq!(balancer.active_index(), 2);
    }

    #[test]
    fn surprising_speed_up_grants_an_extra_stage() {
        let mut balancer = balancer(BoundaryKind::Open, 1.0, 0.1);
        let mut harness = Harness::new(None);

        for cost in [100.0, 100.0, 90.0, 90.0, 115.0, 115.0] {
            harness.step(&mut balancer, cost);
        }
        assert_eq!(balancer.stage(), 1);
        assert_eq!(balancer.planned_stages(), 2);

        // Re-timing setup 0 far faster than its recorded 100 while in the
        // final stage books one more pass.
        harness.step(&mut balancer, 80.0);
        harness.step(&mut balancer, 80.0);
        assert_eq!(balancer.planned_stages(), 3);
        assert_eq!(balancer.catalog()[0].best_cycles(), 80.0);
    }

    #[test]
    fn timing_reduction_runs_once_per_step_with_multiple_workers() {
        let mut balancer = balancer(BoundaryKind::Open, 1.0, 0.1);
        let mut harness = Harness::new(None);
        harness.collective.workers = 4;

        harness.step(&mut balancer, 100.0);
        harness.step(&mut balancer, 100.0);
        assert_eq!(harness.collective.calls, 2);

        harness.run_with_costs(&mut balancer, bowl_costs, 50);
        let calls_at_conclusion = harness.collective.calls;
        harness.step(&mut balancer, 100.0);
        // No collective participation once concluded.
        assert_eq!(harness.collective.calls, calls_at_conclusion);
    }

    #[test]
    fn cached_solvers_are_not_rebuilt_on_revisit() {
        let mut balancer = balancer(BoundaryKind::Open, 1.0, 0.1);
        let mut harness = Harness::new(None);
        harness.run_with_costs(&mut balancer, bowl_costs, 50);

        let builds = &harness.factory.builds;
        let built_28 = builds
            .iter()
            .filter(|(grid, _)| *grid == MeshDims::new(28, 28, 28))
            .count();
        // Activated during the scan, revisited in refinement, chosen at the
        // end; built exactly once.
        assert_eq!(built_28, 1);
        assert!(builds.iter().all(|(_, seeded)| *seeded));
        assert_eq!(
            balancer.active_solver().unwrap().grid(),
            MeshDims::new(28, 28, 28)
        );
    }

    #[test]
    fn remote_mesh_workers_receive_switch_signals() {
        let config = BalancerConfigBuilder::new()
            .cutoff(1.0)
            .list_buffer(0.1)
            .order(4)
            .boundary(BoundaryKind::Open)
            .build()
            .unwrap();
        let mut balancer = MeshBalancer::new(
            &config,
            SimulationBox::orthorhombic(3.2, 3.2, 3.2),
            MeshDims::new(32, 32, 32),
            COEFF,
            None,
        )
        .unwrap();

        let mut collective = MeanCollective {
            workers: 1,
            calls: 0,
        };
        let mut link = RecordingLink::default();
        let mut tables = Tables::default();
        let mut params = InteractionParams {
            cutoff: 1.0,
            list_cutoff: 1.1,
            splitting_coefficient: COEFF,
        };
        let current_box = SimulationBox::orthorhombic(3.2, 3.2, 3.2);
        let reporter = ProgressReporter::new();

        for (step_index, cost) in [100.0, 100.0].into_iter().enumerate() {
            let mut kernels = [KernelTarget::Tabulated(&mut tables)];
            let mut ctx = TuningContext {
                collective: &mut collective,
                decomposition: None,
                solver: SolverRole::Remote(&mut link),
                kernels: &mut kernels,
                params: &mut params,
                current_box: &current_box,
                reporter: &reporter,
            };
            balancer.step(cost, step_index as u64, &mut ctx);
        }

        // One switch signal per committed step, none for the warm-up.
        assert_eq!(link.switches.len(), 1);
        let (grid, coeff) = link.switches[0];
        assert_eq!(grid, balancer.active_setup().grid);
        assert!((coeff - balancer.active_setup().splitting_coefficient).abs() < 1e-12);
        assert!(!balancer.active_setup().has_solver());
    }

    #[test]
    fn finalize_is_none_without_any_reconfiguration() {
        let balancer = balancer(BoundaryKind::Open, 1.0, 0.1);
        assert!(balancer.finalize().is_none());
    }

    #[test]
    fn progress_events_trace_the_run() {
        use std::sync::Mutex;

        let events: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            let tag = match event {
                Progress::SetupTimed { .. } => "timed",
                Progress::SetupActivated { .. } => "activated",
                Progress::ScanLimited { .. } => "limited",
                Progress::OptimumChosen { .. } => "optimal",
                Progress::Message(_) => "message",
            };
            events.lock().unwrap().push(tag.to_string());
        }));

        let mut balancer = balancer(BoundaryKind::Periodic, 1.5, 0.08);
        let mut collective = MeanCollective {
            workers: 1,
            calls: 0,
        };
        let mut factory = StubFactory::default();
        let mut tables = Tables::default();
        let mut params = InteractionParams {
            cutoff: 1.5,
            list_cutoff: 1.58,
            splitting_coefficient: COEFF,
        };
        let current_box = SimulationBox::orthorhombic(3.2, 3.2, 3.2);

        for (step_index, cost) in [100.0, 100.0].into_iter().enumerate() {
            let mut kernels = [KernelTarget::Tabulated(&mut tables)];
            let mut ctx = TuningContext {
                collective: &mut collective,
                decomposition: None,
                solver: SolverRole::Local(&mut factory),
                kernels: &mut kernels,
                params: &mut params,
                current_box: &current_box,
                reporter: &reporter,
            };
            balancer.step(cost, step_index as u64, &mut ctx);
        }

        drop(reporter);
        let events = events.into_inner().unwrap();
        assert_eq!(events, vec!["timed", "limited", "optimal"]);
    }
}
