use crate::cli::TuneArgs;
use crate::config::Scenario;
use crate::driver::{CostModel, DemoCollective, DemoDecomposition, DemoSolver, DemoSolverFactory, DemoTables};
use crate::error::{CliError, Result};
use meshtune::engine::context::{DecompositionControl, KernelTarget, SolverRole};
use meshtune::engine::progress::{Progress, ProgressReporter};
use meshtune::workflows::tune as workflow;
use meshtune::{
    BalanceError, InteractionParams, MeshBalancer, MeshDims, SimulationBox, TuningContext,
};
use std::fs::File;
use tracing::{debug, info};

pub fn run(args: TuneArgs) -> Result<()> {
    let scenario = match &args.scenario {
        Some(path) => {
            info!(path = %path.display(), "loading scenario");
            Scenario::load(path)?
        }
        None => {
            info!("no scenario given, using the built-in defaults");
            Scenario::default()
        }
    };

    let reporter = ProgressReporter::with_callback(Box::new(|event| match event {
        Progress::SetupTimed {
            step,
            grid,
            cutoff,
            m_cycles,
        } => {
            println!(
                "step {step:4}: timed with mesh {grid}, cutoff {cutoff:.3} nm: {m_cycles:.1} M-cycles"
            );
        }
        Progress::ScanLimited { step, limit, cutoff } => {
            println!(
                "step {step:4}: the {} limited the load balancing to a cutoff of {cutoff:.3} nm",
                limit.describe()
            );
        }
        Progress::OptimumChosen { grid, cutoff } => {
            println!("           optimal mesh {grid}, cutoff {cutoff:.3} nm");
        }
        _ => {}
    }));

    let (outcome, balancer) = execute(&scenario, args.steps, args.seed, &reporter)?;

    match &outcome.report {
        Some(report) => println!("{report}"),
        None => println!(" Load balancing did not change the initial setup."),
    }
    if !outcome.concluded {
        println!(
            " (stopped at the {}-step cap before confirming a winner)",
            args.steps
        );
    }

    if let Some(path) = &args.timings {
        let file = File::create(path)?;
        balancer.history().write_csv(file)?;
        info!(
            samples = balancer.history().len(),
            path = %path.display(),
            "wrote timing samples"
        );
    }

    Ok(())
}

/// Build the synthetic collaborators for a scenario and drive the balancer
/// to a conclusion (or the step cap).
pub(crate) fn execute(
    scenario: &Scenario,
    max_steps: u64,
    seed: u64,
    reporter: &ProgressReporter<'_>,
) -> Result<(workflow::TuningOutcome, MeshBalancer)> {
    let [lx, ly, lz] = scenario.box_section.edges;
    if lx <= 0.0 || ly <= 0.0 || lz <= 0.0 {
        return Err(CliError::Scenario(
            "box edges must all be positive".to_string(),
        ));
    }
    let current_box = SimulationBox::orthorhombic(lx, ly, lz);
    let grid = MeshDims::new(scenario.grid.nx, scenario.grid.ny, scenario.grid.nz);
    let config = scenario
        .tuning
        .clone()
        .into_config()
        .map_err(BalanceError::from)?;

    let mut balancer = MeshBalancer::new(
        &config,
        current_box,
        grid,
        scenario.grid.splitting_coefficient,
        Some(Box::new(DemoSolver::new(grid))),
    )?;

    let mut collective = DemoCollective {
        workers: scenario.workers.count,
    };
    // A single worker has no spatial decomposition to negotiate with.
    let mut decomposition = (scenario.workers.count > 1)
        .then(|| DemoDecomposition::new(scenario.workers.max_list_cutoff));
    let mut factory = DemoSolverFactory::default();
    let mut tables = DemoTables::default();
    let mut params = InteractionParams {
        cutoff: config.cutoff,
        list_cutoff: config.cutoff + config.list_buffer,
        splitting_coefficient: scenario.grid.splitting_coefficient,
    };
    let mut model = CostModel::new(&scenario.cost, seed);

    let mut kernels = [KernelTarget::Tabulated(&mut tables)];
    let mut ctx = TuningContext {
        collective: &mut collective,
        decomposition: decomposition
            .as_mut()
            .map(|d| d as &mut dyn DecompositionControl),
        solver: SolverRole::Local(&mut factory),
        kernels: &mut kernels,
        params: &mut params,
        current_box: &current_box,
        reporter,
    };

    let outcome = workflow::run(
        &mut balancer,
        &mut ctx,
        |_, params, grid| model.sample(params, grid),
        &workflow::TuneOptions { max_steps },
    );

    debug!(
        solver_builds = factory.builds,
        table_rebuilds = tables.rebuilds,
        decomposition_requests = decomposition.as_ref().map(|d| d.requests).unwrap_or(0),
        "collaborator activity"
    );

    Ok((outcome, balancer))
}
