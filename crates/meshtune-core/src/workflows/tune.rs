use crate::core::mesh::MeshDims;
use crate::engine::balancer::{MeshBalancer, StepOutcome};
use crate::engine::context::{InteractionParams, TuningContext};
use crate::engine::progress::Progress;
use crate::engine::report::TuningReport;
use tracing::{info, instrument};

/// Bounds for a driven tuning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuneOptions {
    /// Hard cap on the number of simulation steps fed to the balancer.
    pub max_steps: u64,
}

impl Default for TuneOptions {
    fn default() -> Self {
        Self { max_steps: 5000 }
    }
}

/// Result of a driven tuning run.
#[derive(Debug, Clone)]
pub struct TuningOutcome {
    /// Steps actually consumed.
    pub steps: u64,
    /// Whether the balancer confirmed a winner within the step cap.
    pub concluded: bool,
    /// The interaction parameters left active.
    pub params: InteractionParams,
    pub report: Option<TuningReport>,
}

/// Drive the balancer to a conclusion.
///
/// `probe` is called once per simulation step with the step index, the live
/// interaction parameters, and the active mesh, and must return that step's
/// measured cost (the host runs or models the step itself). The loop stops
/// as soon as the balancer concludes, or at `options.max_steps`.
#[instrument(skip_all, name = "tuning_workflow")]
pub fn run<F>(
    balancer: &mut MeshBalancer,
    ctx: &mut TuningContext<'_>,
    mut probe: F,
    options: &TuneOptions,
) -> TuningOutcome
where
    F: FnMut(u64, &InteractionParams, MeshDims) -> f64,
{
    info!(max_steps = options.max_steps, "starting pair/mesh balancing");
    ctx.reporter
        .report(Progress::Message("balancing cut-off and mesh".to_string()));

    let mut steps = 0;
    let mut concluded = balancer.is_concluded();
    while !concluded && steps < options.max_steps {
        let grid = balancer.active_setup().grid;
        let cost = probe(steps, ctx.params, grid);
        let outcome = balancer.step(cost, steps, ctx);
        steps += 1;
        concluded = outcome == StepOutcome::Concluded;
    }

    if concluded {
        info!(steps, "balancing concluded");
    } else {
        info!(steps, "balancing stopped at the step cap");
    }

    TuningOutcome {
        steps,
        concluded,
        params: *ctx.params,
        report: balancer.finalize(),
    }
}
