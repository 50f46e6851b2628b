use crate::core::mesh::MeshDims;
use std::fmt;

/// Why the candidate scan stopped before running out of speed-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanLimit {
    #[default]
    Unconstrained,
    /// The pair-list cutoff reached the bound imposed by the box under the
    /// minimum-image convention.
    BoxSize,
    /// The spatial decomposition could not widen its halo to the requested
    /// cutoff.
    Decomposition,
}

impl ScanLimit {
    pub fn describe(self) -> &'static str {
        match self {
            ScanLimit::Unconstrained => "no",
            ScanLimit::BoxSize => "box size",
            ScanLimit::Decomposition => "domain decomposition",
        }
    }
}

/// The parameters of one setup, frozen for reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetupSummary {
    pub cutoff: f64,
    pub list_cutoff: f64,
    pub grid: MeshDims,
    pub spacing: f64,
    pub splitting_coefficient: f64,
}

/// Human-readable comparison of the initial and the finally chosen setup.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningReport {
    pub initial: SetupSummary,
    pub chosen: SetupSummary,
    /// Pair-work scaling, the cube of the list-cutoff ratio.
    pub pair_cost_ratio: f64,
    /// Mesh-work scaling, the ratio of mesh point counts.
    pub mesh_cost_ratio: f64,
    pub limit: ScanLimit,
    /// The chosen setup sits at the constrained end of the scanned range, so
    /// the balance may still be off.
    pub limited_at_chosen: bool,
}

fn write_row(f: &mut fmt::Formatter<'_>, name: &str, s: &SetupSummary) -> fmt::Result {
    writeln!(
        f,
        "   {:<7} {:>6.3} nm {:>6.3} nm    {:>4} {:>4} {:>4}   {:>5.3} nm  {:>5.3} nm",
        name,
        s.cutoff,
        s.list_cutoff,
        s.grid.nx,
        s.grid.ny,
        s.grid.nz,
        s.spacing,
        1.0 / s.splitting_coefficient,
    )
}

impl fmt::Display for TuningReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "       P A I R  -  M E S H   L O A D   B A L A N C I N G")?;
        writeln!(f)?;
        if self.limited_at_chosen {
            writeln!(
                f,
                " NOTE: The load balancing was limited by the {},",
                self.limit.describe()
            )?;
            writeln!(f, "       you might not have reached a good load balance.")?;
            if self.limit == ScanLimit::Decomposition {
                writeln!(
                    f,
                    "       Try a different worker layout or a smaller decomposition margin."
                )?;
            }
            writeln!(f)?;
        }
        writeln!(f, " Load balancing changed the cut-off and the mesh settings:")?;
        writeln!(f, "           pair (direct)                    mesh")?;
        writeln!(f, "            cutoff   list               grid       spacing   1/coeff")?;
        write_row(f, "initial", &self.initial)?;
        write_row(f, "final", &self.chosen)?;
        writeln!(
            f,
            " cost-ratio           {:4.2}             {:4.2}",
            self.pair_cost_ratio, self.mesh_cost_ratio
        )?;
        writeln!(
            f,
            " (note that these numbers concern only part of the total pair and mesh load)"
        )
    }
}
