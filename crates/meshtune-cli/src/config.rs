use crate::error::{CliError, Result};
use meshtune::engine::config::TuningSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A self-contained synthetic simulation scenario: the box, the initial
/// tuning parameters, and the cost model the balancer is exercised against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(rename = "box")]
    pub box_section: BoxSection,
    pub tuning: TuningSettings,
    #[serde(default)]
    pub grid: GridSection,
    #[serde(default)]
    pub cost: CostSection,
    #[serde(default)]
    pub workers: WorkerSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoxSection {
    /// Box edge lengths in nm.
    pub edges: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridSection {
    #[serde(default = "default_grid_dim")]
    pub nx: usize,
    #[serde(default = "default_grid_dim")]
    pub ny: usize,
    #[serde(default = "default_grid_dim")]
    pub nz: usize,
    #[serde(default = "default_splitting_coefficient")]
    pub splitting_coefficient: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CostSection {
    /// Pair-side cost coefficient, per nm^3 of list-cutoff volume.
    #[serde(default = "default_pair_cost")]
    pub pair: f64,
    /// Mesh-side cost coefficient, per mesh point.
    #[serde(default = "default_mesh_cost")]
    pub mesh: f64,
    /// Relative timing jitter applied to every sample.
    #[serde(default = "default_noise")]
    pub noise: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerSection {
    #[serde(default = "default_worker_count")]
    pub count: usize,
    /// Ceiling the synthetic decomposition imposes on the list cutoff;
    /// absent means the worker layout never limits the scan.
    #[serde(default)]
    pub max_list_cutoff: Option<f64>,
}

fn default_grid_dim() -> usize {
    32
}
fn default_splitting_coefficient() -> f64 {
    3.12
}
fn default_pair_cost() -> f64 {
    50.0
}
fn default_mesh_cost() -> f64 {
    2.8e-3
}
fn default_noise() -> f64 {
    0.02
}
fn default_worker_count() -> usize {
    1
}

impl Default for GridSection {
    fn default() -> Self {
        Self {
            nx: default_grid_dim(),
            ny: default_grid_dim(),
            nz: default_grid_dim(),
            splitting_coefficient: default_splitting_coefficient(),
        }
    }
}

impl Default for CostSection {
    fn default() -> Self {
        Self {
            pair: default_pair_cost(),
            mesh: default_mesh_cost(),
            noise: default_noise(),
        }
    }
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            max_list_cutoff: None,
        }
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            box_section: BoxSection {
                edges: [3.2, 3.2, 3.2],
            },
            tuning: TuningSettings {
                cutoff: 1.0,
                list_buffer: 0.105,
                order: 4,
                boundary: Default::default(),
                target_spacing: None,
                stages: 2,
                wall_factor: None,
            },
            grid: GridSection::default(),
            cost: CostSection::default(),
            workers: WorkerSection::default(),
        }
    }
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: anyhow::Error::new(e),
        })
    }
}
