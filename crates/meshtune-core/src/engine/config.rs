use crate::core::geometry::BoundaryKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Any stage budget >= 2 is supported: one scanning pass plus at least one
/// confirmation pass over the surviving range.
pub const DEFAULT_STAGES: u32 = 2;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid parameter {parameter}: {reason}")]
    Invalid {
        parameter: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file '{path}': {source}", path = path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Validated balancer parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BalancerConfig {
    /// Initial interaction cutoff.
    pub cutoff: f64,
    /// Pair-list buffer added on top of the cutoff.
    pub list_buffer: f64,
    /// Mesh interpolation order; every mesh dimension must stay above twice
    /// this value.
    pub order: u32,
    pub boundary: BoundaryKind,
    /// Requested mesh spacing; when absent the spacing implied by the
    /// initial mesh is used as the reference.
    pub target_spacing: Option<f64>,
    pub stages: u32,
    /// z stretch applied to the captured box for two-wall slab systems.
    pub wall_factor: Option<f64>,
}

#[derive(Default)]
pub struct BalancerConfigBuilder {
    cutoff: Option<f64>,
    list_buffer: Option<f64>,
    order: Option<u32>,
    boundary: Option<BoundaryKind>,
    target_spacing: Option<f64>,
    stages: Option<u32>,
    wall_factor: Option<f64>,
}

impl BalancerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = Some(cutoff);
        self
    }
    pub fn list_buffer(mut self, buffer: f64) -> Self {
        self.list_buffer = Some(buffer);
        self
    }
    pub fn order(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }
    pub fn boundary(mut self, boundary: BoundaryKind) -> Self {
        self.boundary = Some(boundary);
        self
    }
    pub fn target_spacing(mut self, spacing: f64) -> Self {
        self.target_spacing = Some(spacing);
        self
    }
    pub fn stages(mut self, stages: u32) -> Self {
        self.stages = Some(stages);
        self
    }
    pub fn wall_factor(mut self, factor: f64) -> Self {
        self.wall_factor = Some(factor);
        self
    }

    pub fn build(self) -> Result<BalancerConfig, ConfigError> {
        let cutoff = self.cutoff.ok_or(ConfigError::MissingParameter("cutoff"))?;
        if cutoff <= 0.0 {
            return Err(ConfigError::Invalid {
                parameter: "cutoff",
                reason: "must be positive",
            });
        }
        let list_buffer = self
            .list_buffer
            .ok_or(ConfigError::MissingParameter("list_buffer"))?;
        if list_buffer < 0.0 {
            return Err(ConfigError::Invalid {
                parameter: "list_buffer",
                reason: "must not be negative",
            });
        }
        let order = self.order.ok_or(ConfigError::MissingParameter("order"))?;
        if order < 2 {
            return Err(ConfigError::Invalid {
                parameter: "order",
                reason: "interpolation order below 2 is not meaningful",
            });
        }
        if let Some(spacing) = self.target_spacing {
            if spacing <= 0.0 {
                return Err(ConfigError::Invalid {
                    parameter: "target_spacing",
                    reason: "must be positive",
                });
            }
        }
        let stages = self.stages.unwrap_or(DEFAULT_STAGES);
        if stages < 2 {
            return Err(ConfigError::Invalid {
                parameter: "stages",
                reason: "at least two stages are required",
            });
        }
        if let Some(factor) = self.wall_factor {
            if factor <= 0.0 {
                return Err(ConfigError::Invalid {
                    parameter: "wall_factor",
                    reason: "must be positive",
                });
            }
        }
        Ok(BalancerConfig {
            cutoff,
            list_buffer,
            order,
            boundary: self.boundary.unwrap_or_default(),
            target_spacing: self.target_spacing,
            stages,
            wall_factor: self.wall_factor,
        })
    }
}

/// Declarative form of [`BalancerConfig`], loadable from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TuningSettings {
    pub cutoff: f64,
    pub list_buffer: f64,
    pub order: u32,
    #[serde(default)]
    pub boundary: BoundaryKind,
    #[serde(default)]
    pub target_spacing: Option<f64>,
    #[serde(default = "default_stages")]
    pub stages: u32,
    #[serde(default)]
    pub wall_factor: Option<f64>,
}

fn default_stages() -> u32 {
    DEFAULT_STAGES
}

impl TuningSettings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn into_config(self) -> Result<BalancerConfig, ConfigError> {
        let mut builder = BalancerConfigBuilder::new()
            .cutoff(self.cutoff)
            .list_buffer(self.list_buffer)
            .order(self.order)
            .boundary(self.boundary)
            .stages(self.stages);
        if let Some(spacing) = self.target_spacing {
            builder = builder.target_spacing(spacing);
        }
        if let Some(factor) = self.wall_factor {
            builder = builder.wall_factor(factor);
        }
        builder.build()
    }
}
