use thiserror::Error;

use super::config::{ConfigError, SettingsError};

/// Failures raised while constructing or configuring a balancer.
///
/// Runtime infeasibility (a candidate the box or the decomposition cannot
/// accept) is not an error: the state machine consumes those as boolean
/// outcomes and records the limitation for the final report.
#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("mesh dimension {dim} must exceed twice the interpolation order {order}")]
    MeshTooSmall { dim: usize, order: u32 },

    #[error("configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("settings error: {source}")]
    Settings {
        #[from]
        source: SettingsError,
    },
}
