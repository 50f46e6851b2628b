use super::report::ScanLimit;
use crate::core::mesh::MeshDims;

/// Events emitted while the balancer runs, so the host simulation can decide
/// what reaches its console and its log file.
#[derive(Debug, Clone)]
pub enum Progress {
    /// A warm, even-numbered sample was recorded for the active setup.
    SetupTimed {
        step: u64,
        grid: MeshDims,
        cutoff: f64,
        m_cycles: f64,
    },
    /// The balancer switched the live parameters to a different setup.
    SetupActivated { grid: MeshDims, cutoff: f64 },
    /// The scan stopped early; the reported cutoff is the largest one kept.
    ScanLimited {
        step: u64,
        limit: ScanLimit,
        cutoff: f64,
    },
    /// Balancing concluded on this setup.
    OptimumChosen { grid: MeshDims, cutoff: f64 },

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}
