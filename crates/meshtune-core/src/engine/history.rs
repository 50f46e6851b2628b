use crate::core::mesh::MeshDims;
use serde::Serialize;
use std::io::Write;

/// One warm timing sample, as consumed by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingRecord {
    pub step: u64,
    /// Catalog index of the setup that was active.
    pub setup: usize,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub cutoff: f64,
    pub m_cycles: f64,
}

impl TimingRecord {
    pub fn grid(&self) -> MeshDims {
        MeshDims::new(self.nx, self.ny, self.nz)
    }
}

/// Every warm sample the balancer has consumed, in arrival order. Useful for
/// post-run analysis of how the scan moved through the candidate list.
#[derive(Debug, Default)]
pub struct TimingHistory {
    records: Vec<TimingRecord>,
}

impl TimingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, record: TimingRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TimingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut out = csv::Writer::from_writer(writer);
        for record in &self.records {
            out.serialize(record)?;
        }
        out.flush()?;
        Ok(())
    }
}
