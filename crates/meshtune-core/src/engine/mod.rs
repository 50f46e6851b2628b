//! The stateful balancing engine.
//!
//! One [`balancer::MeshBalancer`] is created per worker at simulation start
//! and fed the measured cost of every completed step. It owns the ordered
//! catalog of cutoff/mesh candidates, decides per step whether to keep
//! scanning, refine, or conclude, and commits the chosen setup into the live
//! simulation state through the collaborator contracts in [`context`].
//!
//! - **Configuration** ([`config`]) - validated balancer parameters and their
//!   TOML-loadable form
//! - **Candidate catalog** ([`catalog`]) - the append-only setup list and the
//!   coarser-setup generator
//! - **Collaborators** ([`context`]) - the trait seams to the host simulation
//! - **Progress** ([`progress`]) - event reporting to the host's console/log
//! - **History** ([`history`]) - warm timing samples for post-run analysis
//! - **Reporting** ([`report`]) - the final settings comparison
//! - **Errors** ([`error`]) - construction-time failures

pub mod balancer;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod progress;
pub mod report;
