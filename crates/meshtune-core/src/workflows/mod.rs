//! High-level entry points tying the engine together for hosts that want a
//! complete tuning run rather than per-step control.

pub mod tune;
