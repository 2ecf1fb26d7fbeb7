//! # Architecture Abstraction Layer
//!
//! Hardware glue for the millisecond clock and the halted state.
//! Currently implements the Cortex-M4 port; other architectures would add
//! sibling modules.

pub mod cortex_m4;
