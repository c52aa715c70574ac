//! Data contracts and pure orchestration logic for pawpress page runs:
//! theme catalog, selection state, randomizer pools, the selection
//! resolver, and the run's observable surfaces (events, progress,
//! summary).

pub mod context;
pub mod events;
pub mod pool;
pub mod progress;
pub mod resolve;
pub mod selection;
pub mod summary;
pub mod themes;
