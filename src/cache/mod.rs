//! Download worker pool plus admission control and eviction (`spec.md`
//! §4.6, §4.7): the cache engine.

pub mod admission;
pub mod disk_usage;
pub mod eviction;
pub mod pool;
pub mod progress;
pub mod worker;

pub use eviction::{EvictionOutcome, Evictor};
pub use worker::{Worker, WorkerConfig};
