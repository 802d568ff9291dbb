//! Threads and queues that connect node workers to the aggregator.

pub mod queue;
pub mod system;

pub use queue::SafeQueue;
pub use system::TdoaSystem;
