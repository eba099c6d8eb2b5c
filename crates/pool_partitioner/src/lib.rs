//! Decides, before a parallel runtime starts, how the machine's processing
//! units (PUs) are grouped into named thread pools, which scheduling policy
//! each pool uses and which processing units each worker thread is bound to.
//! At runtime, processing units can be transferred into and out of dynamic
//! pools while work is in flight.
//!
//! The partitioner sits between three parties that must stay consistent:
//!
//! 1. The hardware topology (NUMA domains → cores → processing units, each
//!    processing unit with a thread-occupancy capacity), supplied by a
//!    [`TopologyProvider`].
//! 2. The user's partitioning: pool names, resource additions, scheduling
//!    policies and the [`PartitionerMode`] flags.
//! 3. The live membership protocol ([`assign_pu()`][Partitioner::assign_pu] /
//!    [`unassign_pu()`][Partitioner::unassign_pu]) that a running pool
//!    observes without dropping, duplicating or double-binding a worker.
//!
//! The executor that runs tasks is not part of this crate; the partitioner
//! only describes it and hands it a scheduling policy, mode flags and an
//! affinity vector.
//!
//! # Quick start
//!
//! ```
//! use pool_partitioner::{Partitioner, SchedulerMode, SchedulingPolicy, StaticTopology};
//!
//! // One NUMA domain with eight single-PU cores. A real embedding wires up
//! // its topology discoverer here; StaticTopology keeps the example
//! // deterministic.
//! let partitioner = Partitioner::builder()
//!     .topology_provider(StaticTopology::uniform(1, 8, 1))
//!     .build()?;
//!
//! // A dedicated two-PU pool for I/O work.
//! partitioner.create_thread_pool(
//!     "io",
//!     SchedulingPolicy::Static,
//!     SchedulerMode::DEFAULT,
//!     None,
//! )?;
//!
//! let topology = partitioner.topology().clone();
//! for pu in &topology.pus()[..2] {
//!     partitioner.add_resource(pu, "io", true)?;
//! }
//!
//! // Freeze the layout; unclaimed processing units go to the default pool.
//! partitioner.configure_pools()?;
//!
//! assert_eq!(partitioner.num_threads(), 8);
//! assert_eq!(partitioner.num_threads_in("io")?, 2);
//!
//! // Workers are numbered in pool order: the default pool first.
//! assert_eq!(partitioner.pu_mask(0).to_string(), "2");
//! assert_eq!(partitioner.pu_mask(6).to_string(), "0");
//! # Ok::<(), pool_partitioner::Error>(())
//! ```
//!
//! # Dynamic pools
//!
//! With [`PartitionerMode::ALLOW_DYNAMIC_POOLS`], resources may be added
//! non-exclusively and a running pool can give processing units back
//! ([`shrink_pool()`][Partitioner::shrink_pool]) or take them again
//! ([`expand_pool()`][Partitioner::expand_pool]). Both operations snapshot
//! the candidate worker slots under the partitioner lock and invoke the
//! caller's callback with the lock released, so the callback may call back
//! into the partitioner.

mod affinity;
mod error;
mod functions;
mod partitioner;
mod pool_data;
mod primitive_types;
mod scheduling;
mod settings;
mod topology;

pub use error::*;
pub use functions::*;
pub use partitioner::{
    DEFAULT_POOL_NAME, Partitioner, PartitionerBuilder, PartitionerMode,
};
pub use primitive_types::*;
pub use scheduling::*;
pub use settings::*;
pub use topology::*;
