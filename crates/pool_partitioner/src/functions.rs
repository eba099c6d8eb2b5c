use std::sync::Arc;

use pu_mask::PuMask;

use crate::partitioner::PartitionerCore;
use crate::{PoolIndex, WorkerIndex};

/// Process-wide query surface over the live partitioner.
///
/// These free functions forward to the partitioner constructed by this
/// process, wherever it is owned; they fail with the `InvalidStatus` kind
/// when no partitioner is alive.
fn current() -> crate::Result<Arc<PartitionerCore>> {
    crate::partitioner::current().ok_or(crate::Error::NoPartitioner)
}

/// The number of pools owned by the live partitioner.
pub fn num_pools() -> crate::Result<usize> {
    Ok(current()?.num_pools())
}

/// The total number of worker slots across all pools of the live partitioner.
pub fn num_threads() -> crate::Result<usize> {
    Ok(current()?.num_threads())
}

/// The number of worker slots of the named pool of the live partitioner.
pub fn num_threads_in(pool_name: &str) -> crate::Result<usize> {
    current()?.num_threads_in(pool_name)
}

/// Resolves a pool name to its registry index in the live partitioner. The
/// literal `"default"` always resolves to index 0.
pub fn pool_index(pool_name: &str) -> crate::Result<PoolIndex> {
    current()?.pool_index(pool_name)
}

/// The name of the pool at the given index in the live partitioner.
pub fn pool_name(index: PoolIndex) -> crate::Result<String> {
    current()?.pool_name(index)
}

/// Whether the live partitioner owns a pool with the given name. `false` when
/// no partitioner is alive.
#[must_use]
pub fn pool_exists(pool_name: &str) -> bool {
    crate::partitioner::current().is_some_and(|core| core.pool_exists(pool_name))
}

/// The affinity mask of the given worker, per the live partitioner.
pub fn pu_mask(worker: WorkerIndex) -> crate::Result<PuMask> {
    Ok(current()?.pu_mask(worker))
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::{Partitioner, SchedulerMode, SchedulingPolicy, StaticTopology};

    #[test]
    #[serial]
    fn surface_requires_a_live_partitioner() {
        assert!(matches!(num_pools(), Err(crate::Error::NoPartitioner)));
        assert!(matches!(num_threads(), Err(crate::Error::NoPartitioner)));
        assert!(matches!(pool_index("default"), Err(crate::Error::NoPartitioner)));
        assert!(!pool_exists("default"));
    }

    #[test]
    #[serial]
    fn surface_forwards_to_the_live_partitioner() {
        let partitioner = Partitioner::builder()
            .topology_provider(StaticTopology::uniform(1, 4, 1))
            .build()
            .unwrap();

        partitioner
            .create_thread_pool(
                "io",
                SchedulingPolicy::Static,
                SchedulerMode::DEFAULT,
                None,
            )
            .unwrap();

        let topology = partitioner.topology().clone();
        partitioner
            .add_resource(&topology.pus()[0], "io", true)
            .unwrap();

        partitioner.configure_pools().unwrap();

        assert_eq!(num_pools().unwrap(), 2);
        assert_eq!(num_threads().unwrap(), 4);
        assert_eq!(num_threads_in("io").unwrap(), 1);
        assert_eq!(pool_index("io").unwrap(), 1);
        assert_eq!(pool_name(1).unwrap(), "io");
        assert!(pool_exists("io"));
        assert!(!pool_exists("gpu"));

        // Worker 0 is the first default-pool worker, bound to the first
        // processing unit the default pool received.
        assert_eq!(pu_mask(0).unwrap().iter_set().collect::<Vec<_>>(), vec![1]);

        drop(partitioner);

        assert!(matches!(num_pools(), Err(crate::Error::NoPartitioner)));
    }
}
