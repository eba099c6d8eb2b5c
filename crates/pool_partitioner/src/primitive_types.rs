/// The index of a processing unit (a hardware thread), as assigned by topology
/// discovery. Processing units are numbered sequentially in discovery order,
/// starting from zero, across all NUMA domains and cores.
pub type PuIndex = usize;

/// The index of a core in topology-discovery order, across all NUMA domains.
pub type CoreIndex = usize;

/// The index of a NUMA domain in topology-discovery order.
pub type NumaDomainIndex = usize;

/// The global index of a worker thread. Workers are numbered in pool order:
/// first every worker of the default pool, then every worker of the first
/// user-created pool, and so on.
pub type WorkerIndex = usize;

/// The index of a thread pool in the partitioner's registry. The default pool
/// always has index 0; user-created pools follow in creation order.
pub type PoolIndex = usize;
