use std::io;
use std::mem;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex, TryLockError, Weak};

use bitflags::bitflags;
use pu_mask::PuMask;
use tracing::{debug, trace};

use crate::affinity::AffinityData;
use crate::pool_data::PoolData;
use crate::{
    BackgroundWorkFunction, Core, CoreIndex, NumaDomain, PoolIndex, PoolInit, Pu, PuIndex,
    SchedulerFunction, SchedulerMode, SchedulingPolicy, Settings, SystemTopology, Topology,
    TopologyProvider, WorkerIndex,
};

/// The reserved name under which the default pool stays reachable, even after
/// it has been renamed.
pub const DEFAULT_POOL_NAME: &str = "default";

const ERR_POISONED_LOCK: &str = "encountered poisoned lock";

/// Live partitioners per process. At most one may exist at a time; the
/// partitioner is an owned value and this counter only enforces the contract.
static INSTANCE_COUNT: AtomicIsize = AtomicIsize::new(0);

/// The live partitioner, for the process-wide query surface in `functions`.
static CURRENT: LazyLock<Mutex<Weak<PartitionerCore>>> =
    LazyLock::new(|| Mutex::new(Weak::new()));

pub(crate) fn current() -> Option<Arc<PartitionerCore>> {
    CURRENT.lock().expect(ERR_POISONED_LOCK).upgrade()
}

bitflags! {
    /// Options that loosen the partitioner's validation rules.
    ///
    /// The empty set is the default: every worker slot is exclusive and each
    /// processing unit hosts at most its thread occupancy worth of workers.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
    pub struct PartitionerMode: u32 {
        /// Non-exclusive resource additions are permitted and pools may be
        /// shrunk and expanded at runtime.
        const ALLOW_DYNAMIC_POOLS = 0x01;

        /// Disables the per-processing-unit occupancy cap and the overall
        /// worker-thread limit.
        const ALLOW_OVERSUBSCRIPTION = 0x02;
    }
}

impl Default for PartitionerMode {
    fn default() -> Self {
        Self::empty()
    }
}

/// State behind the partitioner lock.
///
/// One mutex guards the pool registry, every slot's `assigned` flag and the
/// cached first-core/threads-needed values. User callbacks are never invoked
/// with this lock held.
struct Inner {
    /// The pool registry. Index 0 is always the default pool.
    pools: Vec<PoolData>,

    affinity: AffinityData,

    /// Per processing unit, how many worker slots reference it across all pools.
    pu_occupancy_counts: Vec<usize>,

    /// Worker slots across all pools; matches the sum of the per-pool counts.
    num_threads_overall: usize,

    first_core: Option<CoreIndex>,
    pus_needed: Option<usize>,

    is_initialized: bool,
}

pub(crate) struct PartitionerCore {
    mode: PartitionerMode,
    settings: Settings,
    topology: Topology,
    os_threads: NonZeroUsize,
    default_scheduler_mode: SchedulerMode,
    inner: Mutex<Inner>,
}

impl Drop for PartitionerCore {
    fn drop(&mut self) {
        INSTANCE_COUNT.fetch_sub(1, Ordering::SeqCst);
    }
}

fn pool_position(pools: &[PoolData], pool_name: &str) -> crate::Result<usize> {
    // The default pool may be renamed but stays reachable under the literal.
    if pool_name == DEFAULT_POOL_NAME {
        return Ok(0);
    }

    pools
        .iter()
        .position(|pool| pool.name == pool_name)
        .ok_or_else(|| crate::Error::UnknownPoolName {
            pool_name: pool_name.to_string(),
        })
}

fn pool_at(pools: &[PoolData], index: PoolIndex) -> crate::Result<&PoolData> {
    let num_pools = pools.len();

    pools
        .get(index)
        .ok_or(crate::Error::PoolIndexOutOfBounds { index, num_pools })
}

impl PartitionerCore {
    fn create_thread_pool(
        &self,
        pool_name: &str,
        policy: SchedulingPolicy,
        mode: SchedulerMode,
        background_work: Option<BackgroundWorkFunction>,
    ) -> crate::Result<()> {
        if pool_name.is_empty() {
            return Err(crate::Error::EmptyPoolName);
        }

        let mut guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        let inner = &mut *guard;

        if pool_name == DEFAULT_POOL_NAME || pool_name == inner.pools[0].name {
            let current_name = inner.pools[0].name.clone();
            let replacement = PoolData::new(&current_name, policy, mode, background_work)?;

            Self::replace_default_pool(inner, replacement);
            return Ok(());
        }

        if inner.pools[1..].iter().any(|pool| pool.name == pool_name) {
            return Err(crate::Error::DuplicatePoolName {
                pool_name: pool_name.to_string(),
            });
        }

        inner
            .pools
            .push(PoolData::new(pool_name, policy, mode, background_work)?);

        debug!(pool = pool_name, %policy, "created thread pool");
        Ok(())
    }

    fn create_custom_thread_pool(
        &self,
        pool_name: &str,
        create_function: SchedulerFunction,
        background_work: Option<BackgroundWorkFunction>,
    ) -> crate::Result<()> {
        if pool_name.is_empty() {
            return Err(crate::Error::EmptyPoolName);
        }

        let mut guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        let inner = &mut *guard;

        if pool_name == DEFAULT_POOL_NAME || pool_name == inner.pools[0].name {
            let current_name = inner.pools[0].name.clone();
            let replacement = PoolData::with_scheduler_function(
                &current_name,
                create_function,
                self.default_scheduler_mode,
                background_work,
            )?;

            Self::replace_default_pool(inner, replacement);
            return Ok(());
        }

        if inner.pools[1..].iter().any(|pool| pool.name == pool_name) {
            return Err(crate::Error::DuplicatePoolName {
                pool_name: pool_name.to_string(),
            });
        }

        inner.pools.push(PoolData::with_scheduler_function(
            pool_name,
            create_function,
            self.default_scheduler_mode,
            background_work,
        )?);

        debug!(pool = pool_name, "created thread pool with custom scheduler");
        Ok(())
    }

    /// Swaps in a fresh default-pool descriptor, releasing the resources the
    /// previous descriptor was holding so the counters stay consistent.
    fn replace_default_pool(inner: &mut Inner, replacement: PoolData) {
        let previous = mem::replace(&mut inner.pools[0], replacement);

        inner.num_threads_overall -= previous.num_threads;

        for slot in &previous.assigned_pu_nums {
            inner.pu_occupancy_counts[slot.pu_index] -= 1;
        }
    }

    fn add_resource_threads(
        &self,
        pu: &Pu,
        pool_name: &str,
        exclusive: bool,
        num_threads: usize,
    ) -> crate::Result<()> {
        if !exclusive && !self.mode.contains(PartitionerMode::ALLOW_DYNAMIC_POOLS) {
            return Err(crate::Error::DynamicPoolsDisabled);
        }

        let mut guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        let inner = &mut *guard;
        let num_pus = self.topology.num_pus();

        let pool_index = pool_position(&inner.pools, pool_name)?;

        if !self.mode.contains(PartitionerMode::ALLOW_OVERSUBSCRIPTION) {
            let thread_occupancy = pu.thread_occupancy().get();

            if inner.pu_occupancy_counts[pu.id()] + num_threads > thread_occupancy {
                return Err(crate::Error::PuOversubscribed {
                    pu_index: pu.id(),
                    thread_occupancy,
                });
            }

            // The total may not exceed what the configuration asked for.
            let requested = inner.num_threads_overall + num_threads;
            if requested > self.os_threads.get() {
                return Err(crate::Error::TooManyThreads {
                    requested,
                    os_threads: self.os_threads.get(),
                });
            }
        }

        inner.pools[pool_index].add_resource(pu.id(), exclusive, num_threads, num_pus)?;
        inner.pu_occupancy_counts[pu.id()] += num_threads;
        inner.num_threads_overall += num_threads;

        trace!(
            pool = pool_name,
            pu = pu.id(),
            exclusive,
            num_threads,
            "added resource"
        );
        Ok(())
    }

    fn set_scheduler(&self, policy: SchedulingPolicy, pool_name: &str) -> crate::Result<()> {
        let mut guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        let inner = &mut *guard;

        let pool_index = pool_position(&inner.pools, pool_name)?;
        inner.pools[pool_index].policy = policy;
        Ok(())
    }

    fn configure_pools(&self) -> crate::Result<()> {
        self.setup_pools()?;
        self.setup_schedulers()?;

        {
            let mut guard = self.inner.lock().expect(ERR_POISONED_LOCK);
            let inner = &mut *guard;

            Self::reconfigure_affinities_locked(inner);
            debug_assert_eq!(inner.affinity.num_threads(), inner.num_threads_overall);

            inner.pus_needed = None;
            inner.is_initialized = true;
        }

        debug!("resource partitioner initialized");
        Ok(())
    }

    /// Hands every processing unit that no pool has claimed to the default
    /// pool, then verifies that no pool ended up empty.
    fn setup_pools(&self) -> crate::Result<()> {
        let dynamic = self.mode.contains(PartitionerMode::ALLOW_DYNAMIC_POOLS);
        let mut first = true;

        for pu in self.topology.pus() {
            let unclaimed = {
                let guard = self.inner.lock().expect(ERR_POISONED_LOCK);
                guard.pu_occupancy_counts[pu.id()] == 0
            };

            if !unclaimed {
                continue;
            }

            // The first free processing unit is always exclusive so the
            // default pool cannot be shrunk to nothing. The rest stay
            // exclusive unless dynamic pools are enabled, in which case they
            // are candidates for dynamic transfer.
            let exclusive = first || !dynamic;
            let default_pool_name = self.default_pool_name();

            self.add_resource_threads(pu, &default_pool_name, exclusive, 1)?;
            first = false;
        }

        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);

        if guard.pools[0].num_threads == 0 {
            return Err(crate::Error::DefaultPoolWithoutThreads {
                pool_name: guard.pools[0].name.clone(),
            });
        }

        for pool in &guard.pools {
            if pool.assigned_pus.is_empty() {
                return Err(crate::Error::EmptyPool {
                    pool_name: pool.name.clone(),
                });
            }
        }

        debug!(
            num_pools = guard.pools.len(),
            num_threads = guard.num_threads_overall,
            "pools populated"
        );
        Ok(())
    }

    /// Applies the configured default scheduling policy to every pool that
    /// has not chosen one.
    fn setup_schedulers(&self) -> crate::Result<()> {
        let default_scheduler = self.settings.default_scheduler()?;

        let mut guard = self.inner.lock().expect(ERR_POISONED_LOCK);

        for pool in &mut guard.pools {
            if pool.policy == SchedulingPolicy::Unspecified {
                pool.policy = default_scheduler;
            }
        }

        debug!(%default_scheduler, "schedulers configured");
        Ok(())
    }

    /// Rewrites the affinity table in pool order.
    ///
    /// Topology discovery numbered workers in order of occupation of the
    /// consecutive processing units, but the runtime instantiates workers pool
    /// by pool: first every worker of the default pool, then every worker of
    /// the next pool. Without this rewrite the k-th worker of the second pool
    /// would be bound to the wrong processing unit.
    fn reconfigure_affinities_locked(inner: &mut Inner) {
        let mut new_pu_nums = Vec::with_capacity(inner.num_threads_overall);
        let mut new_affinity_masks = Vec::with_capacity(inner.num_threads_overall);

        for pool in &inner.pools {
            new_pu_nums.extend(pool.assigned_pu_nums.iter().map(|slot| slot.pu_index));
            new_affinity_masks.extend(pool.assigned_pus.iter().cloned());
        }

        inner.affinity.set_num_threads(new_pu_nums.len());
        inner.affinity.set_pu_nums(new_pu_nums);
        inner.affinity.set_affinity_masks(new_affinity_masks);
    }

    fn assign_cores(&self, first_core: CoreIndex) -> crate::Result<usize> {
        let mut guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        let inner = &mut *guard;

        if inner.first_core != Some(first_core) {
            let pus_per_core = self.topology.pus_per_core(first_core).ok_or(
                crate::Error::CoreIndexOutOfBounds {
                    core: first_core,
                    num_cores: self.topology.num_cores(),
                },
            )?;

            let previous = inner.first_core.unwrap_or(0);
            let num_pus = self.topology.num_pus();

            // The shift may be downward; reduce it to a forward shift over the
            // machine's processing-unit count.
            let offset = ((first_core as isize - previous as isize) * pus_per_core as isize)
                .rem_euclid(num_pus as isize) as usize;

            if offset != 0 {
                for pool in &mut inner.pools {
                    pool.assign_first_core(offset);
                }
            }

            inner.first_core = Some(first_core);
            Self::reconfigure_affinities_locked(inner);
            inner.pus_needed = None;

            debug!(first_core, offset, "reassigned first core");
        }

        Ok(Self::threads_needed_locked(inner))
    }

    fn threads_needed_locked(inner: &mut Inner) -> usize {
        match inner.pus_needed {
            Some(pus_needed) => pus_needed,
            None => {
                let pus_needed = inner.affinity.num_pus_needed();
                inner.pus_needed = Some(pus_needed);
                pus_needed
            }
        }
    }

    fn threads_needed(&self) -> usize {
        let mut guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        Self::threads_needed_locked(&mut guard)
    }

    fn assign_pu(&self, pool_name: &str, virt_core: WorkerIndex) -> crate::Result<()> {
        let mut guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        let inner = &mut *guard;

        let pool_index = pool_position(&inner.pools, pool_name)?;
        inner.pools[pool_index].assign_pu(virt_core);
        Ok(())
    }

    fn unassign_pu(&self, pool_name: &str, virt_core: WorkerIndex) -> crate::Result<()> {
        match self.inner.try_lock() {
            Ok(mut guard) => {
                let inner = &mut *guard;

                let pool_index = pool_position(&inner.pools, pool_name)?;
                inner.pools[pool_index].unassign_pu(virt_core);
                Ok(())
            }
            Err(TryLockError::WouldBlock) => {
                // A concurrent reconfiguration owns the lock and will cover
                // this slot; the unassignment is dropped on purpose.
                trace!(
                    pool = pool_name,
                    virt_core,
                    "unassignment skipped under lock contention"
                );
                Ok(())
            }
            Err(TryLockError::Poisoned(_)) => panic!("{ERR_POISONED_LOCK}"),
        }
    }

    fn pu_is_exclusive(&self, pool_name: &str, virt_core: WorkerIndex) -> crate::Result<bool> {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);

        let pool_index = pool_position(&guard.pools, pool_name)?;
        Ok(guard.pools[pool_index].pu_is_exclusive(virt_core))
    }

    fn pu_is_assigned(&self, pool_name: &str, virt_core: WorkerIndex) -> crate::Result<bool> {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);

        let pool_index = pool_position(&guard.pools, pool_name)?;
        Ok(guard.pools[pool_index].pu_is_assigned(virt_core))
    }

    fn shrink_pool(
        &self,
        pool_name: &str,
        mut remove_pu: impl FnMut(WorkerIndex),
    ) -> crate::Result<usize> {
        if !self.mode.contains(PartitionerMode::ALLOW_DYNAMIC_POOLS) {
            return Err(crate::Error::DynamicPoolsDisabled);
        }

        let mut virt_cores_to_remove = Vec::new();
        let mut has_non_exclusive_pus = false;

        {
            let guard = self.inner.lock().expect(ERR_POISONED_LOCK);
            let pool_index = pool_position(&guard.pools, pool_name)?;
            let pool = &guard.pools[pool_index];

            virt_cores_to_remove.reserve(pool.num_threads);

            for virt_core in 0..pool.num_threads {
                if !pool.pu_is_exclusive(virt_core) {
                    has_non_exclusive_pus = true;
                    if pool.pu_is_assigned(virt_core) {
                        virt_cores_to_remove.push(virt_core);
                    }
                }
            }
        }

        if !has_non_exclusive_pus {
            return Err(crate::Error::NoNonExclusivePus {
                pool_name: pool_name.to_string(),
            });
        }

        // The callback runs without the partitioner lock held and is expected
        // to call back into unassign_pu() for each slot. Another actor may
        // have transitioned a slot since the snapshot; the callback tolerates
        // that by being a no-op for such slots.
        for virt_core in &virt_cores_to_remove {
            remove_pu(*virt_core);
        }

        debug!(
            pool = pool_name,
            count = virt_cores_to_remove.len(),
            "shrank pool"
        );
        Ok(virt_cores_to_remove.len())
    }

    fn expand_pool(
        &self,
        pool_name: &str,
        mut add_pu: impl FnMut(WorkerIndex),
    ) -> crate::Result<usize> {
        if !self.mode.contains(PartitionerMode::ALLOW_DYNAMIC_POOLS) {
            return Err(crate::Error::DynamicPoolsDisabled);
        }

        let mut virt_cores_to_add = Vec::new();
        let mut has_non_exclusive_pus = false;

        {
            let guard = self.inner.lock().expect(ERR_POISONED_LOCK);
            let pool_index = pool_position(&guard.pools, pool_name)?;
            let pool = &guard.pools[pool_index];

            virt_cores_to_add.reserve(pool.num_threads);

            for virt_core in 0..pool.num_threads {
                if !pool.pu_is_exclusive(virt_core) {
                    has_non_exclusive_pus = true;
                    if !pool.pu_is_assigned(virt_core) {
                        virt_cores_to_add.push(virt_core);
                    }
                }
            }
        }

        if !has_non_exclusive_pus {
            return Err(crate::Error::NoNonExclusivePus {
                pool_name: pool_name.to_string(),
            });
        }

        // Same two-phase contract as shrink_pool(), with assign_pu() instead.
        for virt_core in &virt_cores_to_add {
            add_pu(*virt_core);
        }

        debug!(
            pool = pool_name,
            count = virt_cores_to_add.len(),
            "expanded pool"
        );
        Ok(virt_cores_to_add.len())
    }

    pub(crate) fn num_pools(&self) -> usize {
        self.inner.lock().expect(ERR_POISONED_LOCK).pools.len()
    }

    pub(crate) fn num_threads(&self) -> usize {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        guard.pools.iter().map(|pool| pool.num_threads).sum()
    }

    pub(crate) fn num_threads_in(&self, pool_name: &str) -> crate::Result<usize> {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        let pool_index = pool_position(&guard.pools, pool_name)?;
        Ok(guard.pools[pool_index].num_threads)
    }

    pub(crate) fn num_threads_at(&self, index: PoolIndex) -> crate::Result<usize> {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        Ok(pool_at(&guard.pools, index)?.num_threads)
    }

    pub(crate) fn pool_index(&self, pool_name: &str) -> crate::Result<PoolIndex> {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        pool_position(&guard.pools, pool_name)
    }

    pub(crate) fn pool_name(&self, index: PoolIndex) -> crate::Result<String> {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        Ok(pool_at(&guard.pools, index)?.name.clone())
    }

    pub(crate) fn pool_exists(&self, pool_name: &str) -> bool {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        pool_position(&guard.pools, pool_name).is_ok()
    }

    fn scheduler_mode(&self, index: PoolIndex) -> crate::Result<SchedulerMode> {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        Ok(pool_at(&guard.pools, index)?.mode)
    }

    fn background_work(&self, index: PoolIndex) -> crate::Result<Option<BackgroundWorkFunction>> {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        Ok(pool_at(&guard.pools, index)?.background_work.clone())
    }

    fn pool_creator(&self, index: PoolIndex) -> crate::Result<Option<SchedulerFunction>> {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        Ok(pool_at(&guard.pools, index)?.create_function.clone())
    }

    fn which_scheduler(&self, pool_name: &str) -> crate::Result<SchedulingPolicy> {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        let pool_index = pool_position(&guard.pools, pool_name)?;

        let policy = guard.pools[pool_index].policy;
        if policy == SchedulingPolicy::Unspecified {
            return Err(crate::Error::UnspecifiedScheduler {
                pool_name: guard.pools[pool_index].name.clone(),
            });
        }

        Ok(policy)
    }

    fn pool_init(&self, index: PoolIndex) -> crate::Result<PoolInit> {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        let pool = pool_at(&guard.pools, index)?;

        Ok(PoolInit {
            index,
            name: pool.name.clone(),
            num_threads: pool.num_threads,
            mode: pool.mode,
            policy: pool.policy,
        })
    }

    fn pu_num(&self, worker: WorkerIndex) -> PuIndex {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);

        if guard.is_initialized {
            return guard.affinity.pu_num(worker).unwrap_or(worker);
        }

        // Schedulers may be used stand-alone before initialization; fall back
        // to the identity mapping.
        worker
    }

    pub(crate) fn pu_mask(&self, worker: WorkerIndex) -> PuMask {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);

        if guard.is_initialized {
            if let Some(mask) = guard.affinity.pu_mask(worker) {
                return mask.clone();
            }
        }

        let num_pus = self.topology.num_pus().max(worker + 1);
        PuMask::single(num_pus, worker)
    }

    fn used_pus_mask(&self, pu_num: PuIndex) -> PuMask {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);

        if guard.is_initialized {
            return guard.affinity.used_pus().clone();
        }

        let num_pus = self.topology.num_pus().max(pu_num + 1);
        PuMask::single(num_pus, pu_num)
    }

    fn thread_occupancy(&self, pu_num: PuIndex) -> usize {
        self.topology
            .pu(pu_num)
            .map_or(0, |pu| pu.thread_occupancy().get())
    }

    fn is_initialized(&self) -> bool {
        self.inner.lock().expect(ERR_POISONED_LOCK).is_initialized
    }

    fn default_pool_name(&self) -> String {
        self.inner.lock().expect(ERR_POISONED_LOCK).pools[0]
            .name
            .clone()
    }

    fn set_default_pool_name(&self, pool_name: &str) -> crate::Result<()> {
        if pool_name.is_empty() {
            return Err(crate::Error::EmptyPoolName);
        }

        let mut guard = self.inner.lock().expect(ERR_POISONED_LOCK);
        guard.pools[0].name = pool_name.to_string();
        Ok(())
    }

    fn print_pools(&self, out: &mut dyn io::Write) -> io::Result<()> {
        let guard = self.inner.lock().expect(ERR_POISONED_LOCK);

        writeln!(
            out,
            "the resource partitioner owns {} pool(s):",
            guard.pools.len()
        )?;

        for pool in &guard.pools {
            pool.write_summary(out)?;
        }

        Ok(())
    }
}

/// Builds a [`Partitioner`].
///
/// All knobs are optional: by default the partitioner runs in the strict mode
/// (no dynamic pools, no over-subscription), reads an empty settings table and
/// discovers a flat topology via [`SystemTopology`].
///
/// # Example
///
/// ```
/// use pool_partitioner::{Partitioner, PartitionerMode, StaticTopology};
///
/// let partitioner = Partitioner::builder()
///     .mode(PartitionerMode::ALLOW_DYNAMIC_POOLS)
///     .topology_provider(StaticTopology::uniform(1, 4, 1))
///     .build()?;
///
/// partitioner.configure_pools()?;
///
/// assert_eq!(partitioner.num_threads(), 4);
/// # Ok::<(), pool_partitioner::Error>(())
/// ```
#[derive(Default)]
pub struct PartitionerBuilder {
    mode: PartitionerMode,
    settings: Settings,
    used_pus: Option<Vec<PuIndex>>,
    provider: Option<Box<dyn TopologyProvider>>,
}

impl PartitionerBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the partitioner's operating mode.
    #[must_use]
    pub fn mode(mut self, mode: PartitionerMode) -> Self {
        self.mode = mode;
        self
    }

    /// Supplies the configuration entries the partitioner consumes.
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Restricts the partitioner to the given processing units; everything
    /// else is treated as not exposed to this process.
    #[must_use]
    pub fn used_pus(mut self, used_pus: impl IntoIterator<Item = PuIndex>) -> Self {
        self.used_pus = Some(used_pus.into_iter().collect());
        self
    }

    /// Sets the topology discoverer to consult. Defaults to [`SystemTopology`].
    #[must_use]
    pub fn topology_provider(mut self, provider: impl TopologyProvider + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    /// Builds the partitioner.
    ///
    /// Fails when another partitioner is alive in this process, when the
    /// settings are malformed, or when topology discovery reports an unusable
    /// machine.
    pub fn build(self) -> crate::Result<Partitioner> {
        let provider = self
            .provider
            .unwrap_or_else(|| Box::new(SystemTopology::new()));

        let default_scheduler_mode = self.settings.default_scheduler_mode()?;
        let topology = Topology::discover(provider.as_ref(), self.used_pus.as_deref())?;
        let num_pus = topology.num_pus();

        if let Some(used_pus) = &self.used_pus {
            if let Some(pu_index) = used_pus.iter().copied().find(|pu| *pu >= num_pus) {
                return Err(crate::Error::PuIndexOutOfBounds { pu_index, num_pus });
            }
        }

        let os_threads = match self.settings.os_threads()? {
            Some(os_threads) => os_threads,
            None => NonZeroUsize::new(num_pus)
                .expect("a discovered topology has at least one processing unit"),
        };

        let used_pus_mask = self
            .used_pus
            .map(|used_pus| PuMask::from_indices(num_pus, used_pus));

        // Only one partitioner may be alive per process.
        if INSTANCE_COUNT.fetch_add(1, Ordering::SeqCst) != 0 {
            INSTANCE_COUNT.fetch_sub(1, Ordering::SeqCst);
            return Err(crate::Error::AlreadyInstantiated);
        }

        let default_pool = PoolData::new(
            DEFAULT_POOL_NAME,
            SchedulingPolicy::Unspecified,
            default_scheduler_mode,
            None,
        )
        .expect("the reserved default pool name is not empty");

        let core = Arc::new(PartitionerCore {
            mode: self.mode,
            settings: self.settings,
            topology,
            os_threads,
            default_scheduler_mode,
            inner: Mutex::new(Inner {
                pools: vec![default_pool],
                affinity: AffinityData::new(num_pus, used_pus_mask),
                pu_occupancy_counts: vec![0; num_pus],
                num_threads_overall: 0,
                first_core: None,
                pus_needed: None,
                is_initialized: false,
            }),
        });

        *CURRENT.lock().expect(ERR_POISONED_LOCK) = Arc::downgrade(&core);

        debug!(num_pus, os_threads = os_threads.get(), "partitioner created");
        Ok(Partitioner { core })
    }
}

/// The process-wide configuration authority for thread pools.
///
/// Before a parallel runtime starts, the partitioner decides how the machine's
/// processing units are grouped into named pools, which scheduling policy each
/// pool uses and which processing units each worker is bound to. After
/// [`configure_pools()`][Self::configure_pools] has frozen the layout, the
/// running pools call back in to report worker assignment and to shrink or
/// expand dynamic pools while work is in flight.
///
/// At most one partitioner is alive per process; construct it via
/// [`Partitioner::builder()`], populate it, configure it, then hand it to
/// runtime initialization. The [process-wide query surface][crate::num_threads]
/// reaches the live instance from anywhere in the process.
///
/// # Example
///
/// ```
/// use pool_partitioner::{Partitioner, SchedulingPolicy, SchedulerMode, StaticTopology};
///
/// let partitioner = Partitioner::builder()
///     .topology_provider(StaticTopology::uniform(1, 8, 1))
///     .build()?;
///
/// // Claim the first two processing units for a dedicated I/O pool.
/// partitioner.create_thread_pool(
///     "io",
///     SchedulingPolicy::Static,
///     SchedulerMode::DEFAULT,
///     None,
/// )?;
///
/// let topology = partitioner.topology().clone();
/// for pu in &topology.pus()[..2] {
///     partitioner.add_resource(pu, "io", true)?;
/// }
///
/// // Everything unclaimed goes to the default pool.
/// partitioner.configure_pools()?;
///
/// assert_eq!(partitioner.num_threads_in("default")?, 6);
/// assert_eq!(partitioner.num_threads_in("io")?, 2);
/// # Ok::<(), pool_partitioner::Error>(())
/// ```
pub struct Partitioner {
    core: Arc<PartitionerCore>,
}

impl std::fmt::Debug for Partitioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partitioner").finish_non_exhaustive()
    }
}

impl Partitioner {
    /// Creates a builder that can be used to construct a partitioner.
    #[must_use]
    pub fn builder() -> PartitionerBuilder {
        PartitionerBuilder::new()
    }

    /// Creates a thread pool with the given scheduling policy.
    ///
    /// Creating a pool under the default pool's name (or the reserved literal
    /// `"default"`) replaces the default pool's descriptor, releasing any
    /// resources it held. Any other name must be new.
    pub fn create_thread_pool(
        &self,
        pool_name: &str,
        policy: SchedulingPolicy,
        mode: SchedulerMode,
        background_work: Option<BackgroundWorkFunction>,
    ) -> crate::Result<()> {
        self.core
            .create_thread_pool(pool_name, policy, mode, background_work)
    }

    /// Creates a thread pool backed by a caller-supplied scheduler factory.
    ///
    /// The pool's policy is [`SchedulingPolicy::UserDefined`] and the factory
    /// is stored verbatim for the runtime to invoke when it instantiates the
    /// pool.
    pub fn create_custom_thread_pool(
        &self,
        pool_name: &str,
        create_function: SchedulerFunction,
        background_work: Option<BackgroundWorkFunction>,
    ) -> crate::Result<()> {
        self.core
            .create_custom_thread_pool(pool_name, create_function, background_work)
    }

    /// Adds one worker slot on the given processing unit to a pool.
    ///
    /// Non-exclusive slots require [`PartitionerMode::ALLOW_DYNAMIC_POOLS`].
    /// Without [`PartitionerMode::ALLOW_OVERSUBSCRIPTION`], a processing unit
    /// hosts at most its thread occupancy worth of worker slots and the
    /// overall worker count may not exceed the configured thread count.
    pub fn add_resource(&self, pu: &Pu, pool_name: &str, exclusive: bool) -> crate::Result<()> {
        self.core.add_resource_threads(pu, pool_name, exclusive, 1)
    }

    /// Adds `num_threads` worker slots on the given processing unit to a pool.
    ///
    /// More than one slot per processing unit is over-subscription and is
    /// validated accordingly.
    pub fn add_resource_threads(
        &self,
        pu: &Pu,
        pool_name: &str,
        exclusive: bool,
        num_threads: usize,
    ) -> crate::Result<()> {
        self.core
            .add_resource_threads(pu, pool_name, exclusive, num_threads)
    }

    /// Adds one worker slot on each of the given processing units to a pool.
    pub fn add_resource_pus<'t>(
        &self,
        pus: impl IntoIterator<Item = &'t Pu>,
        pool_name: &str,
        exclusive: bool,
    ) -> crate::Result<()> {
        for pu in pus {
            self.core.add_resource_threads(pu, pool_name, exclusive, 1)?;
        }
        Ok(())
    }

    /// Adds every processing unit of a core to a pool.
    pub fn add_resource_core(
        &self,
        core: &Core,
        pool_name: &str,
        exclusive: bool,
    ) -> crate::Result<()> {
        for pu in self.core.topology.pus_in(core) {
            self.core.add_resource_threads(pu, pool_name, exclusive, 1)?;
        }
        Ok(())
    }

    /// Adds every processing unit of a NUMA domain to a pool.
    pub fn add_resource_numa_domain(
        &self,
        domain: &NumaDomain,
        pool_name: &str,
        exclusive: bool,
    ) -> crate::Result<()> {
        for core in self.core.topology.cores_in(domain) {
            for pu in self.core.topology.pus_in(core) {
                self.core.add_resource_threads(pu, pool_name, exclusive, 1)?;
            }
        }
        Ok(())
    }

    /// Overwrites a pool's scheduling policy.
    pub fn set_scheduler(&self, policy: SchedulingPolicy, pool_name: &str) -> crate::Result<()> {
        self.core.set_scheduler(policy, pool_name)
    }

    /// Freezes the pool layout.
    ///
    /// Hands every unclaimed processing unit to the default pool, resolves
    /// unspecified scheduling policies to the configured default and rewrites
    /// the worker affinity table in pool order. Any failure leaves the
    /// partitioner un-initialized.
    pub fn configure_pools(&self) -> crate::Result<()> {
        self.core.configure_pools()
    }

    /// Shifts every pool's bindings so that the runtime starts on the given
    /// first core, and returns [`threads_needed()`][Self::threads_needed].
    ///
    /// Calling this again with the same first core is a no-op.
    pub fn assign_cores(&self, first_core: CoreIndex) -> crate::Result<usize> {
        self.core.assign_cores(first_core)
    }

    /// The number of distinct processing units referenced by configured
    /// workers.
    #[must_use]
    pub fn threads_needed(&self) -> usize {
        self.core.threads_needed()
    }

    /// Records that a worker now occupies the given virtual core of a pool.
    ///
    /// The slot must currently be unoccupied.
    pub fn assign_pu(&self, pool_name: &str, virt_core: WorkerIndex) -> crate::Result<()> {
        self.core.assign_pu(pool_name, virt_core)
    }

    /// Records that a worker has vacated the given virtual core of a pool.
    ///
    /// The slot must currently be occupied. When the partitioner lock is
    /// contended the unassignment is silently skipped; a concurrent
    /// reconfiguration covers it.
    pub fn unassign_pu(&self, pool_name: &str, virt_core: WorkerIndex) -> crate::Result<()> {
        self.core.unassign_pu(pool_name, virt_core)
    }

    /// Whether the given virtual core of a pool may not be taken away by a
    /// dynamic shrink.
    pub fn pu_is_exclusive(&self, pool_name: &str, virt_core: WorkerIndex) -> crate::Result<bool> {
        self.core.pu_is_exclusive(pool_name, virt_core)
    }

    /// Whether a worker currently occupies the given virtual core of a pool.
    pub fn pu_is_assigned(&self, pool_name: &str, virt_core: WorkerIndex) -> crate::Result<bool> {
        self.core.pu_is_assigned(pool_name, virt_core)
    }

    /// Invokes `remove_pu` for every non-exclusive, currently assigned virtual
    /// core of a pool and returns how many there were.
    ///
    /// The callback runs without the partitioner lock held and is expected to
    /// call back into [`unassign_pu()`][Self::unassign_pu] for the same slot.
    /// Because the lock is released between the snapshot and the callbacks,
    /// a slot may have been transitioned by another actor in between; the
    /// callback must be a no-op in that case.
    pub fn shrink_pool(
        &self,
        pool_name: &str,
        remove_pu: impl FnMut(WorkerIndex),
    ) -> crate::Result<usize> {
        self.core.shrink_pool(pool_name, remove_pu)
    }

    /// Invokes `add_pu` for every non-exclusive, currently unassigned virtual
    /// core of a pool and returns how many there were.
    ///
    /// The same two-phase contract as [`shrink_pool()`][Self::shrink_pool]
    /// applies, with [`assign_pu()`][Self::assign_pu] instead.
    pub fn expand_pool(
        &self,
        pool_name: &str,
        add_pu: impl FnMut(WorkerIndex),
    ) -> crate::Result<usize> {
        self.core.expand_pool(pool_name, add_pu)
    }

    /// The number of pools in the registry, the default pool included.
    #[must_use]
    pub fn num_pools(&self) -> usize {
        self.core.num_pools()
    }

    /// The total number of worker slots across all pools.
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.core.num_threads()
    }

    /// The number of worker slots of the named pool.
    pub fn num_threads_in(&self, pool_name: &str) -> crate::Result<usize> {
        self.core.num_threads_in(pool_name)
    }

    /// The number of worker slots of the pool at the given index.
    pub fn num_threads_at(&self, index: PoolIndex) -> crate::Result<usize> {
        self.core.num_threads_at(index)
    }

    /// Resolves a pool name to its registry index. The literal `"default"`
    /// always resolves to index 0.
    pub fn pool_index(&self, pool_name: &str) -> crate::Result<PoolIndex> {
        self.core.pool_index(pool_name)
    }

    /// The name of the pool at the given index.
    pub fn pool_name(&self, index: PoolIndex) -> crate::Result<String> {
        self.core.pool_name(index)
    }

    /// Whether a pool with the given name exists.
    #[must_use]
    pub fn pool_exists(&self, pool_name: &str) -> bool {
        self.core.pool_exists(pool_name)
    }

    /// The scheduler mode of the pool at the given index.
    pub fn scheduler_mode(&self, index: PoolIndex) -> crate::Result<SchedulerMode> {
        self.core.scheduler_mode(index)
    }

    /// The background-work hook of the pool at the given index, if any.
    pub fn background_work(
        &self,
        index: PoolIndex,
    ) -> crate::Result<Option<BackgroundWorkFunction>> {
        self.core.background_work(index)
    }

    /// The scheduler factory of the pool at the given index; present if and
    /// only if the pool's policy is [`SchedulingPolicy::UserDefined`].
    pub fn pool_creator(&self, index: PoolIndex) -> crate::Result<Option<SchedulerFunction>> {
        self.core.pool_creator(index)
    }

    /// The scheduling policy a pool's executor must be instantiated with.
    ///
    /// Fails while the policy is still unspecified, i.e. before
    /// [`configure_pools()`][Self::configure_pools] resolved the defaults.
    pub fn which_scheduler(&self, pool_name: &str) -> crate::Result<SchedulingPolicy> {
        self.core.which_scheduler(pool_name)
    }

    /// Everything an executor needs to instantiate the pool at the given index.
    pub fn pool_init(&self, index: PoolIndex) -> crate::Result<PoolInit> {
        self.core.pool_init(index)
    }

    /// The processing unit the given worker is bound to.
    ///
    /// Before initialization this falls back to the identity mapping.
    #[must_use]
    pub fn pu_num(&self, worker: WorkerIndex) -> PuIndex {
        self.core.pu_num(worker)
    }

    /// The affinity mask of the given worker.
    ///
    /// Before initialization this falls back to a one-hot mask on the worker's
    /// own index.
    #[must_use]
    pub fn pu_mask(&self, worker: WorkerIndex) -> PuMask {
        self.core.pu_mask(worker)
    }

    /// The mask of processing units this process is allowed to use.
    ///
    /// Before initialization this falls back to a one-hot mask on the given
    /// processing unit.
    #[must_use]
    pub fn used_pus_mask(&self, pu_num: PuIndex) -> PuMask {
        self.core.used_pus_mask(pu_num)
    }

    /// How many worker threads the given processing unit may host; zero for
    /// unexposed processing units.
    #[must_use]
    pub fn thread_occupancy(&self, pu_num: PuIndex) -> usize {
        self.core.thread_occupancy(pu_num)
    }

    /// The topology snapshot taken at construction.
    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.core.topology
    }

    /// The partitioner's operating mode.
    #[must_use]
    pub fn mode(&self) -> PartitionerMode {
        self.core.mode
    }

    /// Whether [`configure_pools()`][Self::configure_pools] has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.core.is_initialized()
    }

    /// The current name of the default pool.
    #[must_use]
    pub fn default_pool_name(&self) -> String {
        self.core.default_pool_name()
    }

    /// Renames the default pool. It stays reachable under the literal
    /// `"default"`.
    pub fn set_default_pool_name(&self, pool_name: &str) -> crate::Result<()> {
        self.core.set_default_pool_name(pool_name)
    }

    /// Writes a human-readable summary of every pool: its name, its scheduler
    /// and the affinity mask of each worker.
    pub fn print_pools(&self, out: &mut dyn io::Write) -> io::Result<()> {
        self.core.print_pools(out)
    }
}
