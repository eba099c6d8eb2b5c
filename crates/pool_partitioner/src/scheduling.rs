use std::sync::Arc;

use bitflags::bitflags;
use derive_more::derive::Display;

use crate::{PoolIndex, WorkerIndex};

/// The closed set of scheduling policies a thread pool can be created with.
///
/// The partitioner only records the policy; the executor that interprets it is
/// outside this crate. `Unspecified` is the initial state of every pool and is
/// replaced with the configured default during pool configuration.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum SchedulingPolicy {
    /// No policy chosen yet; resolved to the configured default during
    /// pool configuration.
    #[display("unspecified")]
    Unspecified,

    /// The pool is created through a caller-supplied scheduler factory.
    #[display("user supplied")]
    UserDefined,

    /// Local queues, FIFO ordering.
    #[display("local")]
    Local,

    /// Local queues with priority lanes, FIFO ordering.
    #[display("local_priority_fifo")]
    LocalPriorityFifo,

    /// Local queues with priority lanes, LIFO ordering.
    #[display("local_priority_lifo")]
    LocalPriorityLifo,

    /// Work-requesting variant of the local scheduler, FIFO ordering.
    #[display("local_workrequesting_fifo")]
    LocalWorkrequestingFifo,

    /// Work-requesting variant of the local scheduler, LIFO ordering.
    #[display("local_workrequesting_lifo")]
    LocalWorkrequestingLifo,

    /// Work-requesting variant of the local scheduler using message-passing
    /// between workers.
    #[display("local_workrequesting_mc")]
    LocalWorkrequestingMc,

    /// Static task-to-worker assignment, no stealing.
    #[display("static")]
    Static,

    /// Static assignment with priority lanes.
    #[display("static_priority")]
    StaticPriority,

    /// ABP deque based scheduler with priority lanes, FIFO ordering.
    #[display("abp_priority_fifo")]
    AbpPriorityFifo,

    /// ABP deque based scheduler with priority lanes, LIFO ordering.
    #[display("abp_priority_lifo")]
    AbpPriorityLifo,

    /// A single priority queue shared by all workers of the pool.
    #[display("shared_priority")]
    SharedPriority,
}

impl SchedulingPolicy {
    /// Configuration names accepted for each selectable policy, in match order.
    ///
    /// A configured name selects the first entry it is a prefix of, so `"local"`
    /// wins over `"local-priority-fifo"` for any prefix both share.
    const NAME_CANDIDATES: [(&'static str, Self); 11] = [
        ("local", Self::Local),
        ("local-priority-fifo", Self::LocalPriorityFifo),
        ("local-priority-lifo", Self::LocalPriorityLifo),
        ("local-workrequesting-fifo", Self::LocalWorkrequestingFifo),
        ("local-workrequesting-lifo", Self::LocalWorkrequestingLifo),
        ("local-workrequesting-mc", Self::LocalWorkrequestingMc),
        ("static", Self::Static),
        ("static-priority", Self::StaticPriority),
        ("abp-priority-fifo", Self::AbpPriorityFifo),
        ("abp-priority-lifo", Self::AbpPriorityLifo),
        ("shared-priority", Self::SharedPriority),
    ];

    /// Resolves a configured scheduler name to a policy.
    ///
    /// The name may be any prefix of a policy's configuration name; the first
    /// candidate it prefixes wins, so the empty string resolves to [`Local`].
    ///
    /// [`Local`]: Self::Local
    pub fn from_configured_name(name: &str) -> crate::Result<Self> {
        Self::NAME_CANDIDATES
            .iter()
            .find(|(candidate, _)| candidate.starts_with(name))
            .map(|(_, policy)| *policy)
            .ok_or_else(|| crate::Error::UnknownScheduler {
                name: name.to_string(),
            })
    }
}

bitflags! {
    /// Mode bits forwarded to the executor of each pool.
    ///
    /// The partitioner does not interpret these beyond validating that a
    /// configured bitmask stays within the recognized set.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
    pub struct SchedulerMode: u32 {
        /// Workers run background work between tasks.
        const DO_BACKGROUND_WORK = 0x0001;

        /// Worker threads run at reduced OS priority.
        const REDUCE_THREAD_PRIORITY = 0x0002;

        /// Workers linger before exiting when they run out of work.
        const DELAY_EXIT = 0x0004;

        /// Workers spin instead of sleeping when idle.
        const FAST_IDLE_MODE = 0x0008;

        /// The executor may vary its worker count at runtime.
        const ENABLE_ELASTICITY = 0x0010;

        /// Workers run background work exclusively.
        const DO_BACKGROUND_WORK_ONLY = 0x0020;

        /// Workers steal tasks from each other.
        const ENABLE_STEALING = 0x0040;

        /// Workers steal across NUMA domain boundaries.
        const ENABLE_STEALING_NUMA = 0x0080;

        /// New tasks are distributed round-robin over workers.
        const ASSIGN_WORK_ROUND_ROBIN = 0x0100;

        /// New tasks stay with the worker that created them.
        const ASSIGN_WORK_THREAD_PARENT = 0x0200;

        /// Stealing prefers high-priority tasks.
        const STEAL_HIGH_PRIORITY_FIRST = 0x0400;

        /// Stealing happens only once local queues are exhausted.
        const STEAL_AFTER_LOCAL = 0x0800;

        /// Idle workers back off exponentially.
        const ENABLE_IDLE_BACKOFF = 0x1000;

        /// The combination applied to pools that do not configure a mode.
        const DEFAULT = Self::DO_BACKGROUND_WORK.bits()
            | Self::REDUCE_THREAD_PRIORITY.bits()
            | Self::DELAY_EXIT.bits()
            | Self::ENABLE_STEALING.bits()
            | Self::ENABLE_STEALING_NUMA.bits()
            | Self::ASSIGN_WORK_ROUND_ROBIN.bits()
            | Self::STEAL_AFTER_LOCAL.bits()
            | Self::ENABLE_IDLE_BACKOFF.bits();
    }
}

impl Default for SchedulerMode {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Everything an executor needs to instantiate one configured thread pool.
///
/// Handed to a [`SchedulerFunction`] when the runtime brings the pool up.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct PoolInit {
    /// Index of the pool in the partitioner's registry.
    pub index: PoolIndex,

    /// Name of the pool.
    pub name: String,

    /// Number of worker threads the pool was configured with.
    pub num_threads: usize,

    /// Mode bits for the pool's executor.
    pub mode: SchedulerMode,

    /// The scheduling policy the pool was configured with.
    pub policy: SchedulingPolicy,
}

/// Factory for a caller-supplied scheduler.
///
/// Stored verbatim by the partitioner and handed back to the runtime when it
/// instantiates the pool; a pool holds one of these if and only if its policy
/// is [`SchedulingPolicy::UserDefined`].
pub type SchedulerFunction = Arc<dyn Fn(PoolInit) + Send + Sync>;

/// Hook invoked by a pool's workers between tasks.
///
/// Receives the global index of the invoking worker and returns whether any
/// background work was performed. Stored verbatim and forwarded to the
/// executor on pool creation.
pub type BackgroundWorkFunction = Arc<dyn Fn(WorkerIndex) -> bool + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_matching_smoke_test() {
        assert_eq!(
            SchedulingPolicy::from_configured_name("").unwrap(),
            SchedulingPolicy::Local
        );
        assert_eq!(
            SchedulingPolicy::from_configured_name("local").unwrap(),
            SchedulingPolicy::Local
        );
        assert_eq!(
            SchedulingPolicy::from_configured_name("local-priority-f").unwrap(),
            SchedulingPolicy::LocalPriorityFifo
        );
        assert_eq!(
            SchedulingPolicy::from_configured_name("static").unwrap(),
            SchedulingPolicy::Static
        );
        assert_eq!(
            SchedulingPolicy::from_configured_name("static-p").unwrap(),
            SchedulingPolicy::StaticPriority
        );
        assert_eq!(
            SchedulingPolicy::from_configured_name("abp-priority-lifo").unwrap(),
            SchedulingPolicy::AbpPriorityLifo
        );
        assert_eq!(
            SchedulingPolicy::from_configured_name("shared").unwrap(),
            SchedulingPolicy::SharedPriority
        );
    }

    #[test]
    fn unknown_scheduler_name_is_rejected() {
        let error = SchedulingPolicy::from_configured_name("quantum").unwrap_err();

        assert!(matches!(error, crate::Error::UnknownScheduler { .. }));
    }

    #[test]
    fn scheduler_names_are_never_selected_by_a_longer_string() {
        // A full name with a suffix appended is not a prefix of anything.
        SchedulingPolicy::from_configured_name("localx").unwrap_err();
    }

    #[test]
    fn display_names_are_human_readable() {
        assert_eq!(SchedulingPolicy::Local.to_string(), "local");
        assert_eq!(
            SchedulingPolicy::LocalPriorityFifo.to_string(),
            "local_priority_fifo"
        );
        assert_eq!(SchedulingPolicy::UserDefined.to_string(), "user supplied");
    }

    #[test]
    fn default_mode_is_within_recognized_bits() {
        assert_eq!(
            SchedulerMode::from_bits(SchedulerMode::DEFAULT.bits()),
            Some(SchedulerMode::DEFAULT)
        );
    }

    #[test]
    fn unknown_mode_bits_do_not_round_trip() {
        assert!(SchedulerMode::from_bits(0x8000_0000).is_none());
    }
}
