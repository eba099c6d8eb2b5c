use thiserror::Error;

use crate::{PoolIndex, PuIndex};

/// Broad category of a partitioner error, for programmatic matching.
///
/// Every [`Error`] variant belongs to exactly one kind; the kind expresses what
/// class of mistake was made rather than which operation detected it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The partitioner as a whole is in a state in which the operation cannot
    /// be carried out (e.g. a second live instance, or a pool left without
    /// resources at configuration time).
    InvalidStatus,

    /// The operation is valid in principle but conflicts with the partitioner's
    /// operating mode or resource limits.
    BadParameter,

    /// A caller-supplied value (name or index) does not identify anything.
    InvalidArgument,

    /// A configuration entry could not be interpreted.
    CommandLine,
}

/// Errors reported by the partitioner.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Another partitioner is already alive in this process.
    #[error("cannot instantiate more than one resource partitioner per process")]
    AlreadyInstantiated,

    /// Topology discovery found no processing units at all.
    #[error("the topology provider reported no processing units")]
    NoProcessingUnits,

    /// A processing unit reported a thread occupancy of zero during discovery.
    #[error("processing unit #{pu_index} has thread occupancy 0")]
    ZeroThreadOccupancy {
        /// The offending processing unit.
        pu_index: PuIndex,
    },

    /// After configuration, the default pool ended up with no worker threads.
    #[error(
        "default pool '{pool_name}' has no threads assigned; \
         check the thread count and the pool thread assignment"
    )]
    DefaultPoolWithoutThreads {
        /// Current name of the default pool.
        pool_name: String,
    },

    /// A pool ended up with no resources (or only empty affinity masks).
    #[error("pool '{pool_name}' is empty of resources, which is not allowed")]
    EmptyPool {
        /// Name of the offending pool.
        pool_name: String,
    },

    /// A query was made through the process-wide surface while no partitioner
    /// is alive.
    #[error("no resource partitioner is alive in this process")]
    NoPartitioner,

    /// A non-exclusive resource was added while dynamic pools are disabled, or
    /// a dynamic operation was attempted on a non-dynamic partitioner.
    #[error("dynamic pools have not been enabled for this partitioner")]
    DynamicPoolsDisabled,

    /// A processing unit was asked to host more worker threads than its
    /// occupancy allows.
    #[error(
        "processing unit #{pu_index} can be assigned only {thread_occupancy} \
         threads according to affinity bindings"
    )]
    PuOversubscribed {
        /// The offending processing unit.
        pu_index: PuIndex,

        /// How many worker threads the processing unit may host.
        thread_occupancy: usize,
    },

    /// The partitioner was asked to create more worker threads than the
    /// configured OS thread count.
    #[error(
        "creation of {requested} threads requested by the resource partitioner, \
         but only {os_threads} were configured"
    )]
    TooManyThreads {
        /// Worker threads requested across all pools.
        requested: usize,

        /// The configured limit.
        os_threads: usize,
    },

    /// A shrink or expand operation targeted a pool with no non-exclusive
    /// processing units.
    #[error("pool '{pool_name}' has no non-exclusive processing units associated")]
    NoNonExclusivePus {
        /// Name of the offending pool.
        pool_name: String,
    },

    /// A thread pool cannot be created with an empty string as its name.
    #[error("cannot instantiate a thread pool with empty string as a name")]
    EmptyPoolName,

    /// A thread pool with this name already exists.
    #[error("there already exists a pool named '{pool_name}'")]
    DuplicatePoolName {
        /// The duplicate name.
        pool_name: String,
    },

    /// No thread pool with this name exists.
    #[error("the resource partitioner does not own a thread pool named '{pool_name}'")]
    UnknownPoolName {
        /// The unknown name.
        pool_name: String,
    },

    /// A pool index was out of range.
    #[error(
        "pool index {index} too large: the resource partitioner owns \
         only {num_pools} thread pools"
    )]
    PoolIndexOutOfBounds {
        /// The out-of-range index.
        index: PoolIndex,

        /// How many pools exist.
        num_pools: usize,
    },

    /// A processing-unit index was out of range.
    #[error(
        "processing unit index {pu_index} out of bounds; the total available \
         number of processing units on this machine is {num_pus}"
    )]
    PuIndexOutOfBounds {
        /// The out-of-range index.
        pu_index: PuIndex,

        /// The machine's processing-unit count.
        num_pus: usize,
    },

    /// A core index was out of range.
    #[error("core index {core} out of bounds; this machine has {num_cores} cores")]
    CoreIndexOutOfBounds {
        /// The out-of-range index.
        core: usize,

        /// The machine's core count.
        num_cores: usize,
    },

    /// A pool's scheduler was queried while its policy is still unspecified.
    #[error("thread pool '{pool_name}' cannot be instantiated with unspecified scheduler type")]
    UnspecifiedScheduler {
        /// Name of the offending pool.
        pool_name: String,
    },

    /// A scheduler name did not prefix-match any known scheduling policy.
    #[error("bad value for the configured scheduler name: '{name}'")]
    UnknownScheduler {
        /// The unrecognized name.
        name: String,
    },

    /// A scheduler-mode bitmask contained bits outside the recognized set.
    #[error("scheduler mode {bits:#x} contains unknown scheduler mode bits")]
    UnknownSchedulerModeBits {
        /// The raw bitmask.
        bits: u32,
    },

    /// A configuration entry had a value that could not be interpreted.
    #[error("configuration entry '{key}' has invalid value '{value}': {problem}")]
    InvalidSettingsValue {
        /// The configuration key.
        key: String,

        /// The raw value.
        value: String,

        /// Human-readable description of what went wrong.
        problem: String,
    },
}

impl Error {
    /// The broad category this error belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyInstantiated
            | Self::NoProcessingUnits
            | Self::ZeroThreadOccupancy { .. }
            | Self::DefaultPoolWithoutThreads { .. }
            | Self::EmptyPool { .. }
            | Self::NoPartitioner => ErrorKind::InvalidStatus,

            Self::DynamicPoolsDisabled
            | Self::PuOversubscribed { .. }
            | Self::TooManyThreads { .. }
            | Self::NoNonExclusivePus { .. } => ErrorKind::BadParameter,

            Self::EmptyPoolName
            | Self::DuplicatePoolName { .. }
            | Self::UnknownPoolName { .. }
            | Self::PoolIndexOutOfBounds { .. }
            | Self::PuIndexOutOfBounds { .. }
            | Self::CoreIndexOutOfBounds { .. }
            | Self::UnspecifiedScheduler { .. } => ErrorKind::InvalidArgument,

            Self::UnknownScheduler { .. }
            | Self::UnknownSchedulerModeBits { .. }
            | Self::InvalidSettingsValue { .. } => ErrorKind::CommandLine,
        }
    }
}

/// Shorthand for fallible operations of this crate.
pub type Result<T> = std::result::Result<T, crate::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(Error::AlreadyInstantiated.kind(), ErrorKind::InvalidStatus);
        assert_eq!(
            Error::DynamicPoolsDisabled.kind(),
            ErrorKind::BadParameter
        );
        assert_eq!(Error::EmptyPoolName.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            Error::UnknownScheduler {
                name: "quantum".to_string()
            }
            .kind(),
            ErrorKind::CommandLine
        );
    }

    #[test]
    fn messages_name_the_offender() {
        let error = Error::PuOversubscribed {
            pu_index: 3,
            thread_occupancy: 1,
        };

        let message = error.to_string();
        assert!(message.contains("#3"));
        assert!(message.contains("only 1 threads"));
    }
}
