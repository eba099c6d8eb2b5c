use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use crate::{SchedulerMode, SchedulingPolicy};

/// String key/value configuration entries consumed by the partitioner.
///
/// The configuration store itself lives outside this crate; whoever owns it
/// copies the relevant entries in here. Only three keys are interpreted
/// ([`Settings::OS_THREADS`], [`Settings::SCHEDULER`] and
/// [`Settings::DEFAULT_SCHEDULER_MODE`]); missing keys fall back to defaults
/// and malformed values are reported when the entry is first read.
///
/// # Example
///
/// ```
/// use pool_partitioner::{Settings, SchedulingPolicy};
///
/// let settings = Settings::from_entries([
///     (Settings::OS_THREADS, "4"),
///     (Settings::SCHEDULER, "static-p"),
/// ]);
///
/// assert_eq!(settings.os_threads().unwrap().unwrap().get(), 4);
/// assert_eq!(
///     settings.default_scheduler().unwrap(),
///     SchedulingPolicy::StaticPriority
/// );
/// ```
#[derive(Clone, Debug, Default)]
pub struct Settings {
    entries: BTreeMap<String, String>,
}

impl Settings {
    /// Key holding the number of worker threads the runtime was asked for.
    pub const OS_THREADS: &'static str = "hpx.os_threads";

    /// Key holding the default scheduler name; any prefix of a known
    /// scheduler name is accepted.
    pub const SCHEDULER: &'static str = "hpx.scheduler";

    /// Key holding the default scheduler mode as an integer bitmask.
    pub const DEFAULT_SCHEDULER_MODE: &'static str = "hpx.default_scheduler_mode";

    /// Creates an empty settings table; every consumed key falls back to its
    /// default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a settings table from key/value entries.
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Sets one entry, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Raw access to an entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// The configured worker-thread count, or `None` when not configured.
    ///
    /// The value must be a positive integer.
    pub fn os_threads(&self) -> crate::Result<Option<NonZeroUsize>> {
        let Some(value) = self.get(Self::OS_THREADS) else {
            return Ok(None);
        };

        let count = value
            .parse::<usize>()
            .map_err(|inner| crate::Error::InvalidSettingsValue {
                key: Self::OS_THREADS.to_string(),
                value: value.to_string(),
                problem: format!("could not be parsed as an integer: {inner}"),
            })?;

        NonZeroUsize::new(count)
            .ok_or_else(|| crate::Error::InvalidSettingsValue {
                key: Self::OS_THREADS.to_string(),
                value: value.to_string(),
                problem: "must be a positive integer".to_string(),
            })
            .map(Some)
    }

    /// The scheduling policy pools fall back to when they do not choose one.
    ///
    /// A missing entry resolves the same way as the empty prefix.
    pub fn default_scheduler(&self) -> crate::Result<SchedulingPolicy> {
        SchedulingPolicy::from_configured_name(self.get(Self::SCHEDULER).unwrap_or(""))
    }

    /// The scheduler mode applied to pools that do not configure one.
    ///
    /// The value is an integer bitmask; bits outside the recognized set are
    /// rejected.
    pub fn default_scheduler_mode(&self) -> crate::Result<SchedulerMode> {
        let Some(value) = self.get(Self::DEFAULT_SCHEDULER_MODE) else {
            return Ok(SchedulerMode::DEFAULT);
        };

        let bits = value
            .parse::<u32>()
            .map_err(|inner| crate::Error::InvalidSettingsValue {
                key: Self::DEFAULT_SCHEDULER_MODE.to_string(),
                value: value.to_string(),
                problem: format!("could not be parsed as an integer: {inner}"),
            })?;

        SchedulerMode::from_bits(bits).ok_or(crate::Error::UnknownSchedulerModeBits { bits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn smoke_test() {
        let mut settings = Settings::new();

        assert!(settings.os_threads().unwrap().is_none());
        assert_eq!(
            settings.default_scheduler().unwrap(),
            SchedulingPolicy::Local
        );
        assert_eq!(
            settings.default_scheduler_mode().unwrap(),
            SchedulerMode::DEFAULT
        );

        settings.set(Settings::OS_THREADS, "16");
        settings.set(Settings::SCHEDULER, "abp-priority-f");
        settings.set(
            Settings::DEFAULT_SCHEDULER_MODE,
            SchedulerMode::DO_BACKGROUND_WORK.bits().to_string(),
        );

        assert_eq!(settings.os_threads().unwrap().unwrap().get(), 16);
        assert_eq!(
            settings.default_scheduler().unwrap(),
            SchedulingPolicy::AbpPriorityFifo
        );
        assert_eq!(
            settings.default_scheduler_mode().unwrap(),
            SchedulerMode::DO_BACKGROUND_WORK
        );
    }

    #[test]
    fn zero_os_threads_is_rejected() {
        let settings = Settings::from_entries([(Settings::OS_THREADS, "0")]);

        let error = settings.os_threads().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::CommandLine);
    }

    #[test]
    fn garbage_os_threads_is_rejected() {
        let settings = Settings::from_entries([(Settings::OS_THREADS, "many")]);

        settings.os_threads().unwrap_err();
    }

    #[test]
    fn unknown_scheduler_is_rejected() {
        let settings = Settings::from_entries([(Settings::SCHEDULER, "quantum")]);

        let error = settings.default_scheduler().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::CommandLine);
    }

    #[test]
    fn unknown_mode_bits_are_rejected() {
        let settings =
            Settings::from_entries([(Settings::DEFAULT_SCHEDULER_MODE, "2147483648")]);

        let error = settings.default_scheduler_mode().unwrap_err();
        assert!(matches!(
            error,
            crate::Error::UnknownSchedulerModeBits { bits: 0x8000_0000 }
        ));
    }

    #[test]
    fn entries_can_be_overwritten() {
        let mut settings = Settings::from_entries([(Settings::OS_THREADS, "4")]);
        settings.set(Settings::OS_THREADS, "8");

        assert_eq!(settings.os_threads().unwrap().unwrap().get(), 8);
    }
}
