use itertools::Itertools;
use pu_mask::PuMask;

use crate::{PuIndex, WorkerIndex};

/// The worker-to-hardware binding table exposed to the outside world.
///
/// Topology discovery produces affinity information in topology order, but
/// worker indices run in pool order; the partitioner rewrites this table in
/// bulk whenever the pool layout changes, so the `worker`-indexed getters
/// always answer in pool order.
#[derive(Clone, Debug)]
pub(crate) struct AffinityData {
    num_threads: usize,

    /// Per worker, the index of the processing unit it is bound to.
    pu_nums: Vec<PuIndex>,

    /// Per worker, the affinity mask it is bound with.
    affinity_masks: Vec<PuMask>,

    /// The processing units this process is allowed to use.
    used_pus: PuMask,
}

impl AffinityData {
    /// Creates an empty table over a machine with `num_pus` processing units.
    ///
    /// When no restriction is given, every processing unit is considered used.
    pub(crate) fn new(num_pus: usize, used_pus: Option<PuMask>) -> Self {
        Self {
            num_threads: 0,
            pu_nums: Vec::new(),
            affinity_masks: Vec::new(),
            used_pus: used_pus.unwrap_or_else(|| PuMask::all(num_pus)),
        }
    }

    pub(crate) fn set_num_threads(&mut self, num_threads: usize) {
        self.num_threads = num_threads;
    }

    pub(crate) fn set_pu_nums(&mut self, pu_nums: Vec<PuIndex>) {
        self.pu_nums = pu_nums;
    }

    pub(crate) fn set_affinity_masks(&mut self, affinity_masks: Vec<PuMask>) {
        self.affinity_masks = affinity_masks;
    }

    pub(crate) fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub(crate) fn pu_num(&self, worker: WorkerIndex) -> Option<PuIndex> {
        self.pu_nums.get(worker).copied()
    }

    pub(crate) fn pu_mask(&self, worker: WorkerIndex) -> Option<&PuMask> {
        self.affinity_masks.get(worker)
    }

    pub(crate) fn used_pus(&self) -> &PuMask {
        &self.used_pus
    }

    /// The number of distinct processing units referenced by configured workers.
    pub(crate) fn num_pus_needed(&self) -> usize {
        self.pu_nums.iter().unique().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoke_test() {
        let mut affinity = AffinityData::new(4, None);

        assert_eq!(affinity.num_threads(), 0);
        assert_eq!(affinity.num_pus_needed(), 0);
        assert!(affinity.pu_num(0).is_none());
        assert!(affinity.pu_mask(0).is_none());

        // Every processing unit is used by default.
        assert!(affinity.used_pus().is_set(0));
        assert!(affinity.used_pus().is_set(3));

        affinity.set_num_threads(3);
        affinity.set_pu_nums(vec![2, 3, 2]);
        affinity.set_affinity_masks(vec![
            PuMask::single(4, 2),
            PuMask::single(4, 3),
            PuMask::single(4, 2),
        ]);

        assert_eq!(affinity.num_threads(), 3);
        assert_eq!(affinity.pu_num(1), Some(3));
        assert!(affinity.pu_mask(1).unwrap().is_set(3));
        assert_eq!(affinity.num_pus_needed(), 2);
    }

    #[test]
    fn restriction_limits_exposure() {
        let affinity = AffinityData::new(4, Some(PuMask::from_indices(4, [1, 2])));

        assert_eq!(affinity.used_pus().iter_set().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn bulk_rewrite_replaces_previous_table() {
        let mut affinity = AffinityData::new(2, None);

        affinity.set_num_threads(2);
        affinity.set_pu_nums(vec![0, 1]);
        affinity.set_affinity_masks(vec![PuMask::single(2, 0), PuMask::single(2, 1)]);

        affinity.set_num_threads(1);
        affinity.set_pu_nums(vec![1]);
        affinity.set_affinity_masks(vec![PuMask::single(2, 1)]);

        assert_eq!(affinity.num_threads(), 1);
        assert_eq!(affinity.pu_num(0), Some(1));
        assert!(affinity.pu_num(1).is_none());
        assert_eq!(affinity.num_pus_needed(), 1);
    }
}
