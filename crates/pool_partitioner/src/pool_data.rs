use std::fmt::Debug;
use std::io;

use pu_mask::PuMask;

use crate::{
    BackgroundWorkFunction, PuIndex, SchedulerFunction, SchedulingPolicy, SchedulerMode,
    WorkerIndex,
};

/// One worker slot of a pool: which processing unit the worker is bound to,
/// whether the slot may be taken away by a dynamic shrink, and whether a
/// worker currently occupies it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Slot {
    pub(crate) pu_index: PuIndex,
    pub(crate) exclusive: bool,
    pub(crate) assigned: bool,
}

/// The build-time description of one thread pool.
///
/// Populated before the runtime starts and queried by the executor afterwards.
/// The slot tables (`assigned_pus` and `assigned_pu_nums`) always have exactly
/// `num_threads` entries.
pub(crate) struct PoolData {
    pub(crate) name: String,
    pub(crate) policy: SchedulingPolicy,
    pub(crate) mode: SchedulerMode,
    pub(crate) create_function: Option<SchedulerFunction>,
    pub(crate) background_work: Option<BackgroundWorkFunction>,
    pub(crate) num_threads: usize,

    /// Per worker slot, the affinity mask of the assigned processing unit.
    pub(crate) assigned_pus: Vec<PuMask>,

    /// Per worker slot, the processing-unit number and its flags.
    pub(crate) assigned_pu_nums: Vec<Slot>,
}

impl PoolData {
    pub(crate) fn new(
        name: &str,
        policy: SchedulingPolicy,
        mode: SchedulerMode,
        background_work: Option<BackgroundWorkFunction>,
    ) -> crate::Result<Self> {
        if name.is_empty() {
            return Err(crate::Error::EmptyPoolName);
        }

        Ok(Self {
            name: name.to_string(),
            policy,
            mode,
            create_function: None,
            background_work,
            num_threads: 0,
            assigned_pus: Vec::new(),
            assigned_pu_nums: Vec::new(),
        })
    }

    pub(crate) fn with_scheduler_function(
        name: &str,
        create_function: SchedulerFunction,
        mode: SchedulerMode,
        background_work: Option<BackgroundWorkFunction>,
    ) -> crate::Result<Self> {
        let mut data = Self::new(name, SchedulingPolicy::UserDefined, mode, background_work)?;
        data.create_function = Some(create_function);
        Ok(data)
    }

    /// Appends `num_threads` worker slots bound to the given processing unit.
    ///
    /// More than one thread on a single processing unit means over-subscription;
    /// whether that is allowed is the partitioner's decision, not ours.
    pub(crate) fn add_resource(
        &mut self,
        pu_index: PuIndex,
        exclusive: bool,
        num_threads: usize,
        num_pus: usize,
    ) -> crate::Result<()> {
        if pu_index >= num_pus {
            return Err(crate::Error::PuIndexOutOfBounds { pu_index, num_pus });
        }

        self.num_threads += num_threads;

        let pu_mask = PuMask::single(num_pus, pu_index);

        // One mask and one slot for each worker thread.
        for _ in 0..num_threads {
            self.assigned_pus.push(pu_mask.clone());
            self.assigned_pu_nums.push(Slot {
                pu_index,
                exclusive,
                assigned: false,
            });
        }

        Ok(())
    }

    /// Marks the slot as occupied by a running worker.
    ///
    /// The slot must currently be unoccupied; assigning an occupied slot is a
    /// contract violation.
    pub(crate) fn assign_pu(&mut self, virt_core: WorkerIndex) {
        assert!(virt_core < self.assigned_pu_nums.len());
        debug_assert!(!self.assigned_pu_nums[virt_core].assigned);

        self.assigned_pu_nums[virt_core].assigned = true;
    }

    /// Marks the slot as vacated by a retiring worker.
    ///
    /// The slot must currently be occupied; unassigning a vacant slot is a
    /// contract violation.
    pub(crate) fn unassign_pu(&mut self, virt_core: WorkerIndex) {
        assert!(virt_core < self.assigned_pu_nums.len());
        debug_assert!(self.assigned_pu_nums[virt_core].assigned);

        self.assigned_pu_nums[virt_core].assigned = false;
    }

    pub(crate) fn pu_is_exclusive(&self, virt_core: WorkerIndex) -> bool {
        assert!(virt_core < self.assigned_pu_nums.len());

        self.assigned_pu_nums[virt_core].exclusive
    }

    pub(crate) fn pu_is_assigned(&self, virt_core: WorkerIndex) -> bool {
        assert!(virt_core < self.assigned_pu_nums.len());

        self.assigned_pu_nums[virt_core].assigned
    }

    /// Shifts every slot's processing-unit number up by `offset`, modulo the
    /// machine's processing-unit count, and rebuilds every mask to match.
    pub(crate) fn assign_first_core(&mut self, offset: usize) {
        for i in 0..self.num_threads {
            let num_pus = self.assigned_pus[i].num_pus();
            let pu_num = (self.assigned_pu_nums[i].pu_index + offset) % num_pus;

            self.assigned_pu_nums[i].pu_index = pu_num;

            self.assigned_pus[i].reset();
            self.assigned_pus[i].set(pu_num);
        }
    }

    pub(crate) fn write_summary(&self, out: &mut dyn io::Write) -> io::Result<()> {
        writeln!(
            out,
            "[pool \"{}\"] with scheduler \"{}\" is running on PUs:",
            self.name, self.policy
        )?;

        for assigned_pu in &self.assigned_pus {
            writeln!(out, "{assigned_pu}")?;
        }

        Ok(())
    }
}

impl Debug for PoolData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolData")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("mode", &self.mode)
            .field("has_create_function", &self.create_function.is_some())
            .field("has_background_work", &self.background_work.is_some())
            .field("num_threads", &self.num_threads)
            .field("assigned_pu_nums", &self.assigned_pu_nums)
            .finish_non_exhaustive()
    }
}
