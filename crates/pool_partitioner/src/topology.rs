use std::num::NonZeroUsize;
use std::thread;

use nonempty::NonEmpty;

use crate::{CoreIndex, NumaDomainIndex, PuIndex};

/// The source of hardware-topology facts, implemented by an external
/// topology discoverer.
///
/// The partitioner walks the provider exactly once, at construction, and keeps
/// an immutable [`Topology`] snapshot from then on. Processing units are
/// numbered sequentially in walk order: domain by domain, core by core, so the
/// provider's per-PU answers are indexed the same way.
///
/// Two in-crate implementations exist: [`SystemTopology`] (a flat topology
/// sized to the machine's available parallelism) and [`StaticTopology`]
/// (an explicitly described shape, for tests and embedders without a
/// discoverer).
#[cfg_attr(test, mockall::automock)]
pub trait TopologyProvider {
    /// The number of NUMA domains on the machine.
    fn num_numa_domains(&self) -> usize;

    /// The number of cores in the given NUMA domain.
    fn num_domain_cores(&self, domain: NumaDomainIndex) -> usize;

    /// The number of processing units on the given core. The core index is
    /// global, in walk order across all domains.
    fn num_core_pus(&self, core: CoreIndex) -> usize;

    /// How many worker threads the given processing unit may host. Zero marks
    /// the processing unit as unusable and is fatal at discovery time.
    fn thread_occupancy(&self, pu: PuIndex) -> usize;
}

/// A NUMA domain that retained at least one exposed core after discovery.
#[derive(Clone, Debug)]
pub struct NumaDomain {
    id: NumaDomainIndex,

    /// Indices into the topology's core arena.
    cores: NonEmpty<usize>,
}

impl NumaDomain {
    /// The domain's index in topology-discovery order.
    #[must_use]
    pub fn id(&self) -> NumaDomainIndex {
        self.id
    }
}

/// A core that retained at least one exposed processing unit after discovery.
#[derive(Clone, Debug)]
pub struct Core {
    id: CoreIndex,

    /// Index of the parent domain in the topology's domain arena. A lookup
    /// key, not ownership; resolve it through [`Topology::domain_of()`].
    domain: usize,

    /// Indices into the topology's processing-unit arena.
    pus: NonEmpty<usize>,
}

impl Core {
    /// The core's global index in topology-discovery order.
    #[must_use]
    pub fn id(&self) -> CoreIndex {
        self.id
    }
}

/// An exposed processing unit.
#[derive(Clone, Debug)]
pub struct Pu {
    id: PuIndex,

    /// Index of the parent core in the topology's core arena. A lookup key,
    /// not ownership; resolve it through [`Topology::core_of()`].
    core: usize,

    thread_occupancy: NonZeroUsize,
}

impl Pu {
    /// The processing unit's index in topology-discovery order.
    #[must_use]
    pub fn id(&self) -> PuIndex {
        self.id
    }

    /// How many worker threads this processing unit may host.
    #[must_use]
    pub fn thread_occupancy(&self) -> NonZeroUsize {
        self.thread_occupancy
    }
}

/// An immutable snapshot of the machine topology, filtered down to the
/// processing units exposed to this process.
///
/// Domains, cores and processing units live in three flat arenas; children
/// reference parents by arena index. Cores without exposed processing units
/// and domains without exposed cores are pruned during discovery, but the
/// machine-wide totals (processing-unit and core counts) still cover the
/// pruned hardware.
#[derive(Clone, Debug)]
pub struct Topology {
    domains: Vec<NumaDomain>,
    cores: Vec<Core>,
    pus: Vec<Pu>,

    /// Per-core processing-unit counts for every hardware core, pruned or not.
    core_pu_counts: Vec<usize>,

    /// The machine's total processing-unit count, exposed or not.
    num_pus: usize,
}

impl Topology {
    /// Walks the provider and records the exposed processing units.
    ///
    /// A processing unit is exposed when `used_pus` is absent or contains its
    /// index. A zero thread occupancy on an exposed processing unit is fatal.
    pub(crate) fn discover(
        provider: &dyn TopologyProvider,
        used_pus: Option<&[PuIndex]>,
    ) -> crate::Result<Self> {
        let mut domains = Vec::new();
        let mut cores = Vec::new();
        let mut pus: Vec<Pu> = Vec::new();
        let mut core_pu_counts = Vec::new();

        let mut pu_num = 0;
        let mut core_num = 0;

        let num_domains = provider.num_numa_domains();

        for domain_id in 0..num_domains {
            let num_cores = provider.num_domain_cores(domain_id);
            let mut kept_cores = Vec::with_capacity(num_cores);

            for _ in 0..num_cores {
                let num_pus = provider.num_core_pus(core_num);
                core_pu_counts.push(num_pus);

                let mut kept_pus = Vec::with_capacity(num_pus);

                for _ in 0..num_pus {
                    let exposed = used_pus.is_none_or(|used| used.contains(&pu_num));

                    if exposed {
                        let thread_occupancy =
                            NonZeroUsize::new(provider.thread_occupancy(pu_num)).ok_or(
                                crate::Error::ZeroThreadOccupancy { pu_index: pu_num },
                            )?;

                        kept_pus.push(Pu {
                            id: pu_num,
                            core: cores.len(),
                            thread_occupancy,
                        });
                    }

                    pu_num += 1;
                }

                if let Some(kept_pus) = NonEmpty::from_vec(kept_pus) {
                    let first_pu = pus.len();
                    pus.extend(kept_pus);

                    kept_cores.push(cores.len());
                    cores.push(Core {
                        id: core_num,
                        domain: domains.len(),
                        pus: NonEmpty::from_vec((first_pu..pus.len()).collect())
                            .expect("a kept core has at least one exposed processing unit"),
                    });
                }

                core_num += 1;
            }

            if let Some(kept_cores) = NonEmpty::from_vec(kept_cores) {
                domains.push(NumaDomain {
                    id: domain_id,
                    cores: kept_cores,
                });
            }
        }

        if pu_num == 0 {
            return Err(crate::Error::NoProcessingUnits);
        }

        Ok(Self {
            domains,
            cores,
            pus,
            core_pu_counts,
            num_pus: pu_num,
        })
    }

    /// The NUMA domains that retained exposed cores, in discovery order.
    #[must_use]
    pub fn numa_domains(&self) -> &[NumaDomain] {
        &self.domains
    }

    /// The exposed processing units, in discovery order.
    #[must_use]
    pub fn pus(&self) -> &[Pu] {
        &self.pus
    }

    /// The cores of a domain, in discovery order.
    pub fn cores_in<'t>(&'t self, domain: &'t NumaDomain) -> impl Iterator<Item = &'t Core> {
        domain.cores.iter().map(|index| &self.cores[*index])
    }

    /// The processing units of a core, in discovery order.
    pub fn pus_in<'t>(&'t self, core: &'t Core) -> impl Iterator<Item = &'t Pu> {
        core.pus.iter().map(|index| &self.pus[*index])
    }

    /// Resolves a core's parent-domain reference.
    #[must_use]
    pub fn domain_of(&self, core: &Core) -> &NumaDomain {
        &self.domains[core.domain]
    }

    /// Resolves a processing unit's parent-core reference.
    #[must_use]
    pub fn core_of(&self, pu: &Pu) -> &Core {
        &self.cores[pu.core]
    }

    /// Looks up an exposed processing unit by its index. Returns `None` for
    /// unexposed or unknown indices.
    #[must_use]
    pub fn pu(&self, pu_index: PuIndex) -> Option<&Pu> {
        self.pus.iter().find(|pu| pu.id == pu_index)
    }

    /// The machine's total processing-unit count, including unexposed ones.
    #[must_use]
    pub fn num_pus(&self) -> usize {
        self.num_pus
    }

    /// The machine's total core count, including pruned ones.
    #[must_use]
    pub fn num_cores(&self) -> usize {
        self.core_pu_counts.len()
    }

    /// The processing-unit count of the given hardware core, pruned or not.
    #[must_use]
    pub fn pus_per_core(&self, core: CoreIndex) -> Option<usize> {
        self.core_pu_counts.get(core).copied()
    }
}

/// The fallback topology provider: a flat, single-domain machine with one
/// processing unit per core and a thread occupancy of one, sized by
/// [`std::thread::available_parallelism()`].
///
/// Used when no external topology discoverer is wired up.
#[derive(Clone, Copy, Debug)]
pub struct SystemTopology {
    num_pus: usize,
}

impl SystemTopology {
    /// Creates a provider sized to the current machine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            num_pus: thread::available_parallelism().map_or(1, NonZeroUsize::get),
        }
    }
}

impl Default for SystemTopology {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyProvider for SystemTopology {
    fn num_numa_domains(&self) -> usize {
        1
    }

    fn num_domain_cores(&self, _domain: NumaDomainIndex) -> usize {
        self.num_pus
    }

    fn num_core_pus(&self, _core: CoreIndex) -> usize {
        1
    }

    fn thread_occupancy(&self, _pu: PuIndex) -> usize {
        1
    }
}

/// A topology provider with an explicitly described shape.
///
/// Useful in tests and for embedders that know the machine layout without a
/// live discoverer.
///
/// # Example
///
/// ```
/// use pool_partitioner::StaticTopology;
///
/// // Two NUMA domains, each with four cores of two processing units.
/// let topology = StaticTopology::uniform(2, 4, 2);
/// ```
#[derive(Clone, Debug)]
pub struct StaticTopology {
    /// Per domain, the processing-unit count of each core.
    domains: Vec<Vec<usize>>,

    thread_occupancy: usize,
}

impl StaticTopology {
    /// Creates a provider where every domain has the same number of cores and
    /// every core the same number of processing units.
    #[must_use]
    pub fn uniform(num_domains: usize, cores_per_domain: usize, pus_per_core: usize) -> Self {
        Self {
            domains: vec![vec![pus_per_core; cores_per_domain]; num_domains],
            thread_occupancy: 1,
        }
    }

    /// Creates a provider from an explicit shape: one entry per domain, each
    /// listing the processing-unit count of every core in that domain.
    #[must_use]
    pub fn from_shape(domains: Vec<Vec<usize>>) -> Self {
        Self {
            domains,
            thread_occupancy: 1,
        }
    }

    /// Overrides the thread occupancy reported for every processing unit.
    #[must_use]
    pub fn with_thread_occupancy(mut self, thread_occupancy: usize) -> Self {
        self.thread_occupancy = thread_occupancy;
        self
    }
}

impl TopologyProvider for StaticTopology {
    fn num_numa_domains(&self) -> usize {
        self.domains.len()
    }

    fn num_domain_cores(&self, domain: NumaDomainIndex) -> usize {
        self.domains.get(domain).map_or(0, Vec::len)
    }

    fn num_core_pus(&self, core: CoreIndex) -> usize {
        self.domains
            .iter()
            .flatten()
            .nth(core)
            .copied()
            .unwrap_or(0)
    }

    fn thread_occupancy(&self, _pu: PuIndex) -> usize {
        self.thread_occupancy
    }
}
