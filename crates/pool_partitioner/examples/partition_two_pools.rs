//! Claims two processing units for a dedicated I/O pool and leaves the rest
//! to the default pool.

use std::io;

use pool_partitioner::{Partitioner, SchedulerMode, SchedulingPolicy, StaticTopology};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // An eight-PU machine; a real embedding would wire up its topology
    // discoverer instead.
    let partitioner = Partitioner::builder()
        .topology_provider(StaticTopology::uniform(1, 8, 1))
        .build()?;

    partitioner.create_thread_pool(
        "io",
        SchedulingPolicy::Static,
        SchedulerMode::DEFAULT,
        None,
    )?;

    let topology = partitioner.topology().clone();
    for pu in &topology.pus()[..2] {
        partitioner.add_resource(pu, "io", true)?;
    }

    partitioner.configure_pools()?;

    for worker in 0..partitioner.num_threads() {
        println!(
            "worker {worker} is bound to PU {} (mask {})",
            partitioner.pu_num(worker),
            partitioner.pu_mask(worker)
        );
    }

    partitioner.print_pools(&mut io::stdout())?;

    Ok(())
}
