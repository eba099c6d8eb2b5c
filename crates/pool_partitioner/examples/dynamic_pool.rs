//! Gives processing units back to the system while work is in flight, then
//! takes them again.

use pool_partitioner::{Partitioner, PartitionerMode, StaticTopology};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let partitioner = Partitioner::builder()
        .mode(PartitionerMode::ALLOW_DYNAMIC_POOLS)
        .topology_provider(StaticTopology::uniform(1, 4, 1))
        .build()?;

    partitioner.configure_pools()?;

    // The runtime would do this when it starts the pool's workers.
    for virt_core in 0..partitioner.num_threads_in("default")? {
        partitioner.assign_pu("default", virt_core)?;
    }

    let removed = partitioner.shrink_pool("default", |virt_core| {
        println!("releasing virtual core {virt_core}");
        partitioner
            .unassign_pu("default", virt_core)
            .expect("the pool exists and the slot was assigned in the snapshot");
    })?;
    println!("released {removed} of 4 worker slots (the first one is exclusive)");

    let added = partitioner.expand_pool("default", |virt_core| {
        println!("reclaiming virtual core {virt_core}");
        partitioner
            .assign_pu("default", virt_core)
            .expect("the pool exists and the slot was vacant in the snapshot");
    })?;
    println!("reclaimed {added} worker slots");

    Ok(())
}
