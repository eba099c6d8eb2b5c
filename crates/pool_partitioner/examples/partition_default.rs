//! Partitions the current machine with no user pools: every processing unit
//! lands in the default pool.

use std::io;

use pool_partitioner::Partitioner;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let partitioner = Partitioner::builder().build()?;

    partitioner.configure_pools()?;

    println!(
        "The default pool received {} worker threads.",
        partitioner.num_threads_in("default")?
    );

    partitioner.print_pools(&mut io::stdout())?;

    Ok(())
}
