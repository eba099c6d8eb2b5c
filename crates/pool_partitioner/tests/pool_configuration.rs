//! End-to-end configuration scenarios against deterministic topologies.

use pool_partitioner::{
    ErrorKind, Partitioner, SchedulerMode, SchedulingPolicy, Settings, StaticTopology,
};
use serial_test::serial;

#[test]
#[serial]
fn default_partitioner_on_four_pu_machine() {
    let partitioner = Partitioner::builder()
        .topology_provider(StaticTopology::uniform(1, 4, 1))
        .build()
        .unwrap();

    partitioner.configure_pools().unwrap();

    assert_eq!(partitioner.num_pools(), 1);
    assert_eq!(partitioner.num_threads_in("default").unwrap(), 4);

    // Workers are bound one-to-one to the four processing units.
    for worker in 0..4 {
        assert_eq!(
            partitioner.pu_mask(worker).iter_set().collect::<Vec<_>>(),
            vec![worker]
        );
    }

    // The first worker slot is always exclusive.
    assert!(partitioner.pu_is_exclusive("default", 0).unwrap());
}

#[test]
#[serial]
fn two_named_pools_bind_workers_in_pool_order() {
    let partitioner = Partitioner::builder()
        .topology_provider(StaticTopology::uniform(1, 8, 1))
        .build()
        .unwrap();

    partitioner
        .create_thread_pool(
            "io",
            SchedulingPolicy::Static,
            SchedulerMode::DEFAULT,
            None,
        )
        .unwrap();

    let topology = partitioner.topology().clone();
    partitioner
        .add_resource_pus(&topology.pus()[..2], "io", true)
        .unwrap();

    partitioner.configure_pools().unwrap();

    assert_eq!(partitioner.num_threads_in("default").unwrap(), 6);
    assert_eq!(partitioner.num_threads_in("io").unwrap(), 2);

    // Worker indices run in pool order: six default-pool workers on PUs 2-7,
    // then the two io workers on PUs 0 and 1.
    assert_eq!(partitioner.pu_mask(0).to_string(), "2");
    assert_eq!(partitioner.pu_mask(5).to_string(), "7");
    assert_eq!(partitioner.pu_mask(6).to_string(), "0");
    assert_eq!(partitioner.pu_mask(7).to_string(), "1");

    assert_eq!(partitioner.pu_num(6), 0);

    // Index lookups round-trip through names.
    for index in 0..partitioner.num_pools() {
        let name = partitioner.pool_name(index).unwrap();
        assert_eq!(partitioner.pool_index(&name).unwrap(), index);
    }
}

#[test]
#[serial]
fn duplicate_pool_is_invalid_argument() {
    let partitioner = Partitioner::builder()
        .topology_provider(StaticTopology::uniform(1, 8, 1))
        .build()
        .unwrap();

    partitioner
        .create_thread_pool(
            "io",
            SchedulingPolicy::Static,
            SchedulerMode::DEFAULT,
            None,
        )
        .unwrap();

    let error = partitioner
        .create_thread_pool(
            "io",
            SchedulingPolicy::Local,
            SchedulerMode::DEFAULT,
            None,
        )
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::InvalidArgument);
}

#[test]
#[serial]
fn oversubscription_is_refused_and_names_the_occupancy() {
    let partitioner = Partitioner::builder()
        .topology_provider(StaticTopology::uniform(1, 8, 1))
        .build()
        .unwrap();

    partitioner
        .create_thread_pool(
            "io",
            SchedulingPolicy::Static,
            SchedulerMode::DEFAULT,
            None,
        )
        .unwrap();

    let topology = partitioner.topology().clone();
    partitioner
        .add_resource(&topology.pus()[3], "io", true)
        .unwrap();

    let error = partitioner
        .add_resource(&topology.pus()[3], "default", true)
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::BadParameter);
    assert!(error.to_string().contains("can be assigned only 1 threads"));
}

#[test]
#[serial]
fn first_core_shift_rebinds_the_default_pool() {
    // Four cores of two processing units each; only the first four processing
    // units are exposed to this process.
    let partitioner = Partitioner::builder()
        .topology_provider(StaticTopology::uniform(1, 4, 2))
        .used_pus(0..4)
        .build()
        .unwrap();

    partitioner.configure_pools().unwrap();

    for worker in 0..4 {
        assert_eq!(partitioner.pu_num(worker), worker);
    }

    // Starting on core 1 shifts every binding up by one core's worth of
    // processing units.
    let needed = partitioner.assign_cores(1).unwrap();
    assert_eq!(needed, 4);

    for worker in 0..4 {
        assert_eq!(partitioner.pu_num(worker), worker + 2);
        assert_eq!(
            partitioner.pu_mask(worker).iter_set().collect::<Vec<_>>(),
            vec![worker + 2]
        );
    }
}

#[test]
#[serial]
fn configured_scheduler_applies_to_unspecified_pools() {
    let partitioner = Partitioner::builder()
        .settings(Settings::from_entries([(Settings::SCHEDULER, "static-p")]))
        .topology_provider(StaticTopology::uniform(1, 4, 1))
        .build()
        .unwrap();

    partitioner
        .create_thread_pool(
            "io",
            SchedulingPolicy::Local,
            SchedulerMode::DEFAULT,
            None,
        )
        .unwrap();

    let topology = partitioner.topology().clone();
    partitioner
        .add_resource(&topology.pus()[0], "io", true)
        .unwrap();

    partitioner.configure_pools().unwrap();

    // The default pool had no policy and received the configured one; the io
    // pool keeps its explicit choice.
    assert_eq!(
        partitioner.which_scheduler("default").unwrap(),
        SchedulingPolicy::StaticPriority
    );
    assert_eq!(
        partitioner.which_scheduler("io").unwrap(),
        SchedulingPolicy::Local
    );
}

#[test]
#[serial]
fn unknown_scheduler_name_fails_configuration() {
    let partitioner = Partitioner::builder()
        .settings(Settings::from_entries([(Settings::SCHEDULER, "quantum")]))
        .topology_provider(StaticTopology::uniform(1, 4, 1))
        .build()
        .unwrap();

    let error = partitioner.configure_pools().unwrap_err();

    assert_eq!(error.kind(), ErrorKind::CommandLine);
    assert!(!partitioner.is_initialized());

    // Queries fall back to identity mappings while un-initialized.
    assert_eq!(partitioner.pu_mask(2).iter_set().collect::<Vec<_>>(), vec![2]);
}

#[test]
#[serial]
fn pool_init_describes_the_executor_handoff() {
    let partitioner = Partitioner::builder()
        .topology_provider(StaticTopology::uniform(1, 4, 1))
        .build()
        .unwrap();

    partitioner.configure_pools().unwrap();

    let init = partitioner.pool_init(0).unwrap();

    assert_eq!(init.index, 0);
    assert_eq!(init.name, "default");
    assert_eq!(init.num_threads, 4);
    assert_eq!(init.mode, SchedulerMode::DEFAULT);
    assert_eq!(init.policy, SchedulingPolicy::Local);
}

#[test]
#[serial]
fn printed_summary_names_pools_schedulers_and_masks() {
    let partitioner = Partitioner::builder()
        .topology_provider(StaticTopology::uniform(1, 4, 1))
        .build()
        .unwrap();

    partitioner.configure_pools().unwrap();

    let mut out = Vec::new();
    partitioner.print_pools(&mut out).unwrap();
    let printed = String::from_utf8(out).unwrap();

    assert!(printed.contains("owns 1 pool(s)"));
    assert!(printed.contains("[pool \"default\"]"));
    assert!(printed.contains("\"local\""));
    assert!(printed.contains('3'));
}

#[test]
#[serial]
fn numa_aware_resource_addition() {
    // Two domains of two dual-PU cores each.
    let partitioner = Partitioner::builder()
        .topology_provider(StaticTopology::uniform(2, 2, 2))
        .build()
        .unwrap();

    partitioner
        .create_thread_pool(
            "compute",
            SchedulingPolicy::LocalPriorityFifo,
            SchedulerMode::DEFAULT,
            None,
        )
        .unwrap();

    let topology = partitioner.topology().clone();

    // The whole second domain goes to the compute pool.
    partitioner
        .add_resource_numa_domain(&topology.numa_domains()[1], "compute", true)
        .unwrap();

    partitioner.configure_pools().unwrap();

    assert_eq!(partitioner.num_threads_in("compute").unwrap(), 4);
    assert_eq!(partitioner.num_threads_in("default").unwrap(), 4);

    // Compute workers follow the default pool's workers and are bound to the
    // second domain's processing units 4-7.
    for (worker, pu) in (4..8).zip(4..8) {
        assert_eq!(partitioner.pu_num(worker), pu);
    }
}

#[test]
#[serial]
fn core_granular_resource_addition() {
    let partitioner = Partitioner::builder()
        .topology_provider(StaticTopology::uniform(1, 4, 2))
        .build()
        .unwrap();

    partitioner
        .create_thread_pool(
            "io",
            SchedulingPolicy::Static,
            SchedulerMode::DEFAULT,
            None,
        )
        .unwrap();

    let topology = partitioner.topology().clone();
    let domain = &topology.numa_domains()[0];
    let core = topology.cores_in(domain).nth(1).unwrap();

    partitioner.add_resource_core(core, "io", true).unwrap();

    partitioner.configure_pools().unwrap();

    assert_eq!(partitioner.num_threads_in("io").unwrap(), 2);

    // The io pool owns exactly the second core's processing units.
    let io_first_worker = partitioner.num_threads_in("default").unwrap();
    assert_eq!(partitioner.pu_num(io_first_worker), 2);
    assert_eq!(partitioner.pu_num(io_first_worker + 1), 3);
}
