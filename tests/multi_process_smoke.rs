//! `MultiProcess` needs real OS processes and `/dev/shm`, so it is only
//! exercised manually (design §8's ambient test-tooling note), never as
//! part of the regular suite.

use vpmu::counters::{Model, PlatformInfo};
use vpmu::packet::{Branch, PacketType, Reference};
use vpmu::simulator::branch::create;
use vpmu::simulator::BranchKind;
use vpmu::transport::multi_process::MultiProcess;
use vpmu::transport::StreamImpl;

#[test]
#[ignore = "forks real processes and mmaps /dev/shm; run manually with `cargo test -- --ignored`"]
fn fork_worker_round_trips_one_barrier() {
    let mut sim = create("two bits").unwrap();
    sim.build(&PlatformInfo { cores: 1, frequency_mhz: 1000 }, &Model::default()).unwrap();

    let mut transport: MultiProcess<BranchKind> = MultiProcess::new(16);
    transport.build().unwrap();
    transport.run(vec![sim]).unwrap();

    transport.send(&[Reference::data(Branch { core: 0, pc: 0, taken: true })]);
    transport.send_one(Reference::control(PacketType::BARRIER, 1));
    while transport.sync_counter(0) < 1 {
        std::thread::yield_now();
    }

    let data = transport.get_data(0, None).expect("snapshot present after barrier");
    assert_eq!(data.correct[0] + data.wrong[0], 1);

    transport.destroy();
}
