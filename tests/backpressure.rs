//! Scenario S2 (design §8): a small ring capacity must still deliver every
//! reference, in order, rather than dropping any once the ring fills.

use vpmu::counters::{Model, PlatformInfo};
use vpmu::packet::{Branch, PacketType, Reference};
use vpmu::simulator::branch::create;
use vpmu::simulator::BranchKind;
use vpmu::transport::multi_thread::MultiThread;
use vpmu::transport::StreamImpl;

#[test]
fn back_pressure_delivers_every_reference_under_a_tiny_ring() {
    let mut sim = create("two bits").unwrap();
    sim.build(&PlatformInfo { cores: 1, frequency_mhz: 1000 }, &Model::default()).unwrap();

    let mut transport: MultiThread<BranchKind> = MultiThread::new(8);
    transport.build().unwrap();
    transport.run(vec![sim]).unwrap();

    let refs: Vec<Reference<Branch>> =
        (0..32u32).map(|i| Reference::data(Branch { core: 0, pc: 0, taken: i % 2 == 0 })).collect();
    // Push in chunks no larger than the ring capacity: a single bulk push
    // bigger than capacity could never satisfy `push_bulk`'s backpressure
    // wait, since no amount of draining frees up more than `capacity` slots.
    for chunk in refs.chunks(4) {
        transport.send(chunk);
    }
    transport.send_one(Reference::control(PacketType::BARRIER, 1));
    while transport.sync_counter(0) < 1 {
        std::thread::yield_now();
    }

    let data = transport.get_data(0, None).expect("snapshot present after barrier");
    assert_eq!(data.correct[0] + data.wrong[0], 32);

    transport.destroy();
}
