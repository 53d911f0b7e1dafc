//! Scenario S3 (design §8): with several workers, `dump()` must return
//! only after every worker has emitted its report exactly once, strictly
//! in worker-id order. The token handshake that guarantees this
//! (`ControlPlane::wait_turn`/`pass_turn`) lives under the worker threads;
//! this test only checks the externally observable contract — `dump()`
//! completes at all, for more than one worker, without the caller having
//! to do any polling of its own.

use vpmu::counters::PlatformInfo;
use vpmu::stream::Backend;
use vpmu::Stream;

#[test]
fn dump_completes_for_every_attached_worker() {
    let stream: Stream<vpmu::simulator::BranchKind> = Stream::new(
        "branch",
        vpmu::simulator::branch::create,
        Backend::MultiThread { ring_capacity: 16 },
        PlatformInfo { cores: 1, frequency_mhz: 1000 },
        1,
    );
    stream
        .bind(serde_json::json!([
            { "name": "one bit" },
            { "name": "two bits" },
            { "name": "ght" },
        ]))
        .unwrap();
    stream.build().unwrap();
    assert_eq!(stream.num_workers(), 3);

    // Blocks internally until the token has passed through worker 0, 1,
    // then 2 (`ControlPlane::wait_all_dumped`); returning at all is the
    // property under test.
    stream.dump();

    stream.destroy();
}
