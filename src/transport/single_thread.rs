//! The `SingleThread` back-end: every worker runs inline on the producer's
//! own call stack. There is no ring, no semaphore, and no ordering problem
//! to solve — `send` simply calls each job's `packet_processor` in turn.
//! Useful for deterministic tests and for embedding VPMU in a
//! single-threaded harness (design §4.3).

use std::cell::RefCell;

use crate::error::{Result, VpmuError};
use crate::packet::{PacketType, Reference};
use crate::simulator::{Kind, Simulator};
use crate::transport::{packet_result, StreamImpl, SYNC_HISTORY};

pub struct SingleThread<K: Kind> {
    jobs: RefCell<Vec<Box<dyn Simulator<K>>>>,
    sync_counter: RefCell<Vec<u64>>,
    history: RefCell<Vec<[Option<K::Data>; SYNC_HISTORY]>>,
}

impl<K: Kind> Default for SingleThread<K> {
    fn default() -> Self {
        SingleThread {
            jobs: RefCell::new(Vec::new()),
            sync_counter: RefCell::new(Vec::new()),
            history: RefCell::new(Vec::new()),
        }
    }
}

impl<K: Kind> StreamImpl<K> for SingleThread<K> {
    fn build(&mut self) -> Result<()> {
        Ok(())
    }

    fn destroy(&mut self) {
        for job in self.jobs.borrow_mut().iter_mut() {
            job.destroy();
        }
        self.jobs.borrow_mut().clear();
    }

    fn run(&mut self, jobs: Vec<Box<dyn Simulator<K>>>) -> Result<()> {
        *self.sync_counter.borrow_mut() = vec![0; jobs.len()];
        *self.history.borrow_mut() = jobs.iter().map(|_| std::array::from_fn(|_| None)).collect();
        *self.jobs.borrow_mut() = jobs;
        Ok(())
    }

    fn send(&self, local: &[Reference<K::Payload>]) {
        let mut jobs = self.jobs.borrow_mut();
        let mut counters = self.sync_counter.borrow_mut();
        let mut history = self.history.borrow_mut();
        for (id, job) in jobs.iter_mut().enumerate() {
            for reference in local {
                let kind = reference.kind;
                if kind.contains(PacketType::BARRIER) || kind.contains(PacketType::SYNC_DATA) {
                    let data = job.packet_processor(id, reference);
                    if counters[id] < reference.id {
                        counters[id] += 1;
                        history[id][(counters[id] as usize) % SYNC_HISTORY] = Some(data);
                    }
                } else if kind.is_known() {
                    let _ = packet_result(job.as_mut(), id, reference);
                } else {
                    let err = VpmuError::Protocol { worker: id, raw_kind: kind.raw() };
                    log::error!(target: "vpmu::transport", "{err}, dropping the rest of this batch");
                    break;
                }
            }
        }
    }

    fn send_dump(&self) {
        let mut jobs = self.jobs.borrow_mut();
        for (id, job) in jobs.iter_mut().enumerate() {
            let _ = job.packet_processor(id, &Reference::control(PacketType::DUMP_INFO, id as u64));
        }
    }

    fn get_data(&self, worker: usize, idx: Option<usize>) -> Option<K::Data> {
        let history = self.history.borrow();
        let slots = history.get(worker)?;
        let i = idx.unwrap_or_else(|| self.sync_counter.borrow()[worker] as usize);
        slots[i % SYNC_HISTORY].clone()
    }

    fn num_workers(&self) -> usize {
        self.jobs.borrow().len()
    }

    fn sync_counter(&self, worker: usize) -> u64 {
        self.sync_counter.borrow().get(worker).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packet::Branch;
    use crate::simulator::BranchKind;

    struct Counter(u64);
    impl Simulator<BranchKind> for Counter {
        fn build(&mut self, _platform: &crate::counters::PlatformInfo, _model: &crate::counters::Model) -> Result<()> {
            Ok(())
        }
        fn packet_processor(&mut self, _id: usize, reference: &Reference<Branch>) -> crate::counters::branch::Data {
            if reference.kind.contains(PacketType::DATA) {
                self.0 += 1;
            }
            crate::counters::branch::Data { correct: vec![self.0], wrong: vec![0] }
        }
    }

    #[test]
    fn send_dispatches_inline_to_every_job() {
        let mut stream: SingleThread<BranchKind> = SingleThread::default();
        stream.run(vec![Box::new(Counter(0))]).unwrap();
        stream.send(&[
            Reference::data(Branch { core: 0, pc: 0, taken: true }),
            Reference::data(Branch { core: 0, pc: 4, taken: false }),
        ]);
        assert_eq!(stream.num_workers(), 1);
    }

    #[test]
    fn unrecognized_packet_kind_is_dropped_not_dispatched_as_data() {
        let mut stream: SingleThread<BranchKind> = SingleThread::default();
        stream.run(vec![Box::new(Counter(0))]).unwrap();
        let bogus = Reference { kind: PacketType::default(), id: 0, payload: Branch { core: 0, pc: 0, taken: true } };
        // `PacketType::default()` carries no recognized bits set, so this
        // must not silently reach `packet_processor` the way `DATA` would.
        stream.send(&[bogus, Reference::control(PacketType::BARRIER, 1)]);
        let data = stream.get_data(0, None).expect("barrier still produces a snapshot");
        assert_eq!(data.correct[0], 0);
    }

    #[test]
    fn barrier_snapshots_into_rolling_history() {
        let mut stream: SingleThread<BranchKind> = SingleThread::default();
        stream.run(vec![Box::new(Counter(0))]).unwrap();
        stream.send(&[Reference::data(Branch { core: 0, pc: 0, taken: true })]);
        stream.send(&[Reference::control(PacketType::BARRIER, 1)]);
        let data = stream.get_data(0, None).expect("snapshot present");
        assert_eq!(data.correct[0], 1);
    }
}
