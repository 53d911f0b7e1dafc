//! Scenario S5 (design §8): program registration, exec-time association,
//! fork attachment, and exit cleanup wired together through `EventTracer`.

use vpmu::tracer::{EventTracer, MMapInfo};

#[test]
fn process_lifecycle_from_execv_to_exit() {
    let tracer = EventTracer::new();
    tracer.add_program("bash");

    // EXECV with guest filename `/bin/bash`, current_pid = 42.
    let process = tracer.add_new_process("/bin/bash", 42);
    assert_eq!(process.program(), Some(0));

    // A later MMAP with exec mode on the same pid keeps (or, for a
    // not-yet-matched process, establishes) the program association.
    tracer
        .attach_mapped_region(42, MMapInfo { path: "/bin/bash".into(), start: 0x1000, end: 0x5000, executable: true })
        .unwrap();
    assert_eq!(tracer.process(42).unwrap().program(), Some(0));

    // WAKE_NEW_TASK with child_pid 77 while current_pid = 42.
    let child = tracer.attach_to_parent(42, 77).unwrap();
    assert_eq!(child.parent, Some(42));
    assert_eq!(tracer.process(42).unwrap().children(), vec![77]);

    // EXIT on 42: removes 42; 77 is detached, not torn down with it.
    let exited = tracer.remove_process(42);
    assert!(exited.is_some());
    assert!(tracer.process(42).is_none());
    assert!(tracer.process(77).is_some());
}

#[test]
fn find_process_with_pid_zero_returns_none() {
    let tracer = EventTracer::new();
    tracer.add_new_process("init", 1);
    assert!(tracer.process(0).is_none());
}
