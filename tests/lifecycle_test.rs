//! Tests for worker threads: handing the worker back on stop, slow stops, and failed spawns.

use std::{
    sync::mpsc::{Receiver, RecvTimeoutError},
    thread,
    time::Duration,
};

use log::LevelFilter;

use tangle_consensus::{
    errors::{ConsensusError, Module},
    lifecycle::WorkerHandle,
};

mod common;

use common::logging::setup_logger;

/// Count the polls until shutdown.
fn poll_until_shutdown(polls: u32, shutdown: Receiver<()>) -> u32 {
    let mut polls = polls;
    loop {
        match shutdown.recv_timeout(Duration::from_millis(1)) {
            Err(RecvTimeoutError::Timeout) => polls += 1,
            _ => return polls,
        }
    }
}

/// Take 300 ms to drain after shutdown, then add one.
fn slow_increment(value: u32, shutdown: Receiver<()>) -> u32 {
    let _ = shutdown.recv();
    thread::sleep(Duration::from_millis(300));
    value + 1
}

#[test]
fn stop_returns_worker_test() {
    setup_logger(LevelFilter::Debug);
    let handle = WorkerHandle::spawn("poller", Module::General, None, 0, poll_until_shutdown)
        .map_err(|(_, err)| err)
        .unwrap();
    thread::sleep(Duration::from_millis(20));

    let polls = handle.stop(Duration::from_secs(5)).map_err(|(_, err)| err).unwrap();
    assert!(polls.unwrap() > 0);
}

#[test]
fn slow_stop_can_be_retried_test() {
    setup_logger(LevelFilter::Debug);
    let handle = WorkerHandle::spawn("slow", Module::Solidifier, None, 41, slow_increment)
        .map_err(|(_, err)| err)
        .unwrap();

    let handle = match handle.stop(Duration::from_millis(10)) {
        Err((handle, ConsensusError::StillRunning { module })) => {
            assert_eq!(module, Module::Solidifier);
            handle
        }
        Err((_, err)) => panic!("unexpected error: {}", err),
        Ok(_) => panic!("worker stopped before draining"),
    };

    let value = handle.stop(Duration::from_secs(5)).map_err(|(_, err)| err).unwrap();
    assert_eq!(value, Some(42));
}

#[cfg(target_pointer_width = "64")]
#[test]
fn failed_spawn_returns_worker_test() {
    setup_logger(LevelFilter::Debug);
    // No platform can map a stack this large.
    let spawned = WorkerHandle::spawn(
        "huge",
        Module::MilestoneTracker,
        Some(1 << 60),
        7,
        slow_increment,
    );
    let worker = match spawned {
        Err((worker, ConsensusError::FailedThreadSpawn { module })) => {
            assert_eq!(module, Module::MilestoneTracker);
            worker
        }
        Err((_, err)) => panic!("unexpected error: {}", err),
        Ok(_) => panic!("spawned a thread with an impossible stack"),
    };
    assert_eq!(worker, 7);

    // The same worker can be spawned again with a reasonable stack.
    let handle = WorkerHandle::spawn("retry", Module::MilestoneTracker, None, worker, slow_increment)
        .map_err(|(_, err)| err)
        .unwrap();
    let value = handle.stop(Duration::from_secs(5)).map_err(|(_, err)| err).unwrap();
    assert_eq!(value, Some(8));
}
