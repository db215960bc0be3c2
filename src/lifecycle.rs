/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Lifecycle state machine shared by the consensus engine and its worker threads.
//!
//! ```text
//! Created ──► Initialized ──► Running ◄──► Stopped
//!    │             │                          │
//!    └─────────────┴────────► Destroyed ◄─────┘
//! ```
//!
//! Any other transition fails with
//! [`InvalidLifecycleTransition`](crate::errors::ConsensusError::InvalidLifecycleTransition).

use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::errors::{ConsensusError, Module};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Initialized,
    Running,
    Stopped,
    Destroyed,
}

impl LifecycleState {
    /// Check whether going from `self` to `to` is allowed and, if it is, return `to`.
    pub fn transition(
        self,
        to: LifecycleState,
        component: &'static str,
    ) -> Result<LifecycleState, ConsensusError> {
        use LifecycleState::*;
        match (self, to) {
            (Created, Initialized)
            | (Initialized, Running)
            | (Running, Stopped)
            | (Stopped, Running)
            | (Created, Destroyed)
            | (Initialized, Destroyed)
            | (Stopped, Destroyed) => Ok(to),
            _ => Err(ConsensusError::InvalidLifecycleTransition {
                component,
                from: self,
                to,
            }),
        }
    }
}

/// Outcome of checking a worker's shutdown signal.
pub(crate) enum Signal {
    Continue,
    Shutdown,
}

/// Check `shutdown_signal` without blocking.
///
/// A disconnected signal counts as a shutdown request, since nothing can ever stop the worker
/// otherwise.
pub(crate) fn check_shutdown(shutdown_signal: &Receiver<()>) -> Signal {
    match shutdown_signal.try_recv() {
        Ok(()) | Err(TryRecvError::Disconnected) => Signal::Shutdown,
        Err(TryRecvError::Empty) => Signal::Continue,
    }
}

/// A worker thread that owns a `T` while it runs and hands it back when it stops.
pub struct WorkerHandle<T> {
    module: Module,
    shutdown: Sender<()>,
    done: Receiver<()>,
    thread: JoinHandle<Option<T>>,
}

impl<T: Send + 'static> WorkerHandle<T> {
    /// Spawn a thread named `name` that calls `run` on `worker` until its shutdown signal fires.
    ///
    /// `run` must return the worker once it observes a shutdown request. The worker is moved onto the
    /// thread only after the thread exists, so if spawning fails it is returned inside `Err` unchanged.
    pub fn spawn(
        name: &str,
        module: Module,
        stack_size: Option<usize>,
        worker: T,
        run: fn(T, Receiver<()>) -> T,
    ) -> Result<WorkerHandle<T>, (T, ConsensusError)> {
        let (shutdown, shutdown_receiver) = mpsc::channel();
        let (done_sender, done) = mpsc::channel();
        let (handoff, handoff_receiver) = mpsc::channel::<T>();

        let mut builder = thread::Builder::new().name(name.to_string());
        if let Some(stack_size) = stack_size {
            builder = builder.stack_size(stack_size);
        }
        let spawned = builder.spawn(move || {
            let worker = handoff_receiver.recv().ok()?;
            let worker = run(worker, shutdown_receiver);
            let _ = done_sender.send(());
            Some(worker)
        });
        let thread = match spawned {
            Ok(thread) => thread,
            Err(err) => {
                log::error!("failed to spawn {}: {}", name, err);
                return Err((worker, ConsensusError::FailedThreadSpawn { module }));
            }
        };
        if let Err(mpsc::SendError(worker)) = handoff.send(worker) {
            log::error!("the {} thread exited before receiving its worker", name);
            return Err((worker, ConsensusError::FailedThreadSpawn { module }));
        }

        Ok(WorkerHandle {
            module,
            shutdown,
            done,
            thread,
        })
    }

    /// Ask the worker to stop and wait up to `timeout` for it to drain its in-flight work.
    ///
    /// Returns the worker, or `None` if the thread ended without one. If the worker does not finish in
    /// time, the handle is returned inside `Err` together with
    /// [`StillRunning`](ConsensusError::StillRunning) so that the caller can wait again later.
    pub fn stop(
        self,
        timeout: Duration,
    ) -> Result<Option<T>, (WorkerHandle<T>, ConsensusError)> {
        let _ = self.shutdown.send(());
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match self.thread.join() {
                Ok(worker) => Ok(worker),
                Err(panic) => {
                    log::error!("the {} thread panicked", self.module);
                    std::panic::resume_unwind(panic)
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                let module = self.module;
                Err((self, ConsensusError::StillRunning { module }))
            }
        }
    }
}
