/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build, run, and query the consensus engine.
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the engine](ConsensusSpec) with:
//!   1. `ConsensusSpec::builder` to construct a `ConsensusSpecBuilder`,
//!   2. The setters of the `ConsensusSpecBuilder`, and
//!   3. The `ConsensusSpecBuilder::build` method to construct a [ConsensusSpec],
//! - The function to [initialize](ConsensusSpec::init) a [Consensus] given its specification,
//! - [The type](Consensus) which owns the engine's worker threads and serves queries.
//!
//! ## Starting the engine
//!
//! ```ignore
//! let mut consensus =
//!     ConsensusSpec::builder()
//!     .kv_store(kv_store)
//!     .requester(requester)
//!     .configuration(configuration)
//!     .snapshot(Snapshot::load(snapshot_path, total_supply)?)
//!     .on_commit_milestone(commit_handler)
//!     .build()
//!     .init()?;
//! consensus.start()?;
//! ```
//!
//! ### Required setters
//!
//! - `.kv_store(...)`
//! - `.requester(...)`
//! - `.configuration(...)`
//! - `.snapshot(...)`
//!
//! ### Optional setters
//!
//! The optional setters are for registering user-defined event handlers for events from [crate::events]:
//! - `.on_receive_transaction(...)`
//! - `.on_solidify_transaction(...)`
//! - `.on_request_transaction(...)`
//! - `.on_receive_milestone(...)`
//! - `.on_commit_milestone(...)`
//! - `.on_reject_milestone(...)`
//! - `.on_revert_milestone(...)`
//! - `.on_milestone_gap(...)`
//! - `.on_select_tips(...)`
//! - `.on_start_worker(...)`
//! - `.on_stop_worker(...)`
//!
//! ## Lifecycle
//!
//! [`init`](ConsensusSpec::init) returns an `Initialized` engine. [`start`](Consensus::start) spawns the
//! milestone tracker and then the solidifier; [`stop`](Consensus::stop) stops them in the reverse
//! order, waiting up to [`worker_stop_timeout`](Configuration::worker_stop_timeout) for each. A stop
//! that times out fails with [`StillRunning`](ConsensusError::StillRunning) and may be retried. A
//! start that cannot spawn a thread fails with [`FailedThreadSpawn`](ConsensusError::FailedThreadSpawn)
//! and leaves the engine in the state it was in. A stopped engine can be started again, or
//! [destroyed](Consensus::destroy).
//!
//! Transactions received while the workers are stopped are queued and solidified once they start.

use std::{
    sync::mpsc::{self, Sender},
    thread::JoinHandle,
    time::SystemTime,
};

use typed_builder::TypedBuilder;

use crate::{
    config::Configuration,
    errors::{ConsensusError, Module},
    event_bus::*,
    events::*,
    ledger_validator::LedgerValidator,
    lifecycle::{LifecycleState, WorkerHandle},
    milestone_tracker::MilestoneTracker,
    requester::{Requester, TransactionRequester},
    snapshot::{Snapshot, SnapshotHandle},
    solidifier::Solidifier,
    tangle::{pluggables::KVStore, Tangle},
    tip_selection::{TipSelectionRequest, TipSelector},
    tips_cache::TipsCache,
    transaction_validator::TransactionValidator,
    types::{
        data_types::{Address, CryptoHash, MilestoneIndex},
        transaction::Transaction,
    },
};

const COMPONENT: &str = "consensus";
const SOLIDIFIER: &str = "solidifier";
const MILESTONE_TRACKER: &str = "milestone-tracker";

/// Stores all parameters and trait implementations required to run the [Consensus] engine.
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ConsensusSpec]. On the builder call the following methods to construct a valid [ConsensusSpec].

    Required:
    - `.kv_store(...)`
    - `.requester(...)`
    - `.configuration(...)`
    - `.snapshot(...)`

    Optional:
    - `.on_receive_transaction(...)`
    - `.on_solidify_transaction(...)`
    - `.on_request_transaction(...)`
    - `.on_receive_milestone(...)`
    - `.on_commit_milestone(...)`
    - `.on_reject_milestone(...)`
    - `.on_revert_milestone(...)`
    - `.on_milestone_gap(...)`
    - `.on_select_tips(...)`
    - `.on_start_worker(...)`
    - `.on_stop_worker(...)`
"))]
pub struct ConsensusSpec<K: KVStore, R: Requester> {
    // Required parameters
    #[builder(setter(doc = "Set the implementation of the engine's Key-Value store. The argument must implement the [KVStore](crate::tangle::pluggables::KVStore) trait. Required."))]
    kv_store: K,
    #[builder(setter(doc = "Set the implementation of transaction requests to peers. The argument must implement the [Requester](crate::requester::Requester) trait. Required."))]
    requester: R,
    #[builder(setter(doc = "Set the [configuration](Configuration) of the engine. Required."))]
    configuration: Configuration,
    #[builder(setter(doc = "Set the [snapshot](Snapshot) the ledger starts from. Required."))]
    snapshot: Snapshot,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveTransactionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveTransactionEvent>),
    doc = "Register a handler closure to be invoked after a new transaction is stored. Optional."))]
    on_receive_transaction: Option<HandlerPtr<ReceiveTransactionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SolidifyTransactionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SolidifyTransactionEvent>),
    doc = "Register a handler closure to be invoked after a transaction becomes solid. Optional."))]
    on_solidify_transaction: Option<HandlerPtr<SolidifyTransactionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RequestTransactionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RequestTransactionEvent>),
    doc = "Register a handler closure to be invoked after a missing transaction is requested. Optional."))]
    on_request_transaction: Option<HandlerPtr<RequestTransactionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveMilestoneEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveMilestoneEvent>),
    doc = "Register a handler closure to be invoked after a solid milestone candidate is seen. Optional."))]
    on_receive_milestone: Option<HandlerPtr<ReceiveMilestoneEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitMilestoneEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitMilestoneEvent>),
    doc = "Register a handler closure to be invoked after a milestone's ledger delta is committed. Optional."))]
    on_commit_milestone: Option<HandlerPtr<CommitMilestoneEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RejectMilestoneEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RejectMilestoneEvent>),
    doc = "Register a handler closure to be invoked after a milestone is rejected. Optional."))]
    on_reject_milestone: Option<HandlerPtr<RejectMilestoneEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RevertMilestoneEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RevertMilestoneEvent>),
    doc = "Register a handler closure to be invoked after a committed milestone is reverted. Optional."))]
    on_revert_milestone: Option<HandlerPtr<RevertMilestoneEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&MilestoneGapEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<MilestoneGapEvent>),
    doc = "Register a handler closure to be invoked when the milestone buffer overflows. Optional."))]
    on_milestone_gap: Option<HandlerPtr<MilestoneGapEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SelectTipsEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SelectTipsEvent>),
    doc = "Register a handler closure to be invoked after tips are selected. Optional."))]
    on_select_tips: Option<HandlerPtr<SelectTipsEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartWorkerEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartWorkerEvent>),
    doc = "Register a handler closure to be invoked after a worker thread starts. Optional."))]
    on_start_worker: Option<HandlerPtr<StartWorkerEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StopWorkerEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StopWorkerEvent>),
    doc = "Register a handler closure to be invoked after a worker thread stops. Optional."))]
    on_stop_worker: Option<HandlerPtr<StopWorkerEvent>>,
}

impl<K: KVStore, R: Requester> ConsensusSpec<K, R> {
    /// Wire up the components of the engine and start the event bus. The workers are not started.
    ///
    /// If the store already holds milestones committed past the given snapshot, e.g., after a restart
    /// from an older snapshot file, their stored deltas are replayed onto the snapshot first.
    pub fn init(self) -> Result<Consensus<K, R>, ConsensusError> {
        let state = LifecycleState::Created;
        let configuration = self.configuration;

        if self.snapshot.total_supply() != configuration.total_supply {
            return Err(ConsensusError::SnapshotInvalidSupply {
                expected: configuration.total_supply,
                actual: self.snapshot.total_supply() as u128,
            });
        }
        if self.snapshot.milestone_index() < configuration.milestone_start_index {
            return Err(ConsensusError::UnexpectedMilestoneIndex {
                expected: configuration.milestone_start_index,
                actual: self.snapshot.milestone_index(),
            });
        }

        let event_handlers = EventHandlers::new(
            configuration.log_events,
            self.on_receive_transaction,
            self.on_solidify_transaction,
            self.on_request_transaction,
            self.on_receive_milestone,
            self.on_commit_milestone,
            self.on_reject_milestone,
            self.on_revert_milestone,
            self.on_milestone_gap,
            self.on_select_tips,
            self.on_start_worker,
            self.on_stop_worker,
        );

        let (event_publisher, event_bus, event_bus_shutdown) = if !event_handlers.is_empty() {
            let (event_publisher, event_subscriber) = mpsc::channel();
            let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
            let event_bus = start_event_bus(
                event_handlers,
                event_subscriber,
                event_bus_shutdown_receiver,
            );
            (Some(event_publisher), Some(event_bus), Some(event_bus_shutdown))
        } else {
            (None, None, None)
        };

        let tangle = Tangle::new(self.kv_store);
        let snapshot = self.snapshot.into_handle();
        let ledger_validator = LedgerValidator::new(
            tangle.clone(),
            snapshot.clone(),
            configuration.security_level,
            configuration.snapshot_depth,
            configuration.milestone_start_index,
            event_publisher.clone(),
        );
        ledger_validator.catch_up()?;
        let tips = TipsCache::new(configuration.tips_cache_capacity);
        let requester = TransactionRequester::new(
            self.requester,
            configuration.request_retry_interval,
            event_publisher.clone(),
        );

        let (arrivals, arrivals_receiver) = mpsc::channel();
        let (milestone_candidates, milestone_candidates_receiver) = mpsc::channel();
        let solidifier = Solidifier::new(
            tangle.clone(),
            requester.clone(),
            tips.clone(),
            &configuration,
            arrivals_receiver,
            milestone_candidates,
            event_publisher.clone(),
        );
        let milestone_tracker = MilestoneTracker::new(
            tangle.clone(),
            ledger_validator.clone(),
            &configuration,
            milestone_candidates_receiver,
            event_publisher.clone(),
        );
        let tip_selector = TipSelector::new(
            tangle.clone(),
            snapshot.clone(),
            configuration.clone(),
            event_publisher.clone(),
        );

        let transaction_validator = TransactionValidator::new(&configuration);

        Ok(Consensus {
            state: state.transition(LifecycleState::Initialized, COMPONENT)?,
            configuration,
            tangle,
            snapshot,
            ledger_validator,
            tip_selector,
            tips,
            transaction_validator,
            requester,
            arrivals,
            solidifier: Some(Worker::Idle(solidifier)),
            milestone_tracker: Some(Worker::Idle(milestone_tracker)),
            event_publisher,
            event_bus,
            event_bus_shutdown,
        })
    }
}

/// A worker that is either parked inside the engine or running on its own thread.
enum Worker<T> {
    Idle(T),
    Running(WorkerHandle<T>),
}

/// A handle to the consensus engine. When this value is dropped, its threads are shut down.
pub struct Consensus<K: KVStore, R: Requester> {
    state: LifecycleState,
    configuration: Configuration,
    tangle: Tangle<K>,
    snapshot: SnapshotHandle,
    ledger_validator: LedgerValidator<K>,
    tip_selector: TipSelector<K>,
    tips: TipsCache,
    transaction_validator: TransactionValidator,
    requester: TransactionRequester<R>,
    arrivals: Sender<CryptoHash>,
    solidifier: Option<Worker<Solidifier<K, R>>>,
    milestone_tracker: Option<Worker<MilestoneTracker<K>>>,
    event_publisher: Option<Sender<Event>>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl<K: KVStore, R: Requester> Consensus<K, R> {
    /* ↓↓↓ Lifecycle ↓↓↓ */

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Running
    }

    /// Start the milestone tracker and the solidifier.
    pub fn start(&mut self) -> Result<(), ConsensusError> {
        let next = self.state.transition(LifecycleState::Running, COMPONENT)?;

        let stack_size = self.configuration.worker_stack_size;
        start_worker(
            &mut self.milestone_tracker,
            MILESTONE_TRACKER,
            Module::MilestoneTracker,
            stack_size,
            MilestoneTracker::run,
            &self.event_publisher,
        )?;
        if let Err(err) = start_worker(
            &mut self.solidifier,
            SOLIDIFIER,
            Module::Solidifier,
            stack_size,
            Solidifier::run,
            &self.event_publisher,
        ) {
            // Leave the engine as it was before the call.
            if let Err(stop_err) = self.stop_milestone_tracker() {
                log::error!("failed to stop the milestone tracker: {}", stop_err);
            }
            return Err(err);
        }

        self.state = next;
        Ok(())
    }

    /// Stop the solidifier and the milestone tracker, waiting for each to finish its in-flight work.
    ///
    /// If a worker does not stop within the configured timeout, this fails with
    /// [`StillRunning`](ConsensusError::StillRunning) and the engine stays running; calling `stop`
    /// again waits again.
    pub fn stop(&mut self) -> Result<(), ConsensusError> {
        let next = self.state.transition(LifecycleState::Stopped, COMPONENT)?;

        let timeout = self.configuration.worker_stop_timeout;
        self.solidifier = match self.solidifier.take() {
            Some(Worker::Running(handle)) => match handle.stop(timeout) {
                Ok(solidifier) => {
                    publish_stop(&self.event_publisher, SOLIDIFIER);
                    solidifier.map(Worker::Idle)
                }
                Err((handle, err)) => {
                    self.solidifier = Some(Worker::Running(handle));
                    return Err(err);
                }
            },
            other => other,
        };
        self.stop_milestone_tracker()?;

        self.state = next;
        Ok(())
    }

    fn stop_milestone_tracker(&mut self) -> Result<(), ConsensusError> {
        let timeout = self.configuration.worker_stop_timeout;
        self.milestone_tracker = match self.milestone_tracker.take() {
            Some(Worker::Running(handle)) => match handle.stop(timeout) {
                Ok(milestone_tracker) => {
                    publish_stop(&self.event_publisher, MILESTONE_TRACKER);
                    milestone_tracker.map(Worker::Idle)
                }
                Err((handle, err)) => {
                    self.milestone_tracker = Some(Worker::Running(handle));
                    return Err(err);
                }
            },
            other => other,
        };
        Ok(())
    }

    /// Release the engine's threads. The engine must not be running.
    pub fn destroy(&mut self) -> Result<(), ConsensusError> {
        self.state = self.state.transition(LifecycleState::Destroyed, COMPONENT)?;
        self.solidifier = None;
        self.milestone_tracker = None;
        self.shutdown_event_bus();
        Ok(())
    }

    fn shutdown_event_bus(&mut self) {
        if let Some(event_bus_shutdown) = self.event_bus_shutdown.take() {
            let _ = event_bus_shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            if event_bus.join().is_err() {
                log::error!("the event bus thread panicked");
            }
        }
    }

    /* ↓↓↓ Transactions ↓↓↓ */

    /// Store a transaction received from a peer and queue it for solidification.
    ///
    /// Fails with [`TransactionRejected`](ConsensusError::TransactionRejected), without storing
    /// anything, if the transaction does not pass the
    /// [transaction validator](crate::transaction_validator). Returns `false` if the transaction was
    /// already stored.
    pub fn receive_transaction(&self, transaction: Transaction) -> Result<bool, ConsensusError> {
        self.transaction_validator.validate(&transaction)?;
        let hash = transaction.hash;
        let stored = self.tangle.put_transaction(&transaction)?;
        self.requester.mark_received(&hash);
        if !stored {
            return Ok(false);
        }

        Event::publish(
            &self.event_publisher,
            Event::ReceiveTransaction(ReceiveTransactionEvent {
                timestamp: SystemTime::now(),
                transaction: hash,
            }),
        );
        // The solidifier owns the receiving end for the whole life of the engine.
        let _ = self.arrivals.send(hash);
        Ok(true)
    }

    /// Whether the whole past cone of `hash` is stored.
    pub fn is_solid(&self, hash: &CryptoHash) -> bool {
        self.tangle.is_solid(hash)
    }

    /// The current tips cache contents.
    pub fn tips(&self) -> Vec<CryptoHash> {
        self.tips.tips()
    }

    /* ↓↓↓ Tip selection ↓↓↓ */

    /// Select `count` (1 or 2) consistent tips.
    pub fn select_tips(&self, count: usize) -> Result<Vec<CryptoHash>, ConsensusError> {
        self.select_tips_with(&TipSelectionRequest::builder().count(count).build())
    }

    pub fn select_tips_with(
        &self,
        request: &TipSelectionRequest,
    ) -> Result<Vec<CryptoHash>, ConsensusError> {
        self.tip_selector.select_tips(request)
    }

    /* ↓↓↓ Ledger ↓↓↓ */

    pub fn get_balance(
        &self,
        address: &Address,
        index: Option<MilestoneIndex>,
    ) -> Result<u64, ConsensusError> {
        self.ledger_validator.get_balance(address, index)
    }

    pub fn is_transaction_confirmed(&self, hash: &CryptoHash) -> Result<bool, ConsensusError> {
        self.ledger_validator.is_transaction_confirmed(hash)
    }

    pub fn latest_solid_milestone_index(&self) -> MilestoneIndex {
        self.ledger_validator.latest_solid_milestone_index()
    }

    /// Revert the latest committed milestone. See
    /// [`LedgerValidator::revert_milestone`](crate::ledger_validator::LedgerValidator::revert_milestone).
    pub fn revert_milestone(&self, index: MilestoneIndex) -> Result<(), ConsensusError> {
        self.ledger_validator.revert_milestone(index)
    }

    /// A copy of the current snapshot, e.g., to [save](Snapshot::save) it.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl<K: KVStore, R: Requester> Drop for Consensus<K, R> {
    fn drop(&mut self) {
        if self.state == LifecycleState::Running {
            if let Err(err) = self.stop() {
                log::error!("failed to stop the consensus engine: {}", err);
            }
        }
        self.shutdown_event_bus();
    }
}

/// Move the idle worker in `slot` onto its own thread. On failure the worker is put back.
fn start_worker<T: Send + 'static>(
    slot: &mut Option<Worker<T>>,
    name: &'static str,
    module: Module,
    stack_size: Option<usize>,
    run: fn(T, mpsc::Receiver<()>) -> T,
    event_publisher: &Option<Sender<Event>>,
) -> Result<(), ConsensusError> {
    let worker = match slot.take() {
        Some(Worker::Idle(worker)) => worker,
        running @ Some(Worker::Running(_)) => {
            *slot = running;
            return Ok(());
        }
        None => return Err(ConsensusError::FailedThreadSpawn { module }),
    };
    match WorkerHandle::spawn(name, module, stack_size, worker, run) {
        Ok(handle) => {
            *slot = Some(Worker::Running(handle));
            Event::publish(
                event_publisher,
                Event::StartWorker(StartWorkerEvent {
                    timestamp: SystemTime::now(),
                    worker: name,
                }),
            );
            Ok(())
        }
        Err((worker, err)) => {
            *slot = Some(Worker::Idle(worker));
            Err(err)
        }
    }
}

fn publish_stop(event_publisher: &Option<Sender<Event>>, name: &'static str) {
    Event::publish(
        event_publisher,
        Event::StopWorker(StopWorkerEvent {
            timestamp: SystemTime::now(),
            worker: name,
        }),
    );
}
