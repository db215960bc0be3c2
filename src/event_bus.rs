/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The thread that delivers [events](crate::events) to their handlers.
//!
//! Components publish events on a channel. The event bus thread receives them and calls, for each
//! event, the handlers registered for its type: the user's handler, if any, and the default
//! [logger](crate::logging) if [`log_events`](crate::config::Configuration::log_events) is set.

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// How long the event bus waits for an event before checking its shutdown signal again.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub(crate) struct EventHandlers {
    pub(crate) receive_transaction_handlers: Vec<HandlerPtr<ReceiveTransactionEvent>>,
    pub(crate) solidify_transaction_handlers: Vec<HandlerPtr<SolidifyTransactionEvent>>,
    pub(crate) request_transaction_handlers: Vec<HandlerPtr<RequestTransactionEvent>>,
    pub(crate) receive_milestone_handlers: Vec<HandlerPtr<ReceiveMilestoneEvent>>,
    pub(crate) commit_milestone_handlers: Vec<HandlerPtr<CommitMilestoneEvent>>,
    pub(crate) reject_milestone_handlers: Vec<HandlerPtr<RejectMilestoneEvent>>,
    pub(crate) revert_milestone_handlers: Vec<HandlerPtr<RevertMilestoneEvent>>,
    pub(crate) milestone_gap_handlers: Vec<HandlerPtr<MilestoneGapEvent>>,
    pub(crate) select_tips_handlers: Vec<HandlerPtr<SelectTipsEvent>>,
    pub(crate) start_worker_handlers: Vec<HandlerPtr<StartWorkerEvent>>,
    pub(crate) stop_worker_handlers: Vec<HandlerPtr<StopWorkerEvent>>,
}

/// Collect the user's handler and, if `log_events`, the default logger for one event type.
fn handlers<T: Logger>(log_events: bool, user_handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(T::get_logger());
    }
    if let Some(user_handler) = user_handler {
        handlers.push(user_handler);
    }
    handlers
}

impl EventHandlers {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        receive_transaction_handler: Option<HandlerPtr<ReceiveTransactionEvent>>,
        solidify_transaction_handler: Option<HandlerPtr<SolidifyTransactionEvent>>,
        request_transaction_handler: Option<HandlerPtr<RequestTransactionEvent>>,
        receive_milestone_handler: Option<HandlerPtr<ReceiveMilestoneEvent>>,
        commit_milestone_handler: Option<HandlerPtr<CommitMilestoneEvent>>,
        reject_milestone_handler: Option<HandlerPtr<RejectMilestoneEvent>>,
        revert_milestone_handler: Option<HandlerPtr<RevertMilestoneEvent>>,
        milestone_gap_handler: Option<HandlerPtr<MilestoneGapEvent>>,
        select_tips_handler: Option<HandlerPtr<SelectTipsEvent>>,
        start_worker_handler: Option<HandlerPtr<StartWorkerEvent>>,
        stop_worker_handler: Option<HandlerPtr<StopWorkerEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            receive_transaction_handlers: handlers(log_events, receive_transaction_handler),
            solidify_transaction_handlers: handlers(log_events, solidify_transaction_handler),
            request_transaction_handlers: handlers(log_events, request_transaction_handler),
            receive_milestone_handlers: handlers(log_events, receive_milestone_handler),
            commit_milestone_handlers: handlers(log_events, commit_milestone_handler),
            reject_milestone_handlers: handlers(log_events, reject_milestone_handler),
            revert_milestone_handlers: handlers(log_events, revert_milestone_handler),
            milestone_gap_handlers: handlers(log_events, milestone_gap_handler),
            select_tips_handlers: handlers(log_events, select_tips_handler),
            start_worker_handlers: handlers(log_events, start_worker_handler),
            stop_worker_handlers: handlers(log_events, stop_worker_handler),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.receive_transaction_handlers.is_empty()
            && self.solidify_transaction_handlers.is_empty()
            && self.request_transaction_handlers.is_empty()
            && self.receive_milestone_handlers.is_empty()
            && self.commit_milestone_handlers.is_empty()
            && self.reject_milestone_handlers.is_empty()
            && self.revert_milestone_handlers.is_empty()
            && self.milestone_gap_handlers.is_empty()
            && self.select_tips_handlers.is_empty()
            && self.start_worker_handlers.is_empty()
            && self.stop_worker_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::ReceiveTransaction(receive_transaction_event) => self
                .receive_transaction_handlers
                .iter()
                .for_each(|handler| handler(&receive_transaction_event)),

            Event::SolidifyTransaction(solidify_transaction_event) => self
                .solidify_transaction_handlers
                .iter()
                .for_each(|handler| handler(&solidify_transaction_event)),

            Event::RequestTransaction(request_transaction_event) => self
                .request_transaction_handlers
                .iter()
                .for_each(|handler| handler(&request_transaction_event)),

            Event::ReceiveMilestone(receive_milestone_event) => self
                .receive_milestone_handlers
                .iter()
                .for_each(|handler| handler(&receive_milestone_event)),

            Event::CommitMilestone(commit_milestone_event) => self
                .commit_milestone_handlers
                .iter()
                .for_each(|handler| handler(&commit_milestone_event)),

            Event::RejectMilestone(reject_milestone_event) => self
                .reject_milestone_handlers
                .iter()
                .for_each(|handler| handler(&reject_milestone_event)),

            Event::RevertMilestone(revert_milestone_event) => self
                .revert_milestone_handlers
                .iter()
                .for_each(|handler| handler(&revert_milestone_event)),

            Event::MilestoneGap(milestone_gap_event) => self
                .milestone_gap_handlers
                .iter()
                .for_each(|handler| handler(&milestone_gap_event)),

            Event::SelectTips(select_tips_event) => self
                .select_tips_handlers
                .iter()
                .for_each(|handler| handler(&select_tips_event)),

            Event::StartWorker(start_worker_event) => self
                .start_worker_handlers
                .iter()
                .for_each(|handler| handler(&start_worker_event)),

            Event::StopWorker(stop_worker_event) => self
                .stop_worker_handlers
                .iter()
                .for_each(|handler| handler(&stop_worker_event)),
        }
    }
}

/// Deliver events from `event_subscriber` until `shutdown_signal` fires. Events already published when
/// the signal fires are still delivered.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match event_subscriber.recv_timeout(EVENT_POLL_INTERVAL) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => match shutdown_signal.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => (),
            },
            Err(RecvTimeoutError::Disconnected) => return,
        }
    })
}
