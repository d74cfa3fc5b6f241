// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background delivery of queued reports.
//!
//! [`DeliveryService`] is the single consumer of a session's report queue:
//! it wakes on a timer or on an explicit flush, drains bounded batches, and
//! hands them to the transport. [`ReporterHandle`] is the producer side,
//! cheap to clone and safe to use from any thread; `enqueue` never touches
//! the network and never blocks.
//!
//! Failure handling is driven by a consecutive-failure counter owned by the
//! worker. A failed batch goes back to the head of the queue and is retried
//! on a later cycle; the fourth consecutive transport failure is terminal
//! for the session and is surfaced to whoever asked for the flush or
//! shutdown, as well as on the state channel.

use crate::error::ReportingError;
use crate::queue::ReportQueue;
use crate::report::Report;
use crate::transport::{ReportSink, ShippingError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Consecutive transport failures after which the pipeline stops trying.
pub const FATAL_CONSECUTIVE_FAILURES: u32 = 4;

/// Pause between retries while a drain is riding out transient failures.
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_millis(100);

pub(crate) enum DeliveryCommand {
    Enqueue(Report),
    Flush(oneshot::Sender<Result<(), ReportingError>>),
    Shutdown(oneshot::Sender<Result<(), ReportingError>>),
}

/// Observable lifecycle of a session's delivery worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Running,
    /// Shutdown requested; the worker is emptying the queue.
    Draining,
    /// Terminal, reached through normal shutdown.
    Stopped,
    /// Terminal, reached through the consecutive-failure ceiling.
    Failed,
}

/// Outcome of one delivery attempt. The worker branches on this value; no
/// error is thrown across the loop.
#[derive(Debug)]
enum SendOutcome {
    Success,
    /// Batch dropped because it could not be serialized.
    Rejected,
    TransientFailure(u32),
    FatalFailure,
}

/// Producer-side handle to a session's delivery worker.
#[derive(Clone)]
pub struct ReporterHandle {
    tx: mpsc::UnboundedSender<DeliveryCommand>,
    state: watch::Receiver<DeliveryState>,
    closed: Arc<AtomicBool>,
}

impl ReporterHandle {
    /// Inserts a report at the tail of the session queue.
    ///
    /// Returns in bounded time regardless of Agent reachability. Rejected
    /// once the session is closed or has failed fatally.
    pub fn enqueue(&self, report: Report) -> Result<(), ReportingError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }
        self.tx
            .send(DeliveryCommand::Enqueue(report))
            .map_err(|_| self.closed_error())
    }

    /// Drains every outstanding report before returning.
    pub async fn flush(&self) -> Result<(), ReportingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DeliveryCommand::Flush(reply_tx))
            .map_err(|_| self.closed_error())?;
        reply_rx.await.map_err(|_| ReportingError::WorkerGone)?
    }

    /// Phase one of teardown: closes the queue to producers, then asks the
    /// worker to drain and stop. The returned receiver resolves when the
    /// drain completes, fails fatally, or is cancelled.
    pub(crate) fn request_shutdown(
        &self,
    ) -> Result<oneshot::Receiver<Result<(), ReportingError>>, ReportingError> {
        self.closed.store(true, Ordering::Release);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DeliveryCommand::Shutdown(reply_tx))
            .map_err(|_| self.closed_error())?;
        Ok(reply_rx)
    }

    pub fn state(&self) -> DeliveryState {
        *self.state.borrow()
    }

    /// Error/fatal-failure notification channel for the owning session.
    pub fn watch_state(&self) -> watch::Receiver<DeliveryState> {
        self.state.clone()
    }

    fn closed_error(&self) -> ReportingError {
        match *self.state.borrow() {
            DeliveryState::Failed => ReportingError::FatalDelivery {
                attempts: FATAL_CONSECUTIVE_FAILURES,
            },
            _ => ReportingError::QueueClosed,
        }
    }
}

/// The session's single background consumer.
pub struct DeliveryService {
    rx: mpsc::UnboundedReceiver<DeliveryCommand>,
    queue: ReportQueue,
    sink: Arc<dyn ReportSink>,
    session_id: String,
    max_batch_size: usize,
    flush_interval: Duration,
    consecutive_failures: u32,
    state_tx: watch::Sender<DeliveryState>,
    cancel: CancellationToken,
}

impl DeliveryService {
    pub fn new(
        sink: Arc<dyn ReportSink>,
        session_id: impl Into<String>,
        max_batch_size: usize,
        flush_interval: Duration,
        cancel: CancellationToken,
    ) -> (Self, ReporterHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(DeliveryState::Running);

        let service = DeliveryService {
            rx,
            queue: ReportQueue::new(),
            sink,
            session_id: session_id.into(),
            max_batch_size,
            flush_interval,
            consecutive_failures: 0,
            state_tx,
            cancel,
        };
        let handle = ReporterHandle {
            tx,
            state: state_rx,
            closed: Arc::new(AtomicBool::new(false)),
        };
        (service, handle)
    }

    pub async fn run(mut self) {
        debug!(session_id = %self.session_id, "delivery worker started");

        let mut ticker = interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // the first tick completes immediately

        let mut fatal = false;
        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(DeliveryCommand::Enqueue(report)) => self.queue.push(report),
                    Some(DeliveryCommand::Flush(reply)) => {
                        let result = self.drain().await;
                        fatal = matches!(result, Err(ReportingError::FatalDelivery { .. }));
                        let _ = reply.send(result);
                        if fatal {
                            break;
                        }
                    }
                    Some(DeliveryCommand::Shutdown(reply)) => {
                        let _ = self.state_tx.send(DeliveryState::Draining);
                        let result = self.drain().await;
                        fatal = matches!(result, Err(ReportingError::FatalDelivery { .. }));
                        let _ = reply.send(result);
                        break;
                    }
                    None => {
                        // Every handle is gone; empty the queue on a best
                        // effort basis before exiting.
                        let _ = self.state_tx.send(DeliveryState::Draining);
                        let result = self.drain().await;
                        fatal = matches!(result, Err(ReportingError::FatalDelivery { .. }));
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if matches!(self.ship_pending().await, SendOutcome::FatalFailure) {
                        fatal = true;
                        break;
                    }
                }
            }
        }

        let final_state = if fatal {
            DeliveryState::Failed
        } else {
            DeliveryState::Stopped
        };
        let _ = self.state_tx.send(final_state);
        debug!(session_id = %self.session_id, ?final_state, "delivery worker stopped");
    }

    /// One wake of the worker: ships batches until the queue is empty or a
    /// failure ends the cycle. A transiently failed batch is back at the
    /// head of the queue and waits for the next wake.
    async fn ship_pending(&mut self) -> SendOutcome {
        loop {
            let batch = self.queue.next_batch(self.max_batch_size);
            if batch.is_empty() {
                return SendOutcome::Success;
            }
            match self.ship_batch(batch).await {
                SendOutcome::Success | SendOutcome::Rejected => continue,
                outcome => return outcome,
            }
        }
    }

    /// Empties the queue completely, riding out transient failures, until
    /// done, fatally failed, or cancelled.
    async fn drain(&mut self) -> Result<(), ReportingError> {
        while !self.queue.is_empty() {
            if self.cancel.is_cancelled() {
                warn!(
                    session_id = %self.session_id,
                    remaining = self.queue.len(),
                    "drain cancelled before the queue emptied"
                );
                return Err(ReportingError::Cancelled);
            }

            let batch = self.queue.next_batch(self.max_batch_size);
            match self.ship_batch(batch).await {
                SendOutcome::Success | SendOutcome::Rejected => {}
                SendOutcome::TransientFailure(_) => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            warn!(
                                session_id = %self.session_id,
                                remaining = self.queue.len(),
                                "drain cancelled while backing off"
                            );
                            return Err(ReportingError::Cancelled);
                        }
                        _ = sleep(TRANSIENT_RETRY_DELAY) => {}
                    }
                }
                SendOutcome::FatalFailure => {
                    return Err(ReportingError::FatalDelivery {
                        attempts: FATAL_CONSECUTIVE_FAILURES,
                    });
                }
            }
        }
        Ok(())
    }

    /// Ships one batch and folds the result into the failure counter.
    async fn ship_batch(&mut self, batch: Vec<Report>) -> SendOutcome {
        let size = batch.len();
        match self.sink.ship(&batch).await {
            Ok(()) => {
                self.consecutive_failures = 0;
                debug!(session_id = %self.session_id, size, "batch delivered");
                SendOutcome::Success
            }
            Err(ShippingError::Payload(detail)) => {
                // Malformed data cannot be retried; drop the batch and move on.
                error!(
                    session_id = %self.session_id,
                    size,
                    %detail,
                    "dropping unserializable batch"
                );
                SendOutcome::Rejected
            }
            Err(ShippingError::Destination(status, detail)) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= FATAL_CONSECUTIVE_FAILURES {
                    error!(
                        session_id = %self.session_id,
                        attempts = self.consecutive_failures,
                        ?status,
                        %detail,
                        "giving up on report delivery for this session"
                    );
                    SendOutcome::FatalFailure
                } else {
                    warn!(
                        session_id = %self.session_id,
                        attempt = self.consecutive_failures,
                        ?status,
                        %detail,
                        "report delivery failed; batch requeued for retry"
                    );
                    self.queue.push_front_batch(batch);
                    SendOutcome::TransientFailure(self.consecutive_failures)
                }
            }
        }
    }
}
