//! Bounded-concurrency, rate-limited dispatch queue.
//!
//! Every queue owns one scheduler task. The scheduler is the only place that
//! touches `pending`, the in-flight count and the last dispatch time, so no
//! locking is involved. It wakes for exactly four reasons:
//!
//! - a job was submitted
//! - an in-flight send completed
//! - the rate interval since the last dispatch start has elapsed
//! - the caller asked to drain
//!
//! and after each one runs a single scheduling step that starts as many
//! pending jobs as the concurrency ceiling and the rate interval allow.
//!
//! ```text
//! submit ──► Command::Submit ─┐
//! drain  ──► Command::Drain  ─┼─► handle(event) ─► schedule() ─► JoinSet::spawn(send)
//! JoinSet completion ─────────┤                                      │
//! sleep_until(ready_at) ──────┘◄─────────────────────────────────────┘
//! ```

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use broadside_common::{
    internal, outgoing,
    tracing::{debug, error, info, warn},
};
use tokio::{
    sync::{mpsc, oneshot},
    task::{Id, JoinError, JoinSet},
    time::{Instant, sleep_until},
};

use crate::{
    address::EmailAddress,
    config::DispatchConfig,
    error::DispatchError,
    job::{DispatchResult, Job, SendFailure},
    outcome::{CampaignOutcome, aggregate},
    transport::{Transport, TransportError},
};

type DrainReply = oneshot::Sender<Result<Vec<DispatchResult>, DispatchError>>;

enum Command {
    Submit(Job, oneshot::Sender<DispatchResult>),
    Drain(DrainReply),
}

enum Event {
    Command(Command),
    Completed(Result<(Id, DispatchResult), JoinError>),
    /// The rate interval has elapsed
    Tick,
    /// The queue handle was dropped
    Closed,
    /// Nothing could ever wake the scheduler again
    Stalled,
}

/// Handle for a campaign's dispatch queue.
///
/// Created per campaign send and consumed by [`DispatchQueue::drain`].
/// Dropping it without draining abandons any work that has not completed.
#[derive(Debug)]
pub struct DispatchQueue {
    commands: mpsc::UnboundedSender<Command>,
    sample_errors: usize,
}

impl DispatchQueue {
    /// Validate `config` and start the scheduler task.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Configuration`] if the limits are unusable.
    ///
    /// # Panics
    ///
    /// When called outside of a tokio runtime.
    pub fn new(config: &DispatchConfig, transport: Arc<dyn Transport>) -> Result<Self, DispatchError> {
        config.validate()?;

        let (commands, receiver) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(config, transport);

        internal!(
            level = DEBUG,
            max_concurrency = config.max_concurrency,
            min_interval_ms = config.min_interval().as_millis(),
            send_timeout_secs = config.send_timeout_secs,
            "Dispatch queue created"
        );

        tokio::spawn(scheduler.run(receiver));

        Ok(Self {
            commands,
            sample_errors: config.sample_errors,
        })
    }

    /// Queue one job. Never fails and never waits.
    ///
    /// The returned handle resolves once this job's send attempt has
    /// finished, successfully or not.
    pub fn submit(&self, mut job: Job) -> JobHandle {
        job.submitted_at = Instant::now();

        let recipient = job.recipient.clone();
        let (reply, receiver) = oneshot::channel();

        // A closed scheduler drops the reply sender, which resolves the handle
        // as a failure.
        let _ = self.commands.send(Command::Submit(job, reply));

        JobHandle {
            recipient,
            receiver,
        }
    }

    /// Wait until every submitted job has resolved, then summarise.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Invariant`] if the scheduler detected broken
    /// accounting, or [`DispatchError::SchedulerGone`] if it stopped early.
    pub async fn drain(self) -> Result<CampaignOutcome, DispatchError> {
        let (reply, receiver) = oneshot::channel();
        self.commands
            .send(Command::Drain(reply))
            .map_err(|_| DispatchError::SchedulerGone)?;

        let results = receiver.await.map_err(|_| DispatchError::SchedulerGone)??;
        let outcome = aggregate(&results, self.sample_errors);

        info!(
            sent = outcome.sent,
            failed = outcome.failed,
            total = outcome.total,
            "Dispatch queue drained"
        );

        Ok(outcome)
    }
}

/// Resolves to the [`DispatchResult`] of one submitted job.
#[derive(Debug)]
pub struct JobHandle {
    recipient: EmailAddress,
    receiver: oneshot::Receiver<DispatchResult>,
}

impl JobHandle {
    pub const fn recipient(&self) -> &EmailAddress {
        &self.recipient
    }
}

impl Future for JobHandle {
    type Output = DispatchResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        Pin::new(&mut this.receiver).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                DispatchResult::failed(
                    this.recipient.clone(),
                    SendFailure::permanent("dispatch queue closed before the send completed"),
                )
            })
        })
    }
}

struct Queued {
    job: Job,
    reply: oneshot::Sender<DispatchResult>,
}

struct InFlight {
    recipient: EmailAddress,
    reply: oneshot::Sender<DispatchResult>,
}

struct Scheduler {
    transport: Arc<dyn Transport>,
    max_concurrency: usize,
    min_interval: Duration,
    send_timeout: Duration,

    pending: VecDeque<Queued>,
    in_flight: usize,
    sends: JoinSet<DispatchResult>,
    waiting: HashMap<Id, InFlight>,
    last_dispatch: Option<Instant>,
    /// When the next pending job may start, if one is held back by the rate
    wake_at: Option<Instant>,

    submitted: usize,
    results: Vec<DispatchResult>,
    drain: Option<DrainReply>,
}

impl Scheduler {
    fn new(config: &DispatchConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            max_concurrency: config.max_concurrency,
            min_interval: config.min_interval(),
            send_timeout: config.send_timeout(),
            pending: VecDeque::new(),
            in_flight: 0,
            sends: JoinSet::new(),
            waiting: HashMap::new(),
            last_dispatch: None,
            wake_at: None,
            submitted: 0,
            results: Vec::new(),
            drain: None,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut accepting = true;

        loop {
            let wake_at = self.wake_at;
            let event = tokio::select! {
                biased;

                Some(joined) = self.sends.join_next_with_id(), if !self.sends.is_empty() => {
                    Event::Completed(joined)
                }
                () = sleep_until(wake_at.unwrap_or_else(Instant::now)), if wake_at.is_some() => {
                    Event::Tick
                }
                command = commands.recv(), if accepting => {
                    command.map_or(Event::Closed, Event::Command)
                }
                else => Event::Stalled,
            };

            if matches!(event, Event::Closed) {
                accepting = false;
                if self.drain.is_none() {
                    debug!(
                        pending = self.pending.len(),
                        in_flight = self.in_flight,
                        "Dispatch queue dropped before drain, abandoning remaining work"
                    );
                    return;
                }
            }

            if let Err(e) = self.handle(event) {
                self.abort(e, &mut commands).await;
                return;
            }

            match self.finish_if_drained() {
                Ok(true) => return,
                Ok(false) => {}
                Err(e) => {
                    self.abort(e, &mut commands).await;
                    return;
                }
            }
        }
    }

    fn handle(&mut self, event: Event) -> Result<(), DispatchError> {
        match event {
            Event::Command(Command::Submit(job, reply)) => {
                self.submitted += 1;
                self.pending.push_back(Queued { job, reply });
            }
            Event::Command(Command::Drain(reply)) => {
                debug!(
                    submitted = self.submitted,
                    pending = self.pending.len(),
                    in_flight = self.in_flight,
                    "Drain requested"
                );
                self.drain = Some(reply);
            }
            Event::Completed(joined) => self.complete(joined)?,
            Event::Tick | Event::Closed => {}
            Event::Stalled => {
                return Err(DispatchError::Invariant(format!(
                    "scheduler stalled with {} pending and {} in flight",
                    self.pending.len(),
                    self.in_flight
                )));
            }
        }

        self.schedule()
    }

    /// Start every pending job the concurrency ceiling and rate interval
    /// allow right now, and arm the timer if the rate is what holds the
    /// next one back.
    fn schedule(&mut self) -> Result<(), DispatchError> {
        self.wake_at = None;

        while self.in_flight < self.max_concurrency && !self.pending.is_empty() {
            let now = Instant::now();

            if let Some(last) = self.last_dispatch {
                let ready_at = last + self.min_interval;
                if now < ready_at {
                    self.wake_at = Some(ready_at);
                    break;
                }
            }

            let Some(queued) = self.pending.pop_front() else {
                break;
            };
            self.dispatch(queued, now)?;
        }

        Ok(())
    }

    fn dispatch(&mut self, queued: Queued, now: Instant) -> Result<(), DispatchError> {
        if self.in_flight >= self.max_concurrency {
            return Err(DispatchError::Invariant(format!(
                "dispatch would exceed {} concurrent sends",
                self.max_concurrency
            )));
        }

        let Queued { job, reply } = queued;

        self.in_flight += 1;
        self.last_dispatch = Some(now);

        debug!(
            recipient = %job.recipient,
            queued_ms = now.saturating_duration_since(job.submitted_at).as_millis(),
            in_flight = self.in_flight,
            "Dispatching send"
        );

        let recipient = job.recipient.clone();
        let transport = Arc::clone(&self.transport);
        let timeout = self.send_timeout;

        let handle = self
            .sends
            .spawn(async move { attempt(transport.as_ref(), job, timeout).await });
        self.waiting.insert(handle.id(), InFlight { recipient, reply });

        Ok(())
    }

    fn complete(&mut self, joined: Result<(Id, DispatchResult), JoinError>) -> Result<(), DispatchError> {
        let (id, result) = match joined {
            Ok((id, result)) => (id, Ok(result)),
            Err(e) => (e.id(), Err(e)),
        };

        let Some(in_flight) = self.waiting.remove(&id) else {
            return Err(DispatchError::Invariant(format!(
                "completion for unknown send task {id}"
            )));
        };

        if self.in_flight == 0 {
            return Err(DispatchError::Invariant(
                "send completed while none were in flight".to_string(),
            ));
        }
        self.in_flight -= 1;

        let result = result.unwrap_or_else(|e| {
            error!(recipient = %in_flight.recipient, error = %e, "Send task did not finish");
            let message = if e.is_panic() {
                "send task panicked"
            } else {
                "send task was cancelled"
            };
            DispatchResult::failed(in_flight.recipient.clone(), SendFailure::permanent(message))
        });

        // The caller may have dropped its handle; the result is still counted.
        let _ = in_flight.reply.send(result.clone());
        self.results.push(result);

        Ok(())
    }

    fn finish_if_drained(&mut self) -> Result<bool, DispatchError> {
        if self.drain.is_none() || !self.pending.is_empty() || self.in_flight > 0 {
            return Ok(false);
        }

        if self.results.len() != self.submitted {
            return Err(DispatchError::Invariant(format!(
                "{} jobs submitted but {} results recorded",
                self.submitted,
                self.results.len()
            )));
        }

        if let Some(reply) = self.drain.take() {
            let _ = reply.send(Ok(std::mem::take(&mut self.results)));
        }

        Ok(true)
    }

    /// Stop scheduling and report `error` to the drain, waiting for one to
    /// be requested if necessary.
    async fn abort(&mut self, error: DispatchError, commands: &mut mpsc::UnboundedReceiver<Command>) {
        error!(error = %error, "Dispatch queue aborted");

        // Outstanding handles resolve as failures once their senders drop.
        self.pending.clear();
        self.waiting.clear();
        self.sends.abort_all();

        let reply = match self.drain.take() {
            Some(reply) => Some(reply),
            None => loop {
                match commands.recv().await {
                    Some(Command::Drain(reply)) => break Some(reply),
                    Some(Command::Submit(..)) => {}
                    None => break None,
                }
            },
        };

        if let Some(reply) = reply {
            let _ = reply.send(Err(error));
        }
    }
}

/// Run one send under the per-send timeout and fold every outcome into a
/// result.
async fn attempt(transport: &dyn Transport, job: Job, timeout: Duration) -> DispatchResult {
    let started = Instant::now();

    let outcome = tokio::time::timeout(timeout, transport.send(&job.recipient, &job.payload))
        .await
        .unwrap_or(Err(TransportError::Timeout(timeout)));

    match outcome {
        Ok(()) => {
            outgoing!(
                level = DEBUG,
                recipient = %job.recipient,
                elapsed_ms = started.elapsed().as_millis(),
                "Campaign email sent"
            );
            DispatchResult::sent(job.recipient)
        }
        Err(e) => {
            warn!(
                recipient = %job.recipient,
                error = %e,
                temporary = e.is_temporary(),
                "Campaign email failed"
            );
            DispatchResult::failed(job.recipient, SendFailure::from(&e))
        }
    }
}
