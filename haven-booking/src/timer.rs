use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use haven_core::ReservationStatus;
use tokio::task::AbortHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::ledger::{ReservationLedger, Resolution};
use crate::metrics::BookingMetrics;

pub type ScheduledTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs a task once after a delay.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> CancelHandle;
}

/// Cancels a scheduled task if it has not started yet.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl CancelHandle {
    fn new(cancelled: Arc<AtomicBool>, abort: Option<AbortHandle>) -> Self {
        Self { cancelled, abort }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Spawns one sleeping tokio task per scheduled item. Must be used inside a runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> CancelHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !flag.load(Ordering::SeqCst) {
                task.await;
            }
        });
        CancelHandle::new(cancelled, Some(join.abort_handle()))
    }
}

struct Queued {
    due: Duration,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    task: ScheduledTask,
}

#[derive(Default)]
struct VirtualTime {
    now: Duration,
    next_seq: u64,
    queue: Vec<Queued>,
}

/// Scheduler driven by an explicit virtual clock. Nothing runs until `advance`.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<VirtualTime>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, VirtualTime> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Virtual time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        self.state().now
    }

    /// Tasks still waiting to run and not cancelled.
    pub fn pending(&self) -> usize {
        self.state()
            .queue
            .iter()
            .filter(|q| !q.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Move virtual time forward, running every due task in deadline order.
    /// Tasks scheduled while advancing run too if they fall due before the target.
    pub async fn advance(&self, by: Duration) {
        let target = self.state().now + by;
        loop {
            let next = {
                let mut state = self.state();
                let position = state
                    .queue
                    .iter()
                    .enumerate()
                    .filter(|(_, q)| q.due <= target)
                    .min_by_key(|(_, q)| (q.due, q.seq))
                    .map(|(i, _)| i);
                position.map(|i| {
                    let queued = state.queue.swap_remove(i);
                    if queued.due > state.now {
                        state.now = queued.due;
                    }
                    queued
                })
            };
            match next {
                Some(queued) if queued.cancelled.load(Ordering::SeqCst) => continue,
                Some(queued) => queued.task.await,
                None => break,
            }
        }
        self.state().now = target;
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> CancelHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut state = self.state();
        let seq = state.next_seq;
        state.next_seq += 1;
        let due = state.now + delay;
        state.queue.push(Queued {
            due,
            seq,
            cancelled: cancelled.clone(),
            task,
        });
        CancelHandle::new(cancelled, None)
    }
}

/// Arms one cancellation per PENDING reservation and disarms it on payment resolution.
#[derive(Clone)]
pub struct CancellationTimer {
    scheduler: Arc<dyn Scheduler>,
    grace: Duration,
    armed: Arc<Mutex<HashMap<Uuid, CancelHandle>>>,
    metrics: BookingMetrics,
}

impl CancellationTimer {
    pub fn new(scheduler: Arc<dyn Scheduler>, grace: Duration, metrics: BookingMetrics) -> Self {
        Self {
            scheduler,
            grace,
            armed: Arc::new(Mutex::new(HashMap::new())),
            metrics,
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    fn armed(&self) -> MutexGuard<'_, HashMap<Uuid, CancelHandle>> {
        self.armed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// After `delay`, move the reservation to CANCELLED if it is still PENDING.
    /// Re-arming an id replaces its previous timer.
    pub fn schedule_cancellation(&self, ledger: ReservationLedger, reservation_id: Uuid, delay: Duration) {
        let armed = self.armed.clone();
        let metrics = self.metrics.clone();
        let task: ScheduledTask = Box::pin(async move {
            armed
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&reservation_id);
            match ledger
                .resolve_pending(reservation_id, ReservationStatus::Cancelled)
                .await
            {
                Ok(Resolution::Applied(_)) => {
                    info!(%reservation_id, "payment window elapsed, reservation cancelled");
                    metrics.timer_fired("cancelled");
                }
                Ok(Resolution::AlreadyTerminal(current)) => {
                    debug!(%reservation_id, status = %current.status, "timer fired after resolution");
                    metrics.timer_fired("noop");
                }
                Err(err) => {
                    error!(%reservation_id, error = %err, "failed to cancel unpaid reservation");
                    metrics.timer_fired("error");
                }
            }
        });

        // Held across schedule so a zero-delay task cannot remove its entry before it is inserted.
        let mut armed = self.armed();
        let handle = self.scheduler.schedule(delay, task);
        if let Some(previous) = armed.insert(reservation_id, handle) {
            previous.cancel();
        }
    }

    /// Cancel the pending timer for a reservation. `false` if none was armed.
    pub fn disarm(&self, reservation_id: Uuid) -> bool {
        match self.armed().remove(&reservation_id) {
            Some(handle) => {
                handle.cancel();
                debug!(%reservation_id, "cancellation timer disarmed");
                true
            }
            None => false,
        }
    }

    pub fn armed_count(&self) -> usize {
        self.armed().len()
    }
}
