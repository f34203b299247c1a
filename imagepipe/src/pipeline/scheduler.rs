//! Priority-aware work scheduler.
//!
//! Limits how many units of work run at once and decides which queued unit
//! starts next. Queued work is ordered by priority, then by arrival:
//!
//! ```text
//! running: [a] [b] [c]          (max_concurrent = 3)
//! queued:  VeryHigh d -> High e -> Normal f -> Normal g
//!                 ^ next to start when a slot frees up
//! ```
//!
//! Changing the priority of queued work re-keys it immediately. While the
//! scheduler is suspended nothing new starts; resuming dispatches the
//! highest-priority entries first.
//!
//! Slots are RAII: dropping a [`QueuedWork`] removes it from the queue (or
//! gives back the slot it was just handed), and dropping a
//! [`SchedulerPermit`] frees its slot.

use crate::priority::Priority;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::trace;

/// Default number of units of work allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 6;

/// Identifies one entry handed out by [`WorkScheduler::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TicketId(u64);

struct Waiting {
    priority: Priority,
    seq: u64,
    admit: oneshot::Sender<()>,
}

struct SchedulerState {
    max_concurrent: usize,
    running: usize,
    suspended: bool,
    next_id: u64,
    queue: BTreeMap<(Reverse<Priority>, u64), TicketId>,
    waiting: HashMap<TicketId, Waiting>,
}

impl SchedulerState {
    /// Starts queued work while slots are free.
    fn dispatch(&mut self) {
        while !self.suspended && self.running < self.max_concurrent {
            let Some((_, ticket)) = self.queue.pop_first() else {
                break;
            };
            let Some(waiting) = self.waiting.remove(&ticket) else {
                continue;
            };
            self.running += 1;
            trace!(
                ticket = ticket.0,
                priority = %waiting.priority,
                running = self.running,
                "Dispatching work"
            );
            // The receiver outlives the QueuedWork drop, which has already
            // removed the entry if it was abandoned, so this cannot fail here
            let _ = waiting.admit.send(());
        }
    }
}

/// Bounded, priority-ordered admission of units of work.
///
/// Cheap to clone; clones share the same slots and queue.
#[derive(Clone)]
pub struct WorkScheduler {
    state: Arc<Mutex<SchedulerState>>,
}

impl WorkScheduler {
    /// Creates a scheduler running at most `max_concurrent` units at once.
    ///
    /// Zero is treated as one.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState {
                max_concurrent: max_concurrent.max(1),
                running: 0,
                suspended: false,
                next_id: 0,
                queue: BTreeMap::new(),
                waiting: HashMap::new(),
            })),
        }
    }

    /// Queues a unit of work.
    ///
    /// The returned handle resolves to a permit once a slot is assigned.
    pub fn enqueue(&self, priority: Priority) -> QueuedWork {
        let (admit, admitted) = oneshot::channel();
        let mut state = self.state.lock();
        state.next_id += 1;
        let seq = state.next_id;
        let ticket = TicketId(seq);

        state.queue.insert((Reverse(priority), seq), ticket);
        state.waiting.insert(
            ticket,
            Waiting {
                priority,
                seq,
                admit,
            },
        );
        state.dispatch();

        QueuedWork {
            ticket,
            scheduler: self.clone(),
            admitted: Some(admitted),
            converted: false,
        }
    }

    /// Changes the priority of queued work.
    ///
    /// Returns false if the ticket is no longer queued (already running or gone).
    pub fn set_priority(&self, ticket: TicketId, priority: Priority) -> bool {
        let mut state = self.state.lock();
        let Some(waiting) = state.waiting.get_mut(&ticket) else {
            return false;
        };
        if waiting.priority == priority {
            return true;
        }
        let old = (Reverse(waiting.priority), waiting.seq);
        let new = (Reverse(priority), waiting.seq);
        waiting.priority = priority;
        state.queue.remove(&old);
        state.queue.insert(new, ticket);
        true
    }

    /// Holds (`true`) or releases (`false`) all queued work.
    ///
    /// Work that is already running is not affected.
    pub fn set_suspended(&self, suspended: bool) {
        let mut state = self.state.lock();
        state.suspended = suspended;
        if !suspended {
            state.dispatch();
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.state.lock().suspended
    }

    /// Number of units currently holding a slot.
    pub fn running(&self) -> usize {
        self.state.lock().running
    }

    pub fn max_concurrent(&self) -> usize {
        self.state.lock().max_concurrent
    }

    /// Priorities of queued work, in the order it will start.
    pub fn queued(&self) -> Vec<Priority> {
        self.state
            .lock()
            .queue
            .keys()
            .map(|(Reverse(priority), _)| *priority)
            .collect()
    }

    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.running = state.running.saturating_sub(1);
        state.dispatch();
    }

    /// Removes a ticket from the queue, or gives back its freshly assigned slot.
    fn abandon(&self, ticket: TicketId) {
        let mut state = self.state.lock();
        if let Some(waiting) = state.waiting.remove(&ticket) {
            state.queue.remove(&(Reverse(waiting.priority), waiting.seq));
            return;
        }
        state.running = state.running.saturating_sub(1);
        state.dispatch();
    }
}

impl Default for WorkScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_LOADS)
    }
}

/// A unit of work waiting for a slot.
pub struct QueuedWork {
    ticket: TicketId,
    scheduler: WorkScheduler,
    admitted: Option<oneshot::Receiver<()>>,
    converted: bool,
}

impl QueuedWork {
    pub fn ticket(&self) -> TicketId {
        self.ticket
    }

    /// Waits until the scheduler assigns a slot.
    ///
    /// Cancel-safe: dropping the future before it resolves removes the work
    /// from the queue.
    pub async fn admitted(mut self) -> SchedulerPermit {
        // Awaited in place so that a dropped future runs `abandon` before the
        // receiver goes away.
        if let Some(admitted) = self.admitted.as_mut() {
            let _ = admitted.await;
        }
        self.converted = true;
        SchedulerPermit {
            scheduler: self.scheduler.clone(),
        }
    }
}

impl Drop for QueuedWork {
    fn drop(&mut self) {
        if !self.converted {
            self.scheduler.abandon(self.ticket);
        }
    }
}

/// A running slot. Dropping it lets the next queued unit start.
pub struct SchedulerPermit {
    scheduler: WorkScheduler,
}

impl Drop for SchedulerPermit {
    fn drop(&mut self) {
        self.scheduler.release_slot();
    }
}
