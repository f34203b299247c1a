//! Task coalescing.
//!
//! Equivalent concurrent requests share one unit of work. The registry maps
//! each key to its active unit and every caller becomes an observer of it:
//!
//! ```text
//! Request A ─┐
//!            │                                   Scheduler
//! Request B ─┼──► TaskRegistry ── one unit ──► (priority = max
//!            │       │                          of A, B, C)
//! Request C ─┘       │                              │
//!                    ▼                              ▼
//!             [A, B, C each get                 [fetch, decode,
//!              their own channel]◄──────────────  process once]
//! ```
//!
//! # Locking
//!
//! The registry lock is the single serialization point for attach, detach,
//! priority changes, progress and completion. It is taken before the
//! scheduler lock and before any cache call, never after. Completion writes
//! to the cache and removes the unit under the same lock that `attach`
//! probes the cache with, so a key is never both cached and active.

use crate::pipeline::error::PipelineError;
use crate::pipeline::scheduler::{QueuedWork, TicketId, WorkScheduler};
use crate::pipeline::task::{self, ObserverControl, PipelineTask, TaskEvent, TaskProgress};
use crate::priority::Priority;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Identifies one unit of work for the lifetime of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkId(u64);

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct ObserverId(u64);

struct ObserverSlot<T> {
    priority: Priority,
    events: mpsc::UnboundedSender<TaskEvent<T>>,
}

struct ActiveWork<T> {
    work_id: WorkId,
    observers: BTreeMap<ObserverId, ObserverSlot<T>>,
    priority: Priority,
    progress: TaskProgress,
    ticket: TicketId,
    cancellation: CancellationToken,
}

impl<T> ActiveWork<T> {
    fn effective_priority(&self) -> Priority {
        self.observers
            .values()
            .map(|slot| slot.priority)
            .max()
            .unwrap_or(self.priority)
    }
}

struct RegistryState<K, T> {
    active: HashMap<K, ActiveWork<T>>,
    next_id: u64,
}

/// Statistics for monitoring coalescing effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Requests that reached the registry (cache hits excluded)
    pub total_requests: u64,
    /// Requests attached to existing work
    pub coalesced_requests: u64,
    /// Requests that created new work
    pub new_requests: u64,
    /// Units of work that finished successfully
    pub completed: u64,
    /// Units of work that finished with an error
    pub failed: u64,
    /// Units of work cancelled because every observer left, or torn down by
    /// `cancel_all`
    pub cancelled: u64,
}

impl CoalescerStats {
    /// Share of requests that were coalesced.
    pub fn coalescing_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.coalesced_requests as f64 / self.total_requests as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    coalesced: AtomicU64,
    new: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

/// What the caller must spawn after creating new work.
pub(crate) struct WorkStart {
    pub work_id: WorkId,
    pub cancellation: CancellationToken,
    pub queued: QueuedWork,
}

/// Key → active unit of work, plus the scheduler it queues on.
pub(crate) struct TaskRegistry<K, T> {
    label: &'static str,
    state: Mutex<RegistryState<K, T>>,
    scheduler: WorkScheduler,
    counters: Counters,
}

impl<K, T> TaskRegistry<K, T>
where
    K: Hash + Eq + Clone + fmt::Display + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    pub fn new(label: &'static str, scheduler: WorkScheduler) -> Self {
        Self {
            label,
            state: Mutex::new(RegistryState {
                active: HashMap::new(),
                next_id: 0,
            }),
            scheduler,
            counters: Counters::default(),
        }
    }

    /// Attaches a new observer for `key`.
    ///
    /// `probe` runs under the registry lock; a `Some` result completes the
    /// task immediately. Otherwise the observer joins the active unit for
    /// `key`, or a new unit is created and returned as a [`WorkStart`].
    pub fn attach(
        self: &Arc<Self>,
        key: K,
        priority: Priority,
        probe: impl FnOnce() -> Option<T>,
    ) -> (PipelineTask<T>, Option<WorkStart>) {
        let mut state = self.state.lock();

        if let Some(hit) = probe() {
            debug!(registry = self.label, key = %key, "Served from cache");
            return (task::completed(Ok(hit)), None);
        }

        state.next_id += 1;
        let observer_id = ObserverId(state.next_id);
        let (events, rx) = mpsc::unbounded_channel();
        let slot = ObserverSlot { priority, events };

        if let Some(work) = state.active.get_mut(&key) {
            let before = work.priority;
            work.observers.insert(observer_id, slot);
            work.priority = work.effective_priority();
            if work.priority != before {
                self.scheduler.set_priority(work.ticket, work.priority);
            }
            let work_id = work.work_id;
            self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!(
                registry = self.label,
                key = %key,
                work_id = %work_id,
                observers = work.observers.len(),
                priority = %work.priority,
                "Coalescing request into in-flight work"
            );
            drop(state);
            return (self.observer_task(rx, key, work_id, observer_id), None);
        }

        state.next_id += 1;
        let work_id = WorkId(state.next_id);
        let queued = self.scheduler.enqueue(priority);
        let cancellation = CancellationToken::new();
        let mut observers = BTreeMap::new();
        observers.insert(observer_id, slot);
        state.active.insert(
            key.clone(),
            ActiveWork {
                work_id,
                observers,
                priority,
                progress: TaskProgress::default(),
                ticket: queued.ticket(),
                cancellation: cancellation.clone(),
            },
        );
        self.counters.new.fetch_add(1, Ordering::Relaxed);
        debug!(
            registry = self.label,
            key = %key,
            work_id = %work_id,
            priority = %priority,
            in_flight = state.active.len(),
            "New request - starting work"
        );
        drop(state);

        let task = self.observer_task(rx, key, work_id, observer_id);
        (
            task,
            Some(WorkStart {
                work_id,
                cancellation,
                queued,
            }),
        )
    }

    fn observer_task(
        self: &Arc<Self>,
        events: mpsc::UnboundedReceiver<TaskEvent<T>>,
        key: K,
        work_id: WorkId,
        observer_id: ObserverId,
    ) -> PipelineTask<T> {
        let control = Arc::new(Observer {
            registry: Arc::clone(self),
            key,
            work_id,
            observer_id,
        });
        PipelineTask::new(events, Some(control))
    }

    fn set_observer_priority(
        &self,
        key: &K,
        work_id: WorkId,
        observer_id: ObserverId,
        priority: Priority,
    ) {
        let mut state = self.state.lock();
        let Some(work) = active_work(&mut state, key, work_id) else {
            return;
        };
        let Some(slot) = work.observers.get_mut(&observer_id) else {
            return;
        };
        slot.priority = priority;

        let effective = work.effective_priority();
        if effective != work.priority {
            work.priority = effective;
            self.scheduler.set_priority(work.ticket, effective);
            debug!(
                registry = self.label,
                key = %key,
                work_id = %work_id,
                priority = %effective,
                "Work priority changed"
            );
        }
    }

    /// Removes one observer, cancelling the work if it was the last one.
    fn detach(&self, key: &K, work_id: WorkId, observer_id: ObserverId) {
        let mut state = self.state.lock();
        let Some(work) = active_work(&mut state, key, work_id) else {
            return;
        };
        let Some(slot) = work.observers.remove(&observer_id) else {
            return;
        };
        let _ = slot
            .events
            .send(TaskEvent::Completed(Err(PipelineError::Cancelled)));

        if work.observers.is_empty() {
            if let Some(work) = state.active.remove(key) {
                work.cancellation.cancel();
                self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    registry = self.label,
                    key = %key,
                    work_id = %work_id,
                    "Last observer left - work cancelled"
                );
            }
            return;
        }

        let effective = work.effective_priority();
        if effective != work.priority {
            work.priority = effective;
            self.scheduler.set_priority(work.ticket, effective);
        }
        debug!(
            registry = self.label,
            key = %key,
            work_id = %work_id,
            observers = work.observers.len(),
            "Observer detached"
        );
    }

    /// Records progress and forwards it to every observer.
    pub fn publish_progress(&self, key: &K, work_id: WorkId, completed: u64, total: u64) {
        let mut state = self.state.lock();
        let Some(work) = active_work(&mut state, key, work_id) else {
            return;
        };
        let progress = work.progress.advance(completed, total);
        if progress == work.progress {
            return;
        }
        work.progress = progress;
        for slot in work.observers.values() {
            let _ = slot.events.send(TaskEvent::Progress(progress));
        }
    }

    /// Finishes the work and delivers `result` to every current observer.
    ///
    /// `on_success` runs under the registry lock before the unit is retired,
    /// which is where the result is published to the cache.
    pub fn complete(
        &self,
        key: &K,
        work_id: WorkId,
        result: Result<T, PipelineError>,
        on_success: impl FnOnce(&T),
    ) {
        let mut state = self.state.lock();
        if active_work(&mut state, key, work_id).is_none() {
            return;
        }
        let Some(work) = state.active.remove(key) else {
            return;
        };

        match &result {
            Ok(value) => {
                on_success(value);
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        debug!(
            registry = self.label,
            key = %key,
            work_id = %work_id,
            observers = work.observers.len(),
            success = result.is_ok(),
            "Work finished"
        );

        for slot in work.observers.into_values() {
            let _ = slot.events.send(TaskEvent::Completed(result.clone()));
        }
    }

    /// Retires work that stopped without producing a result.
    ///
    /// Remaining observers complete with `Cancelled`.
    pub fn abandon(&self, key: &K, work_id: WorkId) {
        let mut state = self.state.lock();
        if active_work(&mut state, key, work_id).is_none() {
            return;
        }
        if let Some(work) = state.active.remove(key) {
            work.cancellation.cancel();
            self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            for slot in work.observers.into_values() {
                let _ = slot
                    .events
                    .send(TaskEvent::Completed(Err(PipelineError::Cancelled)));
            }
        }
    }

    /// Cancels every unit of work, failing all observers with `error`.
    pub fn cancel_all(&self, error: PipelineError) -> usize {
        let drained: Vec<ActiveWork<T>> = {
            let mut state = self.state.lock();
            state.active.drain().map(|(_, work)| work).collect()
        };
        let count = drained.len();
        self.counters
            .cancelled
            .fetch_add(count as u64, Ordering::Relaxed);
        for work in drained {
            work.cancellation.cancel();
            for slot in work.observers.into_values() {
                let _ = slot.events.send(TaskEvent::Completed(Err(error.clone())));
            }
        }
        count
    }

    /// Effective priority of the active work for `key`.
    pub fn active_priority(&self, key: &K) -> Option<Priority> {
        self.state.lock().active.get(key).map(|work| work.priority)
    }

    /// Number of observers attached to the active work for `key`.
    pub fn observer_count(&self, key: &K) -> usize {
        self.state
            .lock()
            .active
            .get(key)
            .map_or(0, |work| work.observers.len())
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    pub fn stats(&self) -> CoalescerStats {
        let coalesced = self.counters.coalesced.load(Ordering::Relaxed);
        let new = self.counters.new.load(Ordering::Relaxed);
        CoalescerStats {
            total_requests: coalesced + new,
            coalesced_requests: coalesced,
            new_requests: new,
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.stats();
        info!(
            registry = self.label,
            total_requests = stats.total_requests,
            coalesced = stats.coalesced_requests,
            new_requests = stats.new_requests,
            completed = stats.completed,
            failed = stats.failed,
            cancelled = stats.cancelled,
            in_flight = self.active_count(),
            coalescing_ratio = format!("{:.1}%", stats.coalescing_ratio() * 100.0),
            "Request coalescing statistics"
        );
    }
}

/// Looks up active work, ignoring a stale unit that reused the key.
fn active_work<'a, K: Hash + Eq, T>(
    state: &'a mut RegistryState<K, T>,
    key: &K,
    work_id: WorkId,
) -> Option<&'a mut ActiveWork<T>> {
    state
        .active
        .get_mut(key)
        .filter(|work| work.work_id == work_id)
}

struct Observer<K, T> {
    registry: Arc<TaskRegistry<K, T>>,
    key: K,
    work_id: WorkId,
    observer_id: ObserverId,
}

impl<K, T> ObserverControl for Observer<K, T>
where
    K: Hash + Eq + Clone + fmt::Display + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    fn set_priority(&self, priority: Priority) {
        self.registry
            .set_observer_priority(&self.key, self.work_id, self.observer_id, priority);
    }

    fn cancel(&self) {
        self.registry
            .detach(&self.key, self.work_id, self.observer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Registry = TaskRegistry<String, u32>;

    fn registry(max_concurrent: usize) -> Arc<Registry> {
        Arc::new(TaskRegistry::new("test", WorkScheduler::new(max_concurrent)))
    }

    fn miss() -> Option<u32> {
        None
    }

    #[tokio::test]
    async fn test_first_request_creates_work() {
        let registry = registry(4);
        let (_task, start) = registry.attach("a".into(), Priority::Normal, miss);

        assert!(start.is_some());
        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.stats().new_requests, 1);
    }

    #[tokio::test]
    async fn test_second_request_is_coalesced() {
        let registry = registry(4);
        let (_t1, s1) = registry.attach("a".into(), Priority::Normal, miss);
        let (_t2, s2) = registry.attach("a".into(), Priority::Normal, miss);
        let (_t3, s3) = registry.attach("b".into(), Priority::Normal, miss);

        assert!(s1.is_some());
        assert!(s2.is_none());
        assert!(s3.is_some());
        assert_eq!(registry.observer_count(&"a".to_string()), 2);

        let stats = registry.stats();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.coalesced_requests, 1);
        assert!((stats.coalescing_ratio() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cache_probe_short_circuits() {
        let registry = registry(4);
        let (task, start) = registry.attach("a".into(), Priority::Normal, || Some(9));

        assert!(start.is_none());
        assert_eq!(registry.active_count(), 0);
        assert_eq!(task.response().await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_all_observers_receive_result() {
        let registry = registry(4);
        let key = "a".to_string();
        let (t1, start) = registry.attach(key.clone(), Priority::Normal, miss);
        let (t2, _) = registry.attach(key.clone(), Priority::Normal, miss);
        let work_id = start.unwrap().work_id;

        let mut published = None;
        registry.complete(&key, work_id, Ok(42), |v| published = Some(*v));

        assert_eq!(published, Some(42));
        assert_eq!(t1.response().await.unwrap(), 42);
        assert_eq!(t2.response().await.unwrap(), 42);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.stats().completed, 1);
    }

    #[tokio::test]
    async fn test_failure_reaches_everyone_and_skips_publish() {
        let registry = registry(4);
        let key = "a".to_string();
        let (t1, start) = registry.attach(key.clone(), Priority::Normal, miss);
        let (t2, _) = registry.attach(key.clone(), Priority::Normal, miss);

        let mut published = false;
        registry.complete(
            &key,
            start.unwrap().work_id,
            Err(PipelineError::DataIsEmpty),
            |_| published = true,
        );

        assert!(!published);
        assert!(matches!(t1.response().await, Err(PipelineError::DataIsEmpty)));
        assert!(matches!(t2.response().await, Err(PipelineError::DataIsEmpty)));
        assert_eq!(registry.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_cancel_one_observer_keeps_work() {
        let registry = registry(4);
        let key = "a".to_string();
        let (t1, start) = registry.attach(key.clone(), Priority::Normal, miss);
        let (t2, _) = registry.attach(key.clone(), Priority::Normal, miss);
        let start = start.unwrap();

        t1.cancel();
        t1.cancel();

        assert!(!start.cancellation.is_cancelled());
        assert_eq!(registry.observer_count(&key), 1);
        assert!(t1.response().await.unwrap_err().is_cancelled());

        registry.complete(&key, start.work_id, Ok(1), |_| {});
        assert_eq!(t2.response().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancel_last_observer_cancels_work() {
        let registry = registry(4);
        let key = "a".to_string();
        let (t1, start) = registry.attach(key.clone(), Priority::Normal, miss);
        let (t2, _) = registry.attach(key.clone(), Priority::Normal, miss);
        let start = start.unwrap();

        t1.cancel();
        t2.cancel();

        assert!(start.cancellation.is_cancelled());
        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.stats().cancelled, 1);

        // A late completion for the retired unit is ignored
        registry.complete(&key, start.work_id, Ok(1), |_| panic!("must not publish"));
    }

    #[tokio::test]
    async fn test_priority_is_max_of_observers() {
        let registry = registry(1);
        registry.scheduler.set_suspended(true);
        let key = "a".to_string();

        let (t1, _start) = registry.attach(key.clone(), Priority::Low, miss);
        assert_eq!(registry.scheduler.queued(), vec![Priority::Low]);

        let (t2, _) = registry.attach(key.clone(), Priority::High, miss);
        assert_eq!(registry.active_priority(&key), Some(Priority::High));
        assert_eq!(registry.scheduler.queued(), vec![Priority::High]);

        t1.set_priority(Priority::VeryHigh);
        assert_eq!(registry.scheduler.queued(), vec![Priority::VeryHigh]);

        drop(t1);
        assert_eq!(registry.active_priority(&key), Some(Priority::High));
        assert_eq!(registry.scheduler.queued(), vec![Priority::High]);

        t2.set_priority(Priority::VeryLow);
        assert_eq!(registry.scheduler.queued(), vec![Priority::VeryLow]);
    }

    #[tokio::test]
    async fn test_progress_fans_out_monotonically() {
        let registry = registry(4);
        let key = "a".to_string();
        let (mut t1, start) = registry.attach(key.clone(), Priority::Normal, miss);
        let (mut t2, _) = registry.attach(key.clone(), Priority::Normal, miss);
        let work_id = start.unwrap().work_id;

        registry.publish_progress(&key, work_id, 10, 20);
        registry.publish_progress(&key, work_id, 5, 20);
        registry.publish_progress(&key, work_id, 20, 20);
        registry.complete(&key, work_id, Ok(0), |_| {});

        for task in [&mut t1, &mut t2] {
            let mut seen = Vec::new();
            while let Some(event) = task.next_event().await {
                if let TaskEvent::Progress(p) = event {
                    seen.push((p.completed, p.total));
                }
            }
            assert_eq!(seen, vec![(10, 20), (20, 20)]);
        }
    }

    #[tokio::test]
    async fn test_cancel_all_fails_everyone() {
        let registry = registry(4);
        let (t1, s1) = registry.attach("a".into(), Priority::Normal, miss);
        let (t2, s2) = registry.attach("b".into(), Priority::Normal, miss);

        assert_eq!(registry.cancel_all(PipelineError::PipelineInvalidated), 2);
        assert_eq!(registry.stats().cancelled, 2);
        assert_eq!(registry.active_count(), 0);
        assert!(s1.unwrap().cancellation.is_cancelled());
        assert!(s2.unwrap().cancellation.is_cancelled());
        assert!(matches!(
            t1.response().await,
            Err(PipelineError::PipelineInvalidated)
        ));
        assert!(matches!(
            t2.response().await,
            Err(PipelineError::PipelineInvalidated)
        ));
    }

    #[tokio::test]
    async fn test_abandon_cancels_remaining_observers() {
        let registry = registry(4);
        let key = "a".to_string();
        let (task, start) = registry.attach(key.clone(), Priority::Normal, miss);

        registry.abandon(&key, start.unwrap().work_id);

        assert!(task.response().await.unwrap_err().is_cancelled());
        assert_eq!(registry.active_count(), 0);
    }
}
