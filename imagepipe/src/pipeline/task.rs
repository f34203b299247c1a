//! Per-request task handles.
//!
//! Every call to `load_image` or `load_data` returns its own
//! [`PipelineTask`], even when the underlying work is shared with other
//! requests. The handle receives progress and completion events through a
//! private channel and controls only its own participation:
//!
//! - [`PipelineTask::set_priority`] changes this observer's priority; the
//!   shared work runs at the highest priority of its observers
//! - [`PipelineTask::cancel`] detaches this observer, which then completes
//!   with [`PipelineError::Cancelled`]; the shared work is cancelled only
//!   when its last observer leaves
//! - dropping an unfinished task cancels it

use crate::container::{DataResponse, ImageResponse};
use crate::pipeline::error::PipelineError;
use crate::priority::Priority;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Bytes received so far and the expected total.
///
/// `total` is zero while unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskProgress {
    pub completed: u64,
    pub total: u64,
}

impl TaskProgress {
    pub fn new(completed: u64, total: u64) -> Self {
        Self { completed, total }
    }

    /// Fraction complete in `0.0..=1.0`, or 0.0 while the total is unknown.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.completed as f64 / self.total as f64).min(1.0)
        }
    }

    /// Combines a new observation, never moving backwards.
    pub(crate) fn advance(self, completed: u64, total: u64) -> Self {
        let completed = self.completed.max(completed);
        let mut total = self.total.max(total);
        if total > 0 && total < completed {
            total = completed;
        }
        Self { completed, total }
    }
}

/// Event delivered to a task observer.
#[derive(Debug, Clone)]
pub enum TaskEvent<T> {
    Progress(TaskProgress),
    /// Terminal; nothing follows it.
    Completed(Result<T, PipelineError>),
}

/// Observer-side control over shared work.
pub(crate) trait ObserverControl: Send + Sync {
    fn set_priority(&self, priority: Priority);
    fn cancel(&self);
}

/// Handle for one request.
pub struct PipelineTask<T> {
    events: mpsc::UnboundedReceiver<TaskEvent<T>>,
    control: Option<Arc<dyn ObserverControl>>,
    progress: TaskProgress,
    finished: bool,
}

/// Task returned by `ImagePipeline::load_image`.
pub type ImageTask = PipelineTask<ImageResponse>;

/// Task returned by `ImagePipeline::load_data`.
pub type DataTask = PipelineTask<DataResponse>;

impl<T> PipelineTask<T> {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<TaskEvent<T>>,
        control: Option<Arc<dyn ObserverControl>>,
    ) -> Self {
        Self {
            events,
            control,
            progress: TaskProgress::default(),
            finished: false,
        }
    }

    /// Changes this request's priority. No-op once finished.
    pub fn set_priority(&self, priority: Priority) {
        if self.finished {
            return;
        }
        if let Some(control) = &self.control {
            control.set_priority(priority);
        }
    }

    /// Cancels this request without affecting others sharing its work.
    ///
    /// Idempotent and non-blocking. If the work already finished the task
    /// still yields the real result.
    pub fn cancel(&self) {
        if self.finished {
            return;
        }
        if let Some(control) = &self.control {
            control.cancel();
        }
    }

    /// Latest progress seen by this handle.
    pub fn progress(&self) -> TaskProgress {
        self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Waits for the next event. Returns `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<TaskEvent<T>> {
        self.next().await
    }

    /// Waits for completion, discarding progress events.
    pub async fn response(self) -> Result<T, PipelineError> {
        self.response_with_progress(|_| {}).await
    }

    /// Waits for completion, calling `on_progress` for each progress event.
    pub async fn response_with_progress(
        mut self,
        mut on_progress: impl FnMut(TaskProgress),
    ) -> Result<T, PipelineError> {
        while let Some(event) = self.next().await {
            match event {
                TaskEvent::Progress(progress) => on_progress(progress),
                TaskEvent::Completed(result) => return result,
            }
        }
        Err(PipelineError::Cancelled)
    }
}

impl<T> Stream for PipelineTask<T> {
    type Item = TaskEvent<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.events.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(TaskEvent::Progress(progress))) => {
                self.progress = progress;
                Poll::Ready(Some(TaskEvent::Progress(progress)))
            }
            Poll::Ready(Some(TaskEvent::Completed(result))) => {
                self.finished = true;
                Poll::Ready(Some(TaskEvent::Completed(result)))
            }
            // Sender gone without a terminal event: the work was torn down
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(Some(TaskEvent::Completed(Err(PipelineError::Cancelled))))
            }
        }
    }
}

impl<T> Drop for PipelineTask<T> {
    fn drop(&mut self) {
        if !self.finished {
            if let Some(control) = self.control.take() {
                control.cancel();
            }
        }
    }
}

/// Creates a task that is already complete.
pub(crate) fn completed<T>(result: Result<T, PipelineError>) -> PipelineTask<T> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _ = tx.send(TaskEvent::Completed(result));
    PipelineTask::new(rx, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingControl {
        cancels: AtomicUsize,
        priorities: parking_lot::Mutex<Vec<Priority>>,
    }

    impl ObserverControl for CountingControl {
        fn set_priority(&self, priority: Priority) {
            self.priorities.lock().push(priority);
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_progress_advance_is_monotonic() {
        let p = TaskProgress::default().advance(10, 20);
        assert_eq!(p, TaskProgress::new(10, 20));
        assert_eq!(p.advance(5, 0), TaskProgress::new(10, 20));
        assert_eq!(p.advance(30, 20), TaskProgress::new(30, 30));
        assert_eq!(TaskProgress::default().advance(7, 0), TaskProgress::new(7, 0));
        assert!((TaskProgress::new(5, 20).fraction() - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_completed_task_yields_result_once() {
        let mut task = completed::<u32>(Ok(7));
        assert!(matches!(task.next_event().await, Some(TaskEvent::Completed(Ok(7)))));
        assert!(task.next_event().await.is_none());
        assert!(task.is_finished());
    }

    #[tokio::test]
    async fn test_progress_then_completion() {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = PipelineTask::<u32>::new(rx, None);
        tx.send(TaskEvent::Progress(TaskProgress::new(1, 2))).unwrap();
        tx.send(TaskEvent::Progress(TaskProgress::new(2, 2))).unwrap();
        tx.send(TaskEvent::Completed(Ok(3))).unwrap();

        let mut seen = Vec::new();
        let result = task.response_with_progress(|p| seen.push(p)).await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(seen, vec![TaskProgress::new(1, 2), TaskProgress::new(2, 2)]);
    }

    #[tokio::test]
    async fn test_closed_channel_reports_cancelled() {
        let (tx, rx) = mpsc::unbounded_channel::<TaskEvent<u32>>();
        drop(tx);
        let task = PipelineTask::new(rx, None);
        assert!(task.response().await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_drop_cancels_unfinished_task() {
        let control = Arc::new(CountingControl::default());
        let (_tx, rx) = mpsc::unbounded_channel::<TaskEvent<u32>>();
        let task = PipelineTask::new(rx, Some(control.clone() as Arc<dyn ObserverControl>));

        task.set_priority(Priority::High);
        drop(task);

        assert_eq!(control.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(*control.priorities.lock(), vec![Priority::High]);
    }

    #[tokio::test]
    async fn test_finished_task_ignores_controls() {
        let control = Arc::new(CountingControl::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let mut task = PipelineTask::new(rx, Some(control.clone() as Arc<dyn ObserverControl>));
        tx.send(TaskEvent::Completed(Ok(1u32))).unwrap();

        assert!(task.next_event().await.is_some());
        task.cancel();
        task.set_priority(Priority::Low);
        drop(task);

        assert_eq!(control.cancels.load(Ordering::SeqCst), 0);
        assert!(control.priorities.lock().is_empty());
    }
}
