use futures::future::{FutureExt, LocalBoxFuture};
use futures::task::{waker, ArcWake};
use futures_channel::oneshot;
use intmap::IntMap;
use queues::{IsQueue, Queue};
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use crate::error::{TbError, TbResult};

pub type TaskId = u64;

// Tasks and the ready queue are per thread: one simulation, one thread.
thread_local! {
    static READY_QUEUE: RefCell<Queue<TaskId>> = RefCell::new(Queue::new());
    static TASKS: RefCell<IntMap<Task>> = RefCell::new(IntMap::new());
    static NEXT_ID: Cell<TaskId> = const { Cell::new(1) };
    // task currently being polled, and whether it cancelled itself meanwhile
    static POLLING: Cell<Option<TaskId>> = const { Cell::new(None) };
    static CANCEL_POLLING: Cell<bool> = const { Cell::new(false) };
}

pub fn schedule_task(id: TaskId) {
    READY_QUEUE.with(|q| {
        let _ = q.borrow_mut().add(id);
    });
}

fn next_task() -> Option<TaskId> {
    READY_QUEUE.with(|q| q.borrow_mut().remove().ok())
}

/// Polls woken tasks until none is ready.
#[inline]
pub fn run_once() {
    while let Some(id) = next_task() {
        process_task(id);
    }
}

#[inline]
fn process_task(id: TaskId) {
    // Take the task out of the map while polling, it may spawn or cancel others.
    let Some(mut task) = TASKS.with(|t| t.borrow_mut().remove(id)) else {
        // completed or cancelled, stale wake-up
        return;
    };
    POLLING.with(|p| p.set(Some(id)));
    CANCEL_POLLING.with(|c| c.set(false));

    let waker = task.waker.clone();
    let mut context = Context::from_waker(&waker);
    let poll = task.future.as_mut().poll(&mut context);

    POLLING.with(|p| p.set(None));
    let cancelled = CANCEL_POLLING.with(|c| c.replace(false));
    match poll {
        Poll::Pending if cancelled => log::trace!("task '{}' cancelled itself", task.name),
        Poll::Pending => {
            TASKS.with(|t| t.borrow_mut().insert(id, task));
        }
        Poll::Ready(result) => {
            log::trace!("task '{}' complete", task.name);
            if let Some(tx) = task.join_tx.take() {
                let _ = tx.send(result);
            }
        }
    }
}

/// Drops a task without polling it again. Its `JoinHandle` resolves to `Cancelled`.
pub fn cancel_task(id: TaskId) {
    if POLLING.with(|p| p.get()) == Some(id) {
        CANCEL_POLLING.with(|c| c.set(true));
        return;
    }
    let task = TASKS.with(|t| t.borrow_mut().remove(id));
    drop(task);
}

/// Drops every task and forgets pending wake-ups.
pub fn clear() {
    let tasks = TASKS.with(|t| std::mem::replace(&mut *t.borrow_mut(), IntMap::new()));
    READY_QUEUE.with(|q| *q.borrow_mut() = Queue::new());
    if let Some(id) = POLLING.with(|p| p.get()) {
        cancel_task(id);
    }
    // dropping futures may touch the executor, so it happens outside the borrow
    drop(tasks);
}

pub fn task_count() -> usize {
    TASKS.with(|t| t.borrow().len())
}

struct TaskWaker {
    id: TaskId,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        schedule_task(arc_self.id);
    }
}

pub struct Task {
    future: LocalBoxFuture<'static, TbResult>,
    waker: Waker,
    name: String,
    join_tx: Option<oneshot::Sender<TbResult>>,
}

impl Task {
    pub fn fork(future: impl Future<Output = TbResult> + 'static) -> JoinHandle {
        Task::spawn_from_future(future, "forked")
    }

    pub fn spawn_from_future(
        future: impl Future<Output = TbResult> + 'static,
        name: &str,
    ) -> JoinHandle {
        let id = NEXT_ID.with(|n| {
            let id = n.get();
            n.set(id + 1);
            id
        });
        let (tx, rx) = oneshot::channel::<TbResult>();
        let task = Task {
            future: future.boxed_local(),
            waker: waker(Arc::new(TaskWaker { id })),
            name: name.to_string(),
            join_tx: Some(tx),
        };
        TASKS.with(|t| t.borrow_mut().insert(id, task));
        schedule_task(id);
        JoinHandle { task: id, join_rx: rx }
    }
}

pub struct JoinHandle {
    task: TaskId,
    join_rx: oneshot::Receiver<TbResult>,
}

impl JoinHandle {
    pub fn id(&self) -> TaskId {
        self.task
    }

    pub fn cancel(self) {
        cancel_task(self.task);
    }

    /// Result of the task if it already finished, without waiting.
    pub fn try_result(&mut self) -> Option<TbResult> {
        match self.join_rx.try_recv() {
            Ok(result) => result,
            Err(_) => Some(Err(TbError::Cancelled)),
        }
    }
}

impl Future for JoinHandle {
    type Output = TbResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.join_rx.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TbError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Val;

    #[test]
    fn forked_task_result_reaches_join_handle() {
        let mut inner = Task::fork(async { Ok(Val::Int(7)) });
        assert!(inner.try_result().is_none());
        run_once();
        assert_eq!(inner.try_result(), Some(Ok(Val::Int(7))));
        clear();
    }

    #[test]
    fn awaiting_a_join_handle_chains_tasks() {
        let mut outer = Task::spawn_from_future(
            async {
                let inner = Task::fork(async { Ok(Val::Int(3)) });
                match inner.await? {
                    Val::Int(i) => Ok(Val::Int(i * 2)),
                    other => Ok(other),
                }
            },
            "outer",
        );
        run_once();
        assert_eq!(outer.try_result(), Some(Ok(Val::Int(6))));
        assert_eq!(task_count(), 0);
        clear();
    }

    #[test]
    fn cancelled_task_is_dropped() {
        let mut handle = Task::fork(futures::future::pending());
        run_once();
        assert_eq!(task_count(), 1);
        cancel_task(handle.id());
        assert_eq!(task_count(), 0);
        assert_eq!(handle.try_result(), Some(Err(TbError::Cancelled)));
        clear();
    }
}
