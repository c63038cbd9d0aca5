use intmap::IntMap;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::{TbError, TbResult};
use crate::executor;
use crate::signal::SimObject;
use crate::sim_if::{sim_if, SimCallback};

// IntMap specializes on u64 keys, no hashing needed
thread_local! {
    // key is signal handle
    static EDGE_MAP: RefCell<IntMap<CallbackHandles>> = RefCell::new(IntMap::new());
    // key is absolute callback time
    static TIMER_MAP: RefCell<IntMap<CallbackHandles>> = RefCell::new(IntMap::new());
    static READ_ONLY: RefCell<CallbackHandles> = RefCell::new(CallbackHandles::default());
    static READ_WRITE: RefCell<CallbackHandles> = RefCell::new(CallbackHandles::default());
}

#[derive(Default)]
struct CallbackHandles {
    handle: Option<usize>,
    callbacks: VecDeque<TrigShared>,
}

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum EdgeKind {
    Any,
    Rising,
    Falling,
}

/// Cancels every outstanding simulator callback and forgets its waiters.
pub(crate) fn cancel_all_triggers() {
    let mut handles = Vec::new();
    for sync in [&READ_ONLY, &READ_WRITE] {
        sync.with(|s| {
            let mut s = s.borrow_mut();
            s.callbacks.clear();
            handles.extend(s.handle.take());
        });
    }
    for map in [&TIMER_MAP, &EDGE_MAP] {
        map.with(|m| {
            let drained = std::mem::replace(&mut *m.borrow_mut(), IntMap::new());
            for (_, cb) in drained {
                handles.extend(cb.handle);
            }
        });
    }
    if let Ok(sim) = sim_if() {
        for handle in handles {
            if let Err(e) = sim.cancel_callback(handle) {
                log::warn!("failed to cancel callback {}: {}", handle, e);
            }
        }
    }
}

#[derive(Debug, Clone)]
struct TrigShared {
    waker: Waker,
    fired: Rc<Cell<bool>>,
    // An edge callback is shared by all waiters on a signal; each waiter
    // remembers which edge it wants.
    edge_kind: EdgeKind,
}

impl TrigShared {
    fn fire(self) {
        self.fired.set(true);
        self.waker.wake();
    }
}

#[derive(Clone, Copy, Debug)]
enum TrigKind {
    Edge(usize, EdgeKind),
    Timer(u64),
    ReadWrite,
    ReadOnly,
}

/// A future completing on a simulator event.
///
/// Registration happens on first poll, so a trigger can be created ahead of
/// the point where it is awaited.
#[derive(Debug)]
pub struct Trigger {
    kind: TrigKind,
    fired: Option<Rc<Cell<bool>>>,
}

impl Trigger {
    fn new(kind: TrigKind) -> Self {
        Trigger { kind, fired: None }
    }

    /// Waits `steps` simulation steps. Zero steps resumes in the next evaluation round.
    pub fn timer_steps(steps: u64) -> Self {
        Trigger::new(TrigKind::Timer(steps))
    }

    pub fn timer(time: u64, unit: &str) -> TbResult<Self> {
        let steps = sim_if()?.get_sim_steps(time as f64, unit)?;
        Ok(Trigger::timer_steps(steps))
    }

    pub async fn timer_rw(time: u64, unit: &str) -> TbResult<()> {
        Trigger::timer(time, unit)?.await?;
        Trigger::read_write().await
    }

    pub fn edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Any))
    }

    pub fn rising_edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Rising))
    }

    pub fn falling_edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Falling))
    }

    /// Resumes once all writes of the current time step are applied; writing is still allowed.
    pub fn read_write() -> Self {
        Trigger::new(TrigKind::ReadWrite)
    }

    /// Resumes at the end of the current time step, values are final.
    pub fn read_only() -> Self {
        Trigger::new(TrigKind::ReadOnly)
    }

    fn register(&self, mut shared: TrigShared) -> TbResult<()> {
        let sim = sim_if()?;
        match self.kind {
            TrigKind::ReadWrite | TrigKind::ReadOnly => {
                let (slot, cb) = match self.kind {
                    TrigKind::ReadWrite => (&READ_WRITE, SimCallback::ReadWrite),
                    _ => (&READ_ONLY, SimCallback::ReadOnly),
                };
                slot.with(|s| {
                    let mut s = s.borrow_mut();
                    if s.handle.is_none() {
                        s.handle = Some(sim.register_callback(cb)?);
                    }
                    s.callbacks.push_back(shared);
                    Ok(())
                })
            }
            TrigKind::Timer(t) => {
                // simulator reports absolute time, so that is the key
                let abs_time = t
                    .checked_add(sim.get_sim_time_steps())
                    .ok_or(TbError::TimeOverflow(t))?;
                TIMER_MAP.with(|m| {
                    let mut m = m.borrow_mut();
                    if let Some(callbacks) = m.get_mut(abs_time) {
                        callbacks.callbacks.push_back(shared);
                    } else {
                        let handle = sim.register_callback(SimCallback::Time(abs_time))?;
                        let callback = CallbackHandles {
                            handle: Some(handle),
                            callbacks: VecDeque::from([shared]),
                        };
                        m.insert(abs_time, callback);
                    }
                    Ok(())
                })
            }
            TrigKind::Edge(sig_hdl, edge_kind) => {
                shared.edge_kind = edge_kind;
                EDGE_MAP.with(|m| {
                    let mut m = m.borrow_mut();
                    if let Some(callbacks) = m.get_mut(sig_hdl as u64) {
                        callbacks.callbacks.push_back(shared);
                    } else {
                        let handle = sim.register_callback(SimCallback::Edge(sig_hdl))?;
                        let callback = CallbackHandles {
                            handle: Some(handle),
                            callbacks: VecDeque::from([shared]),
                        };
                        m.insert(sig_hdl as u64, callback);
                    }
                    Ok(())
                })
            }
        }
    }
}

impl Future for Trigger {
    type Output = TbResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(fired) = &self.fired {
            return if fired.get() {
                Poll::Ready(Ok(()))
            } else {
                Poll::Pending
            };
        }
        let fired = Rc::new(Cell::new(false));
        let shared = TrigShared {
            waker: cx.waker().clone(),
            fired: fired.clone(),
            edge_kind: EdgeKind::Any,
        };
        match self.register(shared) {
            Ok(()) => {
                self.fired = Some(fired);
                Poll::Pending
            }
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

/// Called by the simulator when a registered callback is due.
pub fn react(cb: SimCallback, edge: Option<EdgeKind>) {
    let wake: VecDeque<TrigShared> = match cb {
        SimCallback::ReadWrite => take_sync(&READ_WRITE),
        SimCallback::ReadOnly => take_sync(&READ_ONLY),
        SimCallback::Time(t) => TIMER_MAP
            .with(|m| m.borrow_mut().remove(t))
            .map(|c| c.callbacks)
            .unwrap_or_default(),
        SimCallback::Edge(sig_hdl) => react_edge(sig_hdl, edge.unwrap_or(EdgeKind::Any)),
    };
    if wake.is_empty() {
        log::trace!("no waiters for {:?}", cb);
        return;
    }
    for shared in wake {
        shared.fire();
    }
    // execute woken tasks
    executor::run_once();
}

fn take_sync(
    slot: &'static std::thread::LocalKey<RefCell<CallbackHandles>>,
) -> VecDeque<TrigShared> {
    slot.with(|s| {
        let mut s = s.borrow_mut();
        // callback is one-shot, simulator already dropped it
        s.handle = None;
        std::mem::take(&mut s.callbacks)
    })
}

fn react_edge(sig_hdl: usize, edge: EdgeKind) -> VecDeque<TrigShared> {
    let Some(mut callbacks) = EDGE_MAP.with(|m| m.borrow_mut().remove(sig_hdl as u64)) else {
        return VecDeque::new();
    };
    let (wake, resched): (VecDeque<_>, VecDeque<_>) = callbacks
        .callbacks
        .drain(..)
        .partition(|trig| trig.edge_kind == EdgeKind::Any || trig.edge_kind == edge);
    if resched.is_empty() {
        // nobody left waiting on this signal
        if let (Some(handle), Ok(sim)) = (callbacks.handle, sim_if()) {
            if let Err(e) = sim.cancel_callback(handle) {
                log::warn!("failed to cancel edge callback {}: {}", handle, e);
            }
        }
    } else {
        callbacks.callbacks = resched;
        EDGE_MAP.with(|m| m.borrow_mut().insert(sig_hdl as u64, callbacks));
    }
    wake
}
