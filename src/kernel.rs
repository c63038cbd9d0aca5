//! In-process event driven simulator.
//!
//! Stands in for an HDL simulator behind [`SimIf`]: it owns the signals, the
//! time wheel and the callback tables, and drives [`trigger::react`] the way a
//! VPI simulator would call back into the testbench.
//!
//! Each time step is evaluated in rounds. Woken tasks run first, their writes
//! are buffered; when nothing is runnable the buffered writes are applied and
//! resulting value changes fire edge callbacks, which starts the next round.
//! Once no more writes are pending, read-write callbacks run (they may still
//! write), then read-only callbacks, then time advances to the next timer.
//! Readers woken by an edge therefore see the values from before any write
//! made in reaction to that same edge.

use intmap::IntMap;
use num_format::{Locale, ToFormattedString};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::error::{TbError, TbResult};
use crate::executor;
use crate::sim_if::{self, ObjectKind, SimCallback, SimIf};
use crate::trigger::{self, EdgeKind};

/// Default resolution, one picosecond.
pub const DEFAULT_PRECISION: i8 = -12;

struct Object {
    name: String,
    kind: ObjectKind,
    value: u32,
}

struct KernelState {
    objects: Vec<Object>,
    names: HashMap<String, usize>,
    time: u64,
    pending: Vec<(usize, u32)>,
    next_cb: usize,
    callbacks: IntMap<SimCallback>,
    timers: BTreeMap<u64, Vec<usize>>,
    edges: HashMap<usize, Vec<usize>>,
    read_write: Option<usize>,
    read_only: Option<usize>,
}

impl KernelState {
    fn new() -> Self {
        KernelState {
            objects: Vec::new(),
            names: HashMap::new(),
            time: 0,
            pending: Vec::new(),
            next_cb: 0,
            callbacks: IntMap::new(),
            timers: BTreeMap::new(),
            edges: HashMap::new(),
            read_write: None,
            read_only: None,
        }
    }

    fn object(&self, handle: usize) -> TbResult<&Object> {
        self.objects.get(handle).ok_or(TbError::InvalidHandle(handle))
    }

    fn is_live(&self, cb: usize) -> bool {
        self.callbacks.get(cb as u64).is_some()
    }

    fn apply_pending(&mut self) -> Vec<(usize, EdgeKind)> {
        let mut changes = Vec::new();
        for (handle, value) in std::mem::take(&mut self.pending) {
            let obj = &mut self.objects[handle];
            let old = obj.value;
            if old == value {
                continue;
            }
            obj.value = value;
            let edge = match (old & 1, value & 1) {
                (0, 1) => EdgeKind::Rising,
                (1, 0) => EdgeKind::Falling,
                _ => EdgeKind::Any,
            };
            changes.push((handle, edge));
        }
        changes
    }

    fn has_edge_waiters(&mut self, handle: usize) -> bool {
        let Some(mut ids) = self.edges.remove(&handle) else {
            return false;
        };
        ids.retain(|id| self.callbacks.get(*id as u64).is_some());
        let live = !ids.is_empty();
        if live {
            self.edges.insert(handle, ids);
        }
        live
    }

    fn take_sync(&mut self, cb: SimCallback) -> bool {
        let slot = match cb {
            SimCallback::ReadWrite => &mut self.read_write,
            _ => &mut self.read_only,
        };
        match slot.take() {
            Some(id) => self.callbacks.remove(id as u64).is_some(),
            None => false,
        }
    }
}

pub struct Kernel {
    precision: i8,
    state: RefCell<KernelState>,
}

impl Kernel {
    fn new(precision: i8) -> Self {
        Kernel {
            precision,
            state: RefCell::new(KernelState::new()),
        }
    }
}

impl SimIf for Kernel {
    fn set_value(&self, handle: usize, value: u32) -> TbResult<()> {
        let mut st = self.state.borrow_mut();
        let obj = st.object(handle)?;
        let width = match obj.kind {
            ObjectKind::Int(width) => width,
            ObjectKind::Hier => return Err(TbError::InvalidHandle(handle)),
        };
        if width < 32 && value >> width != 0 {
            return Err(TbError::ValueTooWide {
                name: obj.name.clone(),
                width,
                value,
            });
        }
        st.pending.push((handle, value));
        Ok(())
    }

    fn get_value(&self, handle: usize) -> TbResult<u32> {
        Ok(self.state.borrow().object(handle)?.value)
    }

    fn get_handle_by_name(&self, name: &str) -> TbResult<usize> {
        self.state
            .borrow()
            .names
            .get(name)
            .copied()
            .ok_or_else(|| TbError::UnknownSignal(name.to_string()))
    }

    fn get_full_name(&self, handle: usize) -> TbResult<String> {
        Ok(self.state.borrow().object(handle)?.name.clone())
    }

    fn get_kind(&self, handle: usize) -> TbResult<ObjectKind> {
        Ok(self.state.borrow().object(handle)?.kind)
    }

    fn get_root_handle(&self) -> TbResult<usize> {
        let st = self.state.borrow();
        st.objects
            .iter()
            .position(|o| o.kind == ObjectKind::Hier && !o.name.contains('.'))
            .ok_or_else(|| TbError::UnknownSignal("<root>".to_string()))
    }

    fn get_sim_time_steps(&self) -> u64 {
        self.state.borrow().time
    }

    fn get_sim_precision(&self) -> i8 {
        self.precision
    }

    fn register_callback(&self, cb: SimCallback) -> TbResult<usize> {
        let mut st = self.state.borrow_mut();
        let id = st.next_cb;
        st.next_cb += 1;
        match cb {
            SimCallback::Time(t) => {
                if t < st.time {
                    return Err(TbError::Failed(format!(
                        "timer callback for past time {} (now {})",
                        t, st.time
                    )));
                }
                st.timers.entry(t).or_default().push(id);
            }
            SimCallback::Edge(handle) => {
                st.object(handle)?;
                st.edges.entry(handle).or_default().push(id);
            }
            SimCallback::ReadWrite => st.read_write = Some(id),
            SimCallback::ReadOnly => st.read_only = Some(id),
        }
        st.callbacks.insert(id as u64, cb);
        Ok(id)
    }

    fn cancel_callback(&self, cb_hdl: usize) -> TbResult<()> {
        let mut st = self.state.borrow_mut();
        match st.callbacks.remove(cb_hdl as u64) {
            // stale ids in timer and edge lists are skipped when due
            Some(_) => Ok(()),
            None => Err(TbError::InvalidHandle(cb_hdl)),
        }
    }

    fn log(&self, msg: &str) {
        log::info!("{} {}", format_ns(self.get_sim_time("ns").unwrap_or_default()), msg);
    }
}

/// Renders a time in ns with thousands separators, e.g. `12,340.000ns`.
pub fn format_ns(t: f64) -> String {
    let fixed = format!("{:.3}", t);
    let (int, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "000"));
    match int.parse::<u64>() {
        Ok(int) => format!("{}.{}ns", int.to_formatted_string(&Locale::en), frac),
        Err(_) => format!("{}ns", fixed),
    }
}

/// How a call to [`Simulator::run_until`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The stop condition became true.
    Done,
    /// Nothing is scheduled anymore.
    Idle,
    /// The next event lies beyond the time limit.
    Limit,
}

/// Owner of a [`Kernel`] and its event loop.
#[derive(Clone)]
pub struct Simulator {
    kernel: Rc<Kernel>,
}

impl Default for Simulator {
    fn default() -> Self {
        Simulator::new(DEFAULT_PRECISION)
    }
}

impl Simulator {
    pub fn new(precision: i8) -> Self {
        Simulator {
            kernel: Rc::new(Kernel::new(precision)),
        }
    }

    /// Adds a scope. Scopes without a dot in their name are roots.
    pub fn add_scope(&self, full_name: &str) -> TbResult<usize> {
        self.add_object(full_name, ObjectKind::Hier)
    }

    pub fn add_signal(&self, full_name: &str, width: u32) -> TbResult<usize> {
        if width == 0 || width > 32 {
            return Err(TbError::Config(format!(
                "signal {} has unsupported width {}",
                full_name, width
            )));
        }
        self.add_object(full_name, ObjectKind::Int(width))
    }

    fn add_object(&self, full_name: &str, kind: ObjectKind) -> TbResult<usize> {
        let mut st = self.kernel.state.borrow_mut();
        if st.names.contains_key(full_name) {
            return Err(TbError::Config(format!("duplicate object {}", full_name)));
        }
        let handle = st.objects.len();
        st.objects.push(Object {
            name: full_name.to_string(),
            kind,
            value: 0,
        });
        st.names.insert(full_name.to_string(), handle);
        Ok(handle)
    }

    /// Routes signals and triggers of this thread to this simulator.
    pub fn install(&self) {
        sim_if::install(self.kernel.clone());
    }

    pub fn uninstall(&self) {
        sim_if::uninstall();
    }

    pub fn time(&self) -> u64 {
        self.kernel.get_sim_time_steps()
    }

    pub fn precision(&self) -> i8 {
        self.kernel.precision
    }

    pub fn sim_if(&self) -> &dyn SimIf {
        &*self.kernel
    }

    /// Evaluates the current time step until nothing changes anymore.
    pub fn settle(&self) {
        loop {
            executor::run_once();
            let changes = self.kernel.state.borrow_mut().apply_pending();
            if !changes.is_empty() {
                for (handle, edge) in changes {
                    let live = self.kernel.state.borrow_mut().has_edge_waiters(handle);
                    if live {
                        trigger::react(SimCallback::Edge(handle), Some(edge));
                    }
                }
                continue;
            }
            if self.kernel.state.borrow_mut().take_sync(SimCallback::ReadWrite) {
                trigger::react(SimCallback::ReadWrite, None);
                continue;
            }
            if self.kernel.state.borrow_mut().take_sync(SimCallback::ReadOnly) {
                trigger::react(SimCallback::ReadOnly, None);
                if !self.kernel.state.borrow().pending.is_empty() {
                    log::warn!("signal written in read-only phase");
                }
                continue;
            }
            break;
        }
    }

    /// Moves to the next scheduled time, if it is not beyond `limit`, and
    /// delivers its timer callback.
    pub fn advance(&self, limit: Option<u64>) -> RunStatus {
        let due = {
            let mut st = self.kernel.state.borrow_mut();
            loop {
                let Some((&t, ids)) = st.timers.first_key_value() else {
                    break None;
                };
                if !ids.iter().any(|id| st.is_live(*id)) {
                    st.timers.remove(&t);
                    continue;
                }
                if limit.is_some_and(|l| t > l) {
                    return RunStatus::Limit;
                }
                let ids = st.timers.remove(&t).unwrap_or_default();
                for id in ids {
                    st.callbacks.remove(id as u64);
                }
                st.time = t;
                break Some(t);
            }
        };
        match due {
            Some(t) => {
                trigger::react(SimCallback::Time(t), None);
                RunStatus::Done
            }
            None => RunStatus::Idle,
        }
    }

    /// Runs until `done` returns true, the schedule runs dry or the next
    /// event would lie beyond `limit` steps.
    pub fn run_until(&self, mut done: impl FnMut() -> bool, limit: Option<u64>) -> RunStatus {
        loop {
            self.settle();
            if done() {
                return RunStatus::Done;
            }
            match self.advance(limit) {
                RunStatus::Done => {}
                status => return status,
            }
        }
    }
}
