use crate::error::{TbError, TbResult};
use crate::sim_if::{sim_if, ObjectKind};
use crate::trigger::Trigger;

/// Handle to an object (signal or scope) of the running simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimObject {
    handle: usize,
    kind: ObjectKind,
}

impl SimObject {
    pub fn handle(&self) -> usize {
        self.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn name(&self) -> TbResult<String> {
        sim_if()?.get_full_name(self.handle)
    }

    /// Bit width, zero for scopes.
    pub fn size(&self) -> u32 {
        match self.kind {
            ObjectKind::Int(size) => size,
            ObjectKind::Hier => 0,
        }
    }

    pub fn has_value(&self) -> bool {
        matches!(self.kind, ObjectKind::Int(_))
    }

    pub fn from_handle(handle: usize) -> TbResult<Self> {
        let kind = sim_if()?.get_kind(handle)?;
        Ok(SimObject { handle, kind })
    }

    pub fn from_name(full_name: &str) -> TbResult<Self> {
        let handle = sim_if()?.get_handle_by_name(full_name)?;
        SimObject::from_handle(handle)
    }

    pub fn get_root() -> TbResult<Self> {
        SimObject::from_handle(sim_if()?.get_root_handle()?)
    }

    pub fn get_child(&self, name: &str) -> TbResult<Self> {
        let mut child_name = self.name()?;
        child_name.push('.');
        child_name.push_str(name);
        SimObject::from_name(&child_name)
    }

    /// Short for `get_child`.
    pub fn c(&self, name: &str) -> TbResult<Self> {
        self.get_child(name)
    }

    pub fn u32(&self) -> TbResult<u32> {
        self.check_value()?;
        sim_if()?.get_value(self.handle)
    }

    pub fn bin(&self) -> TbResult<String> {
        let val = self.u32()?;
        Ok(format!("{:0width$b}", val, width = self.size() as usize))
    }

    /// Schedules a write, visible once the current evaluation round is over.
    pub fn set(&self, val: u32) -> TbResult<()> {
        self.check_value()?;
        sim_if()?.set_value(self.handle, val)
    }

    fn check_value(&self) -> TbResult<()> {
        if self.has_value() {
            Ok(())
        } else {
            Err(TbError::Failed(format!(
                "object {} has no value",
                self.name().unwrap_or_else(|_| self.handle.to_string())
            )))
        }
    }

    // convenience functions to get edge triggers for this signal
    pub fn rising_edge(self) -> Trigger {
        Trigger::rising_edge(self)
    }

    pub async fn rising_edge_rw(self) -> TbResult<()> {
        self.rising_edge().await?;
        Trigger::read_write().await
    }

    pub async fn rising_edge_ro(self) -> TbResult<()> {
        self.rising_edge().await?;
        Trigger::read_only().await
    }

    pub fn falling_edge(self) -> Trigger {
        Trigger::falling_edge(self)
    }

    pub fn edge(self) -> Trigger {
        Trigger::edge(self)
    }
}
