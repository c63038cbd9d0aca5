use std::collections::VecDeque;

use crate::error::{TbError, TbResult};
use crate::executor::{JoinHandle, Task};
use crate::rstb_obj::RstbObj;
use crate::signal::SimObject;
use crate::sim_if::sim_if;
use crate::tap::Vector;
use crate::trigger::Trigger;
use crate::value::Val;

/*
 * CLOCK
 */
#[allow(unreachable_code)]
pub async fn clock(clk: SimObject, period: u64, start_high: bool) -> TbResult {
    let high_t = period / 2;
    let low_t = period - high_t;
    if period % 2 != 0 {
        sim_if()?.log(&format!(
            "Warning: clock period {} steps not dividable by 2. High time will be {}; low time will be {}.",
            period, high_t, low_t
        ));
    }
    if start_high {
        clk.set(1)?;
        Trigger::timer_steps(high_t).await?;
    }
    loop {
        clk.set(0)?;
        Trigger::timer_steps(low_t).await?;
        clk.set(1)?;
        Trigger::timer_steps(high_t).await?;
    }
    Ok(Val::None)
}

pub async fn clock_cycles(signal: SimObject, n_cycles: u32) -> TbResult {
    for _ in 0..n_cycles {
        signal.rising_edge().await?;
    }
    Ok(Val::None)
}

/*
 * SCOREBOARD
 */
#[derive(Debug)]
pub struct Scoreboard<T: PartialEq> {
    exp_q: VecDeque<T>,
    recv_q: VecDeque<T>,
    errors: u32,
    expected: u32,
    received: u32,
    matched: u32,
}

impl<T: PartialEq> Default for Scoreboard<T> {
    fn default() -> Self {
        Scoreboard {
            exp_q: VecDeque::new(),
            recv_q: VecDeque::new(),
            errors: 0,
            expected: 0,
            received: 0,
            matched: 0,
        }
    }
}

impl<T: PartialEq> Scoreboard<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_exp(&mut self, data: T) {
        self.exp_q.push_back(data);
        self.expected += 1;
        self.compare();
    }

    pub fn add_recv(&mut self, data: T) {
        self.recv_q.push_back(data);
        self.received += 1;
        self.compare();
    }

    fn compare(&mut self) {
        while let (Some(_), Some(_)) = (self.exp_q.front(), self.recv_q.front()) {
            match self.exp_q.pop_front() == self.recv_q.pop_front() {
                true => self.matched += 1,
                false => self.errors += 1,
            }
        }
    }

    pub fn passed(&self) -> bool {
        self.expected > 0
            && self.received == self.expected
            && self.matched == self.received
            && self.errors == 0
            && self.exp_q.is_empty()
            && self.recv_q.is_empty()
    }

    pub fn result_str(&self) -> String {
        format!(
            "expected={}, received={}, matched={}, errors={}, expQ: {}, recvQ: {}",
            self.expected,
            self.received,
            self.matched,
            self.errors,
            self.exp_q.len(),
            self.recv_q.len()
        )
    }

    pub fn result(&self) -> TbResult {
        match self.passed() {
            true => Ok(Val::String(self.result_str())),
            false => Err(TbError::Failed(format!("scoreboard: {}", self.result_str()))),
        }
    }
}

/*
 * MONITOR
 */

/// Input bus as seen by the device on one rising clock edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSample {
    pub time: u64,
    pub rst_n: bool,
    pub ena: bool,
    pub vector: Vector,
}

struct MonitorInner {
    samples: Vec<EdgeSample>,
    // samples after this time are forwarded to the scoreboard
    armed_after: Option<u64>,
    scoreboard: Option<RstbObj<Scoreboard<Vector>>>,
}

/// Records what the device samples on every rising edge.
#[derive(Clone)]
pub struct VectorMonitor(RstbObj<MonitorInner>);

impl Default for VectorMonitor {
    fn default() -> Self {
        VectorMonitor(RstbObj::new(MonitorInner {
            samples: Vec::new(),
            armed_after: None,
            scoreboard: None,
        }))
    }
}

impl VectorMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scoreboard(&self, sb: RstbObj<Scoreboard<Vector>>) {
        self.0.get_mut().scoreboard = Some(sb);
    }

    /// Forwards edges strictly after `time` to the scoreboard.
    pub fn arm(&self, time: u64) {
        self.0.get_mut().armed_after = Some(time);
    }

    pub fn samples(&self) -> Vec<EdgeSample> {
        self.0.get().samples.clone()
    }

    pub fn fork(&self, clk: SimObject, rst_n: SimObject, ena: SimObject, inputs: SimObject) -> JoinHandle {
        Task::spawn_from_future(self.clone().exec(clk, rst_n, ena, inputs), "vector monitor")
    }

    #[allow(unreachable_code)]
    async fn exec(self, clk: SimObject, rst_n: SimObject, ena: SimObject, inputs: SimObject) -> TbResult {
        loop {
            clk.rising_edge().await?;
            // reads happen before anything reacting to this edge is applied
            let sample = EdgeSample {
                time: sim_if()?.get_sim_time_steps(),
                rst_n: rst_n.u32()? != 0,
                ena: ena.u32()? != 0,
                vector: Vector::from_word(inputs.u32()?),
            };
            self.0.with_mut(|m| {
                m.samples.push(sample);
                if let (Some(after), Some(sb)) = (m.armed_after, &m.scoreboard) {
                    if sample.time > after {
                        sb.get_mut().add_recv(sample.vector);
                    }
                }
            });
        }
        Ok(Val::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoreboard_matches_in_order() {
        let mut sb = Scoreboard::new();
        for v in [1, 2, 3] {
            sb.add_exp(v);
        }
        sb.add_recv(1);
        assert!(!sb.passed());
        sb.add_recv(2);
        sb.add_recv(3);
        assert!(sb.passed());
        assert!(sb.result().is_ok());
    }

    #[test]
    fn scoreboard_flags_reordering_and_leftovers() {
        let mut sb = Scoreboard::new();
        sb.add_exp('a');
        sb.add_exp('b');
        sb.add_recv('b');
        sb.add_recv('a');
        assert!(!sb.passed());
        assert_eq!(
            sb.result_str(),
            "expected=2, received=2, matched=0, errors=2, expQ: 0, recvQ: 0"
        );

        let mut short = Scoreboard::new();
        short.add_exp(1);
        short.add_exp(2);
        short.add_recv(1);
        assert!(matches!(short.result(), Err(TbError::Failed(_))));
    }

    #[test]
    fn empty_scoreboard_does_not_pass() {
        let sb: Scoreboard<u8> = Scoreboard::new();
        assert!(!sb.passed());
    }
}
