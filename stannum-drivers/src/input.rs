//! Switch debouncing
//!
//! The TILT, REED, STBY and CHANGE inputs are polled every 100 ms and fed
//! through a short moving average with hysteresis thresholds, so contact
//! chatter never reaches the phase machines. Level and edge are read
//! separately: the T12 idle detection wants edges from a tilt sensor but a
//! level from a reed stand.

use stannum_core::filter::Ema;

/// Average level above which the switch turns on, percent
const ON_LEVEL: i32 = 60;
/// Average level below which the switch turns off, percent
const OFF_LEVEL: i32 = 40;

/// One debounced switch input
pub struct Debounced {
    avg: Ema,
    state: bool,
    edge: bool,
}

impl Debounced {
    /// `len` samples of history; at the 100 ms poll rate a length of 4
    /// settles in under half a second
    pub fn new(len: i32) -> Self {
        Self {
            avg: Ema::new(len),
            state: false,
            edge: false,
        }
    }

    /// Start from a known level (sampled once at boot)
    pub fn reset(&mut self, on: bool) {
        self.avg.reset(if on { 100 } else { 0 });
        self.state = on;
        self.edge = false;
    }

    /// Feed one poll; returns the debounced level
    pub fn update(&mut self, raw_on: bool) -> bool {
        let level = self.avg.update(if raw_on { 100 } else { 0 });
        if !self.state && level >= ON_LEVEL {
            self.state = true;
            self.edge = true;
        } else if self.state && level <= OFF_LEVEL {
            self.state = false;
            self.edge = true;
        }
        self.state
    }

    /// Debounced level
    pub fn status(&self) -> bool {
        self.state
    }

    /// True once per state change
    pub fn take_edge(&mut self) -> bool {
        core::mem::take(&mut self.edge)
    }

    /// Idle-switch activity: a reed stand reports its level, a tilt sensor
    /// reports motion (edges)
    pub fn activity(&mut self, reed_mode: bool) -> bool {
        if reed_mode {
            self.status()
        } else {
            self.take_edge()
        }
    }
}
