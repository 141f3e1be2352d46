//! Relay-oscillation PID autotune
//!
//! The unit is driven open-loop between `base_power + delta` and
//! `base_power - delta`, switching whenever the temperature crosses
//! `setpoint ± hysteresis`. Completed oscillation loops give the ultimate
//! period; the oscillation amplitude gives the ultimate gain
//! `Ku = 4·d / (π·√(A² − ε²))`, and classic Ziegler–Nichols rules turn both
//! into fresh PID coefficients. A tune whose amplitude does not clear the
//! hysteresis is rejected.
//!
//! The caller stabilises the process at `base_power` first and then feeds
//! every temperature sample through [`RelayTuner::update`], applying the
//! returned power.

use stannum_core::config::PidParams;
use stannum_core::filter::Ema;
use stannum_core::util::isqrt;

/// Give up after this many samples without convergence
const MAX_TICKS: u32 = 100_000;
/// Loops needed when the period has settled
const MIN_LOOPS: u16 = 16;
/// Loops after which the result is taken regardless
const MAX_LOOPS: u16 = 24;
/// Consecutive stable periods that count as settled
const STABLE_LOOPS: u16 = 4;

/// Tuner lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TuneState {
    /// Oscillating and collecting loops
    Cycling,
    /// Coefficients ready
    Complete,
    Failed(TuneError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TuneError {
    /// Oscillation amplitude did not clear the hysteresis
    NoOscillation,
    /// Never collected enough loops
    Timeout,
}

/// Åström–Hägglund relay tuner
pub struct RelayTuner {
    base_power: u16,
    delta_power: u16,
    setpoint: i32,
    hysteresis: i32,
    power_high: bool,
    state: TuneState,
    tick: u32,
    last_high_tick: u32,
    last_period: u32,
    period: Ema,
    loops: u16,
    stable_loops: u16,
    cur_max: i32,
    cur_min: i32,
    osc_max: i32,
    osc_min: i32,
    result: Option<PidParams>,
}

impl RelayTuner {
    /// Start the relay around an already-stabilised operating point
    pub fn new(base_power: u16, delta_power: u16, setpoint: u16, hysteresis: u16) -> Self {
        Self {
            base_power,
            delta_power,
            setpoint: setpoint as i32,
            hysteresis: hysteresis.max(1) as i32,
            power_high: true,
            state: TuneState::Cycling,
            tick: 0,
            last_high_tick: 0,
            last_period: 0,
            period: Ema::new(4),
            loops: 0,
            stable_loops: 0,
            cur_max: i32::MIN,
            cur_min: i32::MAX,
            osc_max: 0,
            osc_min: 0,
            result: None,
        }
    }

    pub fn state(&self) -> TuneState {
        self.state
    }

    /// Completed oscillation loops so far
    pub fn loops(&self) -> u16 {
        self.loops
    }

    /// Averaged loop period in samples
    pub fn period_ticks(&self) -> u32 {
        self.period.read().max(0) as u32
    }

    pub fn result(&self) -> Option<PidParams> {
        self.result
    }

    /// Feed one temperature sample, get the power to apply
    pub fn update(&mut self, temp: i32) -> u16 {
        if self.state != TuneState::Cycling {
            return self.base_power;
        }
        self.tick += 1;
        if self.tick >= MAX_TICKS {
            self.state = TuneState::Failed(TuneError::Timeout);
            return self.base_power;
        }
        self.cur_max = self.cur_max.max(temp);
        self.cur_min = self.cur_min.min(temp);

        if self.power_high && temp >= self.setpoint + self.hysteresis {
            self.power_high = false;
        } else if !self.power_high && temp <= self.setpoint - self.hysteresis {
            self.power_high = true;
            self.complete_loop(temp);
        }

        if self.power_high {
            self.base_power.saturating_add(self.delta_power)
        } else {
            self.base_power.saturating_sub(self.delta_power)
        }
    }

    /// A full oscillation ends at each switch back to high power
    fn complete_loop(&mut self, temp: i32) {
        if self.last_high_tick > 0 {
            let period = self.tick - self.last_high_tick;
            self.loops += 1;
            self.osc_max = self.cur_max;
            self.osc_min = self.cur_min;
            self.cur_max = temp;
            self.cur_min = temp;

            if self.last_period > 0
                && (period as i32 - self.last_period as i32).unsigned_abs()
                    <= self.last_period / 8
            {
                self.stable_loops += 1;
            } else {
                self.stable_loops = 0;
            }
            self.period.update(period as i32);
            self.last_period = period;

            if self.loops >= MAX_LOOPS
                || (self.loops >= MIN_LOOPS && self.stable_loops >= STABLE_LOOPS)
            {
                self.finish();
            }
        }
        self.last_high_tick = self.tick;
    }

    fn finish(&mut self) {
        let amplitude = (self.osc_max - self.osc_min + 1) / 2;
        let diff = amplitude * amplitude - self.hysteresis * self.hysteresis;
        if diff <= 0 {
            self.state = TuneState::Failed(TuneError::NoOscillation);
            return;
        }

        // Ku = 4·d / (π·√(A² − ε²)), carried as hundredths
        let sqrt_diff = isqrt(diff as u32).max(1) as i64;
        let ku_x100 = (4 * self.delta_power as i64 * 10_000) / (314 * sqrt_diff);
        let tu = self.period_ticks().max(1) as i64;

        // Ziegler–Nichols classic: Kp = 0.6·Ku, Ki = 1.2·Ku/Tu,
        // Kd = 0.075·Ku·Tu
        let kp_x100 = (60 * ku_x100) / 100;
        let ki_x100 = (120 * ku_x100) / (100 * tu);
        let kd_x100 = (75 * ku_x100 * tu) / 10_000;

        self.result = Some(PidParams {
            kp: kp_x100.clamp(0, u16::MAX as i64) as u16,
            ki: ki_x100.clamp(0, u16::MAX as i64) as u16,
            kd: kd_x100.clamp(0, u16::MAX as i64) as u16,
        });
        self.state = TuneState::Complete;
    }
}
