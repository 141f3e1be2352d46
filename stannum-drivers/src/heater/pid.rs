//! Discrete PID regulator
//!
//! One instance per heater. The integrator is clamped to the output range
//! and reset when the setpoint moves by more than a small delta; swapping
//! coefficients keeps the accumulated state, so a live tuning session never
//! produces a zero-output sample.

use stannum_core::config::PidParams;

use super::fixed::Fixed32;

/// Setpoint move that resets the integrator, raw units
const RESET_DELTA: i32 = 20;

/// Discrete PID with anti-windup
pub struct Pid {
    kp: Fixed32,
    ki: Fixed32,
    kd: Fixed32,
    integral: Fixed32,
    prev_error: i32,
    setpoint: u16,
    max_output: u16,
}

impl Pid {
    pub fn new(params: PidParams, max_output: u16) -> Self {
        Self {
            kp: Fixed32::from_scaled_100(params.kp as i32),
            ki: Fixed32::from_scaled_100(params.ki as i32),
            kd: Fixed32::from_scaled_100(params.kd as i32),
            integral: Fixed32::ZERO,
            prev_error: 0,
            setpoint: 0,
            max_output,
        }
    }

    /// Swap coefficients without touching the accumulated state
    pub fn load(&mut self, params: PidParams) {
        self.kp = Fixed32::from_scaled_100(params.kp as i32);
        self.ki = Fixed32::from_scaled_100(params.ki as i32);
        self.kd = Fixed32::from_scaled_100(params.kd as i32);
    }

    /// Current coefficients in the stored hundredths format
    pub fn dump(&self) -> PidParams {
        PidParams {
            kp: self.kp.to_scaled_100().clamp(0, u16::MAX as i32) as u16,
            ki: self.ki.to_scaled_100().clamp(0, u16::MAX as i32) as u16,
            kd: self.kd.to_scaled_100().clamp(0, u16::MAX as i32) as u16,
        }
    }

    /// Change the setpoint, raw units
    pub fn set_target(&mut self, raw: u16) {
        if (raw as i32 - self.setpoint as i32).abs() > RESET_DELTA {
            self.reset();
        }
        self.setpoint = raw;
    }

    pub fn target(&self) -> u16 {
        self.setpoint
    }

    /// Drop the accumulated state
    pub fn reset(&mut self) {
        self.integral = Fixed32::ZERO;
        self.prev_error = 0;
    }

    /// One regulation step; returns the duty, saturated to the output range
    pub fn compute(&mut self, temp: i32) -> u16 {
        let error = self.setpoint as i32 - temp;
        let error_fp = Fixed32::from_int(error.clamp(i16::MIN as i32, i16::MAX as i32) as i16);

        let p_term = self.kp.mul(error_fp);

        self.integral = self.integral.saturating_add(self.ki.mul(error_fp));
        let limit = Fixed32::from_int(self.max_output as i16);
        self.integral = self.integral.clamp(-limit, limit);

        let d_error = error - self.prev_error;
        let d_term = self
            .kd
            .mul(Fixed32::from_int(d_error.clamp(i16::MIN as i32, i16::MAX as i32) as i16));
        self.prev_error = error;

        let output = p_term
            .saturating_add(self.integral)
            .saturating_add(d_term)
            .to_int();
        output.clamp(0, self.max_output as i32) as u16
    }
}
