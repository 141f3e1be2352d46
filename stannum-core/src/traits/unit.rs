//! The heater-unit capability set
//!
//! Both concrete units (iron and gun) regulate a raw-unit setpoint from
//! ISR-fed samples and report averaged state to the control loop. Samples
//! go in through `update_*`; `power` produces the next PWM duty. Everything
//! crossing the ISR boundary is a plain scalar.

/// Latched unit fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UnitFault {
    /// Averaged temperature crossed the internal maximum
    OverTemperature,
}

/// One closed-loop heater channel
pub trait UnitController {
    /// Change the setpoint, raw units
    ///
    /// A significant change resets the PID integrator.
    fn set_temp(&mut self, raw: u16);

    /// Active setpoint, raw units
    fn preset_temp(&self) -> u16;

    /// Arm or disarm the output
    ///
    /// Disarming drops the requested duty to zero before the armed flag
    /// clears, so a concurrent pipeline tick never re-reads a stale duty.
    fn switch_power(&mut self, on: bool);

    fn is_on(&self) -> bool;

    /// Open-loop power override (manual calibration, fan-assisted cooling)
    fn fix_power(&mut self, power: u16);

    /// Apply the standby setpoint overlay
    fn low_power_mode(&mut self, raw: u16);

    /// Apply the boost setpoint overlay
    fn boost_power_mode(&mut self, raw: u16);

    /// ISR feed: one current sample
    fn update_current(&mut self, raw: u16);

    /// ISR feed: one temperature sample
    fn update_temp(&mut self, raw: u16);

    /// Compute the next PWM duty from the averaged temperature
    ///
    /// Zero whenever the unit is disarmed, disconnected or tripped.
    fn power(&mut self) -> u16;

    /// Averaged temperature, raw units
    fn average_temp(&self) -> u16;

    /// Averaged applied power, duty units
    fn avg_power(&self) -> u16;

    /// Averaged applied power as a percentage of the unit maximum
    fn avg_power_pcnt(&self) -> u8;

    fn temp_dispersion(&self) -> u32;

    fn pwr_dispersion(&self) -> u32;

    /// Averaged current through the heater (iron) or fan (gun)
    fn unit_current(&self) -> u16;

    /// Current-sense connection check
    fn is_connected(&self) -> bool;

    /// The heater cooled down to the cold threshold
    fn is_cold(&self) -> bool;

    /// Largest duty this unit accepts
    fn max_power(&self) -> u16;

    /// Latched fault, if any
    fn fault(&self) -> Option<UnitFault>;
}
