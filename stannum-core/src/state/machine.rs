//! The per-heater phase machine
//!
//! All heater behaviour is a function of the current phase, an event or the
//! periodic tick, and the configuration snapshot handed in by the control
//! loop. The machine mutates nothing outside itself; it returns the actions
//! to apply.
//!
//! The three heaters share one transition table with device-specific
//! arbitration: the T12 is driven by its encoder and the tilt switch, the
//! JBC by its stand, the gun by the cradle reed switch.

use heapless::Vec;

use super::events::{BeepKind, PhaseAction, PhaseEvent};
use crate::device::Device;
use crate::filter::Ema;

/// Raw proximity to the setpoint that counts as "reached"
const READY_TEMP_DELTA: i32 = 6;
/// Temperature dispersion ceiling for "reached"
const READY_TEMP_DISPERSION: u32 = 500;
/// How long the Ready phase lingers before Normal, ms
const READY_HOLD_MS: u32 = 2000;
/// How long the Cold phase lingers before Off, ms
const COLD_HOLD_MS: u32 = 20_000;
/// Applied-power divergence from the idle estimate that means "in use"
const IDLE_POWER_DELTA: i32 = 150;
/// Countdown is published during the last this-many seconds
const COUNTDOWN_WINDOW_S: u32 = 100;

/// Actions produced by one event or tick
pub type Actions = Vec<PhaseAction, 8>;

/// Runtime phase of one heater
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Off,
    Heating,
    Ready,
    Normal,
    Boost,
    LowPwr,
    GoingOff,
    Cooling,
    Cold,
}

impl Phase {
    /// Off, cooling or cold: a short press arms the heater
    pub fn is_cold_side(self) -> bool {
        matches!(self, Phase::Off | Phase::Cooling | Phase::Cold)
    }

    /// Actively regulating towards a setpoint
    pub fn is_working(self) -> bool {
        matches!(self, Phase::Heating | Phase::Ready | Phase::Normal | Phase::Boost)
    }
}

/// Averaged unit state sampled by the control loop
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitSnapshot {
    /// Averaged temperature, raw units
    pub average_temp: u16,
    /// Active setpoint, raw units
    pub preset_temp: u16,
    /// Averaged applied power
    pub avg_power: u16,
    pub temp_dispersion: u32,
    pub pwr_dispersion: u32,
    /// The heater cooled down to the cold threshold
    pub cold: bool,
    /// Debounced tilt/reed activity since the last tick (T12 idle switch)
    pub tilt_active: bool,
}

impl UnitSnapshot {
    fn reached_setpoint(&self) -> bool {
        let delta = (self.preset_temp as i32 - self.average_temp as i32).abs();
        delta < READY_TEMP_DELTA
            && self.temp_dispersion <= READY_TEMP_DISPERSION
            && self.avg_power > 0
    }
}

/// Configuration snapshot for one heater
#[derive(Debug, Clone, Copy)]
pub struct PhaseContext {
    /// Configured preset, display units
    pub preset_human: u16,
    /// Standby temperature (already bounded below the preset), display units
    pub standby_human: u16,
    /// Standby feature enabled (low temperature configured)
    pub standby_enabled: bool,
    /// T12 tilt delay, 5-second units
    pub low_to: u8,
    /// Auto-off timeout, minutes; 0 means immediate switch-off
    pub off_timeout_min: u8,
    /// Boost increment, Celsius
    pub boost_temp: u8,
    /// Boost duration, seconds
    pub boost_duration_s: u16,
    /// T12 handle (with its ambient sensor) is plugged in
    pub handle_present: bool,
    /// Display units are Celsius
    pub is_celsius: bool,
}

impl Default for PhaseContext {
    fn default() -> Self {
        Self {
            preset_human: 235,
            standby_human: 180,
            standby_enabled: true,
            low_to: 5,
            off_timeout_min: 5,
            boost_temp: 25,
            boost_duration_s: 20,
            handle_present: true,
            is_celsius: true,
        }
    }
}

impl PhaseContext {
    /// Boost target in display units
    fn boost_human(&self) -> u16 {
        let mut delta = self.boost_temp as u16;
        if !self.is_celsius {
            delta = (delta * 9 + 3) / 5;
        }
        self.preset_human + delta
    }
}

/// The phase machine of one heater
pub struct PhaseMachine {
    device: Device,
    phase: Phase,
    /// Deadline for time-driven transitions; 0 when none is pending
    phase_end: u32,
    /// T12 tilt-idle deadline
    lowpower_at: u32,
    /// Software auto-off deadline
    swoff_at: u32,
    /// Applied-power estimate while the iron rests in the stand
    idle_power: Ema,
    /// Latched by a safety trip; only a power cycle clears it
    fatal: bool,
}

impl PhaseMachine {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            phase: Phase::Off,
            phase_end: 0,
            lowpower_at: 0,
            swoff_at: 0,
            idle_power: Ema::new(30),
            fatal: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Arm at power-on when the auto-start flag is set (T12 only)
    pub fn power_on_start(&mut self, ctx: &PhaseContext) -> Actions {
        let mut actions = Actions::new();
        if self.device == Device::T12 && ctx.handle_present && !self.fatal {
            self.arm(&mut actions);
        }
        actions
    }

    /// Apply one external event
    pub fn on_event(&mut self, event: PhaseEvent, ctx: &PhaseContext, now: u32) -> Actions {
        let mut actions = Actions::new();
        match event {
            PhaseEvent::EncoderShort => self.encoder_short(ctx, &mut actions),
            PhaseEvent::EncoderLong => self.encoder_long(ctx, now, &mut actions),
            PhaseEvent::EncoderRotate(human) => self.encoder_rotate(human, &mut actions),
            PhaseEvent::SwitchChange(level) => self.switch_change(level, ctx, now, &mut actions),
            PhaseEvent::TipChange => {
                if self.device == Device::Jbc {
                    let _ = actions.push(PhaseAction::TipSelect);
                }
            }
            PhaseEvent::NotConnected => self.not_connected(&mut actions),
            PhaseEvent::SafetyTrip => self.safety_trip(now, &mut actions),
        }
        actions
    }

    /// Advance time-driven behaviour; call at the control-loop cadence
    pub fn tick(&mut self, ctx: &PhaseContext, snap: &UnitSnapshot, now: u32) -> Actions {
        let mut actions = Actions::new();
        match self.phase {
            Phase::Heating => {
                if snap.reached_setpoint() {
                    self.set_phase(Phase::Ready, &mut actions);
                    self.phase_end = now + READY_HOLD_MS;
                    let _ = actions.push(PhaseAction::Beep(BeepKind::Short));
                }
            }
            Phase::Ready => {
                if self.deadline_hit(now) {
                    self.set_phase(Phase::Normal, &mut actions);
                    // The idle clock starts when regulation settles
                    self.lowpower_at = now + ctx.low_to as u32 * 5000;
                    self.swoff_at = 0;
                }
            }
            Phase::Normal => self.normal_tick(ctx, snap, now, &mut actions),
            Phase::Boost => {
                if self.deadline_hit(now) {
                    let _ = actions.push(PhaseAction::Beep(BeepKind::Low));
                    self.arm_with_preset(ctx, &mut actions);
                }
            }
            Phase::LowPwr => {
                if self.device == Device::T12 && snap.tilt_active {
                    self.lowpower_at = 0;
                    self.arm_with_preset(ctx, &mut actions);
                } else if self.deadline_hit(now) {
                    self.switch_off(&mut actions);
                }
            }
            Phase::GoingOff => {
                if self.deadline_hit(now) {
                    self.switch_off(&mut actions);
                }
            }
            Phase::Cooling => {
                if snap.cold {
                    self.set_phase(Phase::Cold, &mut actions);
                    self.phase_end = now + COLD_HOLD_MS;
                    let _ = actions.push(PhaseAction::Beep(BeepKind::Low));
                }
            }
            Phase::Cold => {
                if self.deadline_hit(now) {
                    self.set_phase(Phase::Off, &mut actions);
                }
            }
            Phase::Off => {}
        }
        actions
    }

    fn normal_tick(
        &mut self,
        ctx: &PhaseContext,
        snap: &UnitSnapshot,
        now: u32,
        actions: &mut Actions,
    ) {
        if self.device != Device::T12 {
            // JBC and gun idle handling is switch-driven
            return;
        }
        if ctx.standby_enabled {
            // Hardware idle detection through the tilt/reed switch
            if snap.tilt_active || self.lowpower_at == 0 {
                self.lowpower_at = now + ctx.low_to as u32 * 5000;
            }
            if now >= self.lowpower_at {
                self.set_phase(Phase::LowPwr, actions);
                self.phase_end = now + ctx.off_timeout_min as u32 * 60_000;
                let _ = actions.push(PhaseAction::SetLowPower);
                let _ = actions.push(PhaseAction::ShowPreset {
                    temp_human: ctx.standby_human,
                });
            }
        } else if ctx.off_timeout_min > 0 {
            self.software_timeout(ctx, snap, now, actions);
        }
    }

    /// Applied-power analysis: an iron that is being used draws visibly
    /// more (or less) power than it does resting in the stand
    fn software_timeout(
        &mut self,
        ctx: &PhaseContext,
        snap: &UnitSnapshot,
        now: u32,
        actions: &mut Actions,
    ) {
        let temp = snap.average_temp as i32;
        let set = snap.preset_temp as i32;
        let applied = snap.avg_power as i32;
        let idle = if temp <= set
            && set - temp <= 4
            && snap.temp_dispersion <= 200
            && snap.pwr_dispersion <= 25
        {
            self.idle_power.update(applied)
        } else {
            self.idle_power.read()
        };

        if (applied - idle).abs() >= IDLE_POWER_DELTA {
            // The iron is in use
            self.swoff_at = now + ctx.off_timeout_min as u32 * 60_000;
            return;
        }
        if self.swoff_at == 0 {
            self.swoff_at = now + ctx.off_timeout_min as u32 * 60_000;
        }
        if now >= self.swoff_at {
            self.swoff_at = 0;
            self.set_phase(Phase::GoingOff, actions);
            self.phase_end = now;
        } else {
            let seconds = (self.swoff_at - now) / 1000;
            if seconds < COUNTDOWN_WINDOW_S {
                let _ = actions.push(PhaseAction::ShowCountdown { seconds });
            }
        }
    }

    fn encoder_short(&mut self, ctx: &PhaseContext, actions: &mut Actions) {
        match self.device {
            Device::T12 => {
                if self.phase.is_cold_side() {
                    if !self.check_can_arm(ctx, actions) {
                        return;
                    }
                    self.arm(actions);
                } else {
                    self.switch_off(actions);
                    let _ = actions.push(PhaseAction::ShowPreset {
                        temp_human: ctx.preset_human,
                    });
                }
            }
            // Stand-driven heaters: a short press only ends standby early
            Device::Jbc | Device::Gun => {
                if self.phase == Phase::LowPwr {
                    self.switch_off(actions);
                    let _ = actions.push(PhaseAction::ShowPreset {
                        temp_human: ctx.preset_human,
                    });
                }
            }
        }
    }

    fn encoder_long(&mut self, ctx: &PhaseContext, now: u32, actions: &mut Actions) {
        if self.device != Device::T12 {
            return;
        }
        match self.phase {
            Phase::Off | Phase::Cold | Phase::Cooling => {
                if !self.check_can_arm(ctx, actions) {
                    return;
                }
                let _ = actions.push(PhaseAction::Beep(BeepKind::Short));
                self.arm(actions);
            }
            Phase::Boost => {
                // Leave boost early
                self.arm_with_preset(ctx, actions);
                let _ = actions.push(PhaseAction::Beep(BeepKind::Short));
            }
            _ => {
                if ctx.boost_temp > 0 && ctx.boost_duration_s > 0 {
                    let temp_human = ctx.boost_human();
                    self.set_phase(Phase::Boost, actions);
                    self.phase_end = now + ctx.boost_duration_s as u32 * 1000;
                    let _ = actions.push(PhaseAction::SetBoost { temp_human });
                    let _ = actions.push(PhaseAction::ShowPreset { temp_human });
                    let _ = actions.push(PhaseAction::Beep(BeepKind::Short));
                }
            }
        }
    }

    fn encoder_rotate(&mut self, human: u16, actions: &mut Actions) {
        match self.phase {
            Phase::Boost => {}
            Phase::Off | Phase::Cold | Phase::Cooling => {
                // Update the stored preset without arming
                let _ = actions.push(PhaseAction::UpdatePreset { temp_human: human });
                let _ = actions.push(PhaseAction::ShowPreset { temp_human: human });
            }
            Phase::LowPwr | Phase::GoingOff => {
                if self.device == Device::Gun {
                    return;
                }
                // Any rotation wakes the iron up without changing the preset
                self.lowpower_at = 0;
                let _ = actions.push(PhaseAction::Arm);
                self.set_phase(Phase::Heating, actions);
            }
            Phase::Heating | Phase::Ready | Phase::Normal => {
                let _ = actions.push(PhaseAction::UpdatePreset { temp_human: human });
                let _ = actions.push(PhaseAction::Arm);
                self.set_phase(Phase::Heating, actions);
            }
        }
    }

    fn switch_change(
        &mut self,
        level: bool,
        ctx: &PhaseContext,
        now: u32,
        actions: &mut Actions,
    ) {
        match self.device {
            Device::T12 => {} // tilt activity arrives through the snapshot
            Device::Jbc | Device::Gun => {
                if level {
                    // Off-hook / off-cradle: run
                    match self.phase {
                        Phase::Off | Phase::Cooling | Phase::Cold => self.arm(actions),
                        Phase::LowPwr => self.arm_with_preset(ctx, actions),
                        _ => {}
                    }
                } else if self.phase.is_working() {
                    // On-hook / on-cradle: standby or off
                    if ctx.off_timeout_min > 0 {
                        self.set_phase(Phase::LowPwr, actions);
                        self.phase_end = now + ctx.off_timeout_min as u32 * 60_000;
                        let _ = actions.push(PhaseAction::SetLowPower);
                        let _ = actions.push(PhaseAction::ShowPreset {
                            temp_human: ctx.standby_human,
                        });
                        let _ = actions.push(PhaseAction::SaveConfig);
                    } else {
                        self.switch_off(actions);
                    }
                }
            }
        }
    }

    fn not_connected(&mut self, actions: &mut Actions) {
        let _ = actions.push(PhaseAction::Disarm);
        match self.device {
            Device::T12 => self.set_phase(Phase::Off, actions),
            Device::Jbc | Device::Gun => self.set_phase(Phase::Cooling, actions),
        }
        self.phase_end = 0;
    }

    fn safety_trip(&mut self, _now: u32, actions: &mut Actions) {
        self.fatal = true;
        let _ = actions.push(PhaseAction::Disarm);
        self.set_phase(Phase::Cooling, actions);
        let _ = actions.push(PhaseAction::Beep(BeepKind::Short));
        let _ = actions.push(PhaseAction::Beep(BeepKind::Low));
    }

    /// A trip latches until power-cycle; arming is refused afterwards
    fn check_can_arm(&self, ctx: &PhaseContext, actions: &mut Actions) -> bool {
        if self.fatal || (self.device == Device::T12 && !ctx.handle_present) {
            let _ = actions.push(PhaseAction::Beep(BeepKind::Failed));
            return false;
        }
        true
    }

    fn arm(&mut self, actions: &mut Actions) {
        let _ = actions.push(PhaseAction::Arm);
        self.set_phase(Phase::Heating, actions);
        self.phase_end = 0;
    }

    /// Re-arm and republish the configured preset (return from an overlay)
    fn arm_with_preset(&mut self, ctx: &PhaseContext, actions: &mut Actions) {
        let _ = actions.push(PhaseAction::Arm);
        self.set_phase(Phase::Heating, actions);
        self.phase_end = 0;
        let _ = actions.push(PhaseAction::ShowPreset {
            temp_human: ctx.preset_human,
        });
    }

    fn switch_off(&mut self, actions: &mut Actions) {
        let _ = actions.push(PhaseAction::Disarm);
        self.set_phase(Phase::Cooling, actions);
        self.phase_end = 0;
        let _ = actions.push(PhaseAction::SaveConfig);
    }

    fn set_phase(&mut self, phase: Phase, actions: &mut Actions) {
        if self.phase != phase {
            self.phase = phase;
            let _ = actions.push(PhaseAction::ShowPhase);
        }
    }

    fn deadline_hit(&mut self, now: u32) -> bool {
        if self.phase_end > 0 && now >= self.phase_end {
            self.phase_end = 0;
            true
        } else {
            false
        }
    }
}
