//! Events into and actions out of the phase machines
//!
//! The machine itself never touches hardware or configuration; every
//! transition returns a short list of actions the control loop applies.

/// Beep patterns of the station
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BeepKind {
    Short,
    Double,
    Low,
    Failed,
}

/// External events a phase machine reacts to
///
/// Time-driven behaviour goes through [`super::machine::PhaseMachine::tick`]
/// instead; setpoint-reached and gone-cold conditions are derived there from
/// the unit snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhaseEvent {
    /// Short press on the heater's encoder
    EncoderShort,
    /// Long press on the heater's encoder
    EncoderLong,
    /// Rotation landed on a new preset, display units
    EncoderRotate(u16),
    /// Arbitration switch level: JBC stand off-hook or gun off-cradle
    SwitchChange(bool),
    /// JBC tip sits on the change connector
    TipChange,
    /// The unit reports its heater missing
    NotConnected,
    /// Averaged temperature crossed the internal maximum
    SafetyTrip,
}

/// What the control loop must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhaseAction {
    /// Set the configured preset on the unit and arm it
    Arm,
    /// Disarm the unit (PWM drops before the flag, see the pipeline)
    Disarm,
    /// Apply the standby setpoint overlay
    SetLowPower,
    /// Apply the boost setpoint overlay
    SetBoost { temp_human: u16 },
    /// Store a new preset in the in-RAM configuration
    UpdatePreset { temp_human: u16 },
    /// Flush the configuration to flash
    SaveConfig,
    Beep(BeepKind),
    /// The phase changed; publish it to the display
    ShowPhase,
    /// Publish a preset temperature, display units
    ShowPreset { temp_human: u16 },
    /// Publish the remaining seconds before auto-off
    ShowCountdown { seconds: u32 },
    /// Hand control to the tip-selection mode
    TipSelect,
}
