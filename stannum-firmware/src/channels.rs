//! Inter-task communication
//!
//! Static embassy-sync primitives shared between tasks. Only scalars,
//! events and display messages cross task boundaries; the unit controllers
//! themselves live in one shared block locked for short critical sections
//! from both the sampling loop and the control loop.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use stannum_core::state::BeepKind;
use stannum_drivers::power::PowerPipeline;
use stannum_drivers::sensor::AmbientSensor;
use stannum_drivers::unit::{GunUnit, IronUnit};
use stannum_protocol::{InputEvent, StationMessage};

/// The sampling/regulation state shared with the control loop
pub struct PowerBlock {
    pub iron: IronUnit,
    pub gun: GunUnit,
    pub pipeline: PowerPipeline,
    pub ambient: AmbientSensor,
}

/// Installed once in `main` before the tasks start
pub static POWER: Mutex<CriticalSectionRawMutex, RefCell<Option<PowerBlock>>> =
    Mutex::new(RefCell::new(None));

/// Borrow the power block for a short critical section
pub fn with_power<R>(f: impl FnOnce(&mut PowerBlock) -> R) -> Option<R> {
    POWER.lock(|cell| cell.borrow_mut().as_mut().map(f))
}

/// Encoder events decoded from the display link
pub static INPUT_EVENTS: Channel<CriticalSectionRawMutex, InputEvent, 8> = Channel::new();

/// Messages queued for the display link
pub static DISPLAY_MESSAGES: Channel<CriticalSectionRawMutex, StationMessage, 16> = Channel::new();

/// Beep requests for the buzzer task
pub static BEEPS: Channel<CriticalSectionRawMutex, BeepKind, 4> = Channel::new();

/// Debounced switch events from the 100 ms poll
#[derive(Debug, Clone, Copy, defmt::Format)]
pub enum SwitchEvent {
    /// T12 tilt/reed input: debounced level plus whether it just changed
    Tilt { level: bool, edge: bool },
    /// JBC stand: true when the handle is off-hook
    JbcStand { offhook: bool },
    /// JBC tip-change connector
    JbcChange { active: bool },
    /// Gun cradle reed: true when the gun is off the cradle
    GunReed { offcradle: bool },
}

pub static SWITCH_EVENTS: Channel<CriticalSectionRawMutex, SwitchEvent, 8> = Channel::new();
