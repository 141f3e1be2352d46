//! Working-phase state machines
//!
//! One [`machine::PhaseMachine`] per heater tracks the runtime lifecycle
//! (off → heating → ready → normal → low-power/boost → cooling → cold) and
//! emits actions for the control layer to apply to the unit, the
//! configuration and the display.

pub mod events;
pub mod machine;

pub use events::{BeepKind, PhaseAction, PhaseEvent};
pub use machine::{Phase, PhaseContext, PhaseMachine, UnitSnapshot};
