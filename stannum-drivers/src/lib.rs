//! Control-loop implementations for the soldering station
//!
//! Everything here is still board-agnostic but concrete: the PID regulator
//! and relay autotuner, the iron and gun unit controllers, the acquisition
//! and power pipeline, the ambient-temperature conversion, switch
//! debouncing and the buzzer sequencer. The firmware crate wires these to
//! the actual peripherals.

#![no_std]
#![deny(unsafe_code)]

pub mod buzzer;
pub mod heater;
pub mod input;
pub mod power;
pub mod sensor;
pub mod unit;
