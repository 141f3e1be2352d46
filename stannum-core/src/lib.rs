//! Board-agnostic core logic for the soldering station firmware
//!
//! This crate contains all application logic that does not depend on
//! specific hardware implementations:
//!
//! - The device model (three heaters driven by one controller)
//! - RADIX-50 tip names, the tip catalog and the four-point thermal model
//! - Station configuration with an active/spare pair for dirty detection
//! - Persistent record codecs (config, PID sets, per-tip calibration)
//! - The per-heater working-phase state machine
//! - The unit-controller trait implemented by the driver crate

#![no_std]
#![deny(unsafe_code)]

pub mod config;
pub mod device;
pub mod filter;
pub mod persist;
pub mod state;
pub mod tip;
pub mod traits;
pub mod util;
