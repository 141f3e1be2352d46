//! Temperature regulation
//!
//! A discrete PID regulator on Q16.16 fixed point, and the relay-oscillation
//! autotuner that derives its coefficients.

pub mod autotune;
pub mod fixed;
pub mod pid;

pub use autotune::{RelayTuner, TuneError, TuneState};
pub use fixed::Fixed32;
pub use pid::Pid;
