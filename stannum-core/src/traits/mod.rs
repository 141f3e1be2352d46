//! Hardware-facing traits
//!
//! The interface between the board-agnostic logic and the driver crate.

pub mod unit;

pub use unit::{UnitController, UnitFault};
