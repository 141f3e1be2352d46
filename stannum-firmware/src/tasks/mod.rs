//! Embassy tasks of the station

pub mod buzzer;
pub mod control;
pub mod power;
pub mod switches;
