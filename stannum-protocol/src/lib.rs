//! Display-link protocol
//!
//! The display is a separate MCU on a UART and acts as a dumb terminal:
//! it renders what the station publishes and sends raw encoder events
//! back. Messages ride a small binary frame:
//!
//! ```text
//! ┌──────┬────────┬──────┬───────────┬──────────┐
//! │ SYNC │ LENGTH │ TYPE │ PAYLOAD   │ CHECKSUM │
//! │ 1B   │ 1B     │ 1B   │ 0–24B     │ 1B       │
//! └──────┴────────┴──────┴───────────┴──────────┘
//! ```

#![no_std]
#![deny(unsafe_code)]

pub mod events;
pub mod frame;
pub mod messages;

pub use events::InputEvent;
pub use frame::{Frame, FrameError, FrameParser, FRAME_SYNC, MAX_PAYLOAD};
pub use messages::{DisplayArea, StationMessage};
