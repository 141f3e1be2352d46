//! Station configuration
//!
//! The user-settable state of the whole station: one [`ConfigRecord`] plus
//! the PID coefficient sets. [`ConfigStore`] keeps the active record and a
//! spare copy so persistence happens only on real change;
//! [`StationConfig`] composes the store with the tip catalog and thermal
//! model and offers the human-units temperature API.

pub mod manager;
pub mod pid;
pub mod store;
pub mod types;

pub use manager::StationConfig;
pub use pid::{PidParams, PidTable};
pub use store::ConfigStore;
pub use types::{ConfigFlags, ConfigRecord};
