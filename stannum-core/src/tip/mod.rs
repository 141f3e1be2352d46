//! Tip identity and thermal model
//!
//! A tip is named by a packed RADIX-50 word, listed in the catalog built at
//! boot, and (optionally) carries a persisted four-point thermal curve.

pub mod calibration;
pub mod catalog;
pub mod radix;

pub use calibration::{TempModel, TipCurve};
pub use catalog::{TipCatalog, TipEntry, NO_SLOT};
pub use radix::{NameError, RadixName, TipType};
