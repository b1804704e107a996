#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]

// must come first so the logging macros are visible to every module
mod fmt;

pub mod a2dp;
mod address;
pub mod at;
pub mod constants;
mod device;
pub mod hfp;
pub mod transport;

pub use address::{AddressParseError, BluetoothAddress};
pub use device::{Device, DeviceHold};
