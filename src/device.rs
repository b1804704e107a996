//! Remote device and its reference-counted hold

use crate::BluetoothAddress;
use core::cell::Cell;
use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use heapless::String;

/// A connected remote device
///
/// Transports borrow the device and take a [`DeviceHold`] while they
/// acquire and stream, so the owner can tell when it is safe to forget it.
pub struct Device {
    address: BluetoothAddress,
    name: Option<String<32>>,
    holds: Mutex<CriticalSectionRawMutex, Cell<usize>>,
}

impl Device {
    /// Create a device with no name and no holds
    #[must_use]
    pub const fn new(address: BluetoothAddress) -> Self {
        Self {
            address,
            name: None,
            holds: Mutex::new(Cell::new(0)),
        }
    }

    /// Set the remote name, truncated to 32 bytes
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        let mut bounded = String::new();
        for ch in name.chars() {
            if bounded.push(ch).is_err() {
                break;
            }
        }
        self.name = Some(bounded);
        self
    }

    /// Bluetooth address of the device
    #[must_use]
    pub const fn address(&self) -> BluetoothAddress {
        self.address
    }

    /// Remote name, if known
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Take a hold, released when the guard drops
    #[must_use]
    pub fn hold(&self) -> DeviceHold<'_> {
        let count = self.holds.lock(|holds| {
            holds.set(holds.get() + 1);
            holds.get()
        });
        trace!("[DEVICE] hold taken ({=usize})", count);
        DeviceHold { device: self }
    }

    /// Number of outstanding holds
    #[must_use]
    pub fn holds(&self) -> usize {
        self.holds.lock(Cell::get)
    }

    /// Whether nothing holds the device
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.holds() == 0
    }
}

/// RAII hold on a [`Device`]
pub struct DeviceHold<'a> {
    device: &'a Device,
}

impl DeviceHold<'_> {
    /// The held device
    #[must_use]
    pub fn device(&self) -> &Device {
        self.device
    }
}

impl Drop for DeviceHold<'_> {
    fn drop(&mut self) {
        self.device
            .holds
            .lock(|holds| holds.set(holds.get().saturating_sub(1)));
    }
}
