use core::fmt;
use core::str::FromStr;

/// A Bluetooth Device Address (`BD_ADDR`)
///
/// Bytes are kept in display order, most significant first, as printed by
/// `AA:BB:CC:DD:EE:FF`. HCI carries the address little endian, so the
/// `bt-hci` conversions reverse the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BluetoothAddress(pub [u8; 6]);

/// Address text is not six colon separated hex octets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressParseError;

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid Bluetooth address")
    }
}

impl BluetoothAddress {
    /// Create a new Bluetooth address from bytes
    #[must_use]
    pub const fn new(addr: [u8; 6]) -> Self {
        Self(addr)
    }

    /// Address bytes, most significant first
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Format as `AA:BB:CC:DD:EE:FF`
    #[must_use]
    pub fn format_hex(&self) -> heapless::String<17> {
        use fmt::Write;

        let mut out = heapless::String::new();
        // 17 bytes always fit
        write!(out, "{self}").ok();
        out
    }
}

impl fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for BluetoothAddress {
    type Err = AddressParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut octets = text.split(':');
        for byte in &mut bytes {
            let octet = octets.next().ok_or(AddressParseError)?;
            if octet.len() != 2 {
                return Err(AddressParseError);
            }
            *byte = u8::from_str_radix(octet, 16).map_err(|_| AddressParseError)?;
        }
        if octets.next().is_some() {
            return Err(AddressParseError);
        }
        Ok(Self(bytes))
    }
}

impl From<[u8; 6]> for BluetoothAddress {
    fn from(addr: [u8; 6]) -> Self {
        Self(addr)
    }
}

impl From<bt_hci::param::BdAddr> for BluetoothAddress {
    fn from(bd_addr: bt_hci::param::BdAddr) -> Self {
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(bd_addr.raw());
        bytes.reverse();
        Self(bytes)
    }
}

impl From<BluetoothAddress> for bt_hci::param::BdAddr {
    fn from(addr: BluetoothAddress) -> Self {
        let mut bytes = addr.0;
        bytes.reverse();
        bt_hci::param::BdAddr::new(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parse() {
        let addr = BluetoothAddress::new([0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]);
        assert_eq!(addr.format_hex().as_str(), "12:34:56:78:9A:BC");
        assert_eq!("12:34:56:78:9a:bc".parse(), Ok(addr));
    }

    #[test]
    fn test_parse_rejects_bad_text() {
        assert!("12:34:56:78:9A".parse::<BluetoothAddress>().is_err());
        assert!("12:34:56:78:9A:BC:DE".parse::<BluetoothAddress>().is_err());
        assert!("12:34:56:78:9A:B".parse::<BluetoothAddress>().is_err());
        assert!("12:34:56:78:9A:XY".parse::<BluetoothAddress>().is_err());
        assert!("".parse::<BluetoothAddress>().is_err());
    }

    #[test]
    fn test_hci_byte_order() {
        let addr = BluetoothAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        let bd_addr: bt_hci::param::BdAddr = addr.into();
        assert_eq!(bd_addr.raw(), &[0x55, 0x44, 0x33, 0x22, 0x11, 0x00]);
        assert_eq!(BluetoothAddress::from(bd_addr), addr);
    }
}
