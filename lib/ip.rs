use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IpAddressError {
    #[error("ip address \"{0}\" is not in d.d.d.d format")]
    BadFormat(String),
    #[error("octet {0} is outside the allowed range (0-255)")]
    OctetOutOfRange(i64),
}

/// A dotted-quad IPv4 address. Kept as a dedicated newtype (rather than
/// `std::net::Ipv4Addr`) so octet parsing matches the wire format exactly,
/// including octets with leading zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IpAddr4([u8; 4]);

impl IpAddr4 {
    #[must_use]
    pub fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        IpAddr4([a, b, c, d])
    }

    #[must_use]
    pub fn octets(&self) -> [u8; 4] {
        self.0
    }
}

impl fmt::Display for IpAddr4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl FromStr for IpAddr4 {
    type Err = IpAddressError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 4];
        let mut parts = value.split('.');

        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| IpAddressError::BadFormat(value.to_string()))?;
            let parsed: i64 = part
                .parse()
                .map_err(|_| IpAddressError::BadFormat(value.to_string()))?;
            if !(0..=255).contains(&parsed) {
                return Err(IpAddressError::OctetOutOfRange(parsed));
            }
            *octet = parsed as u8;
        }

        if parts.next().is_some() {
            return Err(IpAddressError::BadFormat(value.to_string()));
        }

        Ok(IpAddr4(octets))
    }
}
