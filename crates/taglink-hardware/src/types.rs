//! Driver-facing data types.

use crate::error::{HardwareError, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use taglink_core::RawReading;
use taglink_core::constants::DEFAULT_LLRP_PORT;

/// Payload handed to the registered callback.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverReport {
    /// A non-empty batch of raw readings.
    Readings(Vec<RawReading>),

    /// The link died while connected. No further reports follow.
    Fault { message: String },
}

/// Callback invoked by a driver from a context the caller does not control.
///
/// Implementations must not block: the callback runs on the driver's read
/// loop.
pub type ReportCallback = Arc<dyn Fn(DriverReport) + Send + Sync>;

/// Which driver a connect request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverMode {
    /// Synthetic tag batches, no hardware.
    Simulated,

    /// LLRP reader over TCP.
    Llrp,
}

impl DriverMode {
    /// Mode for a control request's `simulate` flag.
    pub fn from_simulate(simulate: bool) -> Self {
        if simulate { Self::Simulated } else { Self::Llrp }
    }
}

impl fmt::Display for DriverMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Simulated => write!(f, "simulated"),
            Self::Llrp => write!(f, "llrp"),
        }
    }
}

/// Reader network address, `host` or `host:port`.
///
/// The port defaults to the LLRP port when omitted.
///
/// # Examples
///
/// ```
/// use taglink_hardware::ReaderAddress;
///
/// let addr: ReaderAddress = "192.168.1.100".parse().unwrap();
/// assert_eq!(addr.port, 5084);
///
/// let addr: ReaderAddress = "reader.local:15084".parse().unwrap();
/// assert_eq!(addr.to_string(), "reader.local:15084");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderAddress {
    pub host: String,
    pub port: u16,
}

impl FromStr for ReaderAddress {
    type Err = HardwareError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(HardwareError::InvalidAddress("empty address".to_string()));
        }

        // Bracketed IPv6 with optional port
        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| HardwareError::InvalidAddress(s.to_string()))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(s, port)?,
                None if tail.is_empty() => DEFAULT_LLRP_PORT,
                None => return Err(HardwareError::InvalidAddress(s.to_string())),
            };
            return Ok(Self {
                host: host.to_string(),
                port,
            });
        }

        match s.rsplit_once(':') {
            // A bare IPv6 literal has several colons and no port
            Some((host, _)) if host.contains(':') => Ok(Self {
                host: s.to_string(),
                port: DEFAULT_LLRP_PORT,
            }),
            Some((host, port)) if !host.is_empty() => Ok(Self {
                host: host.to_string(),
                port: parse_port(s, port)?,
            }),
            Some(_) => Err(HardwareError::InvalidAddress(s.to_string())),
            None => Ok(Self {
                host: s.to_string(),
                port: DEFAULT_LLRP_PORT,
            }),
        }
    }
}

fn parse_port(address: &str, port: &str) -> Result<u16> {
    port.parse()
        .map_err(|_| HardwareError::InvalidAddress(address.to_string()))
}

impl fmt::Display for ReaderAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("192.168.1.100", "192.168.1.100", 5084)]
    #[case("192.168.1.100:15084", "192.168.1.100", 15084)]
    #[case("  reader.local  ", "reader.local", 5084)]
    #[case("[::1]:6000", "::1", 6000)]
    #[case("[::1]", "::1", 5084)]
    #[case("fe80::1", "fe80::1", 5084)]
    fn test_address_parse(#[case] input: &str, #[case] host: &str, #[case] port: u16) {
        let addr: ReaderAddress = input.parse().unwrap();
        assert_eq!(addr.host, host);
        assert_eq!(addr.port, port);
    }

    #[rstest]
    #[case("")]
    #[case(":5084")]
    #[case("reader:notaport")]
    #[case("reader:70000")]
    #[case("[::1")]
    fn test_address_parse_invalid(#[case] input: &str) {
        assert!(input.parse::<ReaderAddress>().is_err());
    }

    #[test]
    fn test_ipv6_display_is_bracketed() {
        let addr: ReaderAddress = "[::1]:6000".parse().unwrap();
        assert_eq!(addr.to_string(), "[::1]:6000");
    }

    #[test]
    fn test_driver_mode_from_simulate() {
        assert_eq!(DriverMode::from_simulate(true), DriverMode::Simulated);
        assert_eq!(DriverMode::from_simulate(false), DriverMode::Llrp);
        assert_eq!(DriverMode::Llrp.to_string(), "llrp");
    }
}
