//! Network prefix value type
//!
//! [`Addr`] wraps an [`ipnet::IpNet`] and adds the predicates the
//! reconciliation logic needs: family checks, protection checks and
//! containment. The canonical textual form is CIDR.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

use crate::error::{Error, Result};

/// A network prefix: an IP address (v4 or v6) plus a prefix length
///
/// Parsing canonicalises the prefix to its network address, so
/// `10.1.2.3/24` becomes `10.1.2.0/24`. Bare IP addresses become host
/// prefixes (/32 or /128). Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Addr(IpNet);

impl Addr {
    /// Parse CIDR notation, canonicalising to the masked network address
    pub fn parse_cidr(s: &str) -> Result<Self> {
        let net =
            IpNet::from_str(s).map_err(|e| Error::invalid_address(format!("{s}: {e}")))?;
        Ok(Self(net.trunc()))
    }

    /// Parse a bare IP address into a host prefix (/32 or /128)
    pub fn parse_ip(s: &str) -> Result<Self> {
        let ip =
            IpAddr::from_str(s).map_err(|e| Error::invalid_address(format!("{s}: {e}")))?;
        Ok(Self::from_ip(ip))
    }

    /// Parse CIDR notation first, falling back to a bare IP address
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_cidr(s).or_else(|_| Self::parse_ip(s))
    }

    /// Convert an IP address into a host prefix
    pub fn from_ip(ip: IpAddr) -> Self {
        let prefix_len = match ip {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        Self(IpNet::new(ip, prefix_len).expect("host prefix length is always valid"))
    }

    /// The prefix's IP address
    #[must_use]
    pub fn ip(&self) -> IpAddr {
        self.0.addr()
    }

    /// The prefix length in bits
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    /// Reports whether the prefix is IPv4
    #[must_use]
    pub fn is_ipv4(&self) -> bool {
        matches!(self.0, IpNet::V4(_))
    }

    /// Reports whether the prefix is IPv6
    #[must_use]
    pub fn is_ipv6(&self) -> bool {
        matches!(self.0, IpNet::V6(_))
    }

    /// Reports whether the prefix's address is private
    ///
    /// RFC 1918 ranges for IPv4, unique-local (fc00::/7) for IPv6.
    #[must_use]
    pub fn is_private(&self) -> bool {
        match self.ip() {
            IpAddr::V4(v4) => v4.is_private(),
            IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
        }
    }

    /// Reports whether the prefix's address is a loopback address
    #[must_use]
    pub fn is_loopback(&self) -> bool {
        self.ip().is_loopback()
    }

    /// Reports whether the prefix's address is unspecified (0.0.0.0 or ::)
    #[must_use]
    pub fn is_unspecified(&self) -> bool {
        self.ip().is_unspecified()
    }

    /// Reports whether `other`'s address lies within this prefix's network
    ///
    /// Always false across address families.
    #[must_use]
    pub fn contains(&self, other: &Addr) -> bool {
        self.0.contains(&other.ip())
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Addr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
