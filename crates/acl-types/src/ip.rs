//! IP address and prefix types with safe parsing.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Address family of a rule or a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// Returns the address width in bits (32 or 128).
    pub const fn max_prefix_len(&self) -> u8 {
        match self {
            IpVersion::V4 => 32,
            IpVersion::V6 => 128,
        }
    }

    /// Returns the address width in bytes (4 or 16).
    pub const fn address_len(&self) -> usize {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 16,
        }
    }

    pub const fn is_ipv6(&self) -> bool {
        matches!(self, IpVersion::V6)
    }

    pub const fn from_is_ipv6(is_ipv6: bool) -> Self {
        if is_ipv6 {
            IpVersion::V6
        } else {
            IpVersion::V4
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => write!(f, "IPv4"),
            IpVersion::V6 => write!(f, "IPv6"),
        }
    }
}

/// An IP address that can be either IPv4 or IPv6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IpAddress {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl IpAddress {
    /// The all-zero address of the given family.
    pub const fn unspecified(version: IpVersion) -> Self {
        match version {
            IpVersion::V4 => IpAddress::V4(Ipv4Addr::UNSPECIFIED),
            IpVersion::V6 => IpAddress::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    pub const fn version(&self) -> IpVersion {
        match self {
            IpAddress::V4(_) => IpVersion::V4,
            IpAddress::V6(_) => IpVersion::V6,
        }
    }

    pub const fn is_ipv4(&self) -> bool {
        matches!(self, IpAddress::V4(_))
    }

    pub const fn is_ipv6(&self) -> bool {
        matches!(self, IpAddress::V6(_))
    }

    /// Returns the address as an unsigned integer.
    ///
    /// IPv4 addresses occupy the low 32 bits.
    pub fn to_bits(&self) -> u128 {
        match self {
            IpAddress::V4(addr) => u128::from(u32::from(*addr)),
            IpAddress::V6(addr) => u128::from(*addr),
        }
    }

    /// Builds an address from raw network-order bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not exactly the family's width.
    pub fn from_octets(version: IpVersion, bytes: &[u8]) -> Result<Self, ParseError> {
        let mismatch = || ParseError::AddressLength {
            expected: version.address_len(),
            actual: bytes.len(),
        };
        match version {
            IpVersion::V4 => {
                let octets: [u8; 4] = bytes.try_into().map_err(|_| mismatch())?;
                Ok(IpAddress::V4(Ipv4Addr::from(octets)))
            }
            IpVersion::V6 => {
                let octets: [u8; 16] = bytes.try_into().map_err(|_| mismatch())?;
                Ok(IpAddress::V6(Ipv6Addr::from(octets)))
            }
        }
    }

    /// Network-order bytes, 4 or 16 long.
    pub fn octets(&self) -> Vec<u8> {
        match self {
            IpAddress::V4(addr) => addr.octets().to_vec(),
            IpAddress::V6(addr) => addr.octets().to_vec(),
        }
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpAddress::V4(addr) => addr.fmt(f),
            IpAddress::V6(addr) => addr.fmt(f),
        }
    }
}

impl FromStr for IpAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<IpAddr>()
            .map(IpAddress::from)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<IpAddr> for IpAddress {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => IpAddress::V4(v4),
            IpAddr::V6(v6) => IpAddress::V6(v6),
        }
    }
}

impl From<Ipv4Addr> for IpAddress {
    fn from(addr: Ipv4Addr) -> Self {
        IpAddress::V4(addr)
    }
}

impl From<Ipv6Addr> for IpAddress {
    fn from(addr: Ipv6Addr) -> Self {
        IpAddress::V6(addr)
    }
}

/// An IP prefix in CIDR notation (e.g., 10.0.0.0/24 or 2001:db8::/32).
///
/// The address is stored as given; host bits past the prefix length are
/// kept so a prefix reads back exactly as it was configured, and are
/// ignored when matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPrefix")]
pub struct IpPrefix {
    address: IpAddress,
    prefix_len: u8,
}

/// Unchecked wire shape of [`IpPrefix`]; deserialization goes through
/// [`IpPrefix::new`].
#[derive(Deserialize)]
struct RawPrefix {
    address: IpAddress,
    prefix_len: u8,
}

impl TryFrom<RawPrefix> for IpPrefix {
    type Error = ParseError;

    fn try_from(raw: RawPrefix) -> Result<Self, Self::Error> {
        IpPrefix::new(raw.address, raw.prefix_len)
    }
}

impl IpPrefix {
    /// Creates a new IP prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix length is invalid for the address type
    /// (>32 for IPv4, >128 for IPv6).
    pub fn new(address: IpAddress, prefix_len: u8) -> Result<Self, ParseError> {
        let version = address.version();
        let max = version.max_prefix_len();
        if prefix_len > max {
            return Err(ParseError::PrefixTooLong {
                version,
                len: prefix_len,
                max,
            });
        }

        Ok(IpPrefix {
            address,
            prefix_len,
        })
    }

    /// The zero-length prefix of a family, matching every address of it.
    pub const fn any(version: IpVersion) -> Self {
        IpPrefix {
            address: IpAddress::unspecified(version),
            prefix_len: 0,
        }
    }

    /// A full-length prefix matching exactly one address.
    pub fn host(address: IpAddress) -> Self {
        IpPrefix {
            address,
            prefix_len: address.version().max_prefix_len(),
        }
    }

    pub const fn address(&self) -> &IpAddress {
        &self.address
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub const fn version(&self) -> IpVersion {
        self.address.version()
    }

    /// Returns true if this is a host route (/32 for IPv4, /128 for IPv6).
    pub const fn is_host_route(&self) -> bool {
        self.prefix_len == self.address.version().max_prefix_len()
    }

    /// Returns true if this prefix matches every address (/0).
    pub fn is_default(&self) -> bool {
        self.prefix_len == 0
    }

    /// Bit mask selecting the prefix bits of [`IpAddress::to_bits`].
    pub fn mask(&self) -> u128 {
        if self.prefix_len == 0 {
            return 0;
        }
        let len = u32::from(self.prefix_len);
        match self.address {
            IpAddress::V4(_) => u128::from(u32::MAX << 32u32.saturating_sub(len)),
            IpAddress::V6(_) => u128::MAX << 128u32.saturating_sub(len),
        }
    }

    /// The prefix bits of the stored address, host bits cleared.
    pub fn network_bits(&self) -> u128 {
        self.address.to_bits() & self.mask()
    }

    /// Returns true if `address` falls inside this prefix.
    ///
    /// Addresses of the other family never match.
    pub fn contains(&self, address: &IpAddress) -> bool {
        address.version() == self.version()
            && (address.to_bits() & self.mask()) == self.network_bits()
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, len_str) = s
            .rsplit_once('/')
            .ok_or_else(|| ParseError::InvalidIpPrefix(s.to_string()))?;

        let address: IpAddress = addr_str.parse()?;
        let prefix_len: u8 = len_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;

        IpPrefix::new(address, prefix_len)
    }
}
