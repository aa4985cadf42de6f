//! Network primitives shared by the ACL control plane and classifier.
//!
//! - [`IpVersion`]: address family of a rule or packet
//! - [`IpAddress`]: IPv4 and IPv6 addresses with a flat bit view for matching
//! - [`IpPrefix`]: address + prefix length, validated against the family
//! - [`InterfaceId`]: dataplane interface index
//! - [`Direction`]: INPUT or OUTPUT attachment point

mod interface;
mod ip;

pub use interface::{Direction, InterfaceId};
pub use ip::{IpAddress, IpPrefix, IpVersion};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("prefix length {len} exceeds maximum {max} for {version}")]
    PrefixTooLong { version: IpVersion, len: u8, max: u8 },

    #[error("expected {expected} address bytes, got {actual}")]
    AddressLength { expected: usize, actual: usize },

    #[error("invalid direction: {0}")]
    InvalidDirection(String),
}
