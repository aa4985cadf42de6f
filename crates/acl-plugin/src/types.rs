//! ACL types and enums.
//!
//! Core value types shared by the control plane and the classifier:
//! actions, handles, protocol numbers and the packet key.

use std::fmt;
use std::str::FromStr;

use acl_types::{Direction, InterfaceId, IpAddress, IpVersion};
use serde::{Deserialize, Serialize};

/// Identifier of an access list, allocated by the table.
pub type AclHandle = u32;

/// Sentinel handle requesting allocation of a new access list.
pub const CREATE_NEW: AclHandle = u32::MAX;

/// Sentinel handle used by dump requests to mean "every access list".
pub const ALL_ACLS: AclHandle = u32::MAX;

/// Most ACL handles one interface carries across both directions.
///
/// Interface list replies count handles in a single byte.
pub const MAX_INTERFACE_ACLS: usize = 255;

/// Identifies one attachment point: an interface in one direction.
pub type BindingKey = (InterfaceId, Direction);

/// IP protocol numbers with special meaning to the matcher.
pub mod proto {
    /// Wildcard: any protocol, port/type ranges ignored.
    pub const ANY: u8 = 0;
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    pub const ICMPV6: u8 = 58;

    /// Protocols whose ranges are read as ICMP type (source) and code (destination).
    pub const fn is_icmp(protocol: u8) -> bool {
        protocol == ICMP || protocol == ICMPV6
    }
}

/// Decision attached to a rule and returned by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Deny,
    Permit,
}

impl Action {
    pub const fn is_permit(&self) -> bool {
        matches!(self, Action::Permit)
    }

    pub const fn from_is_permit(is_permit: bool) -> Self {
        if is_permit {
            Action::Permit
        } else {
            Action::Deny
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deny => write!(f, "DENY"),
            Self::Permit => write!(f, "PERMIT"),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DENY" | "DROP" => Ok(Self::Deny),
            "PERMIT" | "FORWARD" => Ok(Self::Permit),
            _ => Err(format!("Unknown ACL action: {}", s)),
        }
    }
}

/// Header fields the classifier looks at.
///
/// For ICMP and ICMPv6 packets the upstream parser places the ICMP type in
/// `src_port` and the ICMP code in `dst_port`. Addresses are kept as flat
/// integers (see [`IpAddress::to_bits`]) so matching is mask-and-compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketKey {
    pub ip_version: IpVersion,
    pub protocol: u8,
    pub src_addr: u128,
    pub dst_addr: u128,
    pub src_port: u16,
    pub dst_port: u16,
}

impl PacketKey {
    /// Builds a key from addresses of the same family.
    ///
    /// The family is taken from `src`. The header parser guarantees both
    /// addresses come from one IP header, so a mixed pair is a caller bug.
    pub fn new(
        src: IpAddress,
        dst: IpAddress,
        protocol: u8,
        src_port_or_type: u16,
        dst_port_or_code: u16,
    ) -> Self {
        debug_assert_eq!(
            src.version(),
            dst.version(),
            "packet key addresses from different families"
        );
        Self {
            ip_version: src.version(),
            protocol,
            src_addr: src.to_bits(),
            dst_addr: dst.to_bits(),
            src_port: src_port_or_type,
            dst_port: dst_port_or_code,
        }
    }

    pub fn tcp(src: IpAddress, dst: IpAddress, src_port: u16, dst_port: u16) -> Self {
        Self::new(src, dst, proto::TCP, src_port, dst_port)
    }

    pub fn udp(src: IpAddress, dst: IpAddress, src_port: u16, dst_port: u16) -> Self {
        Self::new(src, dst, proto::UDP, src_port, dst_port)
    }

    /// ICMP for IPv4 sources, ICMPv6 for IPv6 sources.
    pub fn icmp(src: IpAddress, dst: IpAddress, icmp_type: u8, icmp_code: u8) -> Self {
        let protocol = match src.version() {
            IpVersion::V4 => proto::ICMP,
            IpVersion::V6 => proto::ICMPV6,
        };
        Self::new(src, dst, protocol, u16::from(icmp_type), u16::from(icmp_code))
    }
}
