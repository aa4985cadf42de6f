//! Fixed-layout rule record.
//!
//! Layout, all multi-byte fields in network byte order:
//!
//! ```text
//! is_permit u8 | is_ipv6 u8 | proto u8
//! src_prefix_len u8 | src_addr [4 or 16]
//! dst_prefix_len u8 | dst_addr [4 or 16]
//! src_first u16 | src_last u16 | dst_first u16 | dst_last u16
//! ```
//!
//! Address width follows `is_ipv6`. A rule list is a u32 count followed by
//! that many records.

use std::io::{self, Read, Write};

use acl_types::{IpAddress, IpPrefix, IpVersion, ParseError};
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rule::{Rule, RuleError};
use crate::types::Action;

/// Decoding failures.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("truncated rule record")]
    Truncated,

    #[error("invalid {field} value {value}")]
    InvalidField { field: &'static str, value: u8 },

    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for WireError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            WireError::Truncated
        } else {
            WireError::Io(e)
        }
    }
}

/// One rule as carried in requests and dumps.
///
/// IPv4 addresses occupy the first four bytes of the address arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WireRule {
    pub is_permit: u8,
    pub is_ipv6: u8,
    pub proto: u8,
    pub src_ip_prefix_len: u8,
    pub src_ip_addr: [u8; 16],
    pub dst_ip_prefix_len: u8,
    pub dst_ip_addr: [u8; 16],
    pub srcport_or_icmptype_first: u16,
    pub srcport_or_icmptype_last: u16,
    pub dstport_or_icmpcode_first: u16,
    pub dstport_or_icmpcode_last: u16,
}

impl WireRule {
    fn address_len(&self) -> usize {
        if self.is_ipv6 != 0 {
            16
        } else {
            4
        }
    }

    /// Size of the encoded record.
    pub fn encoded_len(&self) -> usize {
        3 + 2 * (1 + self.address_len()) + 8
    }

    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let addr_len = self.address_len();
        w.write_u8(self.is_permit)?;
        w.write_u8(self.is_ipv6)?;
        w.write_u8(self.proto)?;
        w.write_u8(self.src_ip_prefix_len)?;
        w.write_all(&self.src_ip_addr[..addr_len])?;
        w.write_u8(self.dst_ip_prefix_len)?;
        w.write_all(&self.dst_ip_addr[..addr_len])?;
        w.write_u16::<NetworkEndian>(self.srcport_or_icmptype_first)?;
        w.write_u16::<NetworkEndian>(self.srcport_or_icmptype_last)?;
        w.write_u16::<NetworkEndian>(self.dstport_or_icmpcode_first)?;
        w.write_u16::<NetworkEndian>(self.dstport_or_icmpcode_last)?;
        Ok(())
    }

    pub fn decode<R: Read>(r: &mut R) -> Result<Self, WireError> {
        let mut rule = WireRule {
            is_permit: r.read_u8()?,
            is_ipv6: r.read_u8()?,
            proto: r.read_u8()?,
            ..Default::default()
        };
        if rule.is_ipv6 > 1 {
            return Err(WireError::InvalidField {
                field: "is_ipv6",
                value: rule.is_ipv6,
            });
        }
        let addr_len = rule.address_len();
        rule.src_ip_prefix_len = r.read_u8()?;
        r.read_exact(&mut rule.src_ip_addr[..addr_len])?;
        rule.dst_ip_prefix_len = r.read_u8()?;
        r.read_exact(&mut rule.dst_ip_addr[..addr_len])?;
        rule.srcport_or_icmptype_first = r.read_u16::<NetworkEndian>()?;
        rule.srcport_or_icmptype_last = r.read_u16::<NetworkEndian>()?;
        rule.dstport_or_icmpcode_first = r.read_u16::<NetworkEndian>()?;
        rule.dstport_or_icmpcode_last = r.read_u16::<NetworkEndian>()?;
        Ok(rule)
    }
}

/// Encodes a count-prefixed rule list.
pub fn encode_rules(rules: &[WireRule]) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(4 + rules.iter().map(WireRule::encoded_len).sum::<usize>());
    let count = u32::try_from(rules.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many rules"))?;
    buf.write_u32::<NetworkEndian>(count)?;
    for rule in rules {
        rule.encode(&mut buf)?;
    }
    Ok(buf)
}

/// Decodes a count-prefixed rule list.
pub fn decode_rules(mut bytes: &[u8]) -> Result<Vec<WireRule>, WireError> {
    let count = bytes.read_u32::<NetworkEndian>()?;
    // Each record is at least 19 bytes; don't trust the count for allocation.
    let mut rules = Vec::with_capacity((count as usize).min(bytes.len() / 19));
    for _ in 0..count {
        rules.push(WireRule::decode(&mut bytes)?);
    }
    Ok(rules)
}

fn prefix(
    version: IpVersion,
    raw: &[u8; 16],
    prefix_len: u8,
    field: &'static str,
) -> Result<IpPrefix, RuleError> {
    let to_rule_error = |source: ParseError| RuleError::Prefix { field, source };
    let addr =
        IpAddress::from_octets(version, &raw[..version.address_len()]).map_err(to_rule_error)?;
    IpPrefix::new(addr, prefix_len).map_err(to_rule_error)
}

impl TryFrom<&WireRule> for Rule {
    type Error = RuleError;

    fn try_from(w: &WireRule) -> Result<Self, Self::Error> {
        let action = match w.is_permit {
            0 => Action::Deny,
            1 => Action::Permit,
            value => {
                return Err(RuleError::InvalidField {
                    field: "is_permit",
                    value,
                })
            }
        };
        let version = match w.is_ipv6 {
            0 => IpVersion::V4,
            1 => IpVersion::V6,
            value => {
                return Err(RuleError::InvalidField {
                    field: "is_ipv6",
                    value,
                })
            }
        };
        let src = prefix(version, &w.src_ip_addr, w.src_ip_prefix_len, "src")?;
        let dst = prefix(version, &w.dst_ip_addr, w.dst_ip_prefix_len, "dst")?;

        Ok(Rule::new(action, version)
            .with_protocol(w.proto)
            .with_src_prefix(src)
            .with_dst_prefix(dst)
            .with_src_range(w.srcport_or_icmptype_first, w.srcport_or_icmptype_last)
            .with_dst_range(w.dstport_or_icmpcode_first, w.dstport_or_icmpcode_last))
    }
}

impl From<&Rule> for WireRule {
    fn from(rule: &Rule) -> Self {
        let pack = |prefix: &IpPrefix| {
            let mut raw = [0u8; 16];
            let octets = prefix.address().octets();
            raw[..octets.len()].copy_from_slice(&octets);
            raw
        };
        WireRule {
            is_permit: u8::from(rule.action().is_permit()),
            is_ipv6: u8::from(rule.ip_version().is_ipv6()),
            proto: rule.protocol(),
            src_ip_prefix_len: rule.src_prefix().prefix_len(),
            src_ip_addr: pack(rule.src_prefix()),
            dst_ip_prefix_len: rule.dst_prefix().prefix_len(),
            dst_ip_addr: pack(rule.dst_prefix()),
            srcport_or_icmptype_first: rule.src_range().first,
            srcport_or_icmptype_last: rule.src_range().last,
            dstport_or_icmpcode_first: rule.dst_range().first,
            dstport_or_icmpcode_last: rule.dst_range().last,
        }
    }
}
