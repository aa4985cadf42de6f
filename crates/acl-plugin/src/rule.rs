//! ACL rule: one match specification and its action.
//!
//! Rules are immutable values once they are handed to the table. They are
//! built with the `with_*` builder methods and checked with
//! [`Rule::validate`] before an access list accepts them.

use std::fmt;

use acl_types::{IpPrefix, IpVersion, ParseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::range::{L4Match, L4Range};
use crate::types::{proto, Action, PacketKey};

/// Reasons a rule is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("{field} prefix {prefix} is {found}, rule is {expected}")]
    FamilyMismatch {
        field: &'static str,
        prefix: IpPrefix,
        expected: IpVersion,
        found: IpVersion,
    },

    #[error("{field} range {first}-{last} is inverted")]
    InvertedRange {
        field: &'static str,
        first: u16,
        last: u16,
    },

    #[error("invalid {field} prefix: {source}")]
    Prefix {
        field: &'static str,
        source: ParseError,
    },

    #[error("invalid {field} value {value}")]
    InvalidField { field: &'static str, value: u8 },
}

/// A single ACL rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    action: Action,
    ip_version: IpVersion,
    protocol: u8,
    src_prefix: IpPrefix,
    dst_prefix: IpPrefix,
    src_range: L4Range,
    dst_range: L4Range,
}

impl Rule {
    /// Creates a rule matching every packet of `ip_version`.
    pub fn new(action: Action, ip_version: IpVersion) -> Self {
        Self {
            action,
            ip_version,
            protocol: proto::ANY,
            src_prefix: IpPrefix::any(ip_version),
            dst_prefix: IpPrefix::any(ip_version),
            src_range: L4Range::ALL,
            dst_range: L4Range::ALL,
        }
    }

    pub fn permit(ip_version: IpVersion) -> Self {
        Self::new(Action::Permit, ip_version)
    }

    pub fn deny(ip_version: IpVersion) -> Self {
        Self::new(Action::Deny, ip_version)
    }

    pub fn with_protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_src_prefix(mut self, prefix: IpPrefix) -> Self {
        self.src_prefix = prefix;
        self
    }

    pub fn with_dst_prefix(mut self, prefix: IpPrefix) -> Self {
        self.dst_prefix = prefix;
        self
    }

    pub fn with_src_range(mut self, first: u16, last: u16) -> Self {
        self.src_range = L4Range::new(first, last);
        self
    }

    pub fn with_dst_range(mut self, first: u16, last: u16) -> Self {
        self.dst_range = L4Range::new(first, last);
        self
    }

    pub fn with_src_port(self, port: u16) -> Self {
        self.with_src_range(port, port)
    }

    pub fn with_dst_port(self, port: u16) -> Self {
        self.with_dst_range(port, port)
    }

    /// ICMP type range; stored in the source range.
    pub fn with_icmp_type(self, first: u8, last: u8) -> Self {
        self.with_src_range(u16::from(first), u16::from(last))
    }

    /// ICMP code range; stored in the destination range.
    pub fn with_icmp_code(self, first: u8, last: u8) -> Self {
        self.with_dst_range(u16::from(first), u16::from(last))
    }

    pub const fn action(&self) -> Action {
        self.action
    }

    pub const fn ip_version(&self) -> IpVersion {
        self.ip_version
    }

    pub const fn protocol(&self) -> u8 {
        self.protocol
    }

    pub const fn src_prefix(&self) -> &IpPrefix {
        &self.src_prefix
    }

    pub const fn dst_prefix(&self) -> &IpPrefix {
        &self.dst_prefix
    }

    pub const fn src_range(&self) -> L4Range {
        self.src_range
    }

    pub const fn dst_range(&self) -> L4Range {
        self.dst_range
    }

    /// How the two ranges are read for this rule's protocol.
    pub const fn l4_match(&self) -> L4Match {
        L4Match::for_protocol(self.protocol)
    }

    /// Checks family consistency and range ordering.
    pub fn validate(&self) -> Result<(), RuleError> {
        for (field, prefix) in [("src", &self.src_prefix), ("dst", &self.dst_prefix)] {
            if prefix.version() != self.ip_version {
                return Err(RuleError::FamilyMismatch {
                    field,
                    prefix: *prefix,
                    expected: self.ip_version,
                    found: prefix.version(),
                });
            }
            let max = self.ip_version.max_prefix_len();
            if prefix.prefix_len() > max {
                return Err(RuleError::Prefix {
                    field,
                    source: ParseError::PrefixTooLong {
                        version: self.ip_version,
                        len: prefix.prefix_len(),
                        max,
                    },
                });
            }
        }

        // Ranges are ignored for protocol 0, so they are not checked either.
        if self.l4_match() != L4Match::Any {
            for (field, range) in [("src", self.src_range), ("dst", self.dst_range)] {
                if !range.is_valid() {
                    return Err(RuleError::InvertedRange {
                        field,
                        first: range.first,
                        last: range.last,
                    });
                }
            }
        }

        Ok(())
    }

    /// Reference match predicate.
    ///
    /// The classifier compiles rules into a faster form; this is the
    /// definition that form must agree with.
    pub fn matches(&self, key: &PacketKey) -> bool {
        if key.ip_version != self.ip_version {
            return false;
        }
        if self.protocol != proto::ANY && key.protocol != self.protocol {
            return false;
        }
        let src_mask = self.src_prefix.mask();
        let dst_mask = self.dst_prefix.mask();
        if key.src_addr & src_mask != self.src_prefix.network_bits()
            || key.dst_addr & dst_mask != self.dst_prefix.network_bits()
        {
            return false;
        }
        match self.l4_match() {
            L4Match::Any => true,
            L4Match::Icmp | L4Match::Transport => {
                self.src_range.contains(key.src_port) && self.dst_range.contains(key.dst_port)
            }
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} proto {} {}",
            self.action, self.ip_version, self.protocol, self.src_prefix
        )?;
        match self.l4_match() {
            L4Match::Any => write!(f, " -> {}", self.dst_prefix),
            L4Match::Icmp => write!(
                f,
                " -> {} type {} code {}",
                self.dst_prefix, self.src_range, self.dst_range
            ),
            L4Match::Transport => write!(
                f,
                " sport {} -> {} dport {}",
                self.src_range, self.dst_prefix, self.dst_range
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn v4(s: &str) -> IpPrefix {
        s.parse().unwrap()
    }

    fn key(src: &str, dst: &str, protocol: u8, sport: u16, dport: u16) -> PacketKey {
        PacketKey::new(src.parse().unwrap(), dst.parse().unwrap(), protocol, sport, dport)
    }

    #[test]
    fn test_builder_defaults() {
        let rule = Rule::permit(IpVersion::V4);
        assert_eq!(rule.action(), Action::Permit);
        assert_eq!(rule.protocol(), proto::ANY);
        assert!(rule.src_prefix().is_default());
        assert_eq!(rule.src_range(), L4Range::ALL);
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_family_mismatch_rejected() {
        let rule = Rule::deny(IpVersion::V6).with_src_prefix(v4("10.0.0.0/8"));
        let err = rule.validate().unwrap_err();
        assert!(matches!(err, RuleError::FamilyMismatch { field: "src", .. }));
    }

    #[test]
    fn test_overlong_prefix_never_deserializes() {
        let mut json = serde_json::to_value(Rule::permit(IpVersion::V4)).unwrap();
        json["src_prefix"]["prefix_len"] = 40.into();
        let err = serde_json::from_value::<Rule>(json).unwrap_err();
        assert!(err.to_string().contains("prefix length 40 exceeds maximum 32"));

        let json = serde_json::to_value(Rule::permit(IpVersion::V6)).unwrap();
        let rule: Rule = serde_json::from_value(json).unwrap();
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let rule = Rule::deny(IpVersion::V4)
            .with_protocol(proto::TCP)
            .with_dst_range(5, 4);
        assert_eq!(
            rule.validate().unwrap_err(),
            RuleError::InvertedRange {
                field: "dst",
                first: 5,
                last: 4
            }
        );
    }

    #[test]
    fn test_inverted_range_ignored_for_any_protocol() {
        let rule = Rule::deny(IpVersion::V4).with_dst_range(5, 4);
        assert!(rule.validate().is_ok());
        assert!(rule.matches(&key("1.1.1.1", "2.2.2.2", proto::TCP, 1, 1)));
    }

    #[test]
    fn test_tcp_port_match() {
        let rule = Rule::permit(IpVersion::V4)
            .with_protocol(proto::TCP)
            .with_dst_prefix(v4("192.168.1.0/24"))
            .with_dst_range(1000, 2000);

        assert!(rule.matches(&key("10.0.0.1", "192.168.1.7", proto::TCP, 40000, 1500)));
        assert!(!rule.matches(&key("10.0.0.1", "192.168.1.7", proto::TCP, 40000, 999)));
        assert!(!rule.matches(&key("10.0.0.1", "192.168.2.7", proto::TCP, 40000, 1500)));
        assert!(!rule.matches(&key("10.0.0.1", "192.168.1.7", proto::UDP, 40000, 1500)));
    }

    #[test]
    fn test_icmp_type_code_match() {
        let rule = Rule::deny(IpVersion::V4)
            .with_protocol(proto::ICMP)
            .with_icmp_type(8, 8)
            .with_icmp_code(0, 0);
        assert_eq!(rule.l4_match(), L4Match::Icmp);

        let echo = PacketKey::icmp("1.1.1.1".parse().unwrap(), "2.2.2.2".parse().unwrap(), 8, 0);
        let reply = PacketKey::icmp("1.1.1.1".parse().unwrap(), "2.2.2.2".parse().unwrap(), 0, 0);
        assert!(rule.matches(&echo));
        assert!(!rule.matches(&reply));
    }

    #[test]
    fn test_wildcard_protocol_ignores_ranges() {
        let rule = Rule::permit(IpVersion::V4).with_src_range(1, 1).with_dst_range(2, 2);
        assert!(rule.matches(&key("1.1.1.1", "2.2.2.2", proto::UDP, 999, 999)));
    }

    #[test]
    fn test_family_never_crosses() {
        let rule = Rule::permit(IpVersion::V6);
        assert!(!rule.matches(&key("1.1.1.1", "2.2.2.2", proto::TCP, 1, 1)));
        assert!(rule.matches(&key("::1", "::2", proto::TCP, 1, 1)));
    }

    #[test]
    fn test_display() {
        let rule = Rule::permit(IpVersion::V4)
            .with_protocol(proto::TCP)
            .with_dst_prefix(v4("10.0.0.0/8"))
            .with_dst_port(22);
        assert_eq!(
            rule.to_string(),
            "PERMIT IPv4 proto 6 0.0.0.0/0 sport 0-65535 -> 10.0.0.0/8 dport 22"
        );
    }
}
