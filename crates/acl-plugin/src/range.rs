//! L4 range types for port and ICMP type/code matching.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::proto;

/// Inclusive range over a 16-bit L4 field.
///
/// Holds source/destination ports for transport protocols and ICMP
/// type/code for ICMP and ICMPv6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct L4Range {
    pub first: u16,
    pub last: u16,
}

impl L4Range {
    /// Every port.
    pub const ALL: L4Range = L4Range {
        first: 0,
        last: u16::MAX,
    };

    /// Every ICMP type or code.
    pub const ICMP_ALL: L4Range = L4Range { first: 0, last: 255 };

    pub const fn new(first: u16, last: u16) -> Self {
        Self { first, last }
    }

    pub const fn single(value: u16) -> Self {
        Self {
            first: value,
            last: value,
        }
    }

    /// Returns false for an inverted range (`first > last`).
    pub const fn is_valid(&self) -> bool {
        self.first <= self.last
    }

    #[inline]
    pub const fn contains(&self, value: u16) -> bool {
        self.first <= value && value <= self.last
    }
}

impl Default for L4Range {
    fn default() -> Self {
        Self::ALL
    }
}

impl fmt::Display for L4Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}-{}", self.first, self.last)
        }
    }
}

/// How a rule's two ranges are interpreted, fixed by its protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum L4Match {
    /// Protocol 0: ranges are ignored.
    Any,
    /// ICMP/ICMPv6: source range is the type, destination range the code.
    Icmp,
    /// Any other protocol: source and destination port ranges.
    Transport,
}

impl L4Match {
    pub const fn for_protocol(protocol: u8) -> Self {
        if protocol == proto::ANY {
            L4Match::Any
        } else if proto::is_icmp(protocol) {
            L4Match::Icmp
        } else {
            L4Match::Transport
        }
    }

    /// Full range for an unconstrained field under this interpretation.
    pub const fn full_range(&self) -> L4Range {
        match self {
            L4Match::Icmp => L4Range::ICMP_ALL,
            L4Match::Any | L4Match::Transport => L4Range::ALL,
        }
    }
}

impl fmt::Display for L4Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "ANY"),
            Self::Icmp => write!(f, "ICMP"),
            Self::Transport => write!(f, "TRANSPORT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_range_contains() {
        let r = L4Range::new(1000, 2000);
        assert!(r.contains(1000));
        assert!(r.contains(2000));
        assert!(!r.contains(999));
        assert!(!r.contains(2001));
        assert!(L4Range::ALL.contains(u16::MAX));
    }

    #[test]
    fn test_range_validity() {
        assert!(L4Range::single(80).is_valid());
        assert!(!L4Range::new(5, 4).is_valid());
    }

    #[test]
    fn test_range_display() {
        assert_eq!(L4Range::single(53).to_string(), "53");
        assert_eq!(L4Range::new(1, 1024).to_string(), "1-1024");
    }

    #[test]
    fn test_interpretation_by_protocol() {
        assert_eq!(L4Match::for_protocol(0), L4Match::Any);
        assert_eq!(L4Match::for_protocol(1), L4Match::Icmp);
        assert_eq!(L4Match::for_protocol(58), L4Match::Icmp);
        assert_eq!(L4Match::for_protocol(6), L4Match::Transport);
        assert_eq!(L4Match::for_protocol(17), L4Match::Transport);
        assert_eq!(L4Match::Icmp.full_range(), L4Range::ICMP_ALL);
    }
}
