//! Interface identifiers and attachment directions.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dataplane interface index (`sw_if_index`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterfaceId(u32);

impl InterfaceId {
    /// Wildcard index used by dump requests to mean "every interface".
    pub const ALL: InterfaceId = InterfaceId(u32::MAX);

    pub const fn new(index: u32) -> Self {
        InterfaceId(index)
    }

    pub const fn index(&self) -> u32 {
        self.0
    }

    pub const fn is_all(&self) -> bool {
        self.0 == u32::MAX
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if{}", self.0)
    }
}

impl From<u32> for InterfaceId {
    fn from(index: u32) -> Self {
        InterfaceId(index)
    }
}

/// Direction at which an ACL list is attached to an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Packets received on the interface.
    #[default]
    Input,
    /// Packets transmitted on the interface.
    Output,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Input, Direction::Output];

    /// The other direction of the same interface.
    pub const fn opposite(&self) -> Direction {
        match self {
            Direction::Input => Direction::Output,
            Direction::Output => Direction::Input,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "INPUT"),
            Self::Output => write!(f, "OUTPUT"),
        }
    }
}

impl FromStr for Direction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INPUT" | "IN" | "INGRESS" => Ok(Self::Input),
            "OUTPUT" | "OUT" | "EGRESS" => Ok(Self::Output),
            _ => Err(ParseError::InvalidDirection(s.to_string())),
        }
    }
}
