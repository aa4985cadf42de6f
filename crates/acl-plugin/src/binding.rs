//! Interface bindings: which access lists apply where, and in what order.

use std::fmt;

use acl_types::{Direction, InterfaceId};
use serde::{Deserialize, Serialize};

use crate::types::{AclHandle, BindingKey};

/// Ordered list of ACL handles attached to one interface in one direction.
///
/// Order is evaluation order. A binding is replaced wholesale on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceBinding {
    interface: InterfaceId,
    direction: Direction,
    acls: Vec<AclHandle>,
}

impl InterfaceBinding {
    pub fn new(interface: InterfaceId, direction: Direction, acls: Vec<AclHandle>) -> Self {
        Self {
            interface,
            direction,
            acls,
        }
    }

    pub const fn interface(&self) -> InterfaceId {
        self.interface
    }

    pub const fn direction(&self) -> Direction {
        self.direction
    }

    pub const fn key(&self) -> BindingKey {
        (self.interface, self.direction)
    }

    pub fn acls(&self) -> &[AclHandle] {
        &self.acls
    }

    pub fn references(&self, handle: AclHandle) -> bool {
        self.acls.contains(&handle)
    }
}

impl fmt::Display for InterfaceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {:?}", self.interface, self.direction, self.acls)
    }
}

/// Both directions of one interface, as reported by the interface list dump.
///
/// The combined form lists input handles first, then output handles, with
/// `n_input` marking the split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceAclList {
    pub interface: InterfaceId,
    pub input: Vec<AclHandle>,
    pub output: Vec<AclHandle>,
}

impl InterfaceAclList {
    pub fn new(interface: InterfaceId) -> Self {
        Self {
            interface,
            input: Vec::new(),
            output: Vec::new(),
        }
    }

    /// Splits a combined list at `n_input`.
    ///
    /// Returns `None` if `n_input` exceeds the list length.
    pub fn from_combined(interface: InterfaceId, n_input: usize, acls: &[AclHandle]) -> Option<Self> {
        if n_input > acls.len() {
            return None;
        }
        let (input, output) = acls.split_at(n_input);
        Some(Self {
            interface,
            input: input.to_vec(),
            output: output.to_vec(),
        })
    }

    pub fn n_input(&self) -> usize {
        self.input.len()
    }

    /// Input handles followed by output handles.
    pub fn combined(&self) -> Vec<AclHandle> {
        self.input.iter().chain(self.output.iter()).copied().collect()
    }

    pub fn direction(&self, direction: Direction) -> &[AclHandle] {
        match direction {
            Direction::Input => &self.input,
            Direction::Output => &self.output,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }
}
