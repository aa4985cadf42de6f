//! Access lists: ordered rule sequences addressed by handle.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rule::Rule;
use crate::types::{AclHandle, PacketKey};

/// An ordered list of rules with a handle and an opaque tag.
///
/// Rule order is significant: the first matching rule decides. An access
/// list is never mutated after publication; a replace builds a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessList {
    handle: AclHandle,
    tag: String,
    rules: Vec<Rule>,
}

impl AccessList {
    pub fn new(handle: AclHandle, rules: Vec<Rule>, tag: impl Into<String>) -> Self {
        Self {
            handle,
            tag: tag.into(),
            rules,
        }
    }

    pub const fn handle(&self) -> AclHandle {
        self.handle
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Index and rule of the first rule matching `key`.
    pub fn first_match(&self, key: &PacketKey) -> Option<(usize, &Rule)> {
        self.rules.iter().enumerate().find(|(_, rule)| rule.matches(key))
    }
}

impl fmt::Display for AccessList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acl {} [{}] ({} rules)", self.handle, self.tag, self.rules.len())
    }
}
