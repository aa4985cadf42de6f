//! Error types for the ACL control plane.

use acl_types::InterfaceId;
use thiserror::Error;

use crate::rule::RuleError;
use crate::types::{AclHandle, BindingKey};

/// Coarse classification of control-plane failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Referenced handle or interface does not exist.
    NotFound,
    /// ACL cannot be removed while a binding references it.
    InUse,
    /// Request content is malformed.
    InvalidRule,
    /// No handle could be allocated.
    Exhausted,
    /// The control plane is not accepting requests.
    Unavailable,
}

/// ACL control-plane errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    #[error("ACL {handle} not found")]
    NotFound { handle: AclHandle },

    #[error("interface {0} not found")]
    InterfaceNotFound(InterfaceId),

    #[error("ACL {handle} is in use by {} binding(s)", bound_to.len())]
    InUse {
        handle: AclHandle,
        bound_to: Vec<BindingKey>,
    },

    #[error("rule {index} rejected: {source}")]
    InvalidRule { index: usize, source: RuleError },

    #[error("tag is {len} bytes, limit is {max}")]
    InvalidTag { len: usize, max: usize },

    #[error("invalid ACL list: {0}")]
    InvalidAclList(String),

    #[error("ACL handle space exhausted ({0} live ACLs)")]
    Exhausted(usize),

    #[error("control plane is shut down")]
    ShutDown,
}

impl AclError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AclError::NotFound { .. } | AclError::InterfaceNotFound(_) => ErrorKind::NotFound,
            AclError::InUse { .. } => ErrorKind::InUse,
            AclError::InvalidRule { .. } | AclError::InvalidTag { .. } | AclError::InvalidAclList(_) => {
                ErrorKind::InvalidRule
            }
            AclError::Exhausted(_) => ErrorKind::Exhausted,
            AclError::ShutDown => ErrorKind::Unavailable,
        }
    }

    /// Status code carried in API replies.
    pub fn retval(&self) -> i32 {
        match self {
            AclError::NotFound { .. } => -1,
            AclError::InvalidRule { .. } | AclError::InvalidTag { .. } => -2,
            AclError::InvalidAclList(_) => -3,
            AclError::InUse { .. } => -4,
            AclError::InterfaceNotFound(_) => -5,
            AclError::Exhausted(_) => -6,
            AclError::ShutDown => -7,
        }
    }
}

/// Result type for ACL control-plane operations.
pub type Result<T> = std::result::Result<T, AclError>;
