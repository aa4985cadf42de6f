//! Stateless ACL packet classification with atomic control-plane updates.
//!
//! This crate keeps ordered access lists, attaches them to interfaces per
//! direction, and classifies packets against them:
//!
//! - [`Rule`] / [`AccessList`]: immutable match specifications, first match wins
//! - [`AclTable`]: the published [`TableSnapshot`], swapped atomically on every change
//! - [`Classifier`]: lock-free dataplane reads through a compiled [`LookupPlan`]
//! - [`AclManager`]: validated, serialized control-plane mutations
//! - [`ControlPlane`]: async request queue in front of the manager
//! - [`api`]: request/reply messages and the fixed-layout [`WireRule`] record
//!
//! # Evaluation
//!
//! For a packet on an interface and direction, the bound ACLs are evaluated
//! in list order and each ACL's rules in rule order. The first matching
//! rule decides. If the interface/direction has no binding the packet is
//! permitted; if it has one and nothing matches the configured default
//! (deny unless configured otherwise) applies.
//!
//! # Example
//!
//! ```
//! use acl_plugin::{AclConfig, AclManager, Action, PacketKey, Rule, CREATE_NEW};
//! use acl_plugin::proto;
//! use acl_types::{Direction, InterfaceId, IpVersion};
//!
//! let manager = AclManager::new(AclConfig::default());
//! let ssh = Rule::permit(IpVersion::V4).with_protocol(proto::TCP).with_dst_port(22);
//! let acl = manager.add_or_replace(CREATE_NEW, vec![ssh], "ssh-only").unwrap();
//! manager.set_acl_list(InterfaceId::new(1), Direction::Input, vec![acl]).unwrap();
//!
//! let classifier = manager.classifier();
//! let src = "10.0.0.1".parse().unwrap();
//! let dst = "10.0.0.2".parse().unwrap();
//! let key = PacketKey::tcp(src, dst, 40000, 22);
//! assert_eq!(classifier.classify(&key, InterfaceId::new(1), Direction::Input), Action::Permit);
//! ```

pub mod access_list;
pub mod api;
pub mod binding;
pub mod classifier;
pub mod config;
pub mod control;
pub mod error;
pub mod manager;
pub mod range;
pub mod rule;
pub mod table;
pub mod types;
pub mod wire;

pub use access_list::AccessList;
pub use api::AclApi;
pub use binding::{InterfaceAclList, InterfaceBinding};
pub use classifier::{classify_linear, Classifier, ClassifierPolicy, LookupPlan, RuleHit, Verdict};
pub use config::{AclConfig, ConfigError};
pub use control::{AclRequest, ControlClient, ControlPlane};
pub use error::{AclError, ErrorKind, Result};
pub use manager::{AclManager, AclManagerCallbacks, AclStats};
pub use range::{L4Match, L4Range};
pub use rule::{Rule, RuleError};
pub use table::{AclTable, CompiledBinding, TableSnapshot};
pub use types::{
    proto, Action, AclHandle, BindingKey, PacketKey, ALL_ACLS, CREATE_NEW, MAX_INTERFACE_ACLS,
};
pub use wire::{WireError, WireRule};
