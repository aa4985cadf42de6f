//! AclManager - control plane for ACLs and interface bindings.
//!
//! The manager validates requests, applies them to the [`AclTable`] one at
//! a time, and keeps statistics. Every successful request publishes exactly
//! one new snapshot; a rejected request publishes nothing.

use std::sync::Arc;

use acl_types::{Direction, InterfaceId};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::access_list::AccessList;
use crate::binding::InterfaceAclList;
use crate::classifier::Classifier;
use crate::config::AclConfig;
use crate::error::{AclError, Result};
use crate::rule::Rule;
use crate::table::{AclTable, TableSnapshot};
use crate::types::{Action, AclHandle, PacketKey, CREATE_NEW, MAX_INTERFACE_ACLS};

/// Hooks into the rest of the dataplane.
#[derive(Clone, Default)]
pub struct AclManagerCallbacks {
    /// Returns whether an interface exists. Without it every interface is accepted.
    pub interface_exists: Option<Arc<dyn Fn(InterfaceId) -> bool + Send + Sync>>,
}

impl std::fmt::Debug for AclManagerCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AclManagerCallbacks")
            .field("interface_exists", &self.interface_exists.is_some())
            .finish()
    }
}

/// Statistics for control-plane operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AclStats {
    /// Number of ACLs created.
    pub acls_created: u64,
    /// Number of ACLs replaced in place.
    pub acls_replaced: u64,
    /// Number of ACLs deleted.
    pub acls_deleted: u64,
    /// Number of applied binding changes.
    pub binding_updates: u64,
    /// Number of rejected requests.
    pub requests_rejected: u64,
}

/// Control-plane manager for ACLs and bindings.
#[derive(Debug)]
pub struct AclManager {
    config: AclConfig,
    callbacks: Option<Arc<AclManagerCallbacks>>,
    table: Arc<AclTable>,
    stats: Mutex<AclStats>,
}

impl AclManager {
    /// Creates a manager over a fresh, empty table.
    pub fn new(config: AclConfig) -> Self {
        Self::with_table(config, Arc::new(AclTable::new()))
    }

    pub fn with_table(config: AclConfig, table: Arc<AclTable>) -> Self {
        Self {
            config,
            callbacks: None,
            table,
            stats: Mutex::new(AclStats::default()),
        }
    }

    /// Sets the callbacks.
    pub fn set_callbacks(&mut self, callbacks: AclManagerCallbacks) {
        self.callbacks = Some(Arc::new(callbacks));
    }

    pub fn config(&self) -> &AclConfig {
        &self.config
    }

    /// The table the dataplane reads.
    pub fn table(&self) -> &Arc<AclTable> {
        &self.table
    }

    /// A dataplane classifier over this manager's table.
    pub fn classifier(&self) -> Classifier {
        Classifier::new(Arc::clone(&self.table), self.config.policy())
    }

    pub fn stats(&self) -> AclStats {
        self.stats.lock().clone()
    }

    // ============ ACL Operations ============

    /// Creates an ACL (`handle == CREATE_NEW`) or replaces one in place.
    ///
    /// Replacement keeps the handle and every binding that references it;
    /// the new rules take effect for all of them in the same publication.
    pub fn add_or_replace(
        &self,
        handle: AclHandle,
        rules: Vec<Rule>,
        tag: impl Into<String>,
    ) -> Result<AclHandle> {
        let tag = tag.into();
        let max_acls = self.config.limits.max_acls;

        let result = validate_acl(&rules, &tag, self.config.limits.max_tag_len).and_then(|()| {
            self.table.update(|snap| {
                let (handle, created) = if handle == CREATE_NEW {
                    if snap.acl_count() >= max_acls {
                        return Err(AclError::Exhausted(snap.acl_count()));
                    }
                    let handle = snap
                        .allocate_handle()
                        .ok_or_else(|| AclError::Exhausted(snap.acl_count()))?;
                    (handle, true)
                } else if snap.contains_acl(handle) {
                    (handle, false)
                } else {
                    return Err(AclError::NotFound { handle });
                };
                let rule_count = rules.len();
                snap.put_acl(AccessList::new(handle, rules, tag));
                Ok((handle, created, rule_count))
            })
        });

        let (handle, created, rule_count) = self.finish("add_replace", handle, result)?;
        let mut stats = self.stats.lock();
        if created {
            stats.acls_created += 1;
            info!(acl_index = handle, rules = rule_count, "ACL created");
        } else {
            stats.acls_replaced += 1;
            info!(acl_index = handle, rules = rule_count, "ACL replaced");
        }
        Ok(handle)
    }

    /// Deletes an ACL that no binding references.
    pub fn delete(&self, handle: AclHandle) -> Result<()> {
        let result = self.table.update(|snap| {
            if !snap.contains_acl(handle) {
                return Err(AclError::NotFound { handle });
            }
            let bound_to = snap.referencing(handle);
            if !bound_to.is_empty() {
                return Err(AclError::InUse { handle, bound_to });
            }
            snap.remove_acl(handle);
            Ok(())
        });

        self.finish("delete", handle, result)?;
        self.stats.lock().acls_deleted += 1;
        info!(acl_index = handle, "ACL deleted");
        Ok(())
    }

    /// Returns one ACL exactly as last stored.
    pub fn dump(&self, handle: AclHandle) -> Result<Arc<AccessList>> {
        self.table
            .load()
            .acl(handle)
            .cloned()
            .ok_or(AclError::NotFound { handle })
    }

    /// All ACLs, ordered by handle.
    pub fn dump_all(&self) -> Vec<Arc<AccessList>> {
        self.table.load().acls()
    }

    // ============ Binding Operations ============

    /// Replaces the ACL list of one interface and direction.
    ///
    /// An empty list removes the binding.
    pub fn set_acl_list(
        &self,
        interface: InterfaceId,
        direction: Direction,
        acls: Vec<AclHandle>,
    ) -> Result<()> {
        let count = acls.len();
        let result = self.check_interface(interface).and_then(|()| {
            self.table.update(|snap| {
                let other = snap
                    .binding(interface, direction.opposite())
                    .map_or(0, |b| b.binding().acls().len());
                check_interface_capacity(acls.len() + other)?;
                snap.set_binding(interface, direction, acls)
                    .map_err(|handle| AclError::NotFound { handle })
            })
        });

        self.finish("set_acl_list", interface.index(), result)?;
        self.stats.lock().binding_updates += 1;
        info!(
            sw_if_index = interface.index(),
            %direction,
            acls = count,
            "ACL list updated"
        );
        Ok(())
    }

    /// Replaces both lists of an interface from the combined form.
    ///
    /// The first `n_input` handles become the INPUT list and the rest the
    /// OUTPUT list. Both directions change in the same publication.
    pub fn set_interface_acl_list(
        &self,
        interface: InterfaceId,
        n_input: usize,
        acls: &[AclHandle],
    ) -> Result<()> {
        let result = check_interface_capacity(acls.len())
            .and_then(|()| {
                InterfaceAclList::from_combined(interface, n_input, acls).ok_or_else(|| {
                    AclError::InvalidAclList(format!(
                        "n_input {} exceeds count {}",
                        n_input,
                        acls.len()
                    ))
                })
            })
            .and_then(|list| self.check_interface(interface).map(|()| list))
            .and_then(|list| {
                self.table.update(|snap| {
                    for direction in Direction::ALL {
                        let handles = list.direction(direction).to_vec();
                        snap.set_binding(interface, direction, handles)
                            .map_err(|handle| AclError::NotFound { handle })?;
                    }
                    Ok(())
                })
            });

        self.finish("set_interface_acl_list", interface.index(), result)?;
        self.stats.lock().binding_updates += 1;
        info!(
            sw_if_index = interface.index(),
            n_input,
            count = acls.len(),
            "interface ACL lists updated"
        );
        Ok(())
    }

    /// Current list at one attachment point (empty if unbound).
    pub fn acl_list(&self, interface: InterfaceId, direction: Direction) -> Vec<AclHandle> {
        self.table
            .load()
            .binding(interface, direction)
            .map(|b| b.binding().acls().to_vec())
            .unwrap_or_default()
    }

    /// Both lists of one interface.
    pub fn interface_acl_list(&self, interface: InterfaceId) -> InterfaceAclList {
        interface_lists(&self.table.load(), interface)
    }

    /// Lists of every interface with at least one binding, by interface.
    pub fn interface_acl_lists(&self) -> Vec<InterfaceAclList> {
        let snap = self.table.load();
        let mut interfaces: Vec<_> = snap
            .bindings()
            .iter()
            .map(|b| b.binding().interface())
            .collect();
        interfaces.dedup();
        interfaces
            .into_iter()
            .map(|interface| interface_lists(&snap, interface))
            .collect()
    }

    /// Classifies one packet with the configured policy.
    pub fn classify(&self, key: &PacketKey, interface: InterfaceId, direction: Direction) -> Action {
        self.classifier().classify(key, interface, direction)
    }

    // ============ Helpers ============

    fn check_interface(&self, interface: InterfaceId) -> Result<()> {
        let known = !interface.is_all()
            && self
                .callbacks
                .as_ref()
                .and_then(|cb| cb.interface_exists.as_ref())
                .map_or(true, |exists| exists(interface));
        if known {
            Ok(())
        } else {
            Err(AclError::InterfaceNotFound(interface))
        }
    }

    fn finish<T>(&self, op: &'static str, id: u32, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.stats.lock().requests_rejected += 1;
            warn!(op, id, kind = ?e.kind(), error = %e, "ACL request rejected");
        }
        result
    }
}

/// Structural checks that need no table state.
pub(crate) fn validate_acl(rules: &[Rule], tag: &str, max_tag_len: usize) -> Result<()> {
    if tag.len() > max_tag_len {
        return Err(AclError::InvalidTag {
            len: tag.len(),
            max: max_tag_len,
        });
    }
    for (index, rule) in rules.iter().enumerate() {
        rule.validate()
            .map_err(|source| AclError::InvalidRule { index, source })?;
    }
    Ok(())
}

/// Rejects interface lists the interface list dump cannot describe.
pub(crate) fn check_interface_capacity(count: usize) -> Result<()> {
    if count > MAX_INTERFACE_ACLS {
        return Err(AclError::InvalidAclList(format!(
            "{} ACLs on one interface, limit is {}",
            count, MAX_INTERFACE_ACLS
        )));
    }
    Ok(())
}

fn interface_lists(snap: &TableSnapshot, interface: InterfaceId) -> InterfaceAclList {
    let mut list = InterfaceAclList::new(interface);
    for direction in Direction::ALL {
        if let Some(b) = snap.binding(interface, direction) {
            let handles = b.binding().acls().to_vec();
            match direction {
                Direction::Input => list.input = handles,
                Direction::Output => list.output = handles,
            }
        }
    }
    list
}
