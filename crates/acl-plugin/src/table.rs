//! ACL table: the published, immutable view the dataplane reads.
//!
//! The table holds one [`TableSnapshot`] behind an [`ArcSwap`]. Readers
//! `load()` it without locking and keep using that snapshot for the rest
//! of their packet (or burst). Writers go through [`AclTable::update`],
//! which serializes them, applies the change to a private copy, and
//! publishes the copy in a single store. A reader therefore sees either
//! the old or the new state of every ACL and every binding, never a mix.

use std::fmt;
use std::sync::Arc;

use acl_types::{Direction, InterfaceId};
use ahash::AHashMap;
use arc_swap::{ArcSwap, Guard};
use parking_lot::Mutex;
use tracing::debug;

use crate::access_list::AccessList;
use crate::binding::InterfaceBinding;
use crate::classifier::LookupPlan;
use crate::types::{AclHandle, BindingKey, CREATE_NEW};

/// A binding with its ACLs resolved and compiled.
#[derive(Debug, Clone)]
pub struct CompiledBinding {
    binding: InterfaceBinding,
    access_lists: Vec<Arc<AccessList>>,
    plan: LookupPlan,
}

impl CompiledBinding {
    /// Resolves every handle through `resolve` and compiles the plan.
    ///
    /// Returns the first handle `resolve` does not know.
    fn compile(
        binding: InterfaceBinding,
        resolve: impl Fn(AclHandle) -> Option<Arc<AccessList>>,
    ) -> Result<Self, AclHandle> {
        let access_lists = binding
            .acls()
            .iter()
            .map(|&handle| resolve(handle).ok_or(handle))
            .collect::<Result<Vec<_>, _>>()?;
        let plan = LookupPlan::compile(access_lists.iter().map(Arc::as_ref));
        Ok(Self {
            binding,
            access_lists,
            plan,
        })
    }

    pub fn binding(&self) -> &InterfaceBinding {
        &self.binding
    }

    /// Bound ACLs in evaluation order.
    pub fn access_lists(&self) -> &[Arc<AccessList>] {
        &self.access_lists
    }

    pub fn plan(&self) -> &LookupPlan {
        &self.plan
    }
}

/// Everything the classifier needs, frozen at one point in time.
#[derive(Debug, Clone, Default)]
pub struct TableSnapshot {
    version: u64,
    next_handle: AclHandle,
    acls: AHashMap<AclHandle, Arc<AccessList>>,
    bindings: AHashMap<BindingKey, Arc<CompiledBinding>>,
}

impl TableSnapshot {
    /// Publication counter; 0 for the initial empty table.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn acl(&self, handle: AclHandle) -> Option<&Arc<AccessList>> {
        self.acls.get(&handle)
    }

    pub fn contains_acl(&self, handle: AclHandle) -> bool {
        self.acls.contains_key(&handle)
    }

    pub fn acl_count(&self) -> usize {
        self.acls.len()
    }

    /// All ACLs, ordered by handle.
    pub fn acls(&self) -> Vec<Arc<AccessList>> {
        let mut acls: Vec<_> = self.acls.values().cloned().collect();
        acls.sort_by_key(|acl| acl.handle());
        acls
    }

    pub fn binding(&self, interface: InterfaceId, direction: Direction) -> Option<&Arc<CompiledBinding>> {
        self.bindings.get(&(interface, direction))
    }

    /// All bindings, ordered by interface then direction.
    pub fn bindings(&self) -> Vec<Arc<CompiledBinding>> {
        let mut bindings: Vec<_> = self.bindings.values().cloned().collect();
        bindings.sort_by_key(|b| b.binding().key());
        bindings
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Attachment points whose list contains `handle`, sorted.
    pub fn referencing(&self, handle: AclHandle) -> Vec<BindingKey> {
        let mut keys: Vec<_> = self
            .bindings
            .iter()
            .filter(|(_, b)| b.binding().references(handle))
            .map(|(key, _)| *key)
            .collect();
        keys.sort();
        keys
    }

    // ============ Mutation (writer copy only) ============

    /// Hands out the next handle, or `None` once the space is used up.
    pub(crate) fn allocate_handle(&mut self) -> Option<AclHandle> {
        if self.next_handle == CREATE_NEW {
            return None;
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        Some(handle)
    }

    /// Inserts or replaces an ACL and recompiles the bindings that use it.
    pub(crate) fn put_acl(&mut self, acl: AccessList) {
        let handle = acl.handle();
        self.acls.insert(handle, Arc::new(acl));
        self.recompile_referencing(handle);
    }

    /// Removes an ACL. Callers check [`TableSnapshot::referencing`] first.
    pub(crate) fn remove_acl(&mut self, handle: AclHandle) -> Option<Arc<AccessList>> {
        self.acls.remove(&handle)
    }

    /// Replaces the list at one attachment point; an empty list unbinds.
    ///
    /// Fails with the first handle that is not present.
    pub(crate) fn set_binding(
        &mut self,
        interface: InterfaceId,
        direction: Direction,
        acls: Vec<AclHandle>,
    ) -> Result<(), AclHandle> {
        let key = (interface, direction);
        if acls.is_empty() {
            self.bindings.remove(&key);
            return Ok(());
        }
        let compiled = CompiledBinding::compile(
            InterfaceBinding::new(interface, direction, acls),
            |handle| self.acls.get(&handle).cloned(),
        )?;
        self.bindings.insert(key, Arc::new(compiled));
        Ok(())
    }

    fn recompile_referencing(&mut self, handle: AclHandle) {
        for key in self.referencing(handle) {
            let Some(current) = self.bindings.get(&key) else {
                continue;
            };
            let binding = current.binding().clone();
            // Every handle of a published binding exists in `acls`.
            if let Ok(compiled) = CompiledBinding::compile(binding, |h| self.acls.get(&h).cloned()) {
                self.bindings.insert(key, Arc::new(compiled));
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn with_next_handle(next_handle: AclHandle) -> Self {
        Self {
            next_handle,
            ..Default::default()
        }
    }
}

/// Published ACL state shared between the control plane and the dataplane.
pub struct AclTable {
    current: ArcSwap<TableSnapshot>,
    writer: Mutex<()>,
}

impl AclTable {
    pub fn new() -> Self {
        Self::from_snapshot(TableSnapshot::default())
    }

    pub(crate) fn from_snapshot(snapshot: TableSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
            writer: Mutex::new(()),
        }
    }

    /// Lock-free read of the current snapshot.
    #[inline]
    pub fn load(&self) -> Guard<Arc<TableSnapshot>> {
        self.current.load()
    }

    /// Owned handle to the current snapshot, for long-lived readers.
    pub fn snapshot(&self) -> Arc<TableSnapshot> {
        self.current.load_full()
    }

    /// Applies `change` to a copy of the current snapshot and publishes it.
    ///
    /// Writers are serialized. Nothing is published if `change` fails, so
    /// a rejected request leaves the table untouched.
    pub fn update<R, E>(
        &self,
        change: impl FnOnce(&mut TableSnapshot) -> Result<R, E>,
    ) -> Result<R, E> {
        let _writer = self.writer.lock();
        let mut next = TableSnapshot::clone(&self.current.load());
        let result = change(&mut next)?;
        next.version += 1;
        debug!(
            version = next.version,
            acls = next.acls.len(),
            bindings = next.bindings.len(),
            "publishing ACL snapshot"
        );
        self.current.store(Arc::new(next));
        Ok(result)
    }
}

impl Default for AclTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AclTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.load();
        f.debug_struct("AclTable")
            .field("version", &snapshot.version)
            .field("acls", &snapshot.acls.len())
            .field("bindings", &snapshot.bindings.len())
            .finish()
    }
}
