//! Async control-plane request queue.
//!
//! [`ControlPlane::spawn`] starts a worker that owns the mutation side of an
//! [`AclManager`] and applies queued requests strictly in submission
//! order. [`ControlClient`]s are cheap to clone; each call enqueues one
//! request and waits for its reply. Requests that are structurally invalid
//! are answered by the client immediately and never queued.

use std::sync::Arc;

use acl_types::{Direction, InterfaceId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AclError, Result};
use crate::manager::{check_interface_capacity, validate_acl, AclManager};
use crate::rule::Rule;
use crate::types::AclHandle;

/// A queued mutation and the channel its outcome goes back on.
#[derive(Debug)]
pub enum AclRequest {
    AddOrReplace {
        handle: AclHandle,
        rules: Vec<Rule>,
        tag: String,
        reply: oneshot::Sender<Result<AclHandle>>,
    },
    Delete {
        handle: AclHandle,
        reply: oneshot::Sender<Result<()>>,
    },
    SetAclList {
        interface: InterfaceId,
        direction: Direction,
        acls: Vec<AclHandle>,
        reply: oneshot::Sender<Result<()>>,
    },
    SetInterfaceAclList {
        interface: InterfaceId,
        n_input: usize,
        acls: Vec<AclHandle>,
        reply: oneshot::Sender<Result<()>>,
    },
}

impl AclRequest {
    fn apply(self, manager: &AclManager) {
        // A dropped receiver means the caller stopped waiting; the change
        // is applied regardless.
        match self {
            AclRequest::AddOrReplace {
                handle,
                rules,
                tag,
                reply,
            } => {
                let _ = reply.send(manager.add_or_replace(handle, rules, tag));
            }
            AclRequest::Delete { handle, reply } => {
                let _ = reply.send(manager.delete(handle));
            }
            AclRequest::SetAclList {
                interface,
                direction,
                acls,
                reply,
            } => {
                let _ = reply.send(manager.set_acl_list(interface, direction, acls));
            }
            AclRequest::SetInterfaceAclList {
                interface,
                n_input,
                acls,
                reply,
            } => {
                let _ = reply.send(manager.set_interface_acl_list(interface, n_input, &acls));
            }
        }
    }
}

/// Owner of the request worker.
pub struct ControlPlane;

impl ControlPlane {
    /// Starts the worker on the current tokio runtime.
    ///
    /// The worker exits once every client has been dropped.
    pub fn spawn(manager: Arc<AclManager>) -> (ControlClient, JoinHandle<()>) {
        let depth = manager.config().control.queue_depth;
        let max_tag_len = manager.config().limits.max_tag_len;
        let (tx, rx) = mpsc::channel(depth);
        let worker = tokio::spawn(run(manager, rx));
        info!(queue_depth = depth, "ACL control plane started");
        (ControlClient { tx, max_tag_len }, worker)
    }
}

async fn run(manager: Arc<AclManager>, mut rx: mpsc::Receiver<AclRequest>) {
    let mut processed: u64 = 0;
    while let Some(request) = rx.recv().await {
        request.apply(&manager);
        processed += 1;
    }
    debug!(processed, "ACL control plane stopped");
}

/// Submits requests to a running [`ControlPlane`].
#[derive(Debug, Clone)]
pub struct ControlClient {
    tx: mpsc::Sender<AclRequest>,
    max_tag_len: usize,
}

impl ControlClient {
    pub async fn add_or_replace(
        &self,
        handle: AclHandle,
        rules: Vec<Rule>,
        tag: impl Into<String>,
    ) -> Result<AclHandle> {
        let tag = tag.into();
        if let Err(e) = validate_acl(&rules, &tag, self.max_tag_len) {
            warn!(acl_index = handle, error = %e, "ACL request rejected before queueing");
            return Err(e);
        }
        self.submit(|reply| AclRequest::AddOrReplace {
            handle,
            rules,
            tag,
            reply,
        })
        .await
    }

    pub async fn delete(&self, handle: AclHandle) -> Result<()> {
        self.submit(|reply| AclRequest::Delete { handle, reply }).await
    }

    pub async fn set_acl_list(
        &self,
        interface: InterfaceId,
        direction: Direction,
        acls: Vec<AclHandle>,
    ) -> Result<()> {
        self.submit(|reply| AclRequest::SetAclList {
            interface,
            direction,
            acls,
            reply,
        })
        .await
    }

    pub async fn set_interface_acl_list(
        &self,
        interface: InterfaceId,
        n_input: usize,
        acls: Vec<AclHandle>,
    ) -> Result<()> {
        check_interface_capacity(acls.len())?;
        if n_input > acls.len() {
            return Err(AclError::InvalidAclList(format!(
                "n_input {} exceeds count {}",
                n_input,
                acls.len()
            )));
        }
        self.submit(|reply| AclRequest::SetInterfaceAclList {
            interface,
            n_input,
            acls,
            reply,
        })
        .await
    }

    async fn submit<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> AclRequest,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| AclError::ShutDown)?;
        response.await.map_err(|_| AclError::ShutDown)?
    }
}
