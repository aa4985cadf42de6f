//! Request/reply message surface.
//!
//! Each request maps onto one [`AclManager`] operation. Replies carry a
//! `retval` (0 on success, [`AclError::retval`] otherwise) and echo the
//! identifiers from the request, so a failed replace of handle 432 answers
//! with `acl_index = 432`.

use std::sync::Arc;

use acl_types::InterfaceId;
use serde::{Deserialize, Serialize};

use crate::access_list::AccessList;
use crate::error::{AclError, Result};
use crate::manager::AclManager;
use crate::rule::Rule;
use crate::types::{AclHandle, ALL_ACLS};
use crate::wire::WireRule;

pub const PLUGIN_VERSION_MAJOR: u32 = 1;
pub const PLUGIN_VERSION_MINOR: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclAddReplace {
    /// Existing handle, or [`crate::CREATE_NEW`].
    pub acl_index: u32,
    pub tag: String,
    pub rules: Vec<WireRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclAddReplaceReply {
    pub acl_index: u32,
    pub retval: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclDel {
    pub acl_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclDelReply {
    pub retval: i32,
}

/// Combined list: the first `n_input` handles are INPUT, the rest OUTPUT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclInterfaceSetAclList {
    pub sw_if_index: u32,
    pub count: u8,
    pub n_input: u8,
    pub acls: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclInterfaceSetAclListReply {
    pub retval: i32,
}

/// `acl_index == !0` dumps every ACL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclDump {
    pub acl_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclDetails {
    pub acl_index: u32,
    pub tag: String,
    pub count: u32,
    pub r: Vec<WireRule>,
}

/// `sw_if_index == !0` dumps every bound interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclInterfaceListDump {
    pub sw_if_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclInterfaceListDetails {
    pub sw_if_index: u32,
    pub count: u8,
    pub n_input: u8,
    pub acls: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclPluginGetVersionReply {
    pub major: u32,
    pub minor: u32,
}

fn retval<T>(result: &Result<T>) -> i32 {
    result.as_ref().map_or_else(AclError::retval, |_| 0)
}

/// Converts request rules, reporting the first bad record by index.
pub fn rules_from_wire(rules: &[WireRule]) -> Result<Vec<Rule>> {
    rules
        .iter()
        .enumerate()
        .map(|(index, w)| Rule::try_from(w).map_err(|source| AclError::InvalidRule { index, source }))
        .collect()
}

impl From<&AccessList> for AclDetails {
    fn from(acl: &AccessList) -> Self {
        let r: Vec<WireRule> = acl.rules().iter().map(WireRule::from).collect();
        AclDetails {
            acl_index: acl.handle(),
            tag: acl.tag().to_string(),
            count: u32::try_from(r.len()).unwrap_or(u32::MAX),
            r,
        }
    }
}

/// Message dispatcher in front of an [`AclManager`].
#[derive(Debug, Clone)]
pub struct AclApi {
    manager: Arc<AclManager>,
}

impl AclApi {
    pub fn new(manager: Arc<AclManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<AclManager> {
        &self.manager
    }

    pub fn acl_add_replace(&self, msg: &AclAddReplace) -> AclAddReplaceReply {
        let result = rules_from_wire(&msg.rules)
            .and_then(|rules| self.manager.add_or_replace(msg.acl_index, rules, msg.tag.clone()));
        AclAddReplaceReply {
            acl_index: *result.as_ref().unwrap_or(&msg.acl_index),
            retval: retval(&result),
        }
    }

    pub fn acl_del(&self, msg: &AclDel) -> AclDelReply {
        AclDelReply {
            retval: retval(&self.manager.delete(msg.acl_index)),
        }
    }

    pub fn acl_interface_set_acl_list(
        &self,
        msg: &AclInterfaceSetAclList,
    ) -> AclInterfaceSetAclListReply {
        let result = if usize::from(msg.count) != msg.acls.len() {
            Err(AclError::InvalidAclList(format!(
                "count {} does not match {} handles",
                msg.count,
                msg.acls.len()
            )))
        } else {
            self.manager.set_interface_acl_list(
                InterfaceId::new(msg.sw_if_index),
                usize::from(msg.n_input),
                &msg.acls,
            )
        };
        AclInterfaceSetAclListReply {
            retval: retval(&result),
        }
    }

    /// Unknown handles produce an empty dump.
    pub fn acl_dump(&self, msg: &AclDump) -> Vec<AclDetails> {
        let acls: Vec<Arc<AccessList>> = if msg.acl_index == ALL_ACLS {
            self.manager.dump_all()
        } else {
            self.manager.dump(msg.acl_index).into_iter().collect()
        };
        acls.iter().map(|acl| AclDetails::from(acl.as_ref())).collect()
    }

    pub fn acl_interface_list_dump(&self, msg: &AclInterfaceListDump) -> Vec<AclInterfaceListDetails> {
        let interface = InterfaceId::new(msg.sw_if_index);
        let lists = if interface.is_all() {
            self.manager.interface_acl_lists()
        } else {
            vec![self.manager.interface_acl_list(interface)]
        };
        lists
            .into_iter()
            .map(|list| {
                let mut acls: Vec<AclHandle> = list.combined();
                // Bindings are capped at MAX_INTERFACE_ACLS, so this only
                // trims if that limit is ever raised past one byte.
                let count = u8::try_from(acls.len()).unwrap_or(u8::MAX);
                acls.truncate(usize::from(count));
                let n_input = u8::try_from(list.n_input()).unwrap_or(u8::MAX).min(count);
                AclInterfaceListDetails {
                    sw_if_index: list.interface.index(),
                    count,
                    n_input,
                    acls,
                }
            })
            .collect()
    }

    pub fn acl_plugin_get_version(&self) -> AclPluginGetVersionReply {
        AclPluginGetVersionReply {
            major: PLUGIN_VERSION_MAJOR,
            minor: PLUGIN_VERSION_MINOR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AclConfig;
    use crate::types::{proto, CREATE_NEW};
    use acl_types::IpVersion;
    use pretty_assertions::assert_eq;

    fn api() -> AclApi {
        AclApi::new(Arc::new(AclManager::new(AclConfig::default())))
    }

    fn wire_rules() -> Vec<WireRule> {
        let rule = Rule::permit(IpVersion::V4)
            .with_protocol(proto::UDP)
            .with_dst_port(53);
        vec![WireRule::from(&rule), WireRule::from(&Rule::deny(IpVersion::V6))]
    }

    fn add(api: &AclApi, acl_index: u32, tag: &str) -> AclAddReplaceReply {
        api.acl_add_replace(&AclAddReplace {
            acl_index,
            tag: tag.to_string(),
            rules: wire_rules(),
        })
    }

    #[test]
    fn test_add_replace_handles() {
        let api = api();
        assert_eq!(add(&api, CREATE_NEW, "first"), AclAddReplaceReply { acl_index: 0, retval: 0 });
        assert_eq!(add(&api, CREATE_NEW, "second"), AclAddReplaceReply { acl_index: 1, retval: 0 });
        assert_eq!(add(&api, 432, "missing"), AclAddReplaceReply { acl_index: 432, retval: -1 });
    }

    #[test]
    fn test_add_invalid_wire_rule() {
        let api = api();
        let mut rules = wire_rules();
        rules[1].dst_ip_prefix_len = 200;
        let reply = api.acl_add_replace(&AclAddReplace {
            acl_index: CREATE_NEW,
            tag: String::new(),
            rules,
        });
        assert_eq!(reply.retval, -2);
        assert!(api.acl_dump(&AclDump { acl_index: ALL_ACLS }).is_empty());
    }

    #[test]
    fn test_dump_reads_back_request() {
        let api = api();
        add(&api, CREATE_NEW, "a");
        add(&api, CREATE_NEW, "b");

        let all = api.acl_dump(&AclDump { acl_index: ALL_ACLS });
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].tag, "b");
        assert_eq!(all[1].count, 2);
        assert_eq!(all[1].r, wire_rules());

        let one = api.acl_dump(&AclDump { acl_index: 0 });
        assert_eq!(one.len(), 1);
        assert!(api.acl_dump(&AclDump { acl_index: 7 }).is_empty());
    }

    #[test]
    fn test_interface_set_and_dump() {
        let api = api();
        add(&api, CREATE_NEW, "a");
        add(&api, CREATE_NEW, "b");

        let reply = api.acl_interface_set_acl_list(&AclInterfaceSetAclList {
            sw_if_index: 3,
            count: 2,
            n_input: 1,
            acls: vec![1, 0],
        });
        assert_eq!(reply.retval, 0);

        let details = api.acl_interface_list_dump(&AclInterfaceListDump { sw_if_index: u32::MAX });
        assert_eq!(
            details,
            vec![AclInterfaceListDetails {
                sw_if_index: 3,
                count: 2,
                n_input: 1,
                acls: vec![1, 0],
            }]
        );

        assert_eq!(api.acl_del(&AclDel { acl_index: 1 }).retval, -4);
    }

    #[test]
    fn test_interface_dump_count_matches_handles() {
        let api = api();
        add(&api, CREATE_NEW, "a");
        let manager = api.manager();
        let iface = InterfaceId::new(1);
        manager
            .set_acl_list(iface, acl_types::Direction::Input, vec![0; 200])
            .unwrap();
        assert!(manager
            .set_acl_list(iface, acl_types::Direction::Output, vec![0; 100])
            .is_err());
        manager
            .set_acl_list(iface, acl_types::Direction::Output, vec![0; 55])
            .unwrap();

        let details = api.acl_interface_list_dump(&AclInterfaceListDump { sw_if_index: 1 });
        assert_eq!(details.len(), 1);
        assert_eq!(usize::from(details[0].count), details[0].acls.len());
        assert_eq!(details[0].count, 255);
        assert_eq!(details[0].n_input, 200);
    }

    #[test]
    fn test_interface_set_count_mismatch() {
        let api = api();
        let reply = api.acl_interface_set_acl_list(&AclInterfaceSetAclList {
            sw_if_index: 3,
            count: 3,
            n_input: 1,
            acls: vec![],
        });
        assert_eq!(reply.retval, -3);
    }

    #[test]
    fn test_plugin_version() {
        let reply = api().acl_plugin_get_version();
        assert_eq!((reply.major, reply.minor), (1, 0));
    }

    #[test]
    fn test_details_serialize() {
        let api = api();
        add(&api, CREATE_NEW, "json");
        let details = api.acl_dump(&AclDump { acl_index: 0 });
        let json = serde_json::to_string(&details[0]).unwrap();
        assert!(json.contains("\"tag\":\"json\""));
        assert!(json.contains("\"dstport_or_icmpcode_first\":53"));
    }
}
