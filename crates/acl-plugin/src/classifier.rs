//! Packet classification.
//!
//! Every binding in a published snapshot carries a [`LookupPlan`]: its
//! ACLs' rules flattened in evaluation order (ACL list order, then rule
//! order) and indexed by IP version and protocol. A lookup only visits the
//! rules that could match the packet's protocol, in their original order,
//! so the first hit is the same rule a linear scan would find.
//!
//! [`classify_linear`] is that linear scan. It is the reference the index
//! is tested against and the fallback when indexing is disabled.

use std::sync::Arc;

use acl_types::{Direction, InterfaceId, IpVersion};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::access_list::AccessList;
use crate::range::{L4Match, L4Range};
use crate::rule::Rule;
use crate::table::{AclTable, TableSnapshot};
use crate::types::{proto, Action, AclHandle, PacketKey};

/// The rule that decided a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleHit {
    pub acl: AclHandle,
    pub rule_index: usize,
    pub action: Action,
}

/// Result of classifying one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub action: Action,
    /// Matching rule; `None` when a default decided.
    pub hit: Option<RuleHit>,
    /// Whether the interface/direction had a binding.
    pub bound: bool,
}

/// Default decisions and evaluation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierPolicy {
    /// Decision when a binding exists but no rule matches.
    pub no_match: Action,
    /// Decision when the interface/direction has no binding.
    pub unbound: Action,
    /// Use the compiled index instead of the linear scan.
    pub use_index: bool,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            no_match: Action::Deny,
            unbound: Action::Permit,
            use_index: true,
        }
    }
}

// ============ Compiled Rules ============

#[derive(Debug, Clone)]
struct CompiledRule {
    acl: AclHandle,
    rule_index: u32,
    action: Action,
    protocol: u8,
    l4: L4Match,
    src_net: u128,
    src_mask: u128,
    dst_net: u128,
    dst_mask: u128,
    src_range: L4Range,
    dst_range: L4Range,
}

impl CompiledRule {
    fn new(acl: AclHandle, rule_index: u32, rule: &Rule) -> Self {
        Self {
            acl,
            rule_index,
            action: rule.action(),
            protocol: rule.protocol(),
            l4: rule.l4_match(),
            src_net: rule.src_prefix().network_bits(),
            src_mask: rule.src_prefix().mask(),
            dst_net: rule.dst_prefix().network_bits(),
            dst_mask: rule.dst_prefix().mask(),
            src_range: rule.src_range(),
            dst_range: rule.dst_range(),
        }
    }

    /// Family is already selected by the index.
    #[inline]
    fn matches(&self, key: &PacketKey) -> bool {
        if self.protocol != proto::ANY && self.protocol != key.protocol {
            return false;
        }
        if key.src_addr & self.src_mask != self.src_net || key.dst_addr & self.dst_mask != self.dst_net {
            return false;
        }
        match self.l4 {
            L4Match::Any => true,
            L4Match::Icmp | L4Match::Transport => {
                self.src_range.contains(key.src_port) && self.dst_range.contains(key.dst_port)
            }
        }
    }

    fn hit(&self) -> RuleHit {
        RuleHit {
            acl: self.acl,
            rule_index: self.rule_index as usize,
            action: self.action,
        }
    }
}

/// Positions of one family's rules, grouped by protocol.
///
/// Wildcard-protocol rules appear in `wildcard` and in every protocol
/// list; every list is in ascending position order.
#[derive(Debug, Clone, Default)]
struct FamilyIndex {
    by_protocol: AHashMap<u8, Vec<u32>>,
    wildcard: Vec<u32>,
}

impl FamilyIndex {
    fn push(&mut self, protocol: u8, position: u32) {
        if protocol == proto::ANY {
            self.wildcard.push(position);
            for positions in self.by_protocol.values_mut() {
                positions.push(position);
            }
        } else {
            let wildcard = &self.wildcard;
            self.by_protocol
                .entry(protocol)
                .or_insert_with(|| wildcard.clone())
                .push(position);
        }
    }

    fn candidates(&self, protocol: u8) -> &[u32] {
        self.by_protocol
            .get(&protocol)
            .map(Vec::as_slice)
            .unwrap_or(&self.wildcard)
    }
}

/// Compiled, indexed form of an ordered ACL sequence.
#[derive(Debug, Clone, Default)]
pub struct LookupPlan {
    rules: Vec<CompiledRule>,
    v4: FamilyIndex,
    v6: FamilyIndex,
}

impl LookupPlan {
    /// Compiles `acls` in the given order.
    pub fn compile<'a>(acls: impl IntoIterator<Item = &'a AccessList>) -> Self {
        let mut plan = LookupPlan::default();
        for acl in acls {
            for (index, rule) in acl.rules().iter().enumerate() {
                let position = plan.rules.len() as u32;
                plan.rules
                    .push(CompiledRule::new(acl.handle(), index as u32, rule));
                let family = match rule.ip_version() {
                    IpVersion::V4 => &mut plan.v4,
                    IpVersion::V6 => &mut plan.v6,
                };
                family.push(rule.protocol(), position);
            }
        }
        plan
    }

    /// First matching rule, in evaluation order.
    pub fn lookup(&self, key: &PacketKey) -> Option<RuleHit> {
        let family = match key.ip_version {
            IpVersion::V4 => &self.v4,
            IpVersion::V6 => &self.v6,
        };
        family
            .candidates(key.protocol)
            .iter()
            .map(|&position| &self.rules[position as usize])
            .find(|rule| rule.matches(key))
            .map(CompiledRule::hit)
    }

    /// Total number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Reference classification: scan every rule of every ACL in order.
pub fn classify_linear<'a>(
    acls: impl IntoIterator<Item = &'a AccessList>,
    key: &PacketKey,
) -> Option<RuleHit> {
    acls.into_iter().find_map(|acl| {
        acl.first_match(key).map(|(rule_index, rule)| RuleHit {
            acl: acl.handle(),
            rule_index,
            action: rule.action(),
        })
    })
}

/// Evaluates `key` against one snapshot.
pub fn evaluate(
    snapshot: &TableSnapshot,
    policy: &ClassifierPolicy,
    key: &PacketKey,
    interface: InterfaceId,
    direction: Direction,
) -> Verdict {
    let Some(binding) = snapshot.binding(interface, direction) else {
        return Verdict {
            action: policy.unbound,
            hit: None,
            bound: false,
        };
    };

    let hit = if policy.use_index {
        binding.plan().lookup(key)
    } else {
        classify_linear(binding.access_lists().iter().map(Arc::as_ref), key)
    };

    Verdict {
        action: hit.map_or(policy.no_match, |h| h.action),
        hit,
        bound: true,
    }
}

/// Dataplane handle for classifying packets.
///
/// Cheap to clone; every worker thread can hold its own. Each call reads
/// exactly one published snapshot, so a packet never observes a
/// half-applied update.
#[derive(Debug, Clone)]
pub struct Classifier {
    table: Arc<AclTable>,
    policy: ClassifierPolicy,
}

impl Classifier {
    pub fn new(table: Arc<AclTable>, policy: ClassifierPolicy) -> Self {
        Self { table, policy }
    }

    pub fn policy(&self) -> &ClassifierPolicy {
        &self.policy
    }

    pub fn classify(&self, key: &PacketKey, interface: InterfaceId, direction: Direction) -> Action {
        self.classify_verbose(key, interface, direction).action
    }

    /// Like [`Classifier::classify`], also reporting which rule decided.
    pub fn classify_verbose(
        &self,
        key: &PacketKey,
        interface: InterfaceId,
        direction: Direction,
    ) -> Verdict {
        let snapshot = self.table.load();
        evaluate(&snapshot, &self.policy, key, interface, direction)
    }

    /// Classifies a burst of packets against a single snapshot.
    pub fn classify_batch(
        &self,
        keys: &[PacketKey],
        interface: InterfaceId,
        direction: Direction,
    ) -> Vec<Action> {
        let snapshot = self.table.load();
        keys.iter()
            .map(|key| evaluate(&snapshot, &self.policy, key, interface, direction).action)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tcp(dst: &str, dport: u16) -> PacketKey {
        PacketKey::tcp("10.0.0.1".parse().unwrap(), dst.parse().unwrap(), 40000, dport)
    }

    fn sample_acls() -> Vec<AccessList> {
        vec![
            AccessList::new(
                0,
                vec![
                    Rule::permit(IpVersion::V4)
                        .with_protocol(proto::TCP)
                        .with_dst_port(22),
                    Rule::deny(IpVersion::V4),
                ],
                "ssh",
            ),
            AccessList::new(
                1,
                vec![Rule::permit(IpVersion::V4).with_protocol(proto::UDP)],
                "udp",
            ),
        ]
    }

    #[test]
    fn test_plan_preserves_order_across_wildcards() {
        let acls = sample_acls();
        let plan = LookupPlan::compile(&acls);
        assert_eq!(plan.len(), 3);

        let hit = plan.lookup(&tcp("1.1.1.1", 22)).unwrap();
        assert_eq!((hit.acl, hit.rule_index, hit.action), (0, 0, Action::Permit));

        // The wildcard deny in ACL 0 shadows the UDP permit in ACL 1.
        let udp = PacketKey::udp("10.0.0.1".parse().unwrap(), "1.1.1.1".parse().unwrap(), 1, 53);
        let hit = plan.lookup(&udp).unwrap();
        assert_eq!((hit.acl, hit.rule_index, hit.action), (0, 1, Action::Deny));
    }

    #[test]
    fn test_wildcard_before_protocol_list_creation() {
        let acls = vec![AccessList::new(
            4,
            vec![
                Rule::deny(IpVersion::V4).with_src_prefix("10.0.0.0/8".parse().unwrap()),
                Rule::permit(IpVersion::V4).with_protocol(proto::TCP),
            ],
            "",
        )];
        let plan = LookupPlan::compile(&acls);
        assert_eq!(plan.lookup(&tcp("1.1.1.1", 80)).unwrap().rule_index, 0);
    }

    #[test]
    fn test_family_isolation() {
        let acls = vec![AccessList::new(0, vec![Rule::deny(IpVersion::V6)], "")];
        let plan = LookupPlan::compile(&acls);
        assert!(plan.lookup(&tcp("1.1.1.1", 80)).is_none());
        let v6 = PacketKey::tcp("::1".parse().unwrap(), "::2".parse().unwrap(), 1, 2);
        assert_eq!(plan.lookup(&v6).unwrap().action, Action::Deny);
    }

    #[test]
    fn test_linear_matches_index() {
        let acls = sample_acls();
        let plan = LookupPlan::compile(&acls);
        for key in [
            tcp("1.1.1.1", 22),
            tcp("1.1.1.1", 23),
            PacketKey::icmp("1.1.1.1".parse().unwrap(), "2.2.2.2".parse().unwrap(), 8, 0),
        ] {
            assert_eq!(plan.lookup(&key), classify_linear(&acls, &key));
        }
    }

    #[test]
    fn test_empty_plan() {
        let plan = LookupPlan::compile(std::iter::empty::<&AccessList>());
        assert!(plan.is_empty());
        assert!(plan.lookup(&tcp("1.1.1.1", 80)).is_none());
    }

    #[test]
    fn test_policy_defaults() {
        let policy = ClassifierPolicy::default();
        assert_eq!(policy.no_match, Action::Deny);
        assert_eq!(policy.unbound, Action::Permit);
        assert!(policy.use_index);
    }
}
