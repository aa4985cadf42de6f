//! End-to-end classification scenarios through the control plane.

use acl_plugin::{
    proto, AclConfig, AclError, AclManager, Action, PacketKey, Rule, CREATE_NEW,
};
use acl_types::{Direction, InterfaceId, IpAddress, IpPrefix, IpVersion};
use pretty_assertions::assert_eq;

const IF: InterfaceId = InterfaceId::new(1);

fn addr(s: &str) -> IpAddress {
    s.parse().unwrap()
}

fn prefix(s: &str) -> IpPrefix {
    s.parse().unwrap()
}

fn tcp(dport: u16) -> PacketKey {
    PacketKey::tcp(addr("10.0.0.1"), addr("192.168.1.1"), 33000, dport)
}

fn udp(dport: u16) -> PacketKey {
    PacketKey::udp(addr("10.0.0.1"), addr("192.168.1.1"), 33000, dport)
}

fn icmp(icmp_type: u8, icmp_code: u8) -> PacketKey {
    PacketKey::icmp(addr("10.0.0.1"), addr("192.168.1.1"), icmp_type, icmp_code)
}

/// Creates one ACL and binds it as the only INPUT list of `IF`.
fn bound(rules: Vec<Rule>) -> AclManager {
    let manager = AclManager::new(AclConfig::default());
    let handle = manager.add_or_replace(CREATE_NEW, rules, "scenario").unwrap();
    manager.set_acl_list(IF, Direction::Input, vec![handle]).unwrap();
    manager
}

fn decide(manager: &AclManager, key: &PacketKey) -> Action {
    manager.classify(key, IF, Direction::Input)
}

#[test]
fn permit_udp_only_relies_on_default_deny() {
    let manager = bound(vec![Rule::permit(IpVersion::V4).with_protocol(proto::UDP)]);

    assert_eq!(decide(&manager, &udp(53)), Action::Permit);
    assert_eq!(decide(&manager, &udp(65535)), Action::Permit);
    assert_eq!(decide(&manager, &tcp(80)), Action::Deny);
    assert_eq!(decide(&manager, &icmp(8, 0)), Action::Deny);
}

#[test]
fn deny_udp_then_permit_everything() {
    let manager = bound(vec![
        Rule::deny(IpVersion::V4).with_protocol(proto::UDP),
        Rule::permit(IpVersion::V4),
    ]);

    assert_eq!(decide(&manager, &udp(53)), Action::Deny);
    assert_eq!(decide(&manager, &tcp(80)), Action::Permit);
    assert_eq!(decide(&manager, &icmp(8, 0)), Action::Permit);
}

#[test]
fn icmp_echo_request_only() {
    let manager = bound(vec![
        Rule::permit(IpVersion::V4)
            .with_protocol(proto::ICMP)
            .with_icmp_type(8, 8)
            .with_icmp_code(0, 0),
        Rule::deny(IpVersion::V4),
    ]);

    assert_eq!(decide(&manager, &icmp(8, 0)), Action::Permit);
    assert_eq!(decide(&manager, &icmp(0, 0)), Action::Deny);
    assert_eq!(decide(&manager, &icmp(8, 1)), Action::Deny);
    // Port 8 -> 0 on TCP is not an echo request.
    assert_eq!(
        decide(&manager, &PacketKey::tcp(addr("10.0.0.1"), addr("192.168.1.1"), 8, 0)),
        Action::Deny
    );
}

#[test]
fn unbound_interface_permits_everything() {
    let manager = bound(vec![Rule::deny(IpVersion::V4)]);

    for key in [tcp(80), udp(53), icmp(8, 0)] {
        assert_eq!(manager.classify(&key, InterfaceId::new(2), Direction::Input), Action::Permit);
        assert_eq!(manager.classify(&key, IF, Direction::Output), Action::Permit);
    }
}

#[test]
fn single_tcp_port() {
    let manager = bound(vec![
        Rule::permit(IpVersion::V4)
            .with_protocol(proto::TCP)
            .with_dst_range(4000, 4000),
        Rule::deny(IpVersion::V4),
    ]);

    assert_eq!(decide(&manager, &tcp(4000)), Action::Permit);
    assert_eq!(decide(&manager, &tcp(3999)), Action::Deny);
    assert_eq!(decide(&manager, &tcp(4001)), Action::Deny);
    assert_eq!(decide(&manager, &udp(4000)), Action::Deny);
}

#[test]
fn zero_length_prefix_ignores_stored_address() {
    let manager = bound(vec![Rule::permit(IpVersion::V4)
        .with_src_prefix(prefix("203.0.113.77/0"))
        .with_dst_prefix(prefix("198.51.100.1/0"))]);

    assert_eq!(decide(&manager, &tcp(1)), Action::Permit);
    assert_eq!(
        decide(&manager, &PacketKey::tcp(addr("1.2.3.4"), addr("5.6.7.8"), 1, 1)),
        Action::Permit
    );
}

#[test]
fn ipv6_rules_do_not_see_ipv4_packets() {
    let manager = bound(vec![
        Rule::deny(IpVersion::V6).with_src_prefix(prefix("2001:db8::/32")),
        Rule::permit(IpVersion::V6),
    ]);

    let v6_blocked = PacketKey::tcp(addr("2001:db8::1"), addr("2001:db9::1"), 1, 443);
    let v6_allowed = PacketKey::tcp(addr("2001:db9::1"), addr("2001:db8::1"), 1, 443);
    assert_eq!(decide(&manager, &v6_blocked), Action::Deny);
    assert_eq!(decide(&manager, &v6_allowed), Action::Permit);
    // No IPv4 rule matches, so the bound default applies.
    assert_eq!(decide(&manager, &tcp(443)), Action::Deny);
}

#[test]
fn icmpv6_type_range() {
    let manager = bound(vec![
        Rule::permit(IpVersion::V6)
            .with_protocol(proto::ICMPV6)
            .with_icmp_type(128, 129),
        Rule::deny(IpVersion::V6),
    ]);

    let echo = PacketKey::icmp(addr("::1"), addr("::2"), 128, 0);
    let unreachable = PacketKey::icmp(addr("::1"), addr("::2"), 1, 4);
    assert_eq!(decide(&manager, &echo), Action::Permit);
    assert_eq!(decide(&manager, &unreachable), Action::Deny);
}

#[test]
fn acl_order_in_binding_decides() {
    let manager = AclManager::new(AclConfig::default());
    let deny = manager
        .add_or_replace(CREATE_NEW, vec![Rule::deny(IpVersion::V4)], "deny")
        .unwrap();
    let permit = manager
        .add_or_replace(CREATE_NEW, vec![Rule::permit(IpVersion::V4)], "permit")
        .unwrap();

    manager.set_acl_list(IF, Direction::Input, vec![deny, permit]).unwrap();
    assert_eq!(decide(&manager, &tcp(80)), Action::Deny);

    manager.set_acl_list(IF, Direction::Input, vec![permit, deny]).unwrap();
    assert_eq!(decide(&manager, &tcp(80)), Action::Permit);
}

#[test]
fn empty_acl_falls_through_to_default() {
    let manager = bound(Vec::new());
    assert_eq!(decide(&manager, &tcp(80)), Action::Deny);

    let mut config = AclConfig::default();
    config.classifier.no_match_action = Action::Permit;
    let lenient = AclManager::new(config);
    let handle = lenient.add_or_replace(CREATE_NEW, Vec::new(), "").unwrap();
    lenient.set_acl_list(IF, Direction::Input, vec![handle]).unwrap();
    assert_eq!(decide(&lenient, &tcp(80)), Action::Permit);
}

#[test]
fn replace_takes_effect_on_every_binding() {
    let manager = AclManager::new(AclConfig::default());
    let handle = manager
        .add_or_replace(CREATE_NEW, vec![Rule::deny(IpVersion::V4)], "")
        .unwrap();
    manager.set_acl_list(IF, Direction::Input, vec![handle]).unwrap();
    manager
        .set_acl_list(InterfaceId::new(2), Direction::Output, vec![handle])
        .unwrap();

    manager
        .add_or_replace(handle, vec![Rule::permit(IpVersion::V4)], "")
        .unwrap();

    assert_eq!(manager.classify(&tcp(80), IF, Direction::Input), Action::Permit);
    assert_eq!(
        manager.classify(&tcp(80), InterfaceId::new(2), Direction::Output),
        Action::Permit
    );
}

#[test]
fn delete_bound_acl_then_unbind() {
    let manager = bound(vec![Rule::permit(IpVersion::V4)]);
    let handle = manager.acl_list(IF, Direction::Input)[0];

    assert!(matches!(manager.delete(handle), Err(AclError::InUse { .. })));
    manager.set_acl_list(IF, Direction::Input, Vec::new()).unwrap();
    manager.delete(handle).unwrap();
    assert_eq!(manager.dump(handle), Err(AclError::NotFound { handle }));
}

#[test]
fn failed_bind_keeps_prior_binding() {
    let manager = bound(vec![Rule::deny(IpVersion::V4)]);
    let prior = manager.acl_list(IF, Direction::Input);

    let err = manager
        .set_acl_list(IF, Direction::Input, vec![prior[0], 77])
        .unwrap_err();
    assert_eq!(err, AclError::NotFound { handle: 77 });
    assert_eq!(manager.acl_list(IF, Direction::Input), prior);
    assert_eq!(decide(&manager, &tcp(80)), Action::Deny);
}

#[test]
fn dump_returns_rules_as_given() {
    let manager = AclManager::new(AclConfig::default());
    let rules = vec![
        Rule::permit(IpVersion::V4)
            .with_protocol(proto::TCP)
            .with_src_prefix(prefix("10.1.2.3/8"))
            .with_src_range(1024, 65535)
            .with_dst_port(443),
        Rule::deny(IpVersion::V6)
            .with_protocol(proto::ICMPV6)
            .with_icmp_type(0, 255)
            .with_icmp_code(0, 255),
        Rule::deny(IpVersion::V4),
    ];
    let handle = manager
        .add_or_replace(CREATE_NEW, rules.clone(), "round-trip")
        .unwrap();

    let acl = manager.dump(handle).unwrap();
    assert_eq!(acl.rules(), rules.as_slice());
    assert_eq!(acl.tag(), "round-trip");
}
