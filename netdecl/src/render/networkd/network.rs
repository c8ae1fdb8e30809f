//! `.network` units: addressing, routing and membership.

use crate::context::EngineContext;
use crate::model::{
    DeviceKind, DhcpIdentifier, DhcpOverrides, KindPayload, LinkLocal, TunnelMode, UseDomains,
};
use crate::render::effective_table;
use crate::render::units::{UnitFile, UnitSection};
use crate::state::{ResolvedDevice, State};

pub const DHCP_METRIC: u32 = 100;
pub const DHCP_METRIC_WIFI: u32 = 600;

pub fn network_unit(state: &State, dev: &ResolvedDevice, ctx: &EngineContext) -> UnitFile {
    let def = &dev.def;
    let mut unit = UnitFile::new();

    let section = unit.section("Match");
    match_section(state, dev, section);

    let section = unit.section("Link");
    if def.optional == Some(true) {
        section.set("RequiredForOnline", "no");
    }
    section.set_opt("MACAddress", def.macaddress.as_deref());
    section.set_opt("MTUBytes", def.mtu);

    let member = state.is_aggregation_member(dev);
    let section = unit.section("Network");
    let dhcp = match (def.dhcp4(), def.dhcp6()) {
        (true, true) => Some("yes"),
        (true, false) => Some("ipv4"),
        (false, true) => Some("ipv6"),
        (false, false) => None,
    };
    section.set_opt("DHCP", dhcp);
    section.set("LinkLocalAddressing", link_local(dev, member));
    if def.link_local().contains(&LinkLocal::Ipv6) || def.accept_ra.is_some() {
        section.set_opt("IPv6AcceptRA", def.accept_ra.map(|ra| if ra { "yes" } else { "no" }));
    }
    if def.ipv6_privacy.unwrap_or(ctx.ipv6_privacy) {
        section.set("IPv6PrivacyExtensions", "yes");
    }
    if def.critical == Some(true) {
        section.set("KeepConfiguration", "yes");
    }
    for address in def.addresses().iter().filter(|a| a.is_simple()) {
        section.set("Address", &address.cidr);
    }
    if let Some(ns) = &def.nameservers {
        for server in ns.addresses.iter().flatten() {
            section.set("DNS", server);
        }
        if let Some(search) = ns.search.as_ref().filter(|s| !s.is_empty()) {
            section.set("Domains", search.join(" "));
        }
    }
    if let Some(agg) = state.aggregator_of(dev).filter(|agg| !state.is_ovs(agg)) {
        let key = match agg.kind() {
            DeviceKind::Bridge => "Bridge",
            DeviceKind::Bond => "Bond",
            _ => "VRF",
        };
        section.set(key, agg.id());
        if let KindPayload::Bond(Some(params)) = &agg.def.payload {
            if params.primary.as_deref() == Some(dev.id()) {
                section.set("PrimarySlave", "true");
            }
        }
    }
    if dev.kind().is_virtual() {
        section.set("ConfigureWithoutCarrier", "yes");
    }
    for child in state.children_of(dev) {
        let key = match &child.def.payload {
            KindPayload::Vlan(_) => "VLAN",
            KindPayload::Tunnel(t) if t.mode == Some(TunnelMode::Vxlan) => "VXLAN",
            KindPayload::Tunnel(_) => "Tunnel",
            _ => continue,
        };
        if child.backend == dev.backend {
            section.set(key, child.id());
        }
    }

    for address in def.addresses().iter().filter(|a| !a.is_simple()) {
        let section = unit.section("Address");
        section.set("Address", &address.cidr);
        section.set_opt("PreferredLifetime", address.lifetime);
        section.set_opt("Label", address.label.as_deref());
    }

    for route in def.routes() {
        let section = unit.section("Route");
        section.set_opt("Destination", route.destination());
        section.set_opt("Gateway", route.via.as_deref());
        section.set_opt("PreferredSource", route.from.as_deref());
        section.set_opt("Metric", route.metric);
        section.set_opt("Table", effective_table(state, dev, route.table));
        section.set_opt("Scope", route.scope);
        section.set_opt("Type", route.route_type);
        if route.on_link == Some(true) {
            section.set("GatewayOnLink", "true");
        }
        section.set_opt("MTUBytes", route.mtu);
        section.set_opt("InitialCongestionWindow", route.congestion_window);
        section.set_opt("InitialAdvertisedReceiveWindow", route.advertised_receive_window);
    }

    for rule in def.routing_policy() {
        let section = unit.section("RoutingPolicyRule");
        section.set_opt("From", rule.from.as_deref());
        section.set_opt("To", rule.to.as_deref());
        section.set_opt("Table", effective_table(state, dev, rule.table));
        section.set_opt("Priority", rule.priority);
        section.set_opt("FirewallMark", rule.mark);
        section.set_opt("TypeOfService", rule.type_of_service);
        section.set_opt("IncomingInterface", rule.input_interface.as_deref());
    }

    if dhcp.is_some() {
        let overrides = if def.dhcp4() {
            def.dhcp4_overrides.clone()
        } else {
            def.dhcp6_overrides.clone()
        }
        .unwrap_or_default();
        let default_metric = if dev.kind() == DeviceKind::Wifi {
            DHCP_METRIC_WIFI
        } else {
            DHCP_METRIC
        };
        let section = unit.section("DHCP");
        dhcp_section(section, &overrides, default_metric);
        if def.dhcp_identifier == Some(DhcpIdentifier::Mac) {
            section.set("ClientIdentifier", "mac");
        }
    }

    if let Some(agg) = state.aggregator_of(dev).filter(|a| a.kind() == DeviceKind::Bridge) {
        if let KindPayload::Bridge(Some(params)) = &agg.def.payload {
            let section = unit.section("Bridge");
            section.set_opt(
                "Cost",
                params.path_cost.as_ref().and_then(|m| m.get(dev.id())),
            );
            section.set_opt(
                "Priority",
                params.port_priority.as_ref().and_then(|m| m.get(dev.id())),
            );
        }
    }

    unit
}

fn match_section(state: &State, dev: &ResolvedDevice, section: &mut UnitSection) {
    let def = &dev.def;
    if let Some(name) = def.set_name.as_deref() {
        section.set("Name", name);
        return;
    }
    match def.matching.as_ref().filter(|_| dev.kind().is_physical()) {
        Some(matching) if !matching.is_empty() => {
            section.set_opt("Name", matching.name.as_deref());
            section.set_opt("MACAddress", matching.macaddress.as_deref());
            if let Some(drivers) = &matching.driver {
                section.set("Driver", drivers.join(" "));
            }
        }
        _ => {
            section.set_opt("Name", state.interface_name(dev));
        }
    }
}

fn link_local(dev: &ResolvedDevice, member: bool) -> &'static str {
    if member {
        return "no";
    }
    let set = dev.def.link_local();
    match (set.contains(&LinkLocal::Ipv4), set.contains(&LinkLocal::Ipv6)) {
        (true, true) => "yes",
        (true, false) => "ipv4",
        (false, true) => "ipv6",
        (false, false) => "no",
    }
}

fn dhcp_section(section: &mut UnitSection, o: &DhcpOverrides, default_metric: u32) {
    section.set("RouteMetric", o.route_metric.unwrap_or(default_metric));
    section.set("UseMTU", o.use_mtu.unwrap_or(true));
    section.set_opt("UseDNS", o.use_dns);
    section.set_opt("UseNTP", o.use_ntp);
    section.set_opt("SendHostname", o.send_hostname);
    section.set_opt("UseHostname", o.use_hostname);
    section.set_opt("Hostname", o.hostname.as_deref());
    section.set_opt("UseRoutes", o.use_routes);
    section.set_opt(
        "UseDomains",
        o.use_domains.map(|d| match d {
            UseDomains::True => "true",
            UseDomains::False => "false",
            UseDomains::Route => "route",
        }),
    );
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::network_unit;
    use crate::context::EngineContext;
    use crate::parse::Parser;
    use crate::state::State;

    fn state(yaml: &str) -> State {
        let mut parser = Parser::new();
        parser.load_str(yaml, None).expect("load");
        parser.freeze(&EngineContext::default()).expect("freeze")
    }

    #[test]
    fn dhcp4_enables_dhcp_section() {
        let state = state("network:\n  ethernets:\n    eth0: {dhcp4: true}\n");
        let unit = network_unit(&state, state.get("eth0").expect("eth0"), &EngineContext::default());
        assert_eq!(
            unit.to_string(),
            "[Match]\nName=eth0\n\n[Network]\nDHCP=ipv4\nLinkLocalAddressing=ipv6\n\n[DHCP]\nRouteMetric=100\nUseMTU=true\n"
        );
    }

    #[test]
    fn bridge_members_lose_link_local_and_get_port_settings() {
        let state = state(
            "network:\n  ethernets:\n    eth1: {}\n  bridges:\n    br0:\n      interfaces: [eth1]\n      parameters: {path-cost: {eth1: 50}}\n",
        );
        let ctx = EngineContext::default();
        let member = network_unit(&state, state.get("eth1").expect("eth1"), &ctx).to_string();
        assert!(member.contains("LinkLocalAddressing=no\n"));
        assert!(member.contains("Bridge=br0\n"));
        assert!(member.contains("[Bridge]\nCost=50\n"));

        let bridge = network_unit(&state, state.get("br0").expect("br0"), &ctx).to_string();
        assert!(bridge.contains("ConfigureWithoutCarrier=yes\n"));
    }

    #[test]
    fn vrf_table_fills_unset_route_tables() {
        let state = state(
            "network:\n  vrfs:\n    vrf0:\n      table: 42\n      routes:\n        - {to: default, via: 10.0.0.1}\n",
        );
        let unit = network_unit(&state, state.get("vrf0").expect("vrf0"), &EngineContext::default());
        assert_eq!(unit.get("Route", "Table"), Some("42"));
        assert_eq!(unit.get("Route", "Destination"), Some("0.0.0.0/0"));
    }

    #[test]
    fn wifi_dhcp_metric_defaults_higher() {
        let state = state(
            "network:\n  wifis:\n    wlan0:\n      dhcp4: true\n      access-points: {home: {password: \"longenough\"}}\n",
        );
        let unit = network_unit(&state, state.get("wlan0").expect("wlan0"), &EngineContext::default());
        assert_eq!(unit.get("DHCP", "RouteMetric"), Some("600"));
    }
}
