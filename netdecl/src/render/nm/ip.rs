//! `[ipv4]` and `[ipv6]` sections.

use netdecl_doc::Keyfile;

use crate::context::EngineContext;
use crate::model::{
    DhcpIdentifier, DhcpOverrides, Family, LinkLocal, Route, RoutingPolicyRule, UseDomains,
    WifiMode,
};
use crate::render::effective_table;
use crate::state::{ResolvedDevice, State};

/// Write both IP sections. Aggregation members carry none.
pub fn ip_sections(
    kf: &mut Keyfile,
    state: &State,
    dev: &ResolvedDevice,
    ctx: &EngineContext,
    wifi_mode: Option<WifiMode>,
) {
    if state.is_aggregation_member(dev) {
        return;
    }
    family_section(kf, state, dev, Family::V4, wifi_mode);
    family_section(kf, state, dev, Family::V6, wifi_mode);
    if dev.def.ipv6_privacy.unwrap_or(ctx.ipv6_privacy) {
        kf.set("ipv6", "ip6-privacy", "2");
    }
}

fn family_section(
    kf: &mut Keyfile,
    state: &State,
    dev: &ResolvedDevice,
    family: Family,
    wifi_mode: Option<WifiMode>,
) {
    let def = &dev.def;
    let section = match family {
        Family::V4 => "ipv4",
        Family::V6 => "ipv6",
    };
    let dhcp = match family {
        Family::V4 => def.dhcp4(),
        Family::V6 => def.dhcp6(),
    };
    let addresses: Vec<&str> = def
        .addresses()
        .iter()
        .filter(|a| a.family() == Some(family))
        .map(|a| a.cidr.as_str())
        .collect();
    let explicit_ll = def.link_local.is_some();
    let ll = def.link_local();

    let method = match family {
        Family::V4 if wifi_mode == Some(WifiMode::Ap) => "shared",
        _ if dhcp => "auto",
        _ if !addresses.is_empty() => "manual",
        Family::V4 if explicit_ll && ll.contains(&LinkLocal::Ipv4) => "link-local",
        Family::V4 => "disabled",
        Family::V6 if def.accept_ra == Some(true) => "auto",
        Family::V6 if explicit_ll && ll.contains(&LinkLocal::Ipv6) => "link-local",
        Family::V6 => "ignore",
    };
    kf.set(section, "method", method);

    for (idx, cidr) in addresses.iter().enumerate() {
        kf.set(section, &format!("address{}", idx + 1), *cidr);
    }

    if let Some(ns) = &def.nameservers {
        let servers: Vec<&str> = ns
            .addresses
            .iter()
            .flatten()
            .filter(|s| Family::of_prefix(s) == Some(family))
            .map(String::as_str)
            .collect();
        if !servers.is_empty() {
            kf.set(section, "dns", list(&servers));
        }
        if let Some(search) = ns.search.as_ref().filter(|s| !s.is_empty()) {
            let search: Vec<&str> = search.iter().map(String::as_str).collect();
            kf.set(section, "dns-search", list(&search));
        }
    }

    let routes: Vec<&Route> = def
        .routes()
        .iter()
        .filter(|r| r.family().unwrap_or(Family::V4) == family)
        .collect();
    for (idx, route) in routes.iter().enumerate() {
        let n = idx + 1;
        kf.set(section, &format!("route{n}"), route_line(route, family));
        let options = route_options(state, dev, route);
        if !options.is_empty() {
            kf.set(section, &format!("route{n}_options"), options.join(","));
        }
    }

    let rules: Vec<&RoutingPolicyRule> = def
        .routing_policy()
        .iter()
        .filter(|r| r.family().unwrap_or(Family::V4) == family)
        .collect();
    for (idx, rule) in rules.iter().enumerate() {
        kf.set(
            section,
            &format!("routing-rule{}", idx + 1),
            rule_line(state, dev, rule),
        );
    }

    if dhcp {
        let overrides = match family {
            Family::V4 => def.dhcp4_overrides.as_ref(),
            Family::V6 => def.dhcp6_overrides.as_ref(),
        };
        if let Some(o) = overrides {
            dhcp_overrides(kf, section, o);
        }
        if family == Family::V4 && def.dhcp_identifier == Some(DhcpIdentifier::Mac) {
            kf.set(section, "dhcp-client-id", "mac");
        }
    }
}

/// NetworkManager lists are `;`-terminated.
fn list(items: &[&str]) -> String {
    items.iter().map(|item| format!("{item};")).collect()
}

fn route_line(route: &Route, family: Family) -> String {
    let dest = route.destination().unwrap_or_else(|| match family {
        Family::V4 => "0.0.0.0/0".to_string(),
        Family::V6 => "::/0".to_string(),
    });
    match (&route.via, route.metric) {
        (Some(via), Some(metric)) => format!("{dest},{via},{metric}"),
        (Some(via), None) => format!("{dest},{via}"),
        (None, Some(metric)) => {
            let unspecified = match family {
                Family::V4 => "0.0.0.0",
                Family::V6 => "::",
            };
            format!("{dest},{unspecified},{metric}")
        }
        (None, None) => dest,
    }
}

fn route_options(state: &State, dev: &ResolvedDevice, route: &Route) -> Vec<String> {
    let mut options = Vec::new();
    if let Some(table) = effective_table(state, dev, route.table) {
        options.push(format!("table={table}"));
    }
    if route.on_link == Some(true) {
        options.push("onlink=true".to_string());
    }
    if let Some(from) = &route.from {
        options.push(format!("src={from}"));
    }
    if let Some(kind) = route.route_type {
        options.push(format!("type={kind}"));
    }
    if let Some(mtu) = route.mtu {
        options.push(format!("mtu={mtu}"));
    }
    if let Some(cwnd) = route.congestion_window {
        options.push(format!("initcwnd={cwnd}"));
    }
    if let Some(rwnd) = route.advertised_receive_window {
        options.push(format!("initrwnd={rwnd}"));
    }
    options
}

fn rule_line(state: &State, dev: &ResolvedDevice, rule: &RoutingPolicyRule) -> String {
    let mut parts = Vec::new();
    if let Some(priority) = rule.priority {
        parts.push(format!("priority {priority}"));
    }
    if let Some(from) = &rule.from {
        parts.push(format!("from {from}"));
    }
    if let Some(to) = &rule.to {
        parts.push(format!("to {to}"));
    }
    if let Some(tos) = rule.type_of_service {
        parts.push(format!("tos 0x{tos:02x}"));
    }
    if let Some(mark) = rule.mark {
        parts.push(format!("fwmark {mark}"));
    }
    if let Some(iif) = &rule.input_interface {
        parts.push(format!("iif {iif}"));
    }
    if let Some(table) = effective_table(state, dev, rule.table) {
        parts.push(format!("table {table}"));
    }
    parts.join(" ")
}

fn dhcp_overrides(kf: &mut Keyfile, section: &str, o: &DhcpOverrides) {
    if o.use_dns == Some(false) {
        kf.set(section, "ignore-auto-dns", "true");
    }
    if o.use_routes == Some(false) {
        kf.set(section, "ignore-auto-routes", "true");
        kf.set(section, "never-default", "true");
    }
    if let Some(metric) = o.route_metric {
        kf.set(section, "route-metric", metric.to_string());
    }
    if let Some(send) = o.send_hostname {
        kf.set(section, "dhcp-send-hostname", send.to_string());
    }
    if let Some(hostname) = &o.hostname {
        kf.set(section, "dhcp-hostname", hostname.as_str());
    }
    if o.use_domains == Some(UseDomains::False) {
        kf.set(section, "ignore-auto-dns", "true");
    }
}

#[cfg(test)]
mod tests {
    use netdecl_doc::Keyfile;
    use pretty_assertions::assert_eq;

    use super::ip_sections;
    use crate::context::EngineContext;
    use crate::parse::Parser;

    #[test]
    fn static_addresses_routes_and_dns() {
        let mut parser = Parser::new();
        parser
            .load_str(
                "network:\n  renderer: NetworkManager\n  ethernets:\n    eth0:\n      addresses: [192.168.1.10/24, \"2001:db8::10/64\"]\n      nameservers: {addresses: [1.1.1.1], search: [lan]}\n      routes:\n        - {to: default, via: 192.168.1.1}\n        - {to: 10.0.0.0/8, via: 192.168.1.2, metric: 50, table: 100}\n",
                None,
            )
            .expect("load");
        let ctx = EngineContext::default();
        let state = parser.freeze(&ctx).expect("freeze");
        let mut kf = Keyfile::new();
        ip_sections(&mut kf, &state, state.get("eth0").expect("eth0"), &ctx, None);

        assert_eq!(
            kf.to_string(),
            "[ipv4]\nmethod=manual\naddress1=192.168.1.10/24\ndns=1.1.1.1;\ndns-search=lan;\nroute1=0.0.0.0/0,192.168.1.1\nroute2=10.0.0.0/8,192.168.1.2,50\nroute2_options=table=100\n\n[ipv6]\nmethod=manual\naddress1=2001:db8::10/64\ndns-search=lan;\n"
        );
    }
}
