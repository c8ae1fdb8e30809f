use super::fail;
use crate::error::Result;
use crate::model::ip::Family;
use crate::model::params::duration_ms;
use crate::model::{DeviceKind, KindPayload, TunnelMode};
use crate::state::{ResolvedDevice, State};

pub(super) fn check(state: &State, dev: &ResolvedDevice) -> Result<()> {
    let def = &dev.def;

    if def.set_name.is_some() && !def.has_match() {
        return Err(fail(dev, "set-name", "set-name requires match"));
    }

    for (idx, route) in def.routes().iter().enumerate() {
        let field = format!("routes.{idx}");
        if route.to.is_none() && route.route_type.is_none() {
            return Err(fail(dev, &field, "route requires 'to'"));
        }
        let to = match route.to.as_deref() {
            Some("default") | None => None,
            Some(to) => Some(Family::of_prefix(to).ok_or_else(|| {
                fail(dev, &format!("{field}.to"), format!("malformed route destination '{to}'"))
            })?),
        };
        let via = route.via.as_deref().map(Family::of_prefix);
        let from = route.from.as_deref().map(Family::of_prefix);
        if via == Some(None) {
            return Err(fail(dev, &format!("{field}.via"), "malformed route gateway"));
        }
        if from == Some(None) {
            return Err(fail(dev, &format!("{field}.from"), "malformed route source"));
        }
        let families: Vec<Family> = [to, via.flatten(), from.flatten()].into_iter().flatten().collect();
        if families.windows(2).any(|w| w[0] != w[1]) {
            return Err(fail(dev, &field, "route mixes IPv4 and IPv6 addresses"));
        }
        if route.to.as_deref() == Some("default") && route.via.is_none() && route.from.is_none() {
            return Err(fail(dev, &field, "default route requires 'via'"));
        }
    }

    for (idx, rule) in def.routing_policy().iter().enumerate() {
        let field = format!("routing-policy.{idx}");
        if rule.from.is_none() && rule.to.is_none() {
            return Err(fail(dev, &field, "routing-policy rule requires 'from' or 'to'"));
        }
        let families: Vec<_> = [rule.from.as_deref(), rule.to.as_deref()]
            .into_iter()
            .flatten()
            .map(Family::of_prefix)
            .collect();
        if families.iter().any(Option::is_none) {
            return Err(fail(dev, &field, "malformed routing-policy address"));
        }
        if families.windows(2).any(|w| w[0] != w[1]) {
            return Err(fail(dev, &field, "routing-policy rule mixes IPv4 and IPv6"));
        }
    }

    if let Some(ovs) = &def.openvswitch {
        if ovs.lacp.is_some() && dev.kind() != DeviceKind::Bond {
            return Err(fail(dev, "openvswitch", "openvswitch lacp is only valid on bonds"));
        }
    }

    match &def.payload {
        KindPayload::Wifi(wifi) => {
            if wifi.access_points.as_ref().map_or(true, |aps| aps.is_empty()) {
                return Err(fail(dev, "access-points", "wifi requires at least one access point"));
            }
        }
        KindPayload::Vlan(vlan) => {
            let nm_parent = def
                .networkmanager
                .as_ref()
                .is_some_and(|nm| nm.passthrough_get("vlan", "parent").is_some());
            if def.link.is_none() && !nm_parent {
                return Err(fail(dev, "link", "vlan requires link"));
            }
            if vlan.id.is_none() {
                return Err(fail(dev, "id", "vlan requires id"));
            }
        }
        KindPayload::Tunnel(tunnel) => check_tunnel(dev, tunnel)?,
        KindPayload::Vrf(vrf) => {
            let Some(table) = vrf.table else {
                return Err(fail(dev, "table", "vrf requires table"));
            };
            for (idx, route) in def.routes().iter().enumerate() {
                if route.table.is_some_and(|t| t != table) {
                    return Err(fail(
                        dev,
                        &format!("routes.{idx}.table"),
                        format!("vrf routes must use table {table}"),
                    ));
                }
            }
            for (idx, rule) in def.routing_policy().iter().enumerate() {
                if rule.table.is_some_and(|t| t != table) {
                    return Err(fail(
                        dev,
                        &format!("routing-policy.{idx}.table"),
                        format!("vrf routing-policy must use table {table}"),
                    ));
                }
            }
        }
        KindPayload::Veth => match state.peer_of(dev) {
            Some(peer) => {
                if peer.kind() != DeviceKind::Veth || peer.def.peer.as_deref() != Some(dev.id()) {
                    return Err(fail(
                        dev,
                        "peer",
                        format!("peer '{}' does not point back at '{}'", peer.id(), dev.id()),
                    ));
                }
            }
            None => {
                // The peer may live only in NetworkManager passthrough.
                let nm_peer = def
                    .networkmanager
                    .as_ref()
                    .is_some_and(|nm| nm.passthrough_get("veth", "peer").is_some());
                if def.peer.is_some() || !nm_peer {
                    return Err(fail(dev, "peer", "virtual-ethernet requires peer"));
                }
            }
        },
        KindPayload::Bond(Some(params)) => {
            for (key, value) in params.durations() {
                if duration_ms(value).is_none() {
                    return Err(fail(
                        dev,
                        &format!("parameters.{key}"),
                        format!("invalid duration '{value}' for {key}"),
                    ));
                }
            }
            if let Some(primary) = &params.primary {
                if !def.interfaces().contains(primary) {
                    return Err(fail(
                        dev,
                        "parameters.primary",
                        format!("primary '{primary}' is not a member of the bond"),
                    ));
                }
            }
        }
        KindPayload::NmDevice => {
            if def.passthrough().map_or(true, |p| p.is_empty()) {
                return Err(fail(dev, "networkmanager", "nm-devices require networkmanager.passthrough"));
            }
        }
        _ => {}
    }

    if let Some(agg) = state.aggregator_of(dev) {
        if agg.kind() == DeviceKind::Vrf && dev.kind() == DeviceKind::Vrf {
            return Err(fail(dev, "interfaces", "a vrf cannot be a vrf member"));
        }
    }

    Ok(())
}

fn check_tunnel(dev: &ResolvedDevice, tunnel: &crate::model::TunnelSettings) -> Result<()> {
    let Some(mode) = tunnel.mode else {
        return Err(fail(dev, "mode", "tunnel requires mode"));
    };
    match mode {
        TunnelMode::Wireguard => {
            if tunnel.private_key().is_none() {
                return Err(fail(dev, "keys", "wireguard tunnel requires a private key"));
            }
            for (idx, peer) in tunnel.peers.iter().flatten().enumerate() {
                let field = format!("peers.{idx}");
                if peer.keys.public.is_none() {
                    return Err(fail(dev, &field, "wireguard peer requires keys.public"));
                }
                if peer.allowed_ips.as_ref().map_or(true, Vec::is_empty) {
                    return Err(fail(dev, &field, "wireguard peer requires allowed-ips"));
                }
            }
        }
        TunnelMode::Vxlan => {
            if tunnel.vni.is_none() {
                return Err(fail(dev, "id", "vxlan tunnel requires id"));
            }
            if tunnel.vni.is_some_and(|vni| vni > 16_777_215) {
                return Err(fail(dev, "id", "vxlan id out of range 0..=16777215"));
            }
        }
        ip_mode => {
            let Some(remote) = tunnel.remote.as_deref() else {
                return Err(fail(dev, "remote", format!("{ip_mode} tunnel requires remote")));
            };
            if tunnel.local.is_none() && ip_mode != TunnelMode::Isatap {
                return Err(fail(dev, "local", format!("{ip_mode} tunnel requires local")));
            }
            let want = if ip_mode.is_ipv6() { Family::V6 } else { Family::V4 };
            for (field, addr) in [("remote", Some(remote)), ("local", tunnel.local.as_deref())] {
                if let Some(addr) = addr {
                    if Family::of_prefix(addr) != Some(want) {
                        return Err(fail(
                            dev,
                            field,
                            format!("{field} address '{addr}' does not fit {ip_mode} tunnel"),
                        ));
                    }
                }
            }
            if (tunnel.key.is_some() || tunnel.keys.is_some()) && !ip_mode.is_keyed() {
                return Err(fail(dev, "keys", format!("{ip_mode} tunnel does not take keys")));
            }
        }
    }
    Ok(())
}
