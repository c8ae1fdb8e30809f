use super::fail;
use crate::error::Result;
use crate::model::wifi::is_valid_psk;
use crate::model::{KeyManagement, KindPayload};
use crate::state::ResolvedDevice;

/// Metric value reserved to mean "unset".
pub const METRIC_UNSET: u32 = u32::MAX;

pub(super) fn check(dev: &ResolvedDevice) -> Result<()> {
    let def = &dev.def;

    if def.mtu == Some(0) {
        return Err(fail(dev, "mtu", "mtu must be positive"));
    }

    for (idx, route) in def.routes().iter().enumerate() {
        if route.metric == Some(METRIC_UNSET) {
            return Err(fail(
                dev,
                &format!("routes.{idx}.metric"),
                format!("route metric {METRIC_UNSET} is reserved"),
            ));
        }
        if route.table == Some(0) {
            return Err(fail(dev, &format!("routes.{idx}.table"), "route table must be positive"));
        }
        if route.mtu == Some(0) {
            return Err(fail(dev, &format!("routes.{idx}.mtu"), "route mtu must be positive"));
        }
    }

    for (idx, rule) in def.routing_policy().iter().enumerate() {
        if rule.table == Some(0) {
            return Err(fail(
                dev,
                &format!("routing-policy.{idx}.table"),
                "routing-policy table must be positive",
            ));
        }
        if rule.priority == Some(0) {
            return Err(fail(
                dev,
                &format!("routing-policy.{idx}.priority"),
                "routing-policy priority must be positive",
            ));
        }
    }

    match &def.payload {
        KindPayload::Vlan(vlan) => {
            if let Some(id) = vlan.id {
                if !(1..=4094).contains(&id) {
                    return Err(fail(dev, "id", format!("vlan id {id} out of range 1..=4094")));
                }
            }
        }
        KindPayload::Bridge(Some(params)) => {
            if let Some(priority) = params.priority {
                if priority > 65535 {
                    return Err(fail(
                        dev,
                        "parameters.priority",
                        format!("bridge priority {priority} out of range 0..=65535"),
                    ));
                }
            }
        }
        KindPayload::Tunnel(tunnel) => {
            if let Some(ttl) = tunnel.ttl {
                if !(1..=255).contains(&ttl) {
                    return Err(fail(dev, "ttl", format!("tunnel ttl {ttl} out of range 1..=255")));
                }
            }
        }
        KindPayload::Vrf(vrf) => {
            if vrf.table == Some(0) {
                return Err(fail(dev, "table", "vrf table must be positive"));
            }
        }
        KindPayload::Wifi(wifi) => {
            for (ssid, ap) in wifi.access_points.iter().flatten() {
                if ap.channel == Some(0) {
                    return Err(fail(
                        dev,
                        &format!("access-points.{ssid}.channel"),
                        format!("access point '{ssid}': channel must be positive"),
                    ));
                }
                let auth = ap.effective_auth();
                if matches!(
                    auth.effective_key_management(),
                    KeyManagement::Psk | KeyManagement::Sae
                ) {
                    if let Some(psk) = auth.password.as_deref() {
                        if !is_valid_psk(psk) {
                            return Err(fail(
                                dev,
                                &format!("access-points.{ssid}.password"),
                                format!(
                                    "access point '{ssid}': password must be 8..=63 characters or 64 hex digits"
                                ),
                            ));
                        }
                    }
                }
            }
        }
        _ => {}
    }
    Ok(())
}
