//! Kind-specific settings for aggregating and link-layer devices.

use indexmap::IndexMap;
use strum::{Display, EnumString};

use super::merge::{clear_map, clear_nested, merge_map, merge_opt, Clear, Merge};

/// Selection criteria binding a definition to hardware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Match {
    pub name: Option<String>,
    pub macaddress: Option<String>,
    pub driver: Option<Vec<String>>,
}

impl Match {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.macaddress.is_none()
            && self.driver.as_ref().map_or(true, Vec::is_empty)
    }

    pub fn has_driver(&self) -> bool {
        self.driver.as_ref().is_some_and(|d| !d.is_empty())
    }

    /// The matched name, if it is a plain name rather than a pattern.
    pub fn literal_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !is_glob(name))
    }
}

impl Merge for Match {
    fn merge(&mut self, later: Self) {
        merge_opt(&mut self.name, later.name);
        merge_opt(&mut self.macaddress, later.macaddress);
        merge_opt(&mut self.driver, later.driver);
    }
}

impl Clear for Match {
    fn clear(&mut self, path: &[String]) -> bool {
        let [key] = path else { return false };
        match key.as_str() {
            "name" => self.name = None,
            "macaddress" => self.macaddress = None,
            "driver" => self.driver = None,
            _ => return false,
        }
        true
    }
}

pub fn is_glob(text: &str) -> bool {
    text.contains(['*', '?', '[', ']'])
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeParams {
    pub ageing_time: Option<String>,
    pub priority: Option<u32>,
    pub port_priority: Option<IndexMap<String, u32>>,
    pub forward_delay: Option<String>,
    pub hello_time: Option<String>,
    pub max_age: Option<String>,
    pub path_cost: Option<IndexMap<String, u32>>,
    pub stp: Option<bool>,
    pub vlan_filtering: Option<bool>,
    pub vlan_default_pvid: Option<u32>,
    pub vlans: Option<Vec<String>>,
}

impl BridgeParams {
    pub fn uses_vlans(&self) -> bool {
        self.vlan_filtering == Some(true)
            || self.vlan_default_pvid.is_some()
            || self.vlans.as_ref().is_some_and(|v| !v.is_empty())
    }
}

impl Merge for BridgeParams {
    fn merge(&mut self, later: Self) {
        merge_opt(&mut self.ageing_time, later.ageing_time);
        merge_opt(&mut self.priority, later.priority);
        merge_map(&mut self.port_priority, later.port_priority);
        merge_opt(&mut self.forward_delay, later.forward_delay);
        merge_opt(&mut self.hello_time, later.hello_time);
        merge_opt(&mut self.max_age, later.max_age);
        merge_map(&mut self.path_cost, later.path_cost);
        merge_opt(&mut self.stp, later.stp);
        merge_opt(&mut self.vlan_filtering, later.vlan_filtering);
        merge_opt(&mut self.vlan_default_pvid, later.vlan_default_pvid);
        merge_opt(&mut self.vlans, later.vlans);
    }
}

impl Clear for BridgeParams {
    fn clear(&mut self, path: &[String]) -> bool {
        let Some((key, rest)) = path.split_first() else {
            return false;
        };
        match key.as_str() {
            "port-priority" => return clear_map(&mut self.port_priority, rest),
            "path-cost" => return clear_map(&mut self.path_cost, rest),
            _ if !rest.is_empty() => return false,
            "ageing-time" | "aging-time" => self.ageing_time = None,
            "priority" => self.priority = None,
            "forward-delay" => self.forward_delay = None,
            "hello-time" => self.hello_time = None,
            "max-age" => self.max_age = None,
            "stp" => self.stp = None,
            "vlan-filtering" => self.vlan_filtering = None,
            "vlan-default-pvid" => self.vlan_default_pvid = None,
            "vlans" => self.vlans = None,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
pub enum BondMode {
    #[strum(serialize = "balance-rr")]
    BalanceRr,
    #[strum(serialize = "active-backup")]
    ActiveBackup,
    #[strum(serialize = "balance-xor")]
    BalanceXor,
    #[strum(serialize = "broadcast")]
    Broadcast,
    #[strum(serialize = "802.3ad")]
    Ieee8023ad,
    #[strum(serialize = "balance-tlb")]
    BalanceTlb,
    #[strum(serialize = "balance-alb")]
    BalanceAlb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LacpRate {
    Slow,
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
pub enum HashPolicy {
    #[strum(serialize = "layer2")]
    Layer2,
    #[strum(serialize = "layer3+4")]
    Layer34,
    #[strum(serialize = "layer2+3")]
    Layer23,
    #[strum(serialize = "encap2+3")]
    Encap23,
    #[strum(serialize = "encap3+4")]
    Encap34,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum AdSelect {
    Stable,
    Bandwidth,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ArpValidate {
    None,
    Active,
    Backup,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ArpAllTargets {
    Any,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FailOverMac {
    None,
    Active,
    Follow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PrimaryReselect {
    Always,
    Better,
    Failure,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondParams {
    pub mode: Option<BondMode>,
    pub lacp_rate: Option<LacpRate>,
    pub mii_monitor_interval: Option<String>,
    pub min_links: Option<u32>,
    pub transmit_hash_policy: Option<HashPolicy>,
    pub ad_select: Option<AdSelect>,
    pub all_members_active: Option<bool>,
    pub arp_interval: Option<String>,
    pub arp_ip_targets: Option<Vec<String>>,
    pub arp_validate: Option<ArpValidate>,
    pub arp_all_targets: Option<ArpAllTargets>,
    pub up_delay: Option<String>,
    pub down_delay: Option<String>,
    pub fail_over_mac_policy: Option<FailOverMac>,
    pub gratuitous_arp: Option<u32>,
    pub packets_per_member: Option<u32>,
    pub primary_reselect_policy: Option<PrimaryReselect>,
    pub resend_igmp: Option<u32>,
    pub learn_packet_interval: Option<String>,
    pub primary: Option<String>,
}

impl BondParams {
    /// Duration-valued parameters with their document key.
    pub fn durations(&self) -> Vec<(&'static str, &str)> {
        [
            ("mii-monitor-interval", &self.mii_monitor_interval),
            ("arp-interval", &self.arp_interval),
            ("up-delay", &self.up_delay),
            ("down-delay", &self.down_delay),
            ("learn-packet-interval", &self.learn_packet_interval),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect()
    }
}

impl Merge for BondParams {
    fn merge(&mut self, later: Self) {
        merge_opt(&mut self.mode, later.mode);
        merge_opt(&mut self.lacp_rate, later.lacp_rate);
        merge_opt(&mut self.mii_monitor_interval, later.mii_monitor_interval);
        merge_opt(&mut self.min_links, later.min_links);
        merge_opt(&mut self.transmit_hash_policy, later.transmit_hash_policy);
        merge_opt(&mut self.ad_select, later.ad_select);
        merge_opt(&mut self.all_members_active, later.all_members_active);
        merge_opt(&mut self.arp_interval, later.arp_interval);
        merge_opt(&mut self.arp_ip_targets, later.arp_ip_targets);
        merge_opt(&mut self.arp_validate, later.arp_validate);
        merge_opt(&mut self.arp_all_targets, later.arp_all_targets);
        merge_opt(&mut self.up_delay, later.up_delay);
        merge_opt(&mut self.down_delay, later.down_delay);
        merge_opt(&mut self.fail_over_mac_policy, later.fail_over_mac_policy);
        merge_opt(&mut self.gratuitous_arp, later.gratuitous_arp);
        merge_opt(&mut self.packets_per_member, later.packets_per_member);
        merge_opt(
            &mut self.primary_reselect_policy,
            later.primary_reselect_policy,
        );
        merge_opt(&mut self.resend_igmp, later.resend_igmp);
        merge_opt(&mut self.learn_packet_interval, later.learn_packet_interval);
        merge_opt(&mut self.primary, later.primary);
    }
}

impl Clear for BondParams {
    fn clear(&mut self, path: &[String]) -> bool {
        let [key] = path else { return false };
        match key.as_str() {
            "mode" => self.mode = None,
            "lacp-rate" => self.lacp_rate = None,
            "mii-monitor-interval" => self.mii_monitor_interval = None,
            "min-links" => self.min_links = None,
            "transmit-hash-policy" => self.transmit_hash_policy = None,
            "ad-select" => self.ad_select = None,
            "all-members-active" => self.all_members_active = None,
            "arp-interval" => self.arp_interval = None,
            "arp-ip-targets" => self.arp_ip_targets = None,
            "arp-validate" => self.arp_validate = None,
            "arp-all-targets" => self.arp_all_targets = None,
            "up-delay" => self.up_delay = None,
            "down-delay" => self.down_delay = None,
            "fail-over-mac-policy" => self.fail_over_mac_policy = None,
            "gratuitous-arp" => self.gratuitous_arp = None,
            "packets-per-member" => self.packets_per_member = None,
            "primary-reselect-policy" => self.primary_reselect_policy = None,
            "resend-igmp" => self.resend_igmp = None,
            "learn-packet-interval" => self.learn_packet_interval = None,
            "primary" => self.primary = None,
            _ => return false,
        }
        true
    }
}

/// Parse a duration as milliseconds. Unsuffixed values are milliseconds.
pub fn duration_ms(text: &str) -> Option<u64> {
    let text = text.trim();
    let (digits, factor) = if let Some(v) = text.strip_suffix("ms") {
        (v, 1)
    } else if let Some(v) = text.strip_suffix("min") {
        (v, 60_000)
    } else if let Some(v) = text.strip_suffix('s') {
        (v, 1000)
    } else {
        (text, 1)
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok()?.checked_mul(factor)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModemSettings {
    pub apn: Option<String>,
    pub auto_config: Option<bool>,
    pub device_id: Option<String>,
    pub network_id: Option<String>,
    pub number: Option<String>,
    pub password: Option<String>,
    pub pin: Option<String>,
    pub sim_id: Option<String>,
    pub sim_operator_id: Option<String>,
    pub username: Option<String>,
}

impl ModemSettings {
    /// GSM when any GSM-only setting is present, CDMA otherwise.
    pub fn is_gsm(&self) -> bool {
        self.apn.is_some()
            || self.auto_config.is_some()
            || self.device_id.is_some()
            || self.network_id.is_some()
            || self.pin.is_some()
            || self.sim_id.is_some()
            || self.sim_operator_id.is_some()
    }
}

impl Merge for ModemSettings {
    fn merge(&mut self, later: Self) {
        merge_opt(&mut self.apn, later.apn);
        merge_opt(&mut self.auto_config, later.auto_config);
        merge_opt(&mut self.device_id, later.device_id);
        merge_opt(&mut self.network_id, later.network_id);
        merge_opt(&mut self.number, later.number);
        merge_opt(&mut self.password, later.password);
        merge_opt(&mut self.pin, later.pin);
        merge_opt(&mut self.sim_id, later.sim_id);
        merge_opt(&mut self.sim_operator_id, later.sim_operator_id);
        merge_opt(&mut self.username, later.username);
    }
}

impl Clear for ModemSettings {
    fn clear(&mut self, path: &[String]) -> bool {
        let [key] = path else { return false };
        match key.as_str() {
            "apn" => self.apn = None,
            "auto-config" => self.auto_config = None,
            "device-id" => self.device_id = None,
            "network-id" => self.network_id = None,
            "number" => self.number = None,
            "password" => self.password = None,
            "pin" => self.pin = None,
            "sim-id" => self.sim_id = None,
            "sim-operator-id" => self.sim_operator_id = None,
            "username" => self.username = None,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OvsFailMode {
    Secure,
    Standalone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OvsLacp {
    Active,
    Passive,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum OvsConnectionMode {
    InBand,
    OutOfBand,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OvsController {
    pub addresses: Option<Vec<String>>,
    pub connection_mode: Option<OvsConnectionMode>,
}

impl Merge for OvsController {
    fn merge(&mut self, later: Self) {
        merge_opt(&mut self.addresses, later.addresses);
        merge_opt(&mut self.connection_mode, later.connection_mode);
    }
}

impl Clear for OvsController {
    fn clear(&mut self, path: &[String]) -> bool {
        let [key] = path else { return false };
        match key.as_str() {
            "addresses" => self.addresses = None,
            "connection-mode" => self.connection_mode = None,
            _ => return false,
        }
        true
    }
}

/// Open vSwitch settings of a bridge, bond or patch port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OvsSettings {
    pub fail_mode: Option<OvsFailMode>,
    pub mcast_snooping: Option<bool>,
    pub rstp: Option<bool>,
    pub protocols: Option<Vec<String>>,
    pub controller: Option<OvsController>,
    pub external_ids: Option<IndexMap<String, String>>,
    pub other_config: Option<IndexMap<String, String>>,
    pub lacp: Option<OvsLacp>,
}

impl Merge for OvsSettings {
    fn merge(&mut self, later: Self) {
        merge_opt(&mut self.fail_mode, later.fail_mode);
        merge_opt(&mut self.mcast_snooping, later.mcast_snooping);
        merge_opt(&mut self.rstp, later.rstp);
        merge_opt(&mut self.protocols, later.protocols);
        super::merge::merge_nested(&mut self.controller, later.controller);
        merge_map(&mut self.external_ids, later.external_ids);
        merge_map(&mut self.other_config, later.other_config);
        merge_opt(&mut self.lacp, later.lacp);
    }
}

impl Clear for OvsSettings {
    fn clear(&mut self, path: &[String]) -> bool {
        let Some((key, rest)) = path.split_first() else {
            return false;
        };
        match key.as_str() {
            "controller" => return clear_nested(&mut self.controller, rest),
            "external-ids" => return clear_map(&mut self.external_ids, rest),
            "other-config" => return clear_map(&mut self.other_config, rest),
            _ if !rest.is_empty() => return false,
            "fail-mode" => self.fail_mode = None,
            "mcast-snooping" => self.mcast_snooping = None,
            "rstp" => self.rstp = None,
            "protocols" => self.protocols = None,
            "lacp" => self.lacp = None,
            _ => return false,
        }
        true
    }
}

/// NetworkManager-only identity and the passthrough escape hatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NmSettings {
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub stable_id: Option<String>,
    pub device: Option<String>,
    /// `section.key` → raw keyfile value, in insertion order.
    pub passthrough: Option<IndexMap<String, String>>,
}

impl NmSettings {
    pub fn passthrough_get(&self, section: &str, key: &str) -> Option<&str> {
        self.passthrough
            .as_ref()?
            .get(&format!("{section}.{key}"))
            .map(String::as_str)
    }
}

impl Merge for NmSettings {
    fn merge(&mut self, later: Self) {
        merge_opt(&mut self.name, later.name);
        merge_opt(&mut self.uuid, later.uuid);
        merge_opt(&mut self.stable_id, later.stable_id);
        merge_opt(&mut self.device, later.device);
        merge_map(&mut self.passthrough, later.passthrough);
    }
}

impl Clear for NmSettings {
    fn clear(&mut self, path: &[String]) -> bool {
        let Some((key, rest)) = path.split_first() else {
            return false;
        };
        match key.as_str() {
            "passthrough" => return clear_map(&mut self.passthrough, rest),
            _ if !rest.is_empty() => return false,
            "name" => self.name = None,
            "uuid" => self.uuid = None,
            "stable-id" => self.stable_id = None,
            "device" => self.device = None,
            _ => return false,
        }
        true
    }
}

/// Split a passthrough key into keyfile section and key.
///
/// Section names may contain dots (`wireguard-peer.<key>`); keys never do,
/// so the split happens at the last dot.
pub fn split_passthrough_key(full: &str) -> Option<(&str, &str)> {
    let (section, key) = full.rsplit_once('.')?;
    (!section.is_empty() && !key.is_empty()).then_some((section, key))
}

#[cfg(test)]
mod tests {
    use super::{duration_ms, split_passthrough_key, Match};

    #[test]
    fn duration_defaults_to_milliseconds() {
        assert_eq!(duration_ms("100"), Some(100));
        assert_eq!(duration_ms("100ms"), Some(100));
        assert_eq!(duration_ms("2s"), Some(2000));
        assert_eq!(duration_ms("1min"), Some(60_000));
        assert_eq!(duration_ms("fast"), None);
    }

    #[test]
    fn passthrough_key_splits_at_last_dot() {
        assert_eq!(
            split_passthrough_key("wireguard-peer.abc=.endpoint"),
            Some(("wireguard-peer.abc=", "endpoint"))
        );
        assert_eq!(split_passthrough_key("nodot"), None);
    }

    #[test]
    fn literal_name_rejects_globs() {
        let m = Match {
            name: Some("en*".into()),
            ..Match::default()
        };
        assert_eq!(m.literal_name(), None);
        assert!(!m.is_empty());
    }
}
