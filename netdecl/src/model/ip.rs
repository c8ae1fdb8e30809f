//! Addressing, routing and DHCP settings shared by every device kind.

use std::net::IpAddr;

use strum::{Display, EnumString};

use super::merge::{merge_opt, Clear, Merge};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
pub enum Lifetime {
    #[strum(serialize = "forever")]
    Forever,
    #[strum(serialize = "0")]
    Zero,
}

/// A static address in CIDR notation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub cidr: String,
    pub lifetime: Option<Lifetime>,
    pub label: Option<String>,
}

impl Address {
    pub fn new(cidr: impl Into<String>) -> Self {
        Self {
            cidr: cidr.into(),
            lifetime: None,
            label: None,
        }
    }

    pub fn is_simple(&self) -> bool {
        self.lifetime.is_none() && self.label.is_none()
    }

    pub fn family(&self) -> Option<Family> {
        Family::of_prefix(&self.cidr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// Family of an address or prefix, ignoring any `/len` suffix.
    pub fn of_prefix(text: &str) -> Option<Self> {
        let addr = text.split('/').next().unwrap_or(text);
        match addr.parse::<IpAddr>().ok()? {
            IpAddr::V4(_) => Some(Self::V4),
            IpAddr::V6(_) => Some(Self::V6),
        }
    }
}

/// Parse and check `addr/len`.
pub fn parse_cidr(text: &str) -> Option<(IpAddr, u8)> {
    let (addr, len) = text.split_once('/')?;
    let addr: IpAddr = addr.parse().ok()?;
    let len: u8 = len.parse().ok()?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    (len <= max).then_some((addr, len))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RouteScope {
    Global,
    Link,
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RouteType {
    Unicast,
    Anycast,
    Blackhole,
    Broadcast,
    Local,
    Multicast,
    Nat,
    Prohibit,
    Throw,
    Unreachable,
    Xresolve,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Route {
    pub to: Option<String>,
    pub via: Option<String>,
    pub from: Option<String>,
    pub metric: Option<u32>,
    pub table: Option<u32>,
    pub scope: Option<RouteScope>,
    pub route_type: Option<RouteType>,
    pub on_link: Option<bool>,
    pub mtu: Option<u32>,
    pub congestion_window: Option<u32>,
    pub advertised_receive_window: Option<u32>,
}

impl Route {
    pub fn is_default(&self) -> bool {
        matches!(
            self.to.as_deref(),
            Some("default" | "0.0.0.0/0" | "::/0")
        )
    }

    /// Address family the route belongs to.
    ///
    /// `to: default` takes its family from `via`, then `from`.
    pub fn family(&self) -> Option<Family> {
        match self.to.as_deref() {
            Some("default") | None => self
                .via
                .as_deref()
                .and_then(Family::of_prefix)
                .or_else(|| self.from.as_deref().and_then(Family::of_prefix)),
            Some(to) => Family::of_prefix(to),
        }
    }

    /// Destination with `default` spelled out for the route's family.
    pub fn destination(&self) -> Option<String> {
        match self.to.as_deref()? {
            "default" => Some(match self.family() {
                Some(Family::V6) => "::/0".to_string(),
                _ => "0.0.0.0/0".to_string(),
            }),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingPolicyRule {
    pub from: Option<String>,
    pub to: Option<String>,
    pub table: Option<u32>,
    pub priority: Option<u32>,
    pub mark: Option<u32>,
    pub type_of_service: Option<u8>,
    pub input_interface: Option<String>,
}

impl RoutingPolicyRule {
    pub fn family(&self) -> Option<Family> {
        self.from
            .as_deref()
            .and_then(Family::of_prefix)
            .or_else(|| self.to.as_deref().and_then(Family::of_prefix))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nameservers {
    pub addresses: Option<Vec<String>>,
    pub search: Option<Vec<String>>,
}

impl Merge for Nameservers {
    fn merge(&mut self, later: Self) {
        merge_opt(&mut self.addresses, later.addresses);
        merge_opt(&mut self.search, later.search);
    }
}

impl Clear for Nameservers {
    fn clear(&mut self, path: &[String]) -> bool {
        let [key] = path else { return false };
        match key.as_str() {
            "addresses" => self.addresses = None,
            "search" => self.search = None,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum UseDomains {
    True,
    False,
    Route,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DhcpIdentifier {
    Mac,
    Duid,
}

/// Per-family DHCP client overrides. Unset fields mean the backend default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DhcpOverrides {
    pub use_dns: Option<bool>,
    pub use_ntp: Option<bool>,
    pub send_hostname: Option<bool>,
    pub use_hostname: Option<bool>,
    pub use_mtu: Option<bool>,
    pub hostname: Option<String>,
    pub use_routes: Option<bool>,
    pub route_metric: Option<u32>,
    pub use_domains: Option<UseDomains>,
}

impl Merge for DhcpOverrides {
    fn merge(&mut self, later: Self) {
        merge_opt(&mut self.use_dns, later.use_dns);
        merge_opt(&mut self.use_ntp, later.use_ntp);
        merge_opt(&mut self.send_hostname, later.send_hostname);
        merge_opt(&mut self.use_hostname, later.use_hostname);
        merge_opt(&mut self.use_mtu, later.use_mtu);
        merge_opt(&mut self.hostname, later.hostname);
        merge_opt(&mut self.use_routes, later.use_routes);
        merge_opt(&mut self.route_metric, later.route_metric);
        merge_opt(&mut self.use_domains, later.use_domains);
    }
}

impl Clear for DhcpOverrides {
    fn clear(&mut self, path: &[String]) -> bool {
        let [key] = path else { return false };
        match key.as_str() {
            "use-dns" => self.use_dns = None,
            "use-ntp" => self.use_ntp = None,
            "send-hostname" => self.send_hostname = None,
            "use-hostname" => self.use_hostname = None,
            "use-mtu" => self.use_mtu = None,
            "hostname" => self.hostname = None,
            "use-routes" => self.use_routes = None,
            "route-metric" => self.route_metric = None,
            "use-domains" => self.use_domains = None,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LinkLocal {
    Ipv4,
    Ipv6,
}

#[cfg(test)]
mod tests {
    use super::{parse_cidr, Family, Route};

    #[test]
    fn default_route_family_follows_gateway() {
        let route = Route {
            to: Some("default".into()),
            via: Some("2001:db8::1".into()),
            ..Route::default()
        };
        assert_eq!(route.family(), Some(Family::V6));
        assert_eq!(route.destination().as_deref(), Some("::/0"));
    }

    #[test]
    fn cidr_prefix_length_is_bounded_by_family() {
        assert!(parse_cidr("10.0.0.1/24").is_some());
        assert!(parse_cidr("10.0.0.1/33").is_none());
        assert!(parse_cidr("2001:db8::1/128").is_some());
        assert!(parse_cidr("10.0.0.1").is_none());
    }
}
