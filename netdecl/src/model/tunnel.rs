//! IP tunnels, VXLAN and WireGuard.

use strum::{Display, EnumString};

use super::merge::{merge_nested, merge_opt, Clear, Merge};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TunnelMode {
    Sit,
    Gre,
    Ip6gre,
    Ipip,
    Ipip6,
    Ip6ip6,
    Vti,
    Vti6,
    Gretap,
    Ip6gretap,
    Isatap,
    Vxlan,
    Wireguard,
}

impl TunnelMode {
    /// Modes whose remote endpoint is IPv6.
    pub fn is_ipv6(self) -> bool {
        matches!(
            self,
            Self::Ip6gre | Self::Ipip6 | Self::Ip6ip6 | Self::Vti6 | Self::Ip6gretap
        )
    }

    /// Modes carried as a plain ip tunnel (not vxlan, not wireguard).
    pub fn is_ip_tunnel(self) -> bool {
        !matches!(self, Self::Vxlan | Self::Wireguard)
    }

    /// Modes that take `input`/`output` keys.
    pub fn is_keyed(self) -> bool {
        matches!(
            self,
            Self::Gre | Self::Ip6gre | Self::Gretap | Self::Ip6gretap | Self::Vti | Self::Vti6
        )
    }

    /// Kernel netdev kind for networkd.
    pub fn netdev_kind(self) -> &'static str {
        match self {
            Self::Sit => "sit",
            Self::Gre => "gre",
            Self::Ip6gre => "ip6gre",
            Self::Ipip => "ipip",
            Self::Ipip6 | Self::Ip6ip6 => "ip6tnl",
            Self::Vti => "vti",
            Self::Vti6 => "vti6",
            Self::Gretap => "gretap",
            Self::Ip6gretap => "ip6gretap",
            Self::Isatap => "sit",
            Self::Vxlan => "vxlan",
            Self::Wireguard => "wireguard",
        }
    }

    /// NetworkManager `ip-tunnel.mode` number.
    pub fn nm_mode(self) -> Option<u8> {
        Some(match self {
            Self::Ipip => 1,
            Self::Gre => 2,
            Self::Sit => 3,
            Self::Isatap => 4,
            Self::Vti => 5,
            Self::Ip6ip6 => 6,
            Self::Ipip6 => 7,
            Self::Ip6gre => 8,
            Self::Vti6 => 9,
            Self::Gretap => 10,
            Self::Ip6gretap => 11,
            Self::Vxlan | Self::Wireguard => return None,
        })
    }

    pub fn from_nm_mode(mode: u8) -> Option<Self> {
        [
            Self::Ipip,
            Self::Gre,
            Self::Sit,
            Self::Isatap,
            Self::Vti,
            Self::Ip6ip6,
            Self::Ipip6,
            Self::Ip6gre,
            Self::Vti6,
            Self::Gretap,
            Self::Ip6gretap,
        ]
        .into_iter()
        .find(|m| m.nm_mode() == Some(mode))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelKeys {
    pub input: Option<String>,
    pub output: Option<String>,
    pub private: Option<String>,
}

impl Merge for TunnelKeys {
    fn merge(&mut self, later: Self) {
        merge_opt(&mut self.input, later.input);
        merge_opt(&mut self.output, later.output);
        merge_opt(&mut self.private, later.private);
    }
}

impl Clear for TunnelKeys {
    fn clear(&mut self, path: &[String]) -> bool {
        let [key] = path else { return false };
        match key.as_str() {
            "input" => self.input = None,
            "output" => self.output = None,
            "private" => self.private = None,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerKeys {
    pub public: Option<String>,
    pub shared: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireguardPeer {
    pub keys: PeerKeys,
    pub allowed_ips: Option<Vec<String>>,
    pub endpoint: Option<String>,
    pub keepalive: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelSettings {
    pub mode: Option<TunnelMode>,
    pub local: Option<String>,
    pub remote: Option<String>,
    /// Shorthand for identical input and output keys, or the wireguard
    /// private key.
    pub key: Option<String>,
    pub keys: Option<TunnelKeys>,
    pub ttl: Option<u32>,
    pub port: Option<u32>,
    /// VXLAN network identifier.
    pub vni: Option<u32>,
    pub peers: Option<Vec<WireguardPeer>>,
    pub mark: Option<u32>,
}

impl TunnelSettings {
    pub fn input_key(&self) -> Option<&str> {
        self.keys
            .as_ref()
            .and_then(|k| k.input.as_deref())
            .or(self.key.as_deref())
    }

    pub fn output_key(&self) -> Option<&str> {
        self.keys
            .as_ref()
            .and_then(|k| k.output.as_deref())
            .or(self.key.as_deref())
    }

    pub fn private_key(&self) -> Option<&str> {
        self.keys
            .as_ref()
            .and_then(|k| k.private.as_deref())
            .or(self.key.as_deref())
    }
}

impl Merge for TunnelSettings {
    fn merge(&mut self, later: Self) {
        merge_opt(&mut self.mode, later.mode);
        merge_opt(&mut self.local, later.local);
        merge_opt(&mut self.remote, later.remote);
        merge_opt(&mut self.key, later.key);
        merge_nested(&mut self.keys, later.keys);
        merge_opt(&mut self.ttl, later.ttl);
        merge_opt(&mut self.port, later.port);
        merge_opt(&mut self.vni, later.vni);
        merge_opt(&mut self.peers, later.peers);
        merge_opt(&mut self.mark, later.mark);
    }
}
