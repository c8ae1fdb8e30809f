//! Wireless access points and 802.1x authentication.

use strum::{Display, EnumString};

use super::merge::{clear_nested, merge_nested, merge_opt, Clear, Merge};
use super::params::NmSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum WifiMode {
    Infrastructure,
    Ap,
    Adhoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
pub enum Band {
    #[strum(serialize = "5GHz")]
    A,
    #[strum(serialize = "2.4GHz")]
    Bg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
pub enum KeyManagement {
    #[strum(serialize = "none")]
    None,
    #[strum(serialize = "psk")]
    Psk,
    #[strum(serialize = "eap")]
    Eap,
    #[strum(serialize = "sae")]
    Sae,
    #[strum(serialize = "802.1x")]
    Ieee8021x,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum EapMethod {
    Tls,
    Peap,
    Ttls,
    Leap,
    Pwd,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSettings {
    pub key_management: Option<KeyManagement>,
    pub method: Option<EapMethod>,
    pub identity: Option<String>,
    pub anonymous_identity: Option<String>,
    pub password: Option<String>,
    pub ca_certificate: Option<String>,
    pub client_certificate: Option<String>,
    pub client_key: Option<String>,
    pub client_key_password: Option<String>,
    pub phase2_auth: Option<String>,
}

impl AuthSettings {
    /// Key management, inferred as PSK when only a password is present.
    pub fn effective_key_management(&self) -> KeyManagement {
        match self.key_management {
            Some(km) => km,
            None if self.password.is_some() => KeyManagement::Psk,
            None => KeyManagement::None,
        }
    }

    pub fn uses_eap(&self) -> bool {
        matches!(
            self.effective_key_management(),
            KeyManagement::Eap | KeyManagement::Ieee8021x
        )
    }
}

impl Merge for AuthSettings {
    fn merge(&mut self, later: Self) {
        merge_opt(&mut self.key_management, later.key_management);
        merge_opt(&mut self.method, later.method);
        merge_opt(&mut self.identity, later.identity);
        merge_opt(&mut self.anonymous_identity, later.anonymous_identity);
        merge_opt(&mut self.password, later.password);
        merge_opt(&mut self.ca_certificate, later.ca_certificate);
        merge_opt(&mut self.client_certificate, later.client_certificate);
        merge_opt(&mut self.client_key, later.client_key);
        merge_opt(&mut self.client_key_password, later.client_key_password);
        merge_opt(&mut self.phase2_auth, later.phase2_auth);
    }
}

impl Clear for AuthSettings {
    fn clear(&mut self, path: &[String]) -> bool {
        let [key] = path else { return false };
        match key.as_str() {
            "key-management" => self.key_management = None,
            "method" => self.method = None,
            "identity" => self.identity = None,
            "anonymous-identity" => self.anonymous_identity = None,
            "password" => self.password = None,
            "ca-certificate" => self.ca_certificate = None,
            "client-certificate" => self.client_certificate = None,
            "client-key" => self.client_key = None,
            "client-key-password" => self.client_key_password = None,
            "phase2-auth" => self.phase2_auth = None,
            _ => return false,
        }
        true
    }
}

/// One access point, keyed by SSID in the owning definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPoint {
    pub password: Option<String>,
    pub mode: Option<WifiMode>,
    pub bssid: Option<String>,
    pub band: Option<Band>,
    pub channel: Option<u32>,
    pub hidden: Option<bool>,
    pub auth: Option<AuthSettings>,
    pub networkmanager: Option<NmSettings>,
}

impl AccessPoint {
    /// Authentication with a bare `password` folded in.
    pub fn effective_auth(&self) -> AuthSettings {
        let mut auth = self.auth.clone().unwrap_or_default();
        if auth.password.is_none() {
            auth.password = self.password.clone();
        }
        auth
    }

    pub fn mode(&self) -> WifiMode {
        self.mode.unwrap_or(WifiMode::Infrastructure)
    }
}

impl Merge for AccessPoint {
    fn merge(&mut self, later: Self) {
        merge_opt(&mut self.password, later.password);
        merge_opt(&mut self.mode, later.mode);
        merge_opt(&mut self.bssid, later.bssid);
        merge_opt(&mut self.band, later.band);
        merge_opt(&mut self.channel, later.channel);
        merge_opt(&mut self.hidden, later.hidden);
        merge_nested(&mut self.auth, later.auth);
        merge_nested(&mut self.networkmanager, later.networkmanager);
    }
}

impl Clear for AccessPoint {
    fn clear(&mut self, path: &[String]) -> bool {
        let Some((key, rest)) = path.split_first() else {
            return false;
        };
        match key.as_str() {
            "auth" => return clear_nested(&mut self.auth, rest),
            "networkmanager" => return clear_nested(&mut self.networkmanager, rest),
            _ if !rest.is_empty() => return false,
            "password" => self.password = None,
            "mode" => self.mode = None,
            "bssid" => self.bssid = None,
            "band" => self.band = None,
            "channel" => self.channel = None,
            "hidden" => self.hidden = None,
            _ => return false,
        }
        true
    }
}

/// True for a WPA passphrase (8..=63 characters) or a raw 64-digit hex key.
pub fn is_valid_psk(psk: &str) -> bool {
    let len = psk.chars().count();
    (8..=63).contains(&len) || (len == 64 && psk.bytes().all(|b| b.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::{is_valid_psk, AccessPoint, KeyManagement};

    #[test]
    fn bare_password_implies_psk() {
        let ap = AccessPoint {
            password: Some("hunter2hunter2".into()),
            ..AccessPoint::default()
        };
        assert_eq!(
            ap.effective_auth().effective_key_management(),
            KeyManagement::Psk
        );
    }

    #[test]
    fn psk_length_bounds() {
        assert!(!is_valid_psk("short"));
        assert!(is_valid_psk("eightchr"));
        assert!(is_valid_psk(&"a".repeat(64)));
        assert!(!is_valid_psk(&"z".repeat(64)));
    }
}
