//! wpa_supplicant configuration for wifi and 802.1x ethernets under
//! networkd, with the service that runs the supplicant.

use crate::context::EngineContext;
use crate::model::wifi::Band;
use crate::model::{AccessPoint, AuthSettings, EapMethod, KeyManagement, KindPayload, WifiMode};
use crate::render::output::{OutputTree, MODE_PUBLIC, MODE_SECRET};
use crate::render::units::UnitFile;

/// Add the supplicant config, service and wants link for `iface`.
///
/// Returns false when the device needs no supplicant.
pub fn render(tree: &mut OutputTree, ctx: &EngineContext, iface: &str, payload: &KindPayload) -> bool {
    let ns = &ctx.namespace;
    let (config, wired) = match payload {
        KindPayload::Wifi(wifi) => {
            let Some(aps) = wifi.access_points.as_ref().filter(|aps| !aps.is_empty()) else {
                return false;
            };
            let mut config = String::from("ctrl_interface=/run/wpa_supplicant\n");
            for (ssid, ap) in aps {
                config.push('\n');
                wifi_network(&mut config, ssid, ap);
            }
            (config, false)
        }
        KindPayload::Ethernet(eth) => {
            let Some(auth) = &eth.auth else { return false };
            let mut config = String::from("ctrl_interface=/run/wpa_supplicant\nap_scan=0\n\n");
            config.push_str("network={\n");
            auth_lines(&mut config, auth, true);
            config.push_str("}\n");
            (config, true)
        }
        _ => return false,
    };

    let conf_path = format!("run/{ns}/wpa-{iface}.conf");
    let service = format!("{ns}-wpa-{iface}.service");
    tree.add_file(&conf_path, config, MODE_SECRET);
    tree.add_file(
        format!("run/systemd/system/{service}"),
        service_unit(iface, &format!("/{conf_path}"), wired).to_string(),
        MODE_PUBLIC,
    );
    tree.add_symlink(
        format!("run/systemd/system/systemd-networkd.service.wants/{service}"),
        format!("/run/systemd/system/{service}"),
    );
    true
}

fn wifi_network(out: &mut String, ssid: &str, ap: &AccessPoint) {
    out.push_str("network={\n");
    out.push_str(&format!("  ssid=\"{ssid}\"\n"));
    match ap.mode() {
        WifiMode::Infrastructure => {}
        WifiMode::Adhoc => out.push_str("  mode=1\n"),
        WifiMode::Ap => out.push_str("  mode=2\n"),
    }
    if let Some(bssid) = &ap.bssid {
        out.push_str(&format!("  bssid={bssid}\n"));
    }
    if ap.hidden == Some(true) {
        out.push_str("  scan_ssid=1\n");
    }
    match (ap.band, ap.channel) {
        (Some(band), Some(channel)) => {
            out.push_str(&format!("  frequency={}\n", frequency(band, channel)));
        }
        (Some(Band::A), None) => out.push_str("  freq_list=5180 5200 5220 5240 5745 5765 5785 5805\n"),
        (Some(Band::Bg), None) => out.push_str("  freq_list=2412 2417 2422 2427 2432 2437 2442 2447 2452 2457 2462\n"),
        _ => {}
    }
    auth_lines(out, &ap.effective_auth(), false);
    out.push_str("}\n");
}

/// Centre frequency in MHz of a channel.
pub fn frequency(band: Band, channel: u32) -> u32 {
    match band {
        Band::Bg if channel == 14 => 2484,
        Band::Bg => 2407 + 5 * channel,
        Band::A => 5000 + 5 * channel,
    }
}

fn auth_lines(out: &mut String, auth: &AuthSettings, wired: bool) {
    let km = auth.effective_key_management();
    let key_mgmt = match km {
        KeyManagement::None => "NONE",
        KeyManagement::Psk => "WPA-PSK",
        KeyManagement::Sae => "SAE",
        KeyManagement::Eap => "WPA-EAP",
        KeyManagement::Ieee8021x => "IEEE8021X",
    };
    let key_mgmt = if wired && km == KeyManagement::Eap { "IEEE8021X" } else { key_mgmt };
    out.push_str(&format!("  key_mgmt={key_mgmt}\n"));

    match km {
        KeyManagement::Psk | KeyManagement::Sae => {
            if km == KeyManagement::Sae {
                out.push_str("  ieee80211w=2\n");
            }
            if let Some(psk) = &auth.password {
                if psk.len() == 64 && psk.bytes().all(|b| b.is_ascii_hexdigit()) {
                    out.push_str(&format!("  psk={psk}\n"));
                } else {
                    out.push_str(&format!("  psk=\"{psk}\"\n"));
                }
            }
        }
        KeyManagement::Eap | KeyManagement::Ieee8021x => {
            if let Some(method) = auth.method {
                out.push_str(&format!("  eap={}\n", eap_name(method)));
            }
            let quoted = [
                ("identity", &auth.identity),
                ("anonymous_identity", &auth.anonymous_identity),
                ("password", &auth.password),
                ("ca_cert", &auth.ca_certificate),
                ("client_cert", &auth.client_certificate),
                ("private_key", &auth.client_key),
                ("private_key_passwd", &auth.client_key_password),
            ];
            for (key, value) in quoted {
                if let Some(value) = value {
                    out.push_str(&format!("  {key}=\"{value}\"\n"));
                }
            }
            if let Some(phase2) = &auth.phase2_auth {
                out.push_str(&format!("  phase2=\"auth={phase2}\"\n"));
            }
        }
        KeyManagement::None => {}
    }
}

fn eap_name(method: EapMethod) -> &'static str {
    match method {
        EapMethod::Tls => "TLS",
        EapMethod::Peap => "PEAP",
        EapMethod::Ttls => "TTLS",
        EapMethod::Leap => "LEAP",
        EapMethod::Pwd => "PWD",
    }
}

fn service_unit(iface: &str, conf: &str, wired: bool) -> UnitFile {
    let device = format!("sys-subsystem-net-devices-{}.device", systemd_escape(iface));
    let mut unit = UnitFile::new();
    unit.section("Unit")
        .set("Description", format!("WPA supplicant for {iface}"))
        .set("DefaultDependencies", "no")
        .set("Requires", &device)
        .set("After", &device)
        .set("Before", "network.target")
        .set("Wants", "network.target");
    let driver = if wired { " -Dwired" } else { "" };
    unit.section("Service")
        .set("Type", "simple")
        .set("ExecStart", format!("/sbin/wpa_supplicant -c {conf} -i{iface}{driver}"));
    unit
}

/// Escape a name for use inside a systemd unit name.
pub fn systemd_escape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (idx, c) in name.chars().enumerate() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | ':' | '_' => out.push(c),
            '.' if idx > 0 => out.push(c),
            '/' => out.push('-'),
            _ => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("\\x{byte:02x}"));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{frequency, render, systemd_escape};
    use crate::context::EngineContext;
    use crate::model::wifi::Band;
    use crate::parse::Parser;
    use crate::render::output::{Entry, OutputTree};

    #[test]
    fn psk_network_with_hidden_ssid() {
        let mut parser = Parser::new();
        parser
            .load_str(
                "network:\n  wifis:\n    wlan0:\n      access-points:\n        home: {password: \"correcthorse\", hidden: true}\n",
                None,
            )
            .expect("load");
        let def = parser.get("wlan0").expect("wlan0").clone();
        let mut tree = OutputTree::new();
        assert!(render(&mut tree, &EngineContext::default(), "wlan0", &def.payload));

        assert_eq!(
            tree.contents("run/netdecl/wpa-wlan0.conf"),
            Some("ctrl_interface=/run/wpa_supplicant\n\nnetwork={\n  ssid=\"home\"\n  scan_ssid=1\n  key_mgmt=WPA-PSK\n  psk=\"correcthorse\"\n}\n")
        );
        assert!(matches!(
            tree.get("run/systemd/system/systemd-networkd.service.wants/netdecl-wpa-wlan0.service"),
            Some(Entry::Symlink { .. })
        ));
    }

    #[test]
    fn channel_frequencies() {
        assert_eq!(frequency(Band::Bg, 1), 2412);
        assert_eq!(frequency(Band::Bg, 14), 2484);
        assert_eq!(frequency(Band::A, 36), 5180);
    }

    #[test]
    fn unit_names_escape_dashes() {
        assert_eq!(systemd_escape("wl-0"), "wl\\x2d0");
        assert_eq!(systemd_escape("eth0.10"), "eth0.10");
    }
}
