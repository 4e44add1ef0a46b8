//! Wi-Fi scan adapters.
//!
//! A [`WifiScanner`] produces the access point list fed to the channel
//! scorer. Three modes exist:
//!
//! | Mode | Scanner | Source of data |
//! |------|---------|----------------|
//! | `manual` | [`ManualScanner`] | Access points supplied by the caller |
//! | `router_api` | [`RouterApiScanner`] | Router management API (not queried yet) |
//! | `host_scan` | [`HostScanner`] | `iwlist`, falling back to `nmcli` |
//!
//! Use [`create_scanner`] to build one from [`ScannerSettings`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use zigsight_types::WifiAccessPoint;

use crate::error::{Error, Result};

/// Timeout applied to each host scanning tool.
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Wireless interface scanned when none is configured.
pub const DEFAULT_INTERFACE: &str = "wlan0";

/// Base used to turn a signal percentage into approximate dBm.
const RSSI_BASE_DBM: f64 = -100.0;

/// Trait for Wi-Fi scan adapters.
#[async_trait]
pub trait WifiScanner: Send + Sync {
    /// The scanner mode name.
    fn mode(&self) -> &'static str;

    /// Scan for access points.
    async fn scan(&self) -> Result<Vec<WifiAccessPoint>>;
}

/// Pre-scanned data in either accepted shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScanData {
    /// A bare list of access points.
    List(Vec<WifiAccessPoint>),
    /// An object with an `access_points` list.
    Wrapped {
        #[serde(default)]
        access_points: Vec<WifiAccessPoint>,
    },
}

impl ScanData {
    /// The access points, whichever shape they came in.
    pub fn access_points(&self) -> &[WifiAccessPoint] {
        match self {
            ScanData::List(aps) | ScanData::Wrapped { access_points: aps } => aps,
        }
    }
}

impl From<Vec<WifiAccessPoint>> for ScanData {
    fn from(aps: Vec<WifiAccessPoint>) -> Self {
        ScanData::List(aps)
    }
}

/// Router connection details.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Router family (`unifi`, `openwrt`, `fritzbox`, ...).
    pub router_type: String,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl fmt::Debug for RouterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterSettings")
            .field("router_type", &self.router_type)
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Host scanning options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub interface: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            interface: DEFAULT_INTERFACE.to_string(),
        }
    }
}

/// Scanner selection and mode-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScannerSettings {
    /// `manual`, `router_api` or `host_scan` (case-insensitive).
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_data: Option<ScanData>,
    #[serde(default, alias = "router_config", skip_serializing_if = "Option::is_none")]
    pub router: Option<RouterSettings>,
    #[serde(default, alias = "host_config", skip_serializing_if = "Option::is_none")]
    pub host: Option<HostSettings>,
}

impl ScannerSettings {
    /// Settings for manual mode.
    pub fn manual(scan_data: impl Into<ScanData>) -> Self {
        Self {
            mode: "manual".to_string(),
            scan_data: Some(scan_data.into()),
            ..Default::default()
        }
    }

    /// Settings for host scanning on `interface`.
    pub fn host(interface: impl Into<String>) -> Self {
        Self {
            mode: "host_scan".to_string(),
            host: Some(HostSettings {
                interface: interface.into(),
            }),
            ..Default::default()
        }
    }
}

/// Build the scanner selected by `settings`.
///
/// ```
/// use zigsight_core::scanner::{ScannerSettings, create_scanner};
///
/// let scanner = create_scanner(&ScannerSettings::host("wlan1")).unwrap();
/// assert_eq!(scanner.mode(), "host_scan");
///
/// let err = create_scanner(&ScannerSettings { mode: "manual".into(), ..Default::default() });
/// assert!(err.is_err());
/// ```
pub fn create_scanner(settings: &ScannerSettings) -> Result<Box<dyn WifiScanner>> {
    match settings.mode.to_ascii_lowercase().as_str() {
        "manual" => {
            let data = settings
                .scan_data
                .clone()
                .ok_or_else(|| Error::invalid_config("scan_data is required for manual mode"))?;
            Ok(Box::new(ManualScanner::new(data)))
        }
        "router_api" => {
            let router = settings.router.clone().ok_or_else(|| {
                Error::invalid_config("router_config is required for router_api mode")
            })?;
            Ok(Box::new(RouterApiScanner::new(router)))
        }
        "host_scan" => {
            let interface = settings
                .host
                .as_ref()
                .map(|h| h.interface.clone())
                .unwrap_or_else(|| DEFAULT_INTERFACE.to_string());
            Ok(Box::new(HostScanner::new(interface)))
        }
        _ => Err(Error::invalid_config(format!(
            "Invalid scanner mode: {}",
            settings.mode
        ))),
    }
}

/// Scanner returning caller-supplied data.
#[derive(Debug, Clone)]
pub struct ManualScanner {
    data: ScanData,
}

impl ManualScanner {
    pub fn new(data: ScanData) -> Self {
        Self { data }
    }
}

#[async_trait]
impl WifiScanner for ManualScanner {
    fn mode(&self) -> &'static str {
        "manual"
    }

    async fn scan(&self) -> Result<Vec<WifiAccessPoint>> {
        Ok(self.data.access_points().to_vec())
    }
}

/// Scanner for router management APIs.
///
/// No router family is queried yet; scans log a hint and return nothing.
#[derive(Debug, Clone)]
pub struct RouterApiScanner {
    settings: RouterSettings,
}

impl RouterApiScanner {
    pub fn new(mut settings: RouterSettings) -> Self {
        settings.router_type = settings.router_type.to_ascii_lowercase();
        Self { settings }
    }

    /// Normalized router family.
    pub fn router_type(&self) -> &str {
        &self.settings.router_type
    }
}

#[async_trait]
impl WifiScanner for RouterApiScanner {
    fn mode(&self) -> &'static str {
        "router_api"
    }

    async fn scan(&self) -> Result<Vec<WifiAccessPoint>> {
        info!(
            "Router API scan is not supported for {} at {}; use manual mode with data exported from the router",
            self.settings.router_type, self.settings.host
        );
        Ok(Vec::new())
    }
}

/// Scanner running wireless tools on the local host.
#[derive(Debug, Clone)]
pub struct HostScanner {
    interface: String,
    timeout: Duration,
}

impl HostScanner {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            timeout: SCAN_TIMEOUT,
        }
    }

    /// Override the per-tool timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    async fn run_tool(&self, program: &str, args: &[&str]) -> Result<String> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(program).args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| Error::timeout(format!("{} scan", program), self.timeout))??;

        if !output.status.success() {
            return Err(Error::Scan(format!(
                "{} exited with {}",
                program, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl WifiScanner for HostScanner {
    fn mode(&self) -> &'static str {
        "host_scan"
    }

    async fn scan(&self) -> Result<Vec<WifiAccessPoint>> {
        match self.run_tool("iwlist", &[&self.interface, "scan"]).await {
            Ok(output) => {
                let aps = parse_iwlist_output(&output);
                if !aps.is_empty() {
                    return Ok(aps);
                }
            }
            Err(e) => debug!("iwlist scan failed: {}", e),
        }

        match self
            .run_tool("nmcli", &["-t", "-f", "SSID,CHAN,SIGNAL", "dev", "wifi", "list"])
            .await
        {
            Ok(output) => {
                let aps = parse_nmcli_output(&output);
                if !aps.is_empty() {
                    return Ok(aps);
                }
            }
            Err(e) => debug!("nmcli scan failed: {}", e),
        }

        warn!(
            "Host Wi-Fi scan on {} found nothing; iwlist or nmcli with scan permissions is required",
            self.interface
        );
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct PartialAp {
    ssid: Option<String>,
    channel: Option<u8>,
    rssi: Option<f64>,
}

impl PartialAp {
    fn finish(self) -> Option<WifiAccessPoint> {
        let mut ap = WifiAccessPoint::new(self.channel?, self.rssi?);
        ap.ssid = self.ssid;
        Some(ap)
    }
}

fn parse_signal_level(value: &str) -> Option<f64> {
    if value.contains("dBm") {
        value.split_whitespace().next()?.parse::<i32>().ok().map(f64::from)
    } else {
        let percent = value.split('/').next()?.trim().parse::<i32>().ok()?;
        Some(RSSI_BASE_DBM + f64::from(percent))
    }
}

/// Parse `iwlist <iface> scan` output.
///
/// Only cells reporting both a channel and a signal level are returned.
pub fn parse_iwlist_output(output: &str) -> Vec<WifiAccessPoint> {
    let mut cells: Vec<PartialAp> = Vec::new();
    let mut current: Option<PartialAp> = None;

    for line in output.lines().map(str::trim) {
        if line.starts_with("Cell ") {
            cells.extend(current.replace(PartialAp::default()));
            continue;
        }

        let ap = current.get_or_insert_with(PartialAp::default);
        if let Some((_, rest)) = line.split_once("ESSID:") {
            let ssid = rest.trim().trim_matches('"');
            if !ssid.is_empty() {
                ap.ssid = Some(ssid.to_string());
            }
        } else if let Some((_, rest)) = line.split_once("Channel:") {
            if let Some(channel) = rest.split_whitespace().next().and_then(|c| c.parse().ok()) {
                ap.channel = Some(channel);
            }
        } else if let Some((_, rest)) = line.split_once("Signal level=") {
            if let Some(rssi) = parse_signal_level(rest.trim()) {
                ap.rssi = Some(rssi);
            }
        }
    }
    cells.extend(current);

    cells.into_iter().filter_map(PartialAp::finish).collect()
}

/// Parse `nmcli -t -f SSID,CHAN,SIGNAL dev wifi list` output.
///
/// The signal column is a percentage and is mapped to approximate dBm.
pub fn parse_nmcli_output(output: &str) -> Vec<WifiAccessPoint> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split(':');
            let ssid = parts.next()?.trim();
            let channel = parts.next()?.trim().parse::<u8>().ok()?;
            let signal = parts.next()?.trim().parse::<i32>().ok()?;

            let ap = WifiAccessPoint::new(channel, RSSI_BASE_DBM + f64::from(signal));
            Some(if ssid.is_empty() { ap } else { ap.with_ssid(ssid) })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const IWLIST_SAMPLE: &str = r#"wlan0     Scan completed :
          Cell 01 - Address: AA:BB:CC:DD:EE:01
                    Channel:6
                    Frequency:2.437 GHz (Channel 6)
                    Quality=70/70  Signal level=-40 dBm
                    Encryption key:on
                    ESSID:"HomeNet"
          Cell 02 - Address: AA:BB:CC:DD:EE:02
                    Channel:11
                    Quality=42/100  Signal level=60/100
                    ESSID:""
          Cell 03 - Address: AA:BB:CC:DD:EE:03
                    ESSID:"NoChannel"
                    Quality=42/70  Signal level=-70 dBm
"#;

    #[test]
    fn test_parse_iwlist() {
        let aps = parse_iwlist_output(IWLIST_SAMPLE);
        assert_eq!(aps.len(), 2);

        assert_eq!(aps[0].channel, 6);
        assert_eq!(aps[0].rssi, Some(-40.0));
        assert_eq!(aps[0].ssid.as_deref(), Some("HomeNet"));

        assert_eq!(aps[1].channel, 11);
        assert_eq!(aps[1].rssi, Some(-40.0));
        assert_eq!(aps[1].ssid, None);
    }

    #[test]
    fn test_parse_iwlist_garbage() {
        assert!(parse_iwlist_output("").is_empty());
        assert!(parse_iwlist_output("Cell 01\nChannel:abc\nSignal level=weak").is_empty());
    }

    #[test]
    fn test_parse_nmcli() {
        let output = "HomeNet:6:80\n:11:35\nbroken line\nOffice:x:50\nCafe:1:abc\n";
        let aps = parse_nmcli_output(output);
        assert_eq!(aps.len(), 2);
        assert_eq!(aps[0], WifiAccessPoint::new(6, -20.0).with_ssid("HomeNet"));
        assert_eq!(aps[1], WifiAccessPoint::new(11, -65.0));
    }

    #[tokio::test]
    async fn test_manual_scanner_list() {
        let data: ScanData = serde_json::from_value(json!([
            {"channel": 1, "rssi": -50},
            {"channel": 6}
        ]))
        .unwrap();
        let scanner = ManualScanner::new(data);
        let aps = scanner.scan().await.unwrap();
        assert_eq!(aps.len(), 2);
        assert_eq!(aps[1].rssi, None);
    }

    #[tokio::test]
    async fn test_manual_scanner_wrapped() {
        let data: ScanData = serde_json::from_value(json!({
            "access_points": [{"channel": 11, "rssi": -60, "ssid": "x"}]
        }))
        .unwrap();
        let aps = ManualScanner::new(data).scan().await.unwrap();
        assert_eq!(aps, vec![WifiAccessPoint::new(11, -60.0).with_ssid("x")]);

        let empty: ScanData = serde_json::from_value(json!({})).unwrap();
        assert!(empty.access_points().is_empty());
    }

    #[tokio::test]
    async fn test_router_scanner_returns_nothing() {
        let scanner = create_scanner(&ScannerSettings {
            mode: "ROUTER_API".to_string(),
            router: Some(RouterSettings {
                router_type: "OpenWrt".to_string(),
                host: "192.168.1.1".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(scanner.mode(), "router_api");
        assert!(scanner.scan().await.unwrap().is_empty());
    }

    #[test]
    fn test_create_scanner_errors() {
        let err = create_scanner(&ScannerSettings {
            mode: "manual".to_string(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("scan_data is required for manual mode"));

        let err = create_scanner(&ScannerSettings {
            mode: "router_api".to_string(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("router_config is required for router_api mode"));

        let err = create_scanner(&ScannerSettings {
            mode: "telepathy".to_string(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("Invalid scanner mode: telepathy"));
    }

    #[test]
    fn test_create_scanner_modes() {
        let manual = create_scanner(&ScannerSettings::manual(vec![WifiAccessPoint::new(1, -50.0)]));
        assert_eq!(manual.unwrap().mode(), "manual");

        let host = create_scanner(&ScannerSettings {
            mode: "Host_Scan".to_string(),
            ..Default::default()
        });
        assert_eq!(host.unwrap().mode(), "host_scan");
    }

    #[test]
    fn test_settings_deserialize_aliases() {
        let settings: ScannerSettings = serde_json::from_value(json!({
            "mode": "router_api",
            "router_config": {"router_type": "unifi", "host": "10.0.0.1", "password": "hunter2"}
        }))
        .unwrap();
        let router = settings.router.unwrap();
        assert_eq!(router.host, "10.0.0.1");
        assert!(!format!("{:?}", router).contains("hunter2"));

        let settings: ScannerSettings =
            serde_json::from_value(json!({"mode": "host_scan", "host_config": {}})).unwrap();
        assert_eq!(settings.host.unwrap().interface, "wlan0");
    }

    #[test]
    fn test_host_scanner_defaults() {
        let scanner = HostScanner::new("wlp3s0").with_timeout(Duration::from_secs(5));
        assert_eq!(scanner.interface(), "wlp3s0");
        assert_eq!(scanner.timeout, Duration::from_secs(5));
    }
}
