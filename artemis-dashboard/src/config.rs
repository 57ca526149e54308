use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

use crate::error::Result;
use crate::models::GeoPosition;

pub const CONFIG_ENV: &str = "ARTEMIS_DASHBOARD_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "dashboard.yaml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DashboardConfig {
    pub mqtt: MqttConf,
    pub http: HttpConf,
    pub alert: AlertConf,
    pub view: ViewConf,
    pub map: MapConf,
    pub login: LoginConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AlertConf {
    /// Nombre de ticks avant fermeture automatique
    pub countdown: u32,
    pub tick_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ViewConf {
    pub refresh_secs: u64,
    /// En dessous, la carte affiche "Just now"
    pub just_now_secs: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MapConf {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: u8,
    pub focus_zoom: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoginConf {
    pub username: String,
    pub password: String,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self { host: "localhost".into(), port: 1883, client_id: None, keep_alive_secs: 15 }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

impl Default for AlertConf {
    fn default() -> Self {
        Self { countdown: 60, tick_ms: 1000 }
    }
}

impl Default for ViewConf {
    fn default() -> Self {
        Self { refresh_secs: 2, just_now_secs: 10 }
    }
}

impl Default for MapConf {
    fn default() -> Self {
        Self { center_lat: 27.7, center_lon: 85.3, zoom: 12, focus_zoom: 15 }
    }
}

impl Default for LoginConf {
    fn default() -> Self {
        Self { username: "admin".into(), password: "admin123".into() }
    }
}

impl AlertConf {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

impl ViewConf {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_secs.max(1))
    }
}

impl MapConf {
    pub fn center(&self) -> GeoPosition {
        GeoPosition { lat: self.center_lat, lon: self.center_lon }
    }
}

pub fn parse_config(txt: &str) -> Result<DashboardConfig> {
    if txt.trim().is_empty() {
        return Ok(DashboardConfig::default());
    }
    Ok(serde_yaml::from_str(txt)?)
}

pub async fn load_config() -> DashboardConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    if !Path::new(&path).exists() {
        warn!("no {} found, using default config", path);
        return DashboardConfig::default();
    }

    let txt = match fs::read_to_string(&path).await {
        Ok(txt) => txt,
        Err(e) => {
            warn!("cannot read {}: {}, using default config", path, e);
            return DashboardConfig::default();
        }
    };

    parse_config(&txt).unwrap_or_else(|e| {
        warn!("{} is invalid ({}), using default config", path, e);
        DashboardConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = parse_config("mqtt:\n  host: broker.lan\nalert:\n  countdown: 30\n").unwrap();
        assert_eq!(cfg.mqtt.host, "broker.lan");
        assert_eq!(cfg.mqtt.port, 1883);
        assert_eq!(cfg.alert.countdown, 30);
        assert_eq!(cfg.alert.tick_ms, 1000);
        assert_eq!(cfg.view.refresh_secs, 2);
        assert_eq!(cfg.map.focus_zoom, 15);
        assert_eq!(cfg.login.username, "admin");
    }

    #[test]
    fn test_empty_config_is_default() {
        let cfg = parse_config("   \n").unwrap();
        assert_eq!(cfg.http.bind, "0.0.0.0:8080");
        assert_eq!(cfg.map.center(), GeoPosition { lat: 27.7, lon: 85.3 });
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(parse_config("mqtt: [not, a, map]").is_err());
    }
}
