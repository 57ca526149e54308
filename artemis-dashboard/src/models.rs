/**
 * MODELS - Types partagés du dashboard Artemis
 *
 * RÔLE : Représentation d'un device suivi (registre) et des messages
 * échangés avec la source de télémétrie (entrants + réponse opérateur).
 *
 * CONVENTION : les payloads MQTT sont en camelCase, comme côté serveur.
 * Les champs optionnels absents ou null prennent une valeur neutre (0 / "").
 */

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

pub type DeviceId = String;

/// Batterie affichée tant que le device ne remonte rien (jamais mise à jour).
pub const DEFAULT_BATTERY: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

/// Entrée du registre, une par terminal suivi
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub device_id: DeviceId,
    pub username: String,
    pub client_id: u32,
    pub position: Option<GeoPosition>,
    pub orientation: Orientation,
    pub last_update: OffsetDateTime,
    pub online: bool,
    pub battery: u8,
}

impl Device {
    pub fn new(username: String, device_id: DeviceId, client_id: u32, now: OffsetDateTime) -> Self {
        Self {
            device_id,
            username,
            client_id,
            position: None,
            orientation: Orientation::default(),
            last_update: now,
            online: true,
            battery: DEFAULT_BATTERY,
        }
    }
}

// ===== Messages entrants (source → dashboard) =====

/// `null` côté serveur vaut absence : valeur par défaut du champ
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAnnouncement {
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    pub device_id: DeviceId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub client_id: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotMessage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub devices: Vec<DeviceAnnouncement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct GpsFix {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl GpsFix {
    /// Un fix n'est exploitable que si les deux coordonnées sont présentes
    pub fn position(&self) -> Option<GeoPosition> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(GeoPosition { lat, lon }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    pub device_id: DeviceId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub gps: GpsFix,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct ImuReading {
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
}

impl ImuReading {
    pub fn orientation(&self) -> Orientation {
        Orientation {
            alpha: self.alpha.unwrap_or(0.0),
            beta: self.beta.unwrap_or(0.0),
            gamma: self.gamma.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrientationUpdate {
    pub device_id: DeviceId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub imu: ImuReading,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLost {
    pub device_id: DeviceId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRemoved {
    pub device_id: DeviceId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerStatus {
    pub status: String,
    pub message: Option<String>,
}

/// Événements reçus de la source, dans l'ordre de livraison
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    ConnectivityEstablished,
    ConnectivityLost,
    ServerStatus(ServerStatus),
    Snapshot(Vec<DeviceAnnouncement>),
    DeviceRegistered(DeviceAnnouncement),
    PositionUpdate(PositionUpdate),
    OrientationUpdate(OrientationUpdate),
    DeviceLost(DeviceLost),
    DeviceRemoved(DeviceRemoved),
}

// ===== Message sortant (dashboard → source) =====

pub const OPERATOR_RESPONSE_KIND: &str = "OPERATOR_RESPONSE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub device_id: DeviceId,
    pub false_alarm: bool,
    /// Epoch Unix en millisecondes
    pub timestamp: i64,
}

impl OperatorResponse {
    pub fn new(device_id: DeviceId, false_alarm: bool, at: OffsetDateTime) -> Self {
        Self {
            kind: OPERATOR_RESPONSE_KIND.to_string(),
            device_id,
            false_alarm,
            timestamp: (at.unix_timestamp_nanos() / 1_000_000) as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_imu_components_default_to_zero() {
        let update: OrientationUpdate =
            serde_json::from_str(r#"{"deviceId":"D1","imu":{"beta":12.5}}"#).unwrap();
        assert_eq!(
            update.imu.orientation(),
            Orientation { alpha: 0.0, beta: 12.5, gamma: 0.0 }
        );
    }

    #[test]
    fn test_gps_fix_needs_both_coordinates() {
        let fix = GpsFix { lat: Some(27.7), lon: None };
        assert_eq!(fix.position(), None);

        // zéro est une coordonnée valide
        let fix = GpsFix { lat: Some(0.0), lon: Some(0.0) };
        assert_eq!(fix.position(), Some(GeoPosition { lat: 0.0, lon: 0.0 }));
    }

    #[test]
    fn test_announcement_defaults() {
        let a: DeviceAnnouncement = serde_json::from_str(r#"{"deviceId":"D9"}"#).unwrap();
        assert_eq!(a.client_id, 0);
        assert_eq!(a.username, "");
    }

    #[test]
    fn test_operator_response_wire_shape() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let resp = OperatorResponse::new("D1".into(), true, at);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], "OPERATOR_RESPONSE");
        assert_eq!(json["deviceId"], "D1");
        assert_eq!(json["falseAlarm"], true);
        assert_eq!(json["timestamp"], 1_700_000_000_000i64);
    }
}
