/**
 * TELEMETRY INGEST - Réconciliation des événements source avec le registre
 *
 * RÔLE : Applique enregistrements, GPS, orientation et suppressions au
 * registre + marqueurs. Les événements visant un device inconnu sont
 * ignorés silencieusement (pas d'auto-enregistrement côté dashboard).
 *
 * RÈGLES :
 * - ré-enregistrement d'un id existant = no-op (aucun champ écrasé)
 * - GPS : position, timestamp, online=true, marqueur remplacé
 * - orientation : les 3 angles écrasés (absents → 0), online inchangé
 * - la perte d'un device ne touche pas le registre : elle part vers les alertes
 */

use time::OffsetDateTime;
use tracing::{debug, info};

use crate::models::{Device, DeviceId, DeviceLost, GpsFix, InboundEvent, Orientation};
use crate::registry::DeviceRegistry;
use crate::view::MarkerLayer;

/// Effet d'un événement sur l'état du dashboard
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Le registre a changé, un rendu complet suit
    Changed,
    /// Cible inconnue ou doublon : rien à faire
    Unchanged,
    /// Perte de device : à transmettre au workflow d'alerte
    Disconnect(DeviceLost),
    /// Événement hors registre (connectivité, statut serveur)
    NotApplicable,
}

pub struct TelemetryIngest<'a> {
    registry: &'a mut DeviceRegistry,
    markers: &'a mut MarkerLayer,
}

impl<'a> TelemetryIngest<'a> {
    pub fn new(registry: &'a mut DeviceRegistry, markers: &'a mut MarkerLayer) -> Self {
        Self { registry, markers }
    }

    pub fn apply(&mut self, event: InboundEvent, now: OffsetDateTime) -> IngestOutcome {
        let changed = match event {
            InboundEvent::Snapshot(devices) => {
                let mut any = false;
                for d in devices {
                    any |= self.register_device(d.username, d.device_id, d.client_id, now);
                }
                any
            }
            InboundEvent::DeviceRegistered(d) => {
                self.register_device(d.username, d.device_id, d.client_id, now)
            }
            InboundEvent::PositionUpdate(update) => {
                self.apply_gps_update(&update.device_id, update.gps, now)
            }
            InboundEvent::OrientationUpdate(update) => {
                self.apply_orientation_update(&update.device_id, update.imu.orientation(), now)
            }
            InboundEvent::DeviceRemoved(removed) => self.remove_device(&removed.device_id),
            InboundEvent::DeviceLost(lost) => return IngestOutcome::Disconnect(lost),
            InboundEvent::ConnectivityEstablished
            | InboundEvent::ConnectivityLost
            | InboundEvent::ServerStatus(_) => return IngestOutcome::NotApplicable,
        };

        if changed {
            IngestOutcome::Changed
        } else {
            IngestOutcome::Unchanged
        }
    }

    pub fn register_device(
        &mut self,
        username: String,
        device_id: DeviceId,
        client_id: u32,
        now: OffsetDateTime,
    ) -> bool {
        if self.registry.contains(&device_id) {
            debug!("device {} already registered, keeping existing entry", device_id);
            return false;
        }

        info!("device registered: {} ({})", username, device_id);
        self.registry
            .insert_if_absent(Device::new(username, device_id, client_id, now))
    }

    pub fn remove_device(&mut self, device_id: &str) -> bool {
        self.markers.remove(device_id);
        match self.registry.remove(device_id) {
            Some(device) => {
                info!("device removed: {} ({})", device.username, device_id);
                true
            }
            None => false,
        }
    }

    pub fn apply_gps_update(&mut self, device_id: &str, fix: GpsFix, now: OffsetDateTime) -> bool {
        let Some(device) = self.registry.get_mut(device_id) else {
            debug!("gps update for unknown device {} ignored", device_id);
            return false;
        };

        device.position = fix.position();
        device.last_update = now;
        device.online = true;
        debug!("gps {}: {:?}", device_id, device.position);

        self.markers.refresh(device);
        true
    }

    pub fn apply_orientation_update(
        &mut self,
        device_id: &str,
        orientation: Orientation,
        now: OffsetDateTime,
    ) -> bool {
        let Some(device) = self.registry.get_mut(device_id) else {
            debug!("imu update for unknown device {} ignored", device_id);
            return false;
        };

        device.orientation = orientation;
        device.last_update = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceAnnouncement, DeviceRemoved, GeoPosition, ImuReading, OrientationUpdate, PositionUpdate};
    use crate::view::ONLINE_COLOR;
    use time::Duration;

    struct Fixture {
        registry: DeviceRegistry,
        markers: MarkerLayer,
    }

    impl Fixture {
        fn new() -> Self {
            Self { registry: DeviceRegistry::new(), markers: MarkerLayer::new() }
        }

        fn ingest(&mut self) -> TelemetryIngest<'_> {
            TelemetryIngest::new(&mut self.registry, &mut self.markers)
        }
    }

    fn gps(lat: f64, lon: f64) -> GpsFix {
        GpsFix { lat: Some(lat), lon: Some(lon) }
    }

    #[test]
    fn test_register_then_gps_creates_online_marker() {
        let mut fx = Fixture::new();
        let now = OffsetDateTime::now_utc();
        assert!(fx.ingest().register_device("rover1".into(), "D1".into(), 0, now));
        assert!(fx.ingest().apply_gps_update("D1", gps(27.7, 85.3), now));

        let device = fx.registry.get("D1").unwrap();
        assert!(device.online);
        assert_eq!(device.position, Some(GeoPosition { lat: 27.7, lon: 85.3 }));

        let marker = fx.markers.get("D1").unwrap();
        assert_eq!(marker.position, GeoPosition { lat: 27.7, lon: 85.3 });
        assert_eq!(marker.fill_color, ONLINE_COLOR);
    }

    #[test]
    fn test_reregistration_keeps_stored_fields() {
        let mut fx = Fixture::new();
        let t0 = OffsetDateTime::now_utc() - Duration::seconds(30);
        fx.ingest().register_device("rover1".into(), "D1".into(), 4, t0);
        fx.ingest().apply_gps_update("D1", gps(1.0, 2.0), t0);
        let before = fx.registry.get("D1").unwrap().clone();

        let changed = fx
            .ingest()
            .register_device("renamed".into(), "D1".into(), 99, OffsetDateTime::now_utc());
        assert!(!changed);
        assert_eq!(fx.registry.get("D1").unwrap(), &before);
        assert_eq!(fx.registry.len(), 1);
    }

    #[test]
    fn test_updates_for_unknown_device_are_ignored() {
        let mut fx = Fixture::new();
        let now = OffsetDateTime::now_utc();
        let events = vec![
            InboundEvent::PositionUpdate(PositionUpdate { device_id: "ghost".into(), gps: gps(1.0, 1.0) }),
            InboundEvent::OrientationUpdate(OrientationUpdate {
                device_id: "ghost".into(),
                imu: ImuReading { alpha: Some(10.0), beta: None, gamma: None },
            }),
            InboundEvent::PositionUpdate(PositionUpdate { device_id: "ghost".into(), gps: GpsFix::default() }),
            InboundEvent::DeviceRemoved(DeviceRemoved { device_id: "ghost".into() }),
        ];

        for event in events {
            assert_eq!(fx.ingest().apply(event, now), IngestOutcome::Unchanged);
        }
        assert!(fx.registry.is_empty());
        assert!(fx.markers.is_empty());
    }

    #[test]
    fn test_orientation_overwrites_all_angles_and_keeps_online() {
        let mut fx = Fixture::new();
        let now = OffsetDateTime::now_utc();
        fx.ingest().register_device("rover1".into(), "D1".into(), 0, now);
        fx.registry.get_mut("D1").unwrap().online = false;

        fx.ingest().apply_orientation_update("D1", Orientation { alpha: 1.0, beta: 2.0, gamma: 3.0 }, now);
        let reading = ImuReading { alpha: None, beta: Some(5.0), gamma: None };
        fx.ingest().apply_orientation_update("D1", reading.orientation(), now);

        let device = fx.registry.get("D1").unwrap();
        assert_eq!(device.orientation, Orientation { alpha: 0.0, beta: 5.0, gamma: 0.0 });
        assert!(!device.online);
    }

    #[test]
    fn test_remove_drops_entry_and_marker() {
        let mut fx = Fixture::new();
        let now = OffsetDateTime::now_utc();
        fx.ingest().register_device("rover1".into(), "D1".into(), 0, now);
        fx.ingest().apply_gps_update("D1", gps(27.7, 85.3), now);
        assert!(fx.markers.contains("D1"));

        assert!(fx.ingest().remove_device("D1"));
        assert!(!fx.registry.contains("D1"));
        assert!(!fx.markers.contains("D1"));
        assert!(!fx.ingest().remove_device("D1"));
    }

    #[test]
    fn test_gps_without_full_fix_clears_position() {
        let mut fx = Fixture::new();
        let now = OffsetDateTime::now_utc();
        fx.ingest().register_device("rover1".into(), "D1".into(), 0, now);
        fx.ingest().apply_gps_update("D1", gps(27.7, 85.3), now);
        fx.ingest().apply_gps_update("D1", GpsFix { lat: Some(27.7), lon: None }, now);

        assert_eq!(fx.registry.get("D1").unwrap().position, None);
        assert!(!fx.markers.contains("D1"));
    }

    #[test]
    fn test_snapshot_and_lost_dispatch() {
        let mut fx = Fixture::new();
        let now = OffsetDateTime::now_utc();
        let snapshot = InboundEvent::Snapshot(vec![
            DeviceAnnouncement { username: "a".into(), device_id: "D1".into(), client_id: 1 },
            DeviceAnnouncement { username: "b".into(), device_id: "D2".into(), client_id: 2 },
            DeviceAnnouncement { username: "dup".into(), device_id: "D1".into(), client_id: 3 },
        ]);
        assert_eq!(fx.ingest().apply(snapshot, now), IngestOutcome::Changed);
        assert_eq!(fx.registry.len(), 2);
        assert_eq!(fx.registry.get("D1").unwrap().username, "a");

        let lost = DeviceLost { device_id: "D1".into(), username: "a".into() };
        assert_eq!(
            fx.ingest().apply(InboundEvent::DeviceLost(lost.clone()), now),
            IngestOutcome::Disconnect(lost)
        );
        assert_eq!(fx.registry.len(), 2);
        assert_eq!(
            fx.ingest().apply(InboundEvent::ConnectivityLost, now),
            IngestOutcome::NotApplicable
        );
    }
}
