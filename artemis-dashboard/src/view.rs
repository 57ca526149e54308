/**
 * VIEW RENDERER - Projection du registre vers le modèle de vue
 *
 * RÔLE : Calcule cartes devices, compteurs, marqueurs carte et viewport.
 * Aucune donnée métier ici : tout est recalculé depuis le registre à chaque
 * mutation et toutes les 2s (rafraîchissement du "last seen").
 *
 * MARQUEURS : un seul marqueur par device positionné, remplacé (nouvel id)
 * dès que sa position ou sa couleur change, jamais modifié en place.
 */

use std::collections::HashMap;

use serde::Serialize;
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

use crate::alert::AlertPanel;
use crate::health::LinkStatus;
use crate::models::{Device, DeviceId, GeoPosition, Orientation};
use crate::registry::DeviceRegistry;

pub const ONLINE_COLOR: &str = "#22c55e";
pub const OFFLINE_COLOR: &str = "#ef4444";
pub const WAITING_FOR_GPS: &str = "Waiting for GPS...";
pub const JUST_NOW: &str = "Just now";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl DeviceStatus {
    pub fn of(device: &Device) -> Self {
        if device.online {
            DeviceStatus::Online
        } else {
            DeviceStatus::Offline
        }
    }

    pub fn badge(self) -> &'static str {
        match self {
            DeviceStatus::Online => "ONLINE",
            DeviceStatus::Offline => "OFFLINE",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeviceStatus::Online => "Online",
            DeviceStatus::Offline => "Offline",
        }
    }

    pub fn marker_color(self) -> &'static str {
        match self {
            DeviceStatus::Online => ONLINE_COLOR,
            DeviceStatus::Offline => OFFLINE_COLOR,
        }
    }
}

// ===== Marqueurs =====

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarkerStyle {
    pub radius: u8,
    pub stroke_color: &'static str,
    pub weight: u8,
    pub opacity: f32,
    pub fill_opacity: f32,
}

pub const MARKER_STYLE: MarkerStyle = MarkerStyle {
    radius: 10,
    stroke_color: "#fff",
    weight: 2,
    opacity: 1.0,
    fill_opacity: 0.8,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    /// Change à chaque remplacement
    pub marker_id: u64,
    pub device_id: DeviceId,
    pub position: GeoPosition,
    pub fill_color: &'static str,
    pub style: MarkerStyle,
}

#[derive(Debug, Default)]
pub struct MarkerLayer {
    markers: HashMap<DeviceId, Marker>,
    next_id: u64,
}

impl MarkerLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remplace le marqueur du device par un nouveau. Sans position connue, le marqueur est retiré.
    pub fn refresh(&mut self, device: &Device) -> Option<&Marker> {
        let Some(position) = device.position else {
            self.markers.remove(&device.device_id);
            return None;
        };

        self.next_id += 1;
        let marker = Marker {
            marker_id: self.next_id,
            device_id: device.device_id.clone(),
            position,
            fill_color: DeviceStatus::of(device).marker_color(),
            style: MARKER_STYLE,
        };
        self.markers.insert(device.device_id.clone(), marker);
        self.markers.get(&device.device_id)
    }

    pub fn remove(&mut self, device_id: &str) -> Option<Marker> {
        self.markers.remove(device_id)
    }

    /// Garantit exactement un marqueur à jour par device positionné, et aucun pour les autres
    pub fn sync(&mut self, registry: &DeviceRegistry) {
        self.markers
            .retain(|id, _| registry.get(id).is_some_and(|d| d.position.is_some()));

        for device in registry.iter() {
            let Some(position) = device.position else { continue };
            let color = DeviceStatus::of(device).marker_color();
            let stale = match self.markers.get(&device.device_id) {
                Some(marker) => marker.position != position || marker.fill_color != color,
                None => true,
            };
            if stale {
                self.refresh(device);
            }
        }
    }

    pub fn get(&self, device_id: &str) -> Option<&Marker> {
        self.markers.get(device_id)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.markers.contains_key(device_id)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

// ===== Viewport carte =====

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapViewport {
    pub center: GeoPosition,
    pub zoom: u8,
    pub open_popup: Option<DeviceId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerPopup {
    pub username: String,
    pub device_id: DeviceId,
    pub status: &'static str,
    pub orientation: String,
}

impl MarkerPopup {
    fn of(device: &Device) -> Self {
        Self {
            username: device.username.clone(),
            device_id: device.device_id.clone(),
            status: DeviceStatus::of(device).label(),
            orientation: format_orientation(&device.orientation),
        }
    }
}

/// Résultat d'un clic sur une carte device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FocusTarget {
    pub device_id: DeviceId,
    pub center: GeoPosition,
    pub zoom: u8,
    pub marker_id: Option<u64>,
    pub popup: MarkerPopup,
}

impl MapViewport {
    pub fn new(center: GeoPosition, zoom: u8) -> Self {
        Self { center, zoom, open_popup: None }
    }

    /// Recentre sur le device et ouvre son popup. Effet purement visuel, sans position connue rien ne bouge.
    pub fn focus(
        &mut self,
        registry: &DeviceRegistry,
        markers: &MarkerLayer,
        device_id: &str,
        zoom: u8,
    ) -> Option<FocusTarget> {
        let device = registry.get(device_id)?;
        let center = device.position?;

        self.center = center;
        self.zoom = zoom;
        let marker_id = markers.get(device_id).map(|m| m.marker_id);
        if marker_id.is_some() {
            self.open_popup = Some(device.device_id.clone());
        }

        Some(FocusTarget {
            device_id: device.device_id.clone(),
            center,
            zoom,
            marker_id,
            popup: MarkerPopup::of(device),
        })
    }
}

// ===== Modèle de vue =====

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceCard {
    pub device_id: DeviceId,
    pub username: String,
    pub status: DeviceStatus,
    pub badge: &'static str,
    pub out_of_range: bool,
    pub has_fix: bool,
    pub coordinates: String,
    pub orientation: String,
    pub last_seen: String,
    pub last_update: String,
    pub battery: u8,
    pub popup: MarkerPopup,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub active: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub cards: Vec<DeviceCard>,
    pub stats: DashboardStats,
    pub markers: Vec<Marker>,
    pub viewport: MapViewport,
    pub alert: Option<AlertPanel>,
    pub link: LinkStatus,
    pub rendered_at: String,
}

impl DashboardView {
    pub fn empty(viewport: MapViewport) -> Self {
        Self {
            cards: Vec::new(),
            stats: DashboardStats::default(),
            markers: Vec::new(),
            viewport,
            alert: None,
            link: LinkStatus::Connecting,
            rendered_at: String::new(),
        }
    }

    pub fn card(&self, device_id: &str) -> Option<&DeviceCard> {
        self.cards.iter().find(|c| c.device_id == device_id)
    }
}

pub struct RenderContext<'a> {
    pub registry: &'a DeviceRegistry,
    pub markers: &'a MarkerLayer,
    pub viewport: &'a MapViewport,
    pub alert: Option<AlertPanel>,
    pub link: LinkStatus,
    pub just_now_secs: i64,
}

/// Rendu complet (pas de diff) : suffisant pour quelques dizaines de devices
pub fn render(ctx: RenderContext<'_>, now: OffsetDateTime) -> DashboardView {
    let cards: Vec<DeviceCard> = ctx
        .registry
        .iter()
        .map(|device| card_for(device, now, ctx.just_now_secs))
        .collect();

    let total = ctx.registry.len();
    let online = ctx.registry.online_count();
    let stats = DashboardStats {
        total,
        online,
        offline: total - online,
        active: online,
    };

    let markers = ctx
        .registry
        .iter()
        .filter_map(|device| ctx.markers.get(&device.device_id).cloned())
        .collect();

    DashboardView {
        cards,
        stats,
        markers,
        viewport: ctx.viewport.clone(),
        alert: ctx.alert,
        link: ctx.link,
        rendered_at: now.format(&Rfc3339).unwrap_or_default(),
    }
}

fn card_for(device: &Device, now: OffsetDateTime, just_now_secs: i64) -> DeviceCard {
    let status = DeviceStatus::of(device);
    DeviceCard {
        device_id: device.device_id.clone(),
        username: device.username.clone(),
        status,
        badge: status.badge(),
        out_of_range: !device.online,
        has_fix: device.position.is_some(),
        coordinates: device
            .position
            .as_ref()
            .map(format_position)
            .unwrap_or_else(|| WAITING_FOR_GPS.to_string()),
        orientation: format_orientation(&device.orientation),
        last_seen: format_last_seen(now - device.last_update, just_now_secs),
        last_update: device.last_update.format(&Rfc3339).unwrap_or_default(),
        battery: device.battery,
        popup: MarkerPopup::of(device),
    }
}

pub fn format_last_seen(elapsed: Duration, just_now_secs: i64) -> String {
    let secs = elapsed.whole_seconds().max(0);
    if secs < just_now_secs {
        JUST_NOW.to_string()
    } else {
        format!("{secs}s ago")
    }
}

pub fn format_position(position: &GeoPosition) -> String {
    format!("{:.6}, {:.6}", position.lat, position.lon)
}

pub fn format_orientation(o: &Orientation) -> String {
    format!("α:{:.1}° β:{:.1}° γ:{:.1}°", o.alpha, o.beta, o.gamma)
}
