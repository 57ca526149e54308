use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::view::DashboardView;

/// État du lien avec la source de télémétrie, affiché dans l'en-tête
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardHealth {
    pub uptime_seconds: u64,
    pub devices_tracked: usize,
    pub online_devices: usize,
    pub alert_active: bool,
    pub link_status: LinkStatus,
    pub link_drops: u32,
    pub memory_usage_mb: f32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    link_drops: Arc<AtomicU32>,
    link_status: Arc<Mutex<LinkStatus>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            link_drops: Arc::new(AtomicU32::new(0)),
            link_status: Arc::new(Mutex::new(LinkStatus::Connecting)),
        }
    }

    pub fn mark_connected(&self) {
        *self.link_status.lock() = LinkStatus::Connected;
    }

    /// Compte une coupure uniquement sur la transition connecté → déconnecté
    pub fn mark_disconnected(&self) {
        let mut status = self.link_status.lock();
        if *status == LinkStatus::Connected {
            self.link_drops.fetch_add(1, Ordering::Relaxed);
        }
        *status = LinkStatus::Disconnected;
    }

    pub fn link_status(&self) -> LinkStatus {
        *self.link_status.lock()
    }

    pub fn link_drops(&self) -> u32 {
        self.link_drops.load(Ordering::Relaxed)
    }

    pub fn get_health(&self, view: &DashboardView) -> DashboardHealth {
        DashboardHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            devices_tracked: view.stats.total,
            online_devices: view.stats.online,
            alert_active: view.alert.is_some(),
            link_status: self.link_status(),
            link_drops: self.link_drops(),
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0;
            }
        }
    }

    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPosition;
    use crate::view::{DashboardStats, MapViewport};

    #[test]
    fn test_link_drops_counted_on_transition_only() {
        let tracker = HealthTracker::new();
        assert_eq!(tracker.link_status(), LinkStatus::Connecting);

        // échec initial : pas une coupure
        tracker.mark_disconnected();
        assert_eq!(tracker.link_drops(), 0);

        tracker.mark_connected();
        tracker.mark_disconnected();
        tracker.mark_disconnected();
        assert_eq!(tracker.link_drops(), 1);
        assert_eq!(tracker.link_status(), LinkStatus::Disconnected);
    }

    #[test]
    fn test_health_reports_view_counts() {
        let tracker = HealthTracker::new();
        let mut view = DashboardView::empty(MapViewport::new(GeoPosition { lat: 0.0, lon: 0.0 }, 2));
        view.stats = DashboardStats { total: usize::MAX, online: 3, offline: usize::MAX - 3, active: 3 };

        let health = tracker.get_health(&view);
        assert_eq!(health.devices_tracked, usize::MAX);
        assert_eq!(health.online_devices, 3);
        assert!(!health.alert_active);
        assert_eq!(health.link_status, LinkStatus::Connecting);
    }
}
