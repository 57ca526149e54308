/**
 * DASHBOARD - Coordinateur unique de l'état du tableau de bord
 *
 * RÔLE : Possède registre, marqueurs, viewport et workflow d'alerte.
 * Une seule tâche tokio sérialise événements source, commandes opérateur,
 * ticks d'alerte et rafraîchissement périodique : aucun verrou sur l'état.
 *
 * SORTIES :
 * - watch<DashboardView> : dernière vue rendue, lue par l'API HTTP
 * - mpsc<OperatorResponse> : réponses opérateur vers la source
 */

use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::alert::{AlertTick, AlertWorkflow};
use crate::config::{DashboardConfig, ViewConf};
use crate::error::{DashboardError, Result};
use crate::health::HealthTracker;
use crate::ingest::{IngestOutcome, TelemetryIngest};
use crate::models::{DeviceId, DeviceLost, InboundEvent, OperatorResponse};
use crate::registry::DeviceRegistry;
use crate::view::{self, DashboardView, FocusTarget, MapViewport, MarkerLayer, RenderContext};

const COMMAND_BUFFER: usize = 32;

/// Actions opérateur venant de l'UI
#[derive(Debug)]
pub enum DashboardCommand {
    Focus {
        device_id: DeviceId,
        reply: oneshot::Sender<Option<FocusTarget>>,
    },
    RespondToAlert {
        false_alarm: bool,
        reply: oneshot::Sender<Option<OperatorResponse>>,
    },
    DismissAlert {
        reply: oneshot::Sender<Option<DeviceId>>,
    },
}

pub struct Dashboard {
    registry: DeviceRegistry,
    markers: MarkerLayer,
    viewport: MapViewport,
    alert: AlertWorkflow,
    health: HealthTracker,
    view_conf: ViewConf,
    focus_zoom: u8,
    views: watch::Sender<DashboardView>,
    responses: mpsc::UnboundedSender<OperatorResponse>,
}

impl Dashboard {
    pub fn new(
        cfg: &DashboardConfig,
        health: HealthTracker,
        responses: mpsc::UnboundedSender<OperatorResponse>,
    ) -> Self {
        let viewport = MapViewport::new(cfg.map.center(), cfg.map.zoom);
        let (views, _) = watch::channel(DashboardView::empty(viewport.clone()));

        Self {
            registry: DeviceRegistry::new(),
            markers: MarkerLayer::new(),
            viewport,
            alert: AlertWorkflow::new(cfg.alert.countdown, cfg.alert.tick_period()),
            health,
            view_conf: cfg.view.clone(),
            focus_zoom: cfg.map.focus_zoom,
            views,
            responses,
        }
    }

    /// Lance la boucle du coordinateur. Elle s'arrête quand la source ferme son canal.
    pub fn spawn(self, events: mpsc::Receiver<InboundEvent>) -> (DashboardHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = DashboardHandle {
            commands: commands_tx,
            views: self.views.subscribe(),
        };
        let task = tokio::spawn(self.run(events, commands_rx));
        (handle, task)
    }

    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<InboundEvent>,
        mut commands: mpsc::Receiver<DashboardCommand>,
    ) {
        let mut refresh = tokio::time::interval(self.view_conf.refresh_period());
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("dashboard coordinator started");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, OffsetDateTime::now_utc()),
                    None => {
                        info!("event source closed, stopping dashboard");
                        break;
                    }
                },
                Some(command) = commands.recv() => self.handle_command(command, OffsetDateTime::now_utc()),
                _ = self.alert.wait_tick() => self.on_alert_tick(),
                _ = refresh.tick() => self.render(OffsetDateTime::now_utc()),
            }
        }
    }

    pub fn handle_event(&mut self, event: InboundEvent, now: OffsetDateTime) {
        match event {
            InboundEvent::ConnectivityEstablished => {
                info!("telemetry source reachable");
                self.health.mark_connected();
            }
            InboundEvent::ConnectivityLost => {
                warn!("telemetry source unreachable");
                self.health.mark_disconnected();
            }
            InboundEvent::ServerStatus(status) => {
                info!(
                    "server status: {} {}",
                    status.status,
                    status.message.as_deref().unwrap_or_default()
                );
            }
            event => {
                let outcome = TelemetryIngest::new(&mut self.registry, &mut self.markers).apply(event, now);
                if let IngestOutcome::Disconnect(lost) = outcome {
                    self.on_disconnect_notice(lost);
                }
            }
        }
        self.render(now);
    }

    fn on_disconnect_notice(&mut self, lost: DeviceLost) {
        let username = if lost.username.is_empty() {
            self.registry
                .get(&lost.device_id)
                .map(|d| d.username.clone())
                .unwrap_or_default()
        } else {
            lost.username
        };
        self.alert.start(lost.device_id, username);
    }

    /// La vue est republiée avant la réponse : l'appelant lit un état à jour
    pub fn handle_command(&mut self, command: DashboardCommand, now: OffsetDateTime) {
        match command {
            DashboardCommand::Focus { device_id, reply } => {
                let target = self.focus(&device_id);
                self.render(now);
                let _ = reply.send(target);
            }
            DashboardCommand::RespondToAlert { false_alarm, reply } => {
                let response = self.respond_to_alert(false_alarm, now);
                self.render(now);
                let _ = reply.send(response);
            }
            DashboardCommand::DismissAlert { reply } => {
                let dismissed = self.alert.dismiss();
                self.render(now);
                let _ = reply.send(dismissed);
            }
        }
    }

    /// Clic sur une carte : recentre la carte, ne modifie pas le registre
    pub fn focus(&mut self, device_id: &str) -> Option<FocusTarget> {
        let target = self
            .viewport
            .focus(&self.registry, &self.markers, device_id, self.focus_zoom);
        if target.is_none() {
            debug!("focus on {} ignored, no known position", device_id);
        }
        target
    }

    pub fn respond_to_alert(&mut self, false_alarm: bool, now: OffsetDateTime) -> Option<OperatorResponse> {
        let response = self.alert.respond(false_alarm, now)?;
        if self.responses.send(response.clone()).is_err() {
            warn!("response publisher gone, operator response for {} not sent", response.device_id);
        }
        Some(response)
    }

    pub fn on_alert_tick(&mut self) {
        match self.alert.tick() {
            Some(AlertTick::Expired { device_id }) => {
                debug!("alert for {} closed by timeout", device_id);
            }
            Some(AlertTick::Countdown { .. }) | None => {}
        }
        self.render(OffsetDateTime::now_utc());
    }

    /// Rendu complet + publication de la vue
    pub fn render(&mut self, now: OffsetDateTime) {
        self.markers.sync(&self.registry);
        let view = view::render(
            RenderContext {
                registry: &self.registry,
                markers: &self.markers,
                viewport: &self.viewport,
                alert: self.alert.panel(),
                link: self.health.link_status(),
                just_now_secs: self.view_conf.just_now_secs,
            },
            now,
        );
        self.views.send_replace(view);
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardView> {
        self.views.subscribe()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn markers(&self) -> &MarkerLayer {
        &self.markers
    }

    pub fn alert(&self) -> &AlertWorkflow {
        &self.alert
    }
}

/// Accès au coordinateur depuis les handlers HTTP
#[derive(Clone)]
pub struct DashboardHandle {
    commands: mpsc::Sender<DashboardCommand>,
    views: watch::Receiver<DashboardView>,
}

impl DashboardHandle {
    pub fn view(&self) -> DashboardView {
        self.views.borrow().clone()
    }

    pub fn views(&self) -> watch::Receiver<DashboardView> {
        self.views.clone()
    }

    pub async fn focus(&self, device_id: &str) -> Result<Option<FocusTarget>> {
        let (reply, rx) = oneshot::channel();
        self.send(DashboardCommand::Focus { device_id: device_id.to_string(), reply })
            .await?;
        rx.await.map_err(|_| DashboardError::CoordinatorGone)
    }

    pub async fn respond(&self, false_alarm: bool) -> Result<Option<OperatorResponse>> {
        let (reply, rx) = oneshot::channel();
        self.send(DashboardCommand::RespondToAlert { false_alarm, reply })
            .await?;
        rx.await.map_err(|_| DashboardError::CoordinatorGone)
    }

    pub async fn dismiss(&self) -> Result<Option<DeviceId>> {
        let (reply, rx) = oneshot::channel();
        self.send(DashboardCommand::DismissAlert { reply }).await?;
        rx.await.map_err(|_| DashboardError::CoordinatorGone)
    }

    async fn send(&self, command: DashboardCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DashboardError::CoordinatorGone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::LinkStatus;
    use crate::models::{DeviceAnnouncement, GpsFix, PositionUpdate};
    use crate::view::ONLINE_COLOR;
    use std::time::Duration;

    fn dashboard() -> (Dashboard, mpsc::UnboundedReceiver<OperatorResponse>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Dashboard::new(&DashboardConfig::default(), HealthTracker::new(), tx), rx)
    }

    fn registered(id: &str, username: &str) -> InboundEvent {
        InboundEvent::DeviceRegistered(DeviceAnnouncement {
            username: username.into(),
            device_id: id.into(),
            client_id: 0,
        })
    }

    fn position(id: &str, lat: f64, lon: f64) -> InboundEvent {
        InboundEvent::PositionUpdate(PositionUpdate {
            device_id: id.into(),
            gps: GpsFix { lat: Some(lat), lon: Some(lon) },
        })
    }

    fn lost(id: &str, username: &str) -> InboundEvent {
        InboundEvent::DeviceLost(DeviceLost { device_id: id.into(), username: username.into() })
    }

    #[tokio::test]
    async fn test_events_publish_rendered_view() {
        let (mut dash, _rx) = dashboard();
        let views = dash.subscribe();
        let now = OffsetDateTime::now_utc();

        dash.handle_event(registered("D1", "rover1"), now);
        dash.handle_event(position("D1", 27.7, 85.3), now);

        let view = views.borrow().clone();
        assert_eq!(view.stats.total, 1);
        assert_eq!(view.stats.online, 1);
        assert_eq!(view.markers.len(), 1);
        assert_eq!(view.markers[0].fill_color, ONLINE_COLOR);
        assert_eq!(view.card("D1").unwrap().coordinates, "27.700000, 85.300000");

        let marker = dash.markers().get("D1").unwrap();
        assert_eq!(marker.marker_id, view.markers[0].marker_id);
        assert_eq!(marker.position.lat, 27.7);
    }

    #[tokio::test]
    async fn test_connectivity_updates_link_status() {
        let (mut dash, _rx) = dashboard();
        let views = dash.subscribe();
        let now = OffsetDateTime::now_utc();

        dash.handle_event(InboundEvent::ConnectivityEstablished, now);
        assert_eq!(views.borrow().link, LinkStatus::Connected);
        dash.handle_event(InboundEvent::ConnectivityLost, now);
        assert_eq!(views.borrow().link, LinkStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_lost_device_alert_and_false_alarm_response() {
        let (mut dash, mut rx) = dashboard();
        let views = dash.subscribe();
        let now = OffsetDateTime::now_utc();

        dash.handle_event(registered("D1", "rover1"), now);
        dash.handle_event(lost("D1", "rover1"), now);
        let panel = views.borrow().alert.clone().unwrap();
        assert_eq!(panel.countdown, 60);
        assert_eq!(panel.device_id, "D1");
        // la perte ne touche pas le registre
        assert!(dash.registry().get("D1").unwrap().online);

        let response = dash.respond_to_alert(true, now).unwrap();
        assert_eq!(response.device_id, "D1");
        assert!(response.false_alarm);
        assert_eq!(rx.try_recv().unwrap(), response);

        dash.render(now);
        assert!(views.borrow().alert.is_none());
    }

    #[tokio::test]
    async fn test_lost_notice_without_username_uses_registry_name() {
        let (mut dash, _rx) = dashboard();
        let now = OffsetDateTime::now_utc();
        dash.handle_event(registered("D1", "rover1"), now);
        dash.handle_event(lost("D1", ""), now);
        assert_eq!(dash.alert().panel().unwrap().username, "rover1");
    }

    #[tokio::test]
    async fn test_respond_without_alert_emits_nothing() {
        let (mut dash, mut rx) = dashboard();
        assert!(dash.respond_to_alert(false, OffsetDateTime::now_utc()).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_coordinator_expires_alert_silently() {
        let (dash, mut rx) = dashboard();
        let (events, events_rx) = mpsc::channel(16);
        let (handle, _task) = dash.spawn(events_rx);

        events.send(registered("D1", "rover1")).await.unwrap();
        events.send(lost("D1", "rover1")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(handle.view().alert.unwrap().countdown, 50);

        tokio::time::sleep(Duration::from_secs(50)).await;
        assert!(handle.view().alert.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handle_focus_and_respond_round_trip() {
        let (dash, mut rx) = dashboard();
        let (events, events_rx) = mpsc::channel(16);
        let (handle, _task) = dash.spawn(events_rx);

        events.send(registered("D1", "rover1")).await.unwrap();
        events.send(position("D1", 27.7, 85.3)).await.unwrap();
        events.send(lost("D1", "rover1")).await.unwrap();
        let mut views = handle.views();
        views.wait_for(|v| v.alert.is_some()).await.unwrap();

        let target = handle.focus("D1").await.unwrap().unwrap();
        assert_eq!(target.zoom, 15);
        assert_eq!(handle.view().viewport.open_popup.as_deref(), Some("D1"));
        assert!(handle.focus("ghost").await.unwrap().is_none());

        let response = handle.respond(false).await.unwrap().unwrap();
        assert!(!response.false_alarm);
        assert_eq!(rx.recv().await.unwrap().device_id, "D1");
        assert!(handle.view().alert.is_none());
    }

    #[tokio::test]
    async fn test_periodic_refresh_ages_last_seen_without_events() {
        let mut cfg = DashboardConfig::default();
        cfg.view.refresh_secs = 1;
        cfg.view.just_now_secs = 1;
        let (tx, _rx) = mpsc::unbounded_channel();
        let dash = Dashboard::new(&cfg, HealthTracker::new(), tx);
        let (events, events_rx) = mpsc::channel(16);
        let (handle, _task) = dash.spawn(events_rx);

        events.send(registered("D1", "rover1")).await.unwrap();
        let mut views = handle.views();
        let first = views.wait_for(|v| v.card("D1").is_some()).await.unwrap().clone();
        assert_eq!(first.card("D1").unwrap().last_seen, "Just now");

        // aucun nouvel événement : seul le rafraîchissement périodique fait vieillir la carte
        let aged = tokio::time::timeout(
            Duration::from_secs(5),
            views.wait_for(|v| v.card("D1").is_some_and(|c| c.last_seen != "Just now")),
        )
        .await
        .expect("refresh did not re-render")
        .unwrap()
        .clone();

        assert!(aged.card("D1").unwrap().last_seen.ends_with("s ago"));
        assert_ne!(aged.rendered_at, first.rendered_at);
        assert_eq!(aged.stats.total, 1);
    }
}
