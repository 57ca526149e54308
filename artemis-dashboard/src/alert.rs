/**
 * ALERT WORKFLOW - Machine à états des alertes de déconnexion
 *
 * RÔLE : Sur perte d'un device, affiche une alerte avec compte à rebours
 * (60 ticks d'1s par défaut) en attendant la décision de l'opérateur.
 *
 * ÉTATS : idle → alerting (perte signalée) → idle (timeout, fermeture, réponse)
 *
 * TIMER : l'Interval de tick appartient à la session d'alerte. Remplacer ou
 * terminer la session le détruit, il ne peut donc jamais y avoir deux
 * compteurs actifs.
 */

use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, info};

use crate::models::{DeviceId, OperatorResponse};

pub const DEFAULT_COUNTDOWN: u32 = 60;
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Ce que l'opérateur voit pendant une alerte
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertPanel {
    pub device_id: DeviceId,
    pub username: String,
    pub countdown: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertTick {
    Countdown { device_id: DeviceId, remaining: u32 },
    Expired { device_id: DeviceId },
}

struct AlertSession {
    device_id: DeviceId,
    username: String,
    remaining: u32,
    ticker: Interval,
}

enum AlertState {
    Idle,
    Alerting(AlertSession),
}

pub struct AlertWorkflow {
    state: AlertState,
    countdown: u32,
    tick_period: Duration,
}

impl AlertWorkflow {
    pub fn new(countdown: u32, tick_period: Duration) -> Self {
        Self {
            state: AlertState::Idle,
            countdown: countdown.max(1),
            tick_period,
        }
    }

    /// Passe en alerte pour ce device. Une alerte en cours est remplacée et son timer détruit.
    pub fn start(&mut self, device_id: DeviceId, username: String) -> AlertPanel {
        if let AlertState::Alerting(previous) = std::mem::replace(&mut self.state, AlertState::Idle) {
            info!(
                "replacing alert for {} ({} ticks left) with {}",
                previous.device_id, previous.remaining, device_id
            );
        }

        let ticker = interval_at(Instant::now() + self.tick_period, self.tick_period);
        info!("device {} ({}) lost, alerting for {} ticks", device_id, username, self.countdown);

        self.state = AlertState::Alerting(AlertSession {
            device_id: device_id.clone(),
            username: username.clone(),
            remaining: self.countdown,
            ticker,
        });

        AlertPanel { device_id, username, countdown: self.countdown }
    }

    /// Attend le prochain tick de l'alerte en cours. Ne se termine jamais en idle.
    pub async fn wait_tick(&mut self) {
        match &mut self.state {
            AlertState::Idle => std::future::pending::<()>().await,
            AlertState::Alerting(session) => {
                session.ticker.tick().await;
            }
        }
    }

    /// Décrémente le compteur. À zéro, retour en idle sans notifier la source.
    pub fn tick(&mut self) -> Option<AlertTick> {
        let AlertState::Alerting(session) = &mut self.state else {
            return None;
        };

        session.remaining = session.remaining.saturating_sub(1);
        if session.remaining > 0 {
            debug!("alert {} countdown {}", session.device_id, session.remaining);
            return Some(AlertTick::Countdown {
                device_id: session.device_id.clone(),
                remaining: session.remaining,
            });
        }

        let device_id = session.device_id.clone();
        self.state = AlertState::Idle;
        info!("alert for {} expired without operator response", device_id);
        Some(AlertTick::Expired { device_id })
    }

    /// Décision opérateur. Sans alerte active, ne produit rien.
    pub fn respond(&mut self, false_alarm: bool, now: OffsetDateTime) -> Option<OperatorResponse> {
        match std::mem::replace(&mut self.state, AlertState::Idle) {
            AlertState::Idle => {
                debug!("operator response ignored, no active alert");
                None
            }
            AlertState::Alerting(session) => {
                info!(
                    "operator answered alert for {}: {}",
                    session.device_id,
                    if false_alarm { "false alarm" } else { "confirmed" }
                );
                Some(OperatorResponse::new(session.device_id, false_alarm, now))
            }
        }
    }

    /// Fermeture explicite, sans notifier la source
    pub fn dismiss(&mut self) -> Option<DeviceId> {
        match std::mem::replace(&mut self.state, AlertState::Idle) {
            AlertState::Idle => None,
            AlertState::Alerting(session) => {
                info!("alert for {} dismissed", session.device_id);
                Some(session.device_id)
            }
        }
    }

    pub fn panel(&self) -> Option<AlertPanel> {
        match &self.state {
            AlertState::Idle => None,
            AlertState::Alerting(session) => Some(AlertPanel {
                device_id: session.device_id.clone(),
                username: session.username.clone(),
                countdown: session.remaining,
            }),
        }
    }

    pub fn is_alerting(&self) -> bool {
        matches!(self.state, AlertState::Alerting(_))
    }

    pub fn alerted_device(&self) -> Option<&str> {
        match &self.state {
            AlertState::Idle => None,
            AlertState::Alerting(session) => Some(&session.device_id),
        }
    }
}

impl Default for AlertWorkflow {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTDOWN, DEFAULT_TICK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_enters_alerting() {
        let mut workflow = AlertWorkflow::default();
        assert!(workflow.panel().is_none());

        let panel = workflow.start("D1".into(), "rover1".into());
        assert_eq!(panel.countdown, 60);
        assert!(workflow.is_alerting());
        assert_eq!(workflow.alerted_device(), Some("D1"));
    }

    #[tokio::test]
    async fn test_respond_emits_and_returns_to_idle() {
        let mut workflow = AlertWorkflow::default();
        workflow.start("D1".into(), "rover1".into());

        let now = OffsetDateTime::now_utc();
        let response = workflow.respond(true, now).unwrap();
        assert_eq!(response.device_id, "D1");
        assert!(response.false_alarm);
        assert!(!workflow.is_alerting());
        assert!(workflow.panel().is_none());

        // plus d'alerte : no-op
        assert!(workflow.respond(false, now).is_none());
    }

    #[tokio::test]
    async fn test_dismiss_does_not_emit() {
        let mut workflow = AlertWorkflow::default();
        workflow.start("D1".into(), "rover1".into());
        assert_eq!(workflow.dismiss().as_deref(), Some("D1"));
        assert!(workflow.dismiss().is_none());
        assert!(workflow.tick().is_none());
    }

    #[tokio::test]
    async fn test_manual_ticks_expire_after_countdown() {
        let mut workflow = AlertWorkflow::new(3, DEFAULT_TICK);
        workflow.start("D1".into(), "rover1".into());

        assert_eq!(
            workflow.tick(),
            Some(AlertTick::Countdown { device_id: "D1".into(), remaining: 2 })
        );
        assert_eq!(
            workflow.tick(),
            Some(AlertTick::Countdown { device_id: "D1".into(), remaining: 1 })
        );
        assert_eq!(workflow.tick(), Some(AlertTick::Expired { device_id: "D1".into() }));
        assert!(!workflow.is_alerting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_decrements_once_per_second() {
        let mut workflow = AlertWorkflow::default();
        let started = Instant::now();
        workflow.start("D1".into(), "rover1".into());

        for expected in (1..60).rev() {
            workflow.wait_tick().await;
            let tick = workflow.tick().unwrap();
            assert_eq!(tick, AlertTick::Countdown { device_id: "D1".into(), remaining: expected });
            assert_eq!(started.elapsed(), Duration::from_secs(u64::from(60 - expected)));
        }

        workflow.wait_tick().await;
        assert_eq!(workflow.tick(), Some(AlertTick::Expired { device_id: "D1".into() }));
        assert_eq!(started.elapsed(), Duration::from_secs(60));
        assert!(workflow.panel().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_alert_replaces_running_countdown() {
        let mut workflow = AlertWorkflow::default();
        workflow.start("D1".into(), "rover1".into());
        for _ in 0..5 {
            workflow.wait_tick().await;
            workflow.tick();
        }
        assert_eq!(workflow.panel().unwrap().countdown, 55);

        tokio::time::advance(Duration::from_millis(500)).await;
        workflow.start("D2".into(), "rover2".into());
        let restarted = Instant::now();

        workflow.wait_tick().await;
        assert_eq!(restarted.elapsed(), Duration::from_secs(1));
        assert_eq!(
            workflow.tick(),
            Some(AlertTick::Countdown { device_id: "D2".into(), remaining: 59 })
        );
        assert_eq!(workflow.alerted_device(), Some("D2"));
    }
}
