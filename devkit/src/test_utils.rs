/*!
Test Harness pour le dashboard Artemis

Fait tourner un coordinateur réel derrière le client MQTT mock :
- les messages simulés passent par le même décodeur que la prod
- les réponses opérateur sont publiées sur le mock via le forwarder
- assertions sur la vue rendue et sur les messages publiés
*/

use crate::mqtt_stub::{MockMqttClient, TelemetryMessageBuilder};
use artemis_dashboard::config::DashboardConfig;
use artemis_dashboard::dashboard::{Dashboard, DashboardHandle};
use artemis_dashboard::health::HealthTracker;
use artemis_dashboard::models::{InboundEvent, OperatorResponse};
use artemis_dashboard::mqtt::{
    decode_event, spawn_response_forwarder, GPS_TOPIC, IMU_TOPIC, LOST_TOPIC, REGISTERED_TOPIC,
    REMOVED_TOPIC, SERVER_STATUS_TOPIC, SNAPSHOT_TOPIC, TELEMETRY_TOPICS,
};
use artemis_dashboard::view::{DashboardView, FocusTarget};
use rumqttc::QoS;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use anyhow::Result;

const DEFAULT_WAIT_MS: u64 = 5000;

/// Harness de test complet : mock MQTT + coordinateur + forwarder
pub struct TestHarness {
    pub mqtt_client: MockMqttClient,
    pub dashboard: DashboardHandle,
    pub health: HealthTracker,
    events: mpsc::Sender<InboundEvent>,
    expectations: Vec<Expectation>,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Debug)]
struct Expectation {
    topic: String,
    expected_count: usize,
}

impl TestHarness {
    /// Crée un harness avec la config par défaut. Doit être appelé dans un runtime tokio.
    pub fn new() -> Self {
        Self::with_config(DashboardConfig::default())
    }

    pub fn with_config(cfg: DashboardConfig) -> Self {
        env_logger::try_init().ok();

        let mqtt_client = MockMqttClient::new();
        let health = HealthTracker::new();
        let (events, events_rx) = mpsc::channel(64);
        let (responses_tx, responses_rx) = mpsc::unbounded_channel::<OperatorResponse>();

        let (dashboard, coordinator) = Dashboard::new(&cfg, health.clone(), responses_tx).spawn(events_rx);
        let forwarder = spawn_response_forwarder(mqtt_client.clone(), responses_rx);
        let pump = spawn_incoming_pump(&mqtt_client, events.clone());

        Self {
            mqtt_client,
            dashboard,
            health,
            events,
            expectations: Vec::new(),
            tasks: vec![coordinator, forwarder, pump],
        }
    }

    /// Simule un ConnAck : abonnements + lien établi
    pub async fn connect(&self) -> Result<()> {
        for topic in TELEMETRY_TOPICS {
            self.mqtt_client.subscribe(topic, QoS::AtLeastOnce).await?;
        }
        self.events.send(InboundEvent::ConnectivityEstablished).await?;
        Ok(())
    }

    /// Simule une coupure du broker
    pub async fn disconnect(&self) -> Result<()> {
        self.events.send(InboundEvent::ConnectivityLost).await?;
        Ok(())
    }

    /// Envoie un message JSON sur un topic de télémétrie
    pub async fn send_event(&self, topic: &str, event_data: Value) -> Result<()> {
        let payload = serde_json::to_vec(&event_data)?;
        self.mqtt_client.simulate_incoming(topic, payload).await?;
        log::info!("📨 Sent test event on {}", topic);
        Ok(())
    }

    pub async fn send_raw(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.mqtt_client.simulate_incoming(topic, payload.to_vec()).await
    }

    pub async fn register_device(&self, device_id: &str, username: &str) -> Result<()> {
        self.send_event(REGISTERED_TOPIC, TelemetryMessageBuilder::registered(device_id, username, 0))
            .await
    }

    pub async fn send_snapshot(&self, devices: &[(&str, &str)]) -> Result<()> {
        self.send_event(SNAPSHOT_TOPIC, TelemetryMessageBuilder::snapshot(devices)).await
    }

    pub async fn send_gps(&self, device_id: &str, lat: f64, lon: f64) -> Result<()> {
        self.send_event(GPS_TOPIC, TelemetryMessageBuilder::gps(device_id, lat, lon)).await
    }

    pub async fn send_imu(&self, device_id: &str, alpha: f64, beta: f64, gamma: f64) -> Result<()> {
        self.send_event(IMU_TOPIC, TelemetryMessageBuilder::imu(device_id, alpha, beta, gamma))
            .await
    }

    pub async fn send_lost(&self, device_id: &str, username: &str) -> Result<()> {
        log::info!("📵 Device lost: {}", device_id);
        self.send_event(LOST_TOPIC, TelemetryMessageBuilder::lost(device_id, username)).await
    }

    pub async fn send_removed(&self, device_id: &str) -> Result<()> {
        self.send_event(REMOVED_TOPIC, TelemetryMessageBuilder::removed(device_id)).await
    }

    pub async fn send_server_status(&self, status: &str, message: &str) -> Result<()> {
        self.send_event(SERVER_STATUS_TOPIC, TelemetryMessageBuilder::server_status(status, message))
            .await
    }

    /// Dernière vue publiée par le coordinateur
    pub fn view(&self) -> DashboardView {
        self.dashboard.view()
    }

    /// Attend une vue qui satisfait le prédicat
    pub async fn wait_for_view<F>(&self, predicate: F, timeout_ms: u64) -> Result<DashboardView>
    where
        F: FnMut(&DashboardView) -> bool,
    {
        let mut views = self.dashboard.views();
        let view = match timeout(Duration::from_millis(timeout_ms), views.wait_for(predicate)).await {
            Ok(Ok(view)) => (*view).clone(),
            Ok(Err(_)) => anyhow::bail!("dashboard coordinator stopped"),
            Err(_) => {
                log::warn!("⏰ Timeout waiting for dashboard view");
                anyhow::bail!("no matching view after {} ms", timeout_ms)
            }
        };
        Ok(view)
    }

    pub async fn wait_for_device(&self, device_id: &str) -> Result<DashboardView> {
        self.wait_for_view(|v| v.card(device_id).is_some(), DEFAULT_WAIT_MS).await
    }

    pub async fn wait_for_alert(&self, device_id: &str) -> Result<DashboardView> {
        self.wait_for_view(
            |v| v.alert.as_ref().is_some_and(|a| a.device_id == device_id),
            DEFAULT_WAIT_MS,
        )
        .await
    }

    pub async fn respond(&self, false_alarm: bool) -> Result<Option<OperatorResponse>> {
        Ok(self.dashboard.respond(false_alarm).await?)
    }

    pub async fn dismiss(&self) -> Result<()> {
        self.dashboard.dismiss().await?;
        Ok(())
    }

    pub async fn focus(&self, device_id: &str) -> Result<Option<FocusTarget>> {
        Ok(self.dashboard.focus(device_id).await?)
    }

    /// Ajoute une expectation: on s'attend à N messages publiés sur un topic
    pub fn expect_messages(&mut self, topic: &str, count: usize) -> &mut Self {
        self.expectations.push(Expectation {
            topic: topic.to_string(),
            expected_count: count,
        });
        self
    }

    /// Attend qu'un message ait été publié sur un topic
    pub async fn wait_for_message(&self, topic: &str, timeout_ms: u64) -> Result<Option<Value>> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);

        while tokio::time::Instant::now() < deadline {
            if let Some(msg) = self.mqtt_client.get_last_json_message::<Value>(topic)? {
                log::info!("✅ Received expected message on {}", topic);
                return Ok(Some(msg));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        log::warn!("⏰ Timeout waiting for message on {}", topic);
        Ok(None)
    }

    pub async fn verify_expectations(&self) -> Result<()> {
        log::info!("🔍 Verifying {} expectations...", self.expectations.len());

        for expectation in &self.expectations {
            let actual_count = self.mqtt_client.find_messages_by_topic(&expectation.topic).len();

            if actual_count != expectation.expected_count {
                anyhow::bail!(
                    "Expectation failed for topic '{}': expected {} messages, got {}",
                    expectation.topic, expectation.expected_count, actual_count
                );
            }

            log::info!("✅ Topic '{}': {} messages as expected", expectation.topic, actual_count);
        }

        Ok(())
    }

    /// Assert qu'un champ a une valeur donnée dans le dernier message d'un topic
    pub fn assert_field_equals(&self, topic: &str, field_path: &str, expected: &Value) -> Result<()> {
        if let Some(msg) = self.mqtt_client.get_last_json_message::<Value>(topic)? {
            if let Some(actual) = get_nested_field(&msg, field_path) {
                if actual == expected {
                    log::info!("✅ Field '{}' = {:?} in {}", field_path, expected, topic);
                    return Ok(());
                }
                anyhow::bail!("Field '{}' mismatch: expected {:?}, got {:?}", field_path, expected, actual);
            }
        }

        anyhow::bail!("Field '{}' not found for comparison in {}", field_path, topic);
    }

    pub fn assert_field_exists(&self, topic: &str, field_path: &str) -> Result<()> {
        if let Some(msg) = self.mqtt_client.get_last_json_message::<Value>(topic)? {
            if get_nested_field(&msg, field_path).is_some() {
                return Ok(());
            }
        }

        anyhow::bail!("Field '{}' not found in latest message on {}", field_path, topic);
    }

    pub fn get_stats(&self) -> TestStats {
        let messages = self.mqtt_client.get_published_messages();
        let mut topic_counts = HashMap::new();

        for msg in &messages {
            *topic_counts.entry(msg.topic.clone()).or_insert(0) += 1;
        }

        let view = self.view();
        TestStats {
            total_messages: messages.len(),
            topic_counts,
            subscriptions: self.mqtt_client.get_subscriptions(),
            devices: view.stats.total,
            alert_active: view.alert.is_some(),
        }
    }

    /// Vide les messages enregistrés et les expectations, le coordinateur garde son état
    pub fn reset(&mut self) {
        self.mqtt_client.clear();
        self.expectations.clear();
        log::info!("🧹 Test harness reset");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Équivalent du listener MQTT : décode les messages simulés vers le coordinateur
fn spawn_incoming_pump(client: &MockMqttClient, events: mpsc::Sender<InboundEvent>) -> JoinHandle<()> {
    let mut incoming = client.setup_receiver();
    tokio::spawn(async move {
        while let Some(message) = incoming.recv().await {
            match decode_event(&message.topic, &message.payload) {
                Ok(event) => {
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("⚠️ [MOCK] dropping message: {}", e),
            }
        }
    })
}

fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;

    for part in path.split('.') {
        match current {
            Value::Object(obj) => {
                current = obj.get(part)?;
            }
            _ => return None,
        }
    }

    Some(current)
}

#[derive(Debug)]
pub struct TestStats {
    pub total_messages: usize,
    pub topic_counts: HashMap<String, usize>,
    pub subscriptions: Vec<String>,
    pub devices: usize,
    pub alert_active: bool,
}

impl TestStats {
    pub fn print(&self) {
        println!("📊 Test Statistics:");
        println!("  Devices tracked: {}", self.devices);
        println!("  Alert active: {}", self.alert_active);
        println!("  Total messages published: {}", self.total_messages);
        for (topic, count) in &self.topic_counts {
            println!("    {}: {} messages", topic, count);
        }
        println!("  Subscriptions: {}", self.subscriptions.len());
    }
}

/// Test de scénario dashboard : runtime en temps virtuel, harness prêt à l'emploi
#[macro_export]
macro_rules! dashboard_test {
    ($name:ident, |$harness:ident| $body:block) => {
        #[tokio::test(start_paused = true)]
        async fn $name() {
            #[allow(unused_mut)]
            let mut $harness = $crate::test_utils::TestHarness::new();
            let result: anyhow::Result<()> = async { $body }.await;

            match result {
                Ok(()) => {
                    $harness.get_stats().print();
                    println!("✅ Test '{}' passed", stringify!($name));
                }
                Err(e) => {
                    eprintln!("❌ Test '{}' failed: {}", stringify!($name), e);
                    panic!("Test failed: {}", e);
                }
            }
        }
    };
}
