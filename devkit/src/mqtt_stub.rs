/*!
Mock MQTT Client pour tester le dashboard sans broker

Enregistre tout ce que le dashboard publie (réponses opérateur) et permet
de simuler la réception des messages de télémétrie du serveur.
*/

use artemis_dashboard::mqtt::ResponsePublisher;
use rumqttc::QoS;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Mock MQTT Client qui simule rumqttc::AsyncClient
#[derive(Clone)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    message_sender: Arc<Mutex<Option<mpsc::UnboundedSender<MockMessage>>>>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self {
            published_messages: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            message_sender: Arc::new(Mutex::new(None)),
        }
    }

    /// Canal qui reçoit les messages simulés (remplace l'event loop MQTT)
    pub fn setup_receiver(&self) -> mpsc::UnboundedReceiver<MockMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.message_sender.lock().unwrap() = Some(sender);
        receiver
    }

    /// Simule la publication d'un message (compatible avec AsyncClient)
    pub async fn publish<S, V>(&self, topic: S, qos: QoS, retain: bool, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        };

        self.published_messages.lock().unwrap().push(message.clone());

        log::info!("📤 [MOCK] Published to {}: {} bytes", message.topic, message.payload.len());
        Ok(())
    }

    /// Simule l'abonnement à un topic (compatible avec AsyncClient)
    pub async fn subscribe<S: Into<String>>(&self, topic: S, _qos: QoS) -> Result<()> {
        let topic = topic.into();
        self.subscriptions.lock().unwrap().push(topic.clone());
        log::info!("📥 [MOCK] Subscribed to {}", topic);
        Ok(())
    }

    /// Simule la réception d'un message publié par le serveur de télémétrie
    pub async fn simulate_incoming<S, V>(&self, topic: S, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtLeastOnce,
            retain: false,
        };

        if let Some(sender) = self.message_sender.lock().unwrap().as_ref() {
            sender.send(message.clone()).map_err(|e| anyhow::anyhow!("Send error: {}", e))?;
        }

        log::info!("📨 [MOCK] Simulated incoming: {}", message.topic);
        Ok(())
    }

    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().unwrap().clone()
    }

    pub fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Parse le dernier message d'un topic en JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let messages = self.find_messages_by_topic(topic);
        if let Some(last_msg) = messages.last() {
            let parsed: T = serde_json::from_slice(&last_msg.payload)?;
            Ok(Some(parsed))
        } else {
            Ok(None)
        }
    }

    pub fn clear(&self) {
        self.published_messages.lock().unwrap().clear();
        self.subscriptions.lock().unwrap().clear();
    }
}

impl Default for MockMqttClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Le mock remplace AsyncClient derrière le forwarder de réponses
impl ResponsePublisher for MockMqttClient {
    async fn publish_response(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        self.publish(topic, QoS::AtLeastOnce, false, payload).await
    }
}

/// Messages de test au format du serveur de télémétrie
pub struct TelemetryMessageBuilder;

impl TelemetryMessageBuilder {
    /// devices/registered@v1
    pub fn registered(device_id: &str, username: &str, client_id: u32) -> Value {
        serde_json::json!({
            "deviceId": device_id,
            "username": username,
            "clientId": client_id,
            "timestamp": chrono::Utc::now().timestamp_millis()
        })
    }

    /// devices/snapshot@v1, une entrée par (deviceId, username)
    pub fn snapshot(devices: &[(&str, &str)]) -> Value {
        let devices: Vec<Value> = devices
            .iter()
            .enumerate()
            .map(|(i, (device_id, username))| {
                serde_json::json!({
                    "deviceId": device_id,
                    "username": username,
                    "clientId": i + 1,
                    "status": "online"
                })
            })
            .collect();
        serde_json::json!({ "devices": devices })
    }

    /// devices/gps@v1
    pub fn gps(device_id: &str, lat: f64, lon: f64) -> Value {
        serde_json::json!({
            "deviceId": device_id,
            "gps": {
                "lat": lat,
                "lon": lon,
                "accuracy": 5.0,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        })
    }

    /// devices/gps@v1 sans fix complet (longitude absente)
    pub fn gps_without_fix(device_id: &str, lat: f64) -> Value {
        serde_json::json!({
            "deviceId": device_id,
            "gps": { "lat": lat }
        })
    }

    /// devices/imu@v1
    pub fn imu(device_id: &str, alpha: f64, beta: f64, gamma: f64) -> Value {
        serde_json::json!({
            "deviceId": device_id,
            "imu": { "alpha": alpha, "beta": beta, "gamma": gamma }
        })
    }

    /// devices/lost@v1
    pub fn lost(device_id: &str, username: &str) -> Value {
        serde_json::json!({
            "deviceId": device_id,
            "username": username,
            "lastSeen": chrono::Utc::now().to_rfc3339()
        })
    }

    /// devices/removed@v1
    pub fn removed(device_id: &str) -> Value {
        serde_json::json!({ "deviceId": device_id })
    }

    /// server/status@v1
    pub fn server_status(status: &str, message: &str) -> Value {
        serde_json::json!({ "status": status, "message": message })
    }
}
