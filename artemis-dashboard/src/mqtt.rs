/**
 * MQTT BRIDGE - Adaptateur vers la source de télémétrie
 *
 * RÔLE : Décode les topics devices en InboundEvent pour le coordinateur,
 * signale l'état du lien (ConnAck / erreur), publie les réponses opérateur.
 *
 * TOPICS : artemis/<domaine>/<événement>@<version>
 * La reconnexion est laissée à rumqttc : on re-souscrit à chaque ConnAck.
 */

use std::future::Future;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MqttConf;
use crate::error::{DashboardError, Result};
use crate::models::{
    DeviceAnnouncement, DeviceLost, DeviceRemoved, InboundEvent, OperatorResponse, OrientationUpdate,
    PositionUpdate, ServerStatus, SnapshotMessage,
};

pub const SNAPSHOT_TOPIC: &str = "artemis/devices/snapshot@v1";
pub const REGISTERED_TOPIC: &str = "artemis/devices/registered@v1";
pub const GPS_TOPIC: &str = "artemis/devices/gps@v1";
pub const IMU_TOPIC: &str = "artemis/devices/imu@v1";
pub const LOST_TOPIC: &str = "artemis/devices/lost@v1";
pub const REMOVED_TOPIC: &str = "artemis/devices/removed@v1";
pub const SERVER_STATUS_TOPIC: &str = "artemis/server/status@v1";
pub const RESPONSE_TOPIC: &str = "artemis/operator/response@v1";

pub const TELEMETRY_TOPICS: [&str; 7] = [
    SNAPSHOT_TOPIC,
    REGISTERED_TOPIC,
    GPS_TOPIC,
    IMU_TOPIC,
    LOST_TOPIC,
    REMOVED_TOPIC,
    SERVER_STATUS_TOPIC,
];

/// Décode un message publié sur un topic de télémétrie
pub fn decode_event(topic: &str, payload: &[u8]) -> Result<InboundEvent> {
    let event = match topic {
        SNAPSHOT_TOPIC => InboundEvent::Snapshot(parse::<SnapshotMessage>(topic, payload)?.devices),
        REGISTERED_TOPIC => InboundEvent::DeviceRegistered(parse::<DeviceAnnouncement>(topic, payload)?),
        GPS_TOPIC => InboundEvent::PositionUpdate(parse::<PositionUpdate>(topic, payload)?),
        IMU_TOPIC => InboundEvent::OrientationUpdate(parse::<OrientationUpdate>(topic, payload)?),
        LOST_TOPIC => InboundEvent::DeviceLost(parse::<DeviceLost>(topic, payload)?),
        REMOVED_TOPIC => InboundEvent::DeviceRemoved(parse::<DeviceRemoved>(topic, payload)?),
        SERVER_STATUS_TOPIC => InboundEvent::ServerStatus(parse::<ServerStatus>(topic, payload)?),
        other => return Err(DashboardError::UnknownTopic(other.to_string())),
    };
    Ok(event)
}

fn parse<T: DeserializeOwned>(topic: &str, payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|source| DashboardError::MalformedPayload {
        topic: topic.to_string(),
        source,
    })
}

pub fn create_mqtt_client(cfg: &MqttConf) -> (AsyncClient, EventLoop) {
    let client_id = cfg
        .client_id
        .clone()
        .unwrap_or_else(|| format!("artemis-dashboard-{}", uuid::Uuid::new_v4().simple()));

    let mut opts = MqttOptions::new(client_id, &cfg.host, cfg.port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs.max(5)));
    opts.set_clean_session(true);

    AsyncClient::new(opts, 10)
}

/// Pompe l'event loop MQTT vers le coordinateur jusqu'à fermeture du canal
pub fn spawn_mqtt_listener(
    client: AsyncClient,
    mut eventloop: EventLoop,
    events: mpsc::Sender<InboundEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut connected = false;

        loop {
            let forwarded = match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("connected to telemetry broker");
                    for topic in TELEMETRY_TOPICS {
                        if let Err(e) = client.try_subscribe(topic, QoS::AtLeastOnce) {
                            error!("subscribe to {} failed: {}", topic, e);
                        }
                    }
                    connected = true;
                    Some(InboundEvent::ConnectivityEstablished)
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => match decode_event(&p.topic, &p.payload) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        warn!("dropping message: {}", e);
                        None
                    }
                },
                Ok(_) => None,
                Err(e) => {
                    error!("MQTT error: {:?}", e);
                    let lost = connected.then_some(InboundEvent::ConnectivityLost);
                    connected = false;
                    if let Some(event) = lost {
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    None
                }
            };

            if let Some(event) = forwarded {
                if events.send(event).await.is_err() {
                    debug!("dashboard gone, stopping MQTT listener");
                    break;
                }
            }
        }
    })
}

/// Sortie vers la source : le client MQTT en prod, un mock en test
pub trait ResponsePublisher: Send + Sync + 'static {
    fn publish_response(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = anyhow::Result<()>> + Send;
}

impl ResponsePublisher for AsyncClient {
    async fn publish_response(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        self.publish(topic, QoS::AtLeastOnce, false, payload).await?;
        Ok(())
    }
}

/// Publie chaque réponse opérateur émise par le coordinateur
pub fn spawn_response_forwarder<P: ResponsePublisher>(
    publisher: P,
    mut responses: mpsc::UnboundedReceiver<OperatorResponse>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(response) = responses.recv().await {
            let payload = match serde_json::to_vec(&response) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("cannot encode operator response: {}", e);
                    continue;
                }
            };
            match publisher.publish_response(RESPONSE_TOPIC, payload).await {
                Ok(()) => info!(
                    "published operator response for {} (false alarm: {})",
                    response.device_id, response.false_alarm
                ),
                Err(e) => error!("failed to publish operator response: {:?}", e),
            }
        }
    })
}
