/**
 * ARTEMIS DASHBOARD - Point d'entrée du serveur
 *
 * RÔLE : Orchestration config, MQTT, coordinateur et HTTP.
 * Le coordinateur s'arrête avec le listener MQTT (fermeture du canal d'événements).
 */

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use artemis_dashboard::config::load_config;
use artemis_dashboard::dashboard::Dashboard;
use artemis_dashboard::health::HealthTracker;
use artemis_dashboard::http::{build_router, AppState};
use artemis_dashboard::mqtt;

const EVENT_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("artemis_dashboard=info")),
        )
        .init();

    let cfg = load_config().await;
    let health = HealthTracker::new();

    // source de télémétrie → coordinateur
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let (client, eventloop) = mqtt::create_mqtt_client(&cfg.mqtt);
    info!("connecting to telemetry broker {}:{}", cfg.mqtt.host, cfg.mqtt.port);
    mqtt::spawn_mqtt_listener(client.clone(), eventloop, events_tx);

    // coordinateur → source (réponses opérateur)
    let (responses_tx, responses_rx) = mpsc::unbounded_channel();
    mqtt::spawn_response_forwarder(client, responses_rx);

    let (dashboard, _coordinator) = Dashboard::new(&cfg, health.clone(), responses_tx).spawn(events_rx);

    let app = build_router(AppState {
        dashboard,
        health,
        login: cfg.login.clone(),
    });

    let listener = TcpListener::bind(cfg.http.bind.as_str())
        .await
        .with_context(|| format!("cannot bind HTTP listener on {}", cfg.http.bind))?;
    info!("listening on http://{}", cfg.http.bind);
    axum::serve(listener, app).await.context("HTTP server stopped")?;

    Ok(())
}
