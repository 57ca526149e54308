/*!
# Artemis DevKit - Stubs et Utilitaires pour tester le dashboard

Bibliothèque facilitant les tests du dashboard Artemis sans broker :
- Client MQTT mock (enregistre les réponses opérateur publiées)
- Builders de messages de télémétrie au format du serveur
- Harness qui fait tourner un coordinateur réel derrière le mock
*/

pub mod mqtt_stub;
pub mod test_utils;

pub use mqtt_stub::{MockMqttClient, TelemetryMessageBuilder};
pub use test_utils::TestHarness;
