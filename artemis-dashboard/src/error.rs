use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("unknown telemetry topic '{0}'")]
    UnknownTopic(String),

    #[error("malformed payload on '{topic}': {source}")]
    MalformedPayload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("dashboard coordinator is not running")]
    CoordinatorGone,
}

pub type Result<T> = std::result::Result<T, DashboardError>;
