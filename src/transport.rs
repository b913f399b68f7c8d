//! NATS JetStream transport plumbing
//!
//! The consumer is a durable pull consumer with explicit acknowledgment:
//! messages are fetched one at a time, fully processed, and acknowledged only
//! after processing completed or deliberately skipped. Failed messages are
//! negatively acknowledged and redelivered under the broker's at-least-once
//! policy; the engine relies on that for all retry.

use std::time::Duration;

use async_nats::jetstream::{self, consumer::pull, stream};
use async_nats::ConnectOptions;
use tracing::info;

use crate::errors::{ReconcilerError, ReconcilerResult};

/// Configuration for the NATS connection and the event consumer
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// NATS server URL
    pub url: String,
    /// Client connection name
    pub name: String,
    /// JetStream stream holding lifecycle notifications
    pub stream: String,
    /// Subjects bound to the stream
    pub subjects: Vec<String>,
    /// Durable consumer name
    pub consumer: String,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            name: "registry-reconciler".to_string(),
            stream: "COMPUTE_EVENTS".to_string(),
            subjects: vec!["compute.notifications.>".to_string()],
            consumer: "registry-reconciler".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Connect to NATS with the configured client name
pub async fn connect(config: &TransportConfig) -> ReconcilerResult<async_nats::Client> {
    let options = ConnectOptions::new()
        .name(&config.name)
        .connection_timeout(config.connect_timeout);

    let client = async_nats::connect_with_options(config.url.as_str(), options)
        .await
        .map_err(|e| ReconcilerError::Transport(format!("NATS connection failed: {e}")))?;

    info!(url = %config.url, "Connected to NATS");
    Ok(client)
}

/// Ensure the notification stream and our durable pull consumer exist,
/// returning the consumer ready for fetching.
pub async fn ensure_consumer(
    client: async_nats::Client,
    config: &TransportConfig,
) -> ReconcilerResult<jetstream::consumer::Consumer<pull::Config>> {
    let context = jetstream::new(client);

    let js_stream = match context.get_stream(&config.stream).await {
        Ok(s) => s,
        Err(_) => {
            info!(stream = %config.stream, "Stream not found, creating");
            context
                .create_stream(stream::Config {
                    name: config.stream.clone(),
                    subjects: config.subjects.clone(),
                    max_age: Duration::from_secs(7 * 24 * 60 * 60),
                    ..Default::default()
                })
                .await
                .map_err(|e| {
                    ReconcilerError::Transport(format!("failed to create stream: {e}"))
                })?;
            context.get_stream(&config.stream).await.map_err(|e| {
                ReconcilerError::Transport(format!("failed to get stream: {e}"))
            })?
        }
    };

    let consumer = match js_stream.get_consumer(&config.consumer).await {
        Ok(c) => c,
        Err(_) => {
            info!(consumer = %config.consumer, "Consumer not found, creating");
            js_stream
                .create_consumer(pull::Config {
                    durable_name: Some(config.consumer.clone()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ..Default::default()
                })
                .await
                .map_err(|e| {
                    ReconcilerError::Transport(format!("failed to create consumer: {e}"))
                })?
        }
    };

    info!(stream = %config.stream, consumer = %config.consumer, "Consumer ready");
    Ok(consumer)
}
