//! Registry reconciler service
//!
//! Listens to VM lifecycle notifications on NATS JetStream and reconciles the
//! provisioning registry against them, one message at a time.
//!
//! Messages are acknowledged after successful processing or a deliberate
//! skip. Decode failures and remote-call failures leave the message
//! unacknowledged and rely on broker redelivery; the reconciliation engine is
//! idempotent, so redelivered messages are safe to reprocess.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_nats::jetstream::AckKind;
use futures::StreamExt;
use tracing::{error, info, warn};

use registry_reconciler::adapters::{
    HttpRegistryClient, OpenStackClient, OpenStackConfig, RegistryConfig,
};
use registry_reconciler::clients::DnsResolver;
use registry_reconciler::transport::{self, TransportConfig};
use registry_reconciler::{decode_message, DecodedMessage, EventConsumer, Outcome};

/// Configuration for the reconciler service
#[derive(Debug, Clone)]
struct ServiceConfig {
    transport: TransportConfig,
    registry: RegistryConfig,
    openstack: OpenStackConfig,
}

impl ServiceConfig {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let mut transport = TransportConfig::default();
        if let Ok(url) = std::env::var("NATS_URL") {
            transport.url = url;
        }
        if let Ok(stream) = std::env::var("NATS_STREAM") {
            transport.stream = stream;
        }
        if let Ok(subject) = std::env::var("NATS_SUBJECT") {
            transport.subjects = vec![subject];
        }
        if let Ok(consumer) = std::env::var("NATS_CONSUMER") {
            transport.consumer = consumer;
        }

        let registry = RegistryConfig {
            base_url: std::env::var("REGISTRY_URL").context("REGISTRY_URL not set")?,
            api_token: std::env::var("REGISTRY_API_TOKEN")
                .context("REGISTRY_API_TOKEN not set")?,
            ..Default::default()
        };

        let openstack = OpenStackConfig {
            compute_url: std::env::var("OS_COMPUTE_URL").context("OS_COMPUTE_URL not set")?,
            image_url: std::env::var("OS_IMAGE_URL").context("OS_IMAGE_URL not set")?,
            token: std::env::var("OS_AUTH_TOKEN").context("OS_AUTH_TOKEN not set")?,
            dns_domain: std::env::var("DNS_DOMAIN").ok(),
            timeout_secs: 30,
        };

        Ok(Self {
            transport,
            registry,
            openstack,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting registry reconciler service");

    let config = ServiceConfig::from_env()?;
    info!(
        nats = %config.transport.url,
        stream = %config.transport.stream,
        registry = %config.registry.base_url,
        compute = %config.openstack.compute_url,
        "Configuration loaded"
    );

    let registry = Arc::new(
        HttpRegistryClient::new(config.registry).context("failed to create registry client")?,
    );
    let control_plane = Arc::new(
        OpenStackClient::new(config.openstack).context("failed to create control plane client")?,
    );
    let consumer = EventConsumer::new(registry, control_plane, Arc::new(DnsResolver));

    let client = transport::connect(&config.transport)
        .await
        .context("failed to connect to NATS")?;
    let js_consumer = transport::ensure_consumer(client, &config.transport)
        .await
        .context("failed to set up JetStream consumer")?;

    info!("Starting event consumption");

    // One message at a time: a message is fully processed, including every
    // remote call, before the next is dequeued
    let messages = js_consumer
        .stream()
        .max_messages_per_batch(1)
        .messages()
        .await
        .context("failed to start consuming messages")?;
    tokio::pin!(messages);

    let mut processed = 0u64;
    let mut failed = 0u64;

    while let Some(message) = messages.next().await {
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                failed += 1;
                error!(error = %e, "Error receiving message");
                continue;
            }
        };

        match decode_message(&message.payload) {
            Ok(DecodedMessage::Unsupported(event_type)) => {
                info!(event_type = %event_type, "Ignoring unsupported event type");
                if let Err(e) = message.ack().await {
                    error!(error = %e, "Failed to acknowledge message");
                }
            }
            Ok(DecodedMessage::Event(event)) => match consumer.consume(&event).await {
                Ok(outcome) => {
                    processed += 1;
                    match outcome {
                        Outcome::Completed => info!(total = processed, "Event processed"),
                        Outcome::Skipped(reason) => {
                            info!(%reason, total = processed, "Event skipped")
                        }
                    }
                    if let Err(e) = message.ack().await {
                        error!(error = %e, "Failed to acknowledge message");
                    }
                }
                Err(e) => {
                    failed += 1;
                    error!(error = %e, total_failed = failed, "Event processing failed");
                    // No internal retry; leave redelivery to the broker
                    if let Err(e) = message.ack_with(AckKind::Nak(None)).await {
                        error!(error = %e, "Failed to NAK message");
                    }
                }
            },
            Err(e) => {
                failed += 1;
                error!(error = %e, total_failed = failed, "Failed to decode message");
                if let Err(e) = message.ack_with(AckKind::Nak(None)).await {
                    error!(error = %e, "Failed to NAK message");
                }
            }
        }
    }

    warn!("Message stream ended unexpectedly");
    Ok(())
}
