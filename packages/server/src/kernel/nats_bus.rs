//! JetStream-backed event bus.
//!
//! Exchange `X` is the stream `X` capturing `X.>`; routing key `k` is the
//! subject `X.k`. Each subscription is a durable pull consumer with explicit
//! ack, so messages published while a service is down wait in the stream.

use anyhow::{Context, Result};
use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, PullConsumer},
    stream::{Config as StreamConfig, RetentionPolicy, StorageType},
    AckKind, Message,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::event_bus::{durable_consumer_name, BaseEventBus, EventEnvelope, EventHandler};

/// Translate a topic routing key to a NATS subject token sequence.
fn subject_pattern(exchange: &str, routing_key: &str) -> String {
    let key = routing_key
        .split('.')
        .map(|token| if token == "#" { ">" } else { token })
        .collect::<Vec<_>>()
        .join(".");
    format!("{}.{}", exchange, key)
}

pub struct NatsEventBus {
    jetstream: jetstream::Context,
    service_id: String,
    known_streams: Mutex<HashSet<String>>,
    shutdown: CancellationToken,
}

impl NatsEventBus {
    /// Connect to the broker. Failure here is fatal at startup.
    pub async fn connect(url: &str, service_id: impl Into<String>) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Successfully connected to NATS");
        Ok(Self {
            jetstream: jetstream::new(client),
            service_id: service_id.into(),
            known_streams: Mutex::new(HashSet::new()),
            shutdown: CancellationToken::new(),
        })
    }

    /// Token cancelled on shutdown; stops every consumer loop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    async fn ensure_exchange(&self, exchange: &str) -> Result<jetstream::stream::Stream> {
        self.ensure_stream(StreamConfig {
            name: exchange.to_string(),
            subjects: vec![format!("{}.>", exchange)],
            storage: StorageType::File,
            ..Default::default()
        })
        .await
    }

    async fn ensure_queue(&self, queue: &str) -> Result<jetstream::stream::Stream> {
        self.ensure_stream(StreamConfig {
            name: queue.to_string(),
            subjects: vec![queue.to_string()],
            storage: StorageType::File,
            retention: RetentionPolicy::WorkQueue,
            ..Default::default()
        })
        .await
    }

    async fn ensure_stream(&self, config: StreamConfig) -> Result<jetstream::stream::Stream> {
        let name = config.name.clone();
        let stream = self
            .jetstream
            .get_or_create_stream(config)
            .await
            .with_context(|| format!("Failed to ensure stream '{}'", name))?;

        if self.known_streams.lock().await.insert(name.clone()) {
            info!(stream = %name, "Stream ready");
        }
        Ok(stream)
    }

    async fn publish_envelope(&self, subject: String, envelope: &EventEnvelope) -> Result<()> {
        let payload = Bytes::from(serde_json::to_vec(envelope).context("Failed to encode envelope")?);

        // The second await waits for the stream's persistence ack.
        self.jetstream
            .publish(subject.clone(), payload)
            .await
            .with_context(|| format!("Failed to publish to '{}'", subject))?
            .await
            .with_context(|| format!("No publish ack for '{}'", subject))?;

        debug!(subject = %subject, event_type = %envelope.event_type, "Published event");
        Ok(())
    }

    async fn spawn_consumer(
        &self,
        stream: jetstream::stream::Stream,
        consumer_name: String,
        filter_subject: String,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        let consumer: PullConsumer = stream
            .get_or_create_consumer(
                &consumer_name,
                pull::Config {
                    durable_name: Some(consumer_name.clone()),
                    filter_subject: filter_subject.clone(),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("Failed to create consumer '{}'", consumer_name))?;

        info!(
            consumer = %consumer_name,
            subject = %filter_subject,
            "Consumer created successfully"
        );

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = run_consumer(consumer, handler, shutdown).await {
                error!(consumer = %consumer_name, error = %e, "Consumer loop failed");
            }
        });
        Ok(())
    }
}

/// Process one subscription in delivery order until shutdown.
async fn run_consumer(
    consumer: PullConsumer,
    handler: Arc<dyn EventHandler>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut messages = consumer
        .messages()
        .await
        .context("Failed to open message stream")?;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Received shutdown signal, stopping consumer");
                break;
            }
            next = messages.next() => {
                match next {
                    Some(Ok(message)) => process_message(&message, handler.as_ref()).await,
                    Some(Err(e)) => {
                        warn!(error = %e, "Error receiving message");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                    None => break,
                }
            }
        }
    }

    Ok(())
}

async fn process_message(message: &Message, handler: &dyn EventHandler) {
    let envelope: EventEnvelope = match serde_json::from_slice(&message.payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            error!(subject = %message.subject, error = %e, "Undecodable envelope, terminating");
            terminate(message).await;
            return;
        }
    };

    let event_type = envelope.event_type.clone();
    match handler.handle(envelope).await {
        Ok(()) => {
            if let Err(e) = message.ack().await {
                error!(error = %e, event_type = %event_type, "Failed to acknowledge message");
            }
        }
        Err(e) => {
            error!(
                subject = %message.subject,
                event_type = %event_type,
                error = %e,
                "Handler failed, dropping message"
            );
            terminate(message).await;
        }
    }
}

async fn terminate(message: &Message) {
    if let Err(e) = message.ack_with(AckKind::Term).await {
        error!(error = %e, "Failed to terminate message");
    }
}

#[async_trait]
impl BaseEventBus for NatsEventBus {
    fn service_id(&self) -> &str {
        &self.service_id
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        event_type: &str,
        data: Value,
    ) -> Result<()> {
        self.ensure_exchange(exchange).await?;
        let envelope = EventEnvelope::new(event_type, data, self.service_id.clone());
        self.publish_envelope(subject_pattern(exchange, routing_key), &envelope)
            .await
    }

    async fn subscribe(
        &self,
        exchange: &str,
        routing_key: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        let stream = self.ensure_exchange(exchange).await?;
        let consumer_name = durable_consumer_name(&self.service_id, routing_key);
        self.spawn_consumer(
            stream,
            consumer_name,
            subject_pattern(exchange, routing_key),
            handler,
        )
        .await
    }

    async fn send_direct_message(
        &self,
        queue: &str,
        event_type: &str,
        data: Value,
    ) -> Result<()> {
        self.ensure_queue(queue).await?;
        let envelope = EventEnvelope::new(event_type, data, self.service_id.clone());
        self.publish_envelope(queue.to_string(), &envelope).await
    }

    async fn consume_direct(&self, queue: &str, handler: Arc<dyn EventHandler>) -> Result<()> {
        let stream = self.ensure_queue(queue).await?;
        self.spawn_consumer(stream, format!("{}-workers", queue), queue.to_string(), handler)
            .await
    }
}
