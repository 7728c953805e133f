//! Event bus abstraction for production and testing.
//!
//! Exchanges are topic namespaces (`orders`, `payments`, `drones`, `catalog`);
//! routing keys are dot-separated (`payment.completed`). Subscriptions bind a
//! topic pattern where `*` matches one token and `#` (or `>`) matches the rest.
//!
//! Production uses [`NatsEventBus`](super::nats_bus::NatsEventBus); tests use
//! [`TestEventBus`], which dispatches synchronously to matching subscribers.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Wire envelope wrapped around every published payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub service_id: String,
    /// Tracing only. Never used for deduplication.
    pub correlation_id: Uuid,
}

impl EventEnvelope {
    pub fn new(event_type: impl Into<String>, data: Value, service_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: Utc::now(),
            service_id: service_id.into(),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Decode the payload into a typed event.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            anyhow::anyhow!("malformed {} payload: {}", self.event_type, e)
        })
    }
}

/// Consumer of envelopes delivered by a subscription or direct queue.
///
/// Returning an error drops the message after this one attempt.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: EventEnvelope) -> Result<()>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F, Fut>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, envelope: EventEnvelope) -> Result<()> {
        (self.f)(envelope).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        f,
        _fut: PhantomData,
    })
}

/// Durable topic broker operations.
#[async_trait]
pub trait BaseEventBus: Send + Sync {
    /// Subscriber identity; stamped into envelopes and durable consumer names.
    fn service_id(&self) -> &str;

    /// Publish a persistent message. Broker failures propagate to the caller.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        event_type: &str,
        data: Value,
    ) -> Result<()>;

    /// Bind a durable per-consumer queue to `exchange` for `routing_key`.
    async fn subscribe(
        &self,
        exchange: &str,
        routing_key: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()>;

    /// Point-to-point message; exactly one consumer group receives it.
    async fn send_direct_message(&self, queue: &str, event_type: &str, data: Value)
        -> Result<()>;

    async fn consume_direct(&self, queue: &str, handler: Arc<dyn EventHandler>) -> Result<()>;
}

/// Topic match with `*` (one token) and `#`/`>` (one or more remaining
/// tokens, as the NATS `>` wildcard).
pub fn routing_key_matches(pattern: &str, key: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut key_tokens = key.split('.');

    loop {
        match (pattern_tokens.next(), key_tokens.next()) {
            (Some("#" | ">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(k)) if p == k => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Deterministic durable consumer name for a subscriber and routing key.
pub fn durable_consumer_name(service_id: &str, routing_key: &str) -> String {
    let key: String = routing_key
        .split('.')
        .map(|token| match token {
            "*" => "star",
            "#" | ">" => "all",
            other => other,
        })
        .collect::<Vec<_>>()
        .join("_");
    format!("{}__{}", service_id, key)
}

// =============================================================================
// Test implementation
// =============================================================================

/// A message recorded by [`TestEventBus`].
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    /// Exchange name, or the queue name for direct messages.
    pub exchange: String,
    pub routing_key: String,
    pub envelope: EventEnvelope,
}

/// A message whose handler failed; dropped after one attempt.
#[derive(Debug, Clone)]
pub struct DroppedEvent {
    pub routing_key: String,
    pub envelope: EventEnvelope,
    pub error: String,
}

struct Binding {
    exchange: String,
    pattern: String,
    handler: Arc<dyn EventHandler>,
}

/// In-memory event bus that records everything and dispatches synchronously.
///
/// Handlers run inside `publish`, so a test sees the whole choreography settle
/// before the publishing call returns.
pub struct TestEventBus {
    service_id: String,
    published: RwLock<Vec<PublishedEvent>>,
    bindings: RwLock<Vec<Binding>>,
    direct_consumers: RwLock<Vec<(String, Arc<dyn EventHandler>)>>,
    dropped: RwLock<Vec<DroppedEvent>>,
    fail_publish: RwLock<bool>,
}

impl Default for TestEventBus {
    fn default() -> Self {
        Self::new("test-service")
    }
}

impl TestEventBus {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            published: RwLock::new(Vec::new()),
            bindings: RwLock::new(Vec::new()),
            direct_consumers: RwLock::new(Vec::new()),
            dropped: RwLock::new(Vec::new()),
            fail_publish: RwLock::new(false),
        }
    }

    /// Make every subsequent publish fail, as if the broker were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.fail_publish.write().unwrap_or_else(|e| e.into_inner()) = unavailable;
    }

    /// Deliver an envelope to every subscriber bound to `exchange`/`routing_key`
    /// without recording it as published. Used to simulate redelivery.
    pub async fn deliver(&self, exchange: &str, routing_key: &str, envelope: EventEnvelope) -> usize {
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .bindings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|b| b.exchange == exchange && routing_key_matches(&b.pattern, routing_key))
            .map(|b| b.handler.clone())
            .collect();

        let delivered = handlers.len();
        for handler in handlers {
            self.run_handler(handler, routing_key, envelope.clone()).await;
        }
        delivered
    }

    async fn run_handler(
        &self,
        handler: Arc<dyn EventHandler>,
        routing_key: &str,
        envelope: EventEnvelope,
    ) {
        if let Err(e) = handler.handle(envelope.clone()).await {
            warn!(routing_key, error = %e, "test bus handler failed, dropping message");
            self.dropped
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .push(DroppedEvent {
                    routing_key: routing_key.to_string(),
                    envelope,
                    error: e.to_string(),
                });
        }
    }

    fn record(&self, exchange: &str, routing_key: &str, envelope: EventEnvelope) {
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(PublishedEvent {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                envelope,
            });
    }

    /// Get all published messages.
    pub fn published(&self) -> Vec<PublishedEvent> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Published messages with the given routing key.
    pub fn published_with_key(&self, routing_key: &str) -> Vec<PublishedEvent> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|p| p.routing_key == routing_key)
            .cloned()
            .collect()
    }

    pub fn count_for(&self, routing_key: &str) -> usize {
        self.published_with_key(routing_key).len()
    }

    /// Routing keys in publish order.
    pub fn routing_keys(&self) -> Vec<String> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|p| p.routing_key.clone())
            .collect()
    }

    pub fn dropped(&self) -> Vec<DroppedEvent> {
        self.dropped
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// `(exchange, pattern)` of every subscription.
    pub fn subscriptions(&self) -> Vec<(String, String)> {
        self.bindings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|b| (b.exchange.clone(), b.pattern.clone()))
            .collect()
    }
}

#[async_trait]
impl BaseEventBus for TestEventBus {
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
        if *self.fail_publish.read().unwrap_or_else(|e| e.into_inner()) {
            anyhow::bail!("event bus unavailable");
        }

        let envelope = EventEnvelope::new(event_type, data, self.service_id.clone());
        debug!(exchange, routing_key, event_type, "test bus publish");
        self.record(exchange, routing_key, envelope.clone());
        self.deliver(exchange, routing_key, envelope).await;
        Ok(())
    }

    async fn subscribe(
        &self,
        exchange: &str,
        routing_key: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        self.bindings
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Binding {
                exchange: exchange.to_string(),
                pattern: routing_key.to_string(),
                handler,
            });
        Ok(())
    }

    async fn send_direct_message(
        &self,
        queue: &str,
        event_type: &str,
        data: Value,
    ) -> Result<()> {
        if *self.fail_publish.read().unwrap_or_else(|e| e.into_inner()) {
            anyhow::bail!("event bus unavailable");
        }

        let envelope = EventEnvelope::new(event_type, data, self.service_id.clone());
        self.record(queue, event_type, envelope.clone());

        // First consumer registered on the queue wins, like a shared durable.
        let consumer = self
            .direct_consumers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|(q, _)| q == queue)
            .map(|(_, h)| h.clone());

        if let Some(handler) = consumer {
            self.run_handler(handler, event_type, envelope).await;
        }
        Ok(())
    }

    async fn consume_direct(&self, queue: &str, handler: Arc<dyn EventHandler>) -> Result<()> {
        self.direct_consumers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((queue.to_string(), handler));
        Ok(())
    }
}
