//! Kernel module - server infrastructure and dependencies.

pub mod catalog_client;
pub mod deps;
pub mod event_bus;
pub mod nats_bus;
pub mod order_directory;
pub mod service_client;
pub mod test_dependencies;
pub mod tracking_hub;
pub mod traits;

pub use catalog_client::HttpCatalog;
pub use deps::{DroneServiceDeps, OrderServiceDeps};
pub use event_bus::{
    handler_fn, BaseEventBus, DroppedEvent, EventEnvelope, EventHandler, PublishedEvent,
    TestEventBus,
};
pub use nats_bus::NatsEventBus;
pub use order_directory::HttpOrderDirectory;
pub use service_client::{ServiceClient, ServiceClientError};
pub use test_dependencies::{CatalogFailure, MockCatalog, StoreOrderDirectory, TestDependencies};
pub use tracking_hub::TrackingHub;
pub use traits::*;
