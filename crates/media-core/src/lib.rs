//! # rmedia media-core
//!
//! The control plane of the rmedia media server.
//!
//! - [`registry`]: element types the server can instantiate and their engine factories
//! - [`graph`]: pipelines, elements and mixer ports with cascading destroy
//! - [`session`]: connections on endpoints and their negotiated sessions
//! - [`events`]: subscriptions and asynchronous event delivery
//! - [`gc`]: retention based collection of idle objects
//! - [`server`]: the [`MediaServer`] coordinator tying them together
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use rmedia_infra_common::ServerConfig;
//! use rmedia_media_core::prelude::*;
//!
//! struct LogSink;
//!
//! #[async_trait]
//! impl EventSink for LogSink {
//!     async fn deliver(&self, to: &Destination, event: &EventNotification) -> std::result::Result<(), DeliveryError> {
//!         println!("{} <- {}", to, event.event_type);
//!         Ok(())
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let server = MediaServer::with_builtins(ServerConfig::default(), Arc::new(LogSink))?;
//! server.start().await?;
//!
//! let pipeline = server.create_pipeline(CreateParams::default()).await?;
//! let endpoint = server.create("WebRtcEndpoint", Some(pipeline), CreateParams::default()).await?;
//! server.subscribe(endpoint, EventType::Destroyed, "session-1".into()).await?;
//!
//! server.destroy(pipeline).await?;
//! server.shutdown().await?;
//! # Ok::<(), MediaError>(())
//! # }).unwrap();
//! ```

pub mod error;
pub mod events;
pub mod gc;
pub mod graph;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

pub use error::{DeliveryError, EngineError, MediaError, Result};
pub use events::{Destination, DispatchStats, EventDispatcher, EventNotification, EventSink, Subscription};
pub use gc::{GarbageCollector, SweepReport};
pub use graph::{GraphConfig, GraphStats, Lifecycle, MediaGraph, MediaObject};
pub use registry::{
    CreateContext, ElementCategory, ElementDescriptor, ElementFactory, EngineHandle, ModuleRegistry, NoopEngine,
};
pub use server::{MediaServer, ServerStats};
pub use session::{ConnectionInfo, ConnectionManager, ConnectionState, NegotiationOutcome, Role};
pub use types::{
    ConnectionId, CreateParams, DestroyOutcome, EventType, ObjectCategory, ObjectId, ObjectInfo, ObjectKind,
    SubscriptionId, MIXER_PORT_TYPE, PIPELINE_TYPE,
};

/// Commonly used items
pub mod prelude {
    pub use crate::error::{DeliveryError, MediaError, Result};
    pub use crate::events::{Destination, EventNotification, EventSink};
    pub use crate::registry::{ElementCategory, ElementDescriptor, ElementFactory, ModuleRegistry, NoopEngine};
    pub use crate::server::MediaServer;
    pub use crate::session::{ConnectionState, Role};
    pub use crate::types::{
        ConnectionId, CreateParams, DestroyOutcome, EventType, ObjectId, ObjectInfo, SubscriptionId,
    };
}
