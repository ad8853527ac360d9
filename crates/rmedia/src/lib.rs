//! # rmedia
//!
//! Control plane of a media server: a graph of pipelines, endpoints, filters
//! and mixers; offer/answer capability negotiation; asynchronous event
//! delivery; retention based garbage collection; and a request facade for
//! remote clients.
//!
//! This crate re-exports the member crates and offers [`ControlPlane`], which
//! wires a [`MediaServer`](media_core::MediaServer) to an
//! [`RpcFacade`](rpc_core::RpcFacade) the way a transport needs them.
//!
//! ```rust,no_run
//! use rmedia::prelude::*;
//! use rmedia::infra_common::ServerConfig;
//!
//! # async fn run() -> Result<()> {
//! let plane = ControlPlane::start(ServerConfig::from_env()?).await?;
//! let (session, mut events) = plane.facade().open_session(64);
//!
//! let response = plane.facade().handle(&session, RpcRequest::new("ping")).await;
//! assert!(response.is_success());
//!
//! plane.facade().close_session(&session);
//! plane.shutdown().await?;
//! # drop(events.try_recv());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub use rmedia_infra_common as infra_common;
pub use rmedia_media_core as media_core;
pub use rmedia_rpc_core as rpc_core;
pub use rmedia_sdp_core as sdp_core;

use rmedia_infra_common::logging::log_welcome;
use rmedia_infra_common::ServerConfig;
use rmedia_media_core::{MediaServer, ModuleRegistry, NoopEngine, Result};
use rmedia_rpc_core::{RpcFacade, SessionEventSink, SessionRegistry};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A started media server with its client facade
pub struct ControlPlane {
    server: Arc<MediaServer>,
    facade: RpcFacade,
}

impl ControlPlane {
    /// Start with the built-in element catalog on a noop engine
    pub async fn start(config: ServerConfig) -> Result<Self> {
        let registry = Arc::new(ModuleRegistry::with_builtins(Arc::new(NoopEngine::new()))?);
        Self::start_with_registry(config, registry).await
    }

    /// Start with a caller-populated registry
    pub async fn start_with_registry(config: ServerConfig, registry: Arc<ModuleRegistry>) -> Result<Self> {
        log_welcome("rmedia", VERSION);

        let sessions = Arc::new(SessionRegistry::new());
        let sink = Arc::new(SessionEventSink::new(sessions.clone()));
        let server = Arc::new(MediaServer::new(config, registry, sink));
        server.start().await?;

        let facade = RpcFacade::new(server.clone(), sessions);
        Ok(Self { server, facade })
    }

    pub fn server(&self) -> &Arc<MediaServer> {
        &self.server
    }

    pub fn facade(&self) -> &RpcFacade {
        &self.facade
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.server.shutdown().await
    }
}

/// Common imports for rmedia applications
pub mod prelude {
    pub use crate::ControlPlane;
    pub use rmedia_media_core::prelude::*;
    pub use rmedia_rpc_core::prelude::*;
    pub use rmedia_sdp_core::prelude::*;
}
