//! Media server coordinator
//!
//! Wires the registry, graph, connection manager, event dispatcher and
//! garbage collector together and owns the background tasks.

use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, Instrument, Level};

use rmedia_infra_common::{ErrorExt, LogContext, ServerConfig, TaskManager};
use rmedia_sdp_core::CapabilityDescription;

use crate::error::{MediaError, Result};
use crate::events::{DispatchStats, Destination, EventDispatcher, EventSink, Subscription};
use crate::gc::{GarbageCollector, SweepReport};
use crate::graph::{GraphConfig, GraphStats, MediaGraph, MediaObject};
use crate::registry::{ModuleRegistry, NoopEngine};
use crate::session::{ConnectionInfo, ConnectionManager, NegotiationOutcome, Role};
use crate::types::{
    ConnectionId, CreateParams, DestroyOutcome, EventType, ObjectId, ObjectInfo, ObjectKind, SubscriptionId,
    PIPELINE_TYPE,
};

const STATE_CREATED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Counters across all components
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    pub objects: GraphStats,
    pub dispatch: DispatchStats,
    pub connections: usize,
    pub active_connections: usize,
    pub background_tasks: usize,
}

/// Control plane entry point
pub struct MediaServer {
    config: ServerConfig,
    registry: Arc<ModuleRegistry>,
    graph: Arc<MediaGraph>,
    connections: Arc<ConnectionManager>,
    dispatcher: Arc<EventDispatcher>,
    gc: Arc<GarbageCollector>,
    tasks: TaskManager,
    state: AtomicU8,
}

impl MediaServer {
    pub fn new(config: ServerConfig, registry: Arc<ModuleRegistry>, sink: Arc<dyn EventSink>) -> Self {
        let dispatcher = Arc::new(EventDispatcher::new(&config.dispatch, sink));
        let connections = Arc::new(ConnectionManager::new());
        let graph = Arc::new(MediaGraph::new(
            GraphConfig::from(&config),
            registry.clone(),
            dispatcher.clone(),
            connections.clone(),
        ));
        let gc = Arc::new(GarbageCollector::new(
            graph.clone(),
            connections.clone(),
            dispatcher.clone(),
            config.gc_interval(),
        ));

        Self {
            config,
            registry,
            graph,
            connections,
            dispatcher,
            gc,
            tasks: TaskManager::new("media-server"),
            state: AtomicU8::new(STATE_CREATED),
        }
    }

    /// Server with the built-in element catalog on a [`NoopEngine`]
    pub fn with_builtins(config: ServerConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        let registry = Arc::new(ModuleRegistry::with_builtins(Arc::new(NoopEngine::new()))?);
        Ok(Self::new(config, registry, sink))
    }

    /// Start the delivery workers and the garbage collector
    pub async fn start(&self) -> Result<()> {
        if self
            .state
            .compare_exchange(STATE_CREATED, STATE_RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(MediaError::InvalidState("media server already started".to_string()));
        }

        let span = LogContext::with_operation("media-server", "start").span(Level::INFO);
        async {
            let workers = self
                .dispatcher
                .start(&self.tasks)
                .await
                .with_context("media-server", "start delivery workers")?;
            self.gc.clone().spawn(&self.tasks).await?;
            info!(
                "Media server started: {} delivery workers, GC every {:?}, {} element types",
                workers,
                self.gc.interval(),
                self.registry.type_names().len()
            );
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Stop background tasks and shut the registry down. Live objects are
    /// left in place.
    pub async fn shutdown(&self) -> Result<()> {
        if self.state.swap(STATE_STOPPED, Ordering::SeqCst) == STATE_STOPPED {
            return Ok(());
        }
        self.registry.shutdown();
        self.tasks.shutdown_all().await?;
        info!("Media server stopped with {} live objects", self.graph.len());
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_RUNNING
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn graph(&self) -> &Arc<MediaGraph> {
        &self.graph
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    // Object graph

    pub async fn create(&self, type_name: &str, parent: Option<ObjectId>, params: CreateParams) -> Result<ObjectId> {
        let id = self.graph.create(type_name, parent, params).await?;
        if let Some(parent) = parent {
            // Creating a child counts as use of the container
            let _ = self.graph.touch(parent).await;
        }
        Ok(id)
    }

    pub async fn create_pipeline(&self, params: CreateParams) -> Result<ObjectId> {
        self.graph.create(PIPELINE_TYPE, None, params).await
    }

    pub fn lookup(&self, id: ObjectId) -> Result<Arc<MediaObject>> {
        self.graph.lookup(id)
    }

    /// Snapshot of the object. Client reads count as use, so the object is
    /// touched after the snapshot is taken.
    pub async fn describe(&self, id: ObjectId) -> Result<ObjectInfo> {
        let info = self.graph.describe(id).await?;
        let _ = self.graph.touch(id).await;
        Ok(info)
    }

    pub async fn children(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        let children = self.graph.children(id).await?;
        let _ = self.graph.touch(id).await;
        Ok(children)
    }

    pub fn pipelines(&self) -> Vec<ObjectId> {
        self.graph.pipelines()
    }

    pub async fn destroy(&self, id: ObjectId) -> Result<DestroyOutcome> {
        let outcome = self.graph.destroy(id).await?;
        debug!("destroy({}) -> {:?}", id, outcome);
        Ok(outcome)
    }

    pub async fn touch(&self, id: ObjectId) -> Result<()> {
        self.graph.touch(id).await
    }

    pub async fn set_name(&self, id: ObjectId, name: impl Into<String>) -> Result<()> {
        self.graph.set_name(id, name).await
    }

    pub async fn set_tag(&self, id: ObjectId, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.graph.set_tag(id, key, value).await
    }

    pub async fn remove_tag(&self, id: ObjectId, key: &str) -> Result<Option<String>> {
        self.graph.remove_tag(id, key).await
    }

    pub async fn tags(&self, id: ObjectId) -> Result<std::collections::BTreeMap<String, String>> {
        let tags = self.graph.tags(id).await?;
        let _ = self.graph.touch(id).await;
        Ok(tags)
    }

    // Events

    pub async fn subscribe(
        &self,
        id: ObjectId,
        event_type: EventType,
        destination: Destination,
    ) -> Result<SubscriptionId> {
        self.graph.subscribe(id, event_type, destination).await
    }

    /// Idempotent; returns whether a subscription was removed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    pub fn subscription(&self, id: SubscriptionId) -> Option<Subscription> {
        self.dispatcher.subscription(id)
    }

    /// Drop every subscription of a client session that went away
    pub fn release_destination(&self, destination: &Destination) -> usize {
        self.dispatcher.release_destination(destination)
    }

    /// Signal from the media engine (end of stream, faults, custom signals)
    pub async fn publish(&self, id: ObjectId, event_type: EventType, payload: serde_json::Value) -> Result<usize> {
        self.graph.publish(id, event_type, payload).await
    }

    // Connections

    /// Open a connection on a live endpoint
    pub async fn create_connection(&self, endpoint: ObjectId, role: Role) -> Result<ConnectionId> {
        let connections = self.connections.clone();
        self.graph
            .with_live(endpoint, move |object, state| {
                if !matches!(object.kind, ObjectKind::Endpoint(_)) {
                    return Err(MediaError::InvalidParent(format!(
                        "{} {} cannot hold connections",
                        object.kind, object.id
                    )));
                }
                state.touch();
                Ok(connections.create(object.id, role))
            })
            .await
    }

    pub async fn set_local_spec(&self, connection: ConnectionId, spec: CapabilityDescription) -> Result<()> {
        let endpoint = self.connections.endpoint_of(connection)?;
        self.connections.set_local_spec(connection, spec)?;
        let _ = self.graph.touch(endpoint).await;
        Ok(())
    }

    /// Negotiate and, unless the result was cached or superseded, publish
    /// `Negotiated` on the endpoint
    pub async fn negotiate(&self, connection: ConnectionId, remote: CapabilityDescription) -> Result<NegotiationOutcome> {
        let outcome = self.connections.negotiate(connection, remote)?;
        let _ = self.graph.touch(outcome.endpoint).await;

        if !outcome.cached && !outcome.superseded {
            let payload = json!({
                "connectionId": connection,
                "result": outcome.session.result,
            });
            self.graph.publish(outcome.endpoint, EventType::Negotiated, payload).await.ok();
        }
        Ok(outcome)
    }

    pub async fn close_connection(&self, connection: ConnectionId) -> Result<()> {
        let endpoint = self.connections.endpoint_of(connection)?;
        self.connections.close(connection)?;
        let _ = self.graph.touch(endpoint).await;
        Ok(())
    }

    pub fn connection_info(&self, connection: ConnectionId) -> Result<ConnectionInfo> {
        self.connections.info(connection)
    }

    pub fn connections_for(&self, endpoint: ObjectId) -> Vec<ConnectionId> {
        self.connections.connections_for(endpoint)
    }

    // Housekeeping

    /// Run one garbage collector sweep now
    pub async fn sweep(&self) -> SweepReport {
        self.gc.sweep().await
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            objects: self.graph.stats(),
            dispatch: self.dispatcher.stats(),
            connections: self.connections.len(),
            active_connections: self.connections.active_count(),
            background_tasks: self.tasks.active_task_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::events::EventNotification;
    use crate::session::ConnectionState;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rmedia_sdp_core::{MediaDescriptor, PayloadDescriptor};
    use std::time::Duration;

    #[derive(Default)]
    struct CollectingSink {
        seen: Mutex<Vec<(Destination, EventNotification)>>,
    }

    #[async_trait]
    impl EventSink for CollectingSink {
        async fn deliver(
            &self,
            destination: &Destination,
            notification: &EventNotification,
        ) -> std::result::Result<(), DeliveryError> {
            self.seen.lock().push((destination.clone(), notification.clone()));
            Ok(())
        }
    }

    impl CollectingSink {
        async fn wait_for(&self, count: usize) -> Vec<(Destination, EventNotification)> {
            for _ in 0..200 {
                if self.seen.lock().len() >= count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            self.seen.lock().clone()
        }
    }

    fn server() -> (MediaServer, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        let server = MediaServer::with_builtins(ServerConfig::default(), sink.clone()).unwrap();
        (server, sink)
    }

    fn audio(names: &[(&str, u32)]) -> CapabilityDescription {
        CapabilityDescription::new(vec![MediaDescriptor::audio(
            names
                .iter()
                .enumerate()
                .map(|(i, (n, r))| PayloadDescriptor::new(*n, *r).with_rank(i as u32))
                .collect(),
        )])
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (server, _) = server();
        server.start().await.unwrap();
        assert!(server.is_running());
        assert!(matches!(server.start().await, Err(MediaError::InvalidState(_))));
        server.shutdown().await.unwrap();
        assert!(!server.is_running());
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_requires_endpoint() {
        let (server, _) = server();
        let pipeline = server.create_pipeline(CreateParams::default()).await.unwrap();
        let filter = server.create("ZBarFilter", Some(pipeline), CreateParams::default()).await.unwrap();

        let err = server.create_connection(filter, Role::Answerer).await.unwrap_err();
        assert!(matches!(err, MediaError::InvalidParent(_)));
        let err = server.create_connection(ObjectId::new(), Role::Answerer).await.unwrap_err();
        assert!(matches!(err, MediaError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_negotiate_publishes_once() {
        let (server, sink) = server();
        server.start().await.unwrap();

        let pipeline = server.create_pipeline(CreateParams::default()).await.unwrap();
        let endpoint = server.create("RtpEndpoint", Some(pipeline), CreateParams::default()).await.unwrap();
        server
            .subscribe(endpoint, EventType::Negotiated, Destination::from("client"))
            .await
            .unwrap();

        let conn = server.create_connection(endpoint, Role::Answerer).await.unwrap();
        server.set_local_spec(conn, audio(&[("PCMU", 8000)])).await.unwrap();

        let offer = audio(&[("opus", 48000), ("PCMU", 8000)]);
        let first = server.negotiate(conn, offer.clone()).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.session.result.media[0].payloads[0].encoding_name, "PCMU");

        let second = server.negotiate(conn, offer).await.unwrap();
        assert!(second.cached);

        let seen = sink.wait_for(1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.len(), 1);
        assert_eq!(sink.seen.lock().len(), 1);
        assert_eq!(seen[0].1.event_type, EventType::Negotiated);
        assert_eq!(seen[0].1.object_id, endpoint);

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_operations() {
        let (server, _) = server();
        let pipeline = server.create_pipeline(CreateParams::default()).await.unwrap();
        let endpoint = server.create("WebRtcEndpoint", Some(pipeline), CreateParams::default()).await.unwrap();
        let conn = server.create_connection(endpoint, Role::Offerer).await.unwrap();

        server.close_connection(conn).await.unwrap();
        assert!(matches!(
            server.close_connection(conn).await,
            Err(MediaError::InvalidState(_))
        ));
        assert!(matches!(
            server.set_local_spec(conn, audio(&[("PCMU", 8000)])).await,
            Err(MediaError::InvalidState(_))
        ));
        assert!(matches!(
            server.negotiate(conn, audio(&[("PCMU", 8000)])).await,
            Err(MediaError::InvalidState(_))
        ));
        assert_eq!(server.connection_info(conn).unwrap().state, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_stats_follow_graph() {
        let (server, _) = server();
        let pipeline = server.create_pipeline(CreateParams::default()).await.unwrap();
        let endpoint = server.create("PlayerEndpoint", Some(pipeline), CreateParams::default()).await.unwrap();
        server.create_connection(endpoint, Role::Offerer).await.unwrap();

        let stats = server.stats();
        assert_eq!(stats.objects.pipelines, 1);
        assert_eq!(stats.objects.endpoints, 1);
        assert_eq!(stats.active_connections, 1);

        server.destroy(pipeline).await.unwrap();
        let stats = server.stats();
        assert_eq!(stats.objects.live(), 0);
        assert_eq!(stats.connections, 0);
        assert_eq!(stats.objects.destroyed_total, 2);
    }
}
