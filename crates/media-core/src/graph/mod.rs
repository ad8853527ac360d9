//! Media object graph
//!
//! Pipelines own elements, mixers own their ports, and every port routes one
//! element of the same pipeline. The graph keeps an id index (`DashMap`) and
//! one `tokio` mutex per object. Locks are taken one at a time, except
//! `create` which holds the parent while locking a port's routed element.
//!
//! Destroy works in two phases. The claim phase walks the subtree top-down
//! and moves each node from `Live` to `Releasing` under its own lock; a node
//! already claimed by a concurrent destroy is left to that caller. The
//! finalize phase tears nodes down dependents-first: ports routing an
//! element, then children, then the node itself.

pub mod object;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use rmedia_infra_common::ServerConfig;

use crate::error::{MediaError, Result};
use crate::events::{Destination, EventDispatcher};
use crate::registry::{CreateContext, ModuleRegistry};
use crate::session::ConnectionManager;
use crate::types::{
    CreateParams, DestroyOutcome, EventType, ObjectCategory, ObjectId, ObjectInfo, ObjectKind, SubscriptionId,
};

pub use object::{Lifecycle, MediaObject};
pub(crate) use object::{NewObject, ObjectState};

/// Limits applied by the graph
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub max_objects: usize,
    pub default_retention: Duration,
    pub tombstone_ttl: Duration,
}

impl From<&ServerConfig> for GraphConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_objects: config.max_objects,
            default_retention: config.default_retention(),
            tombstone_ttl: config.tombstone_ttl(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig::from(&ServerConfig::default())
    }
}

/// Live object counts and lifetime totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub pipelines: usize,
    pub endpoints: usize,
    pub filters: usize,
    pub mixers: usize,
    pub mixer_ports: usize,
    pub created_total: u64,
    pub destroyed_total: u64,
    pub tombstones: usize,
}

impl GraphStats {
    pub fn live(&self) -> usize {
        self.pipelines + self.endpoints + self.filters + self.mixers + self.mixer_ports
    }
}

/// Outcome of a conditional (garbage collector) destroy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectOutcome {
    /// The object and `count` objects in total were destroyed
    Collected(usize),
    /// The predicate kept the object alive
    Retained,
    /// The object is gone or being destroyed by someone else
    Gone,
}

enum Claim {
    Claimed(ClaimedNode),
    /// Already `Releasing` under another caller
    Busy,
    Released,
    Rejected,
}

struct ClaimedNode {
    object: Arc<MediaObject>,
    /// Routing ports first, then children
    dependents: Vec<ObjectId>,
}

/// The ownership tree of pipelines, elements and mixer ports
pub struct MediaGraph {
    config: GraphConfig,
    registry: Arc<ModuleRegistry>,
    dispatcher: Arc<EventDispatcher>,
    connections: Arc<ConnectionManager>,
    objects: DashMap<ObjectId, Arc<MediaObject>>,
    tombstones: DashMap<ObjectId, Instant>,
    /// Live objects plus creations in flight
    reserved: AtomicUsize,
    created_total: AtomicU64,
    destroyed_total: AtomicU64,
}

impl MediaGraph {
    pub fn new(
        config: GraphConfig,
        registry: Arc<ModuleRegistry>,
        dispatcher: Arc<EventDispatcher>,
        connections: Arc<ConnectionManager>,
    ) -> Self {
        Self {
            config,
            registry,
            dispatcher,
            connections,
            objects: DashMap::new(),
            tombstones: DashMap::new(),
            reserved: AtomicUsize::new(0),
            created_total: AtomicU64::new(0),
            destroyed_total: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Create an object of `type_name` under `parent`.
    ///
    /// The object is visible to [`lookup`](Self::lookup) when this returns
    /// and its retention timer has started. A `Created` event is published on
    /// the parent.
    pub async fn create(&self, type_name: &str, parent: Option<ObjectId>, params: CreateParams) -> Result<ObjectId> {
        let resolved = self.registry.resolve(type_name)?;
        let kind = resolved.kind.clone();

        match (&kind, parent) {
            (ObjectKind::Pipeline, Some(p)) => {
                return Err(MediaError::InvalidParent(format!("a pipeline cannot have a parent ({})", p)));
            }
            (ObjectKind::Pipeline, None) => {}
            (_, None) => return Err(MediaError::InvalidParent(format!("{} requires a parent", kind))),
            _ => {}
        }
        match (&kind, params.routed) {
            (ObjectKind::MixerPort, None) => {
                return Err(MediaError::InvalidParameter("a mixer port requires a routed element".to_string()));
            }
            (ObjectKind::MixerPort, Some(_)) => {}
            (_, Some(_)) => {
                return Err(MediaError::InvalidParameter(format!("{} cannot route an element", kind)));
            }
            _ => {}
        }

        self.reserve()?;
        let result = self.create_reserved(resolved, parent, params).await;
        if result.is_err() {
            self.reserved.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }

    async fn create_reserved(
        &self,
        resolved: crate::registry::ResolvedKind,
        parent: Option<ObjectId>,
        params: CreateParams,
    ) -> Result<ObjectId> {
        let id = ObjectId::new();
        let kind = resolved.kind;

        let parent_obj = match parent {
            Some(pid) => {
                let parent_obj = self
                    .objects
                    .get(&pid)
                    .map(|o| o.value().clone())
                    .ok_or_else(|| MediaError::InvalidParent(format!("parent {} not found", pid)))?;
                if !parent_obj.kind.accepts_child(&kind) {
                    return Err(MediaError::InvalidParent(format!(
                        "{} cannot contain {}",
                        parent_obj.kind, kind
                    )));
                }
                if !parent_obj.lock().await.is_live() {
                    return Err(MediaError::InvalidParent(format!("parent {} is being destroyed", pid)));
                }
                Some(parent_obj)
            }
            None => None,
        };
        let pipeline = parent_obj.as_ref().map(|p| p.pipeline).unwrap_or(id);

        let routed_obj = match params.routed {
            Some(rid) => {
                let routed = self
                    .objects
                    .get(&rid)
                    .map(|o| o.value().clone())
                    .ok_or_else(|| MediaError::InvalidParent(format!("routed element {} not found", rid)))?;
                if !routed.kind.is_routable() || routed.pipeline != pipeline {
                    return Err(MediaError::InvalidParent(format!(
                        "{} {} cannot be routed by this mixer",
                        routed.kind, rid
                    )));
                }
                Some(routed)
            }
            None => None,
        };

        let handle = match &resolved.factory {
            Some(factory) => {
                let ctx = CreateContext {
                    object_id: id,
                    pipeline,
                    parent: parent.unwrap_or(id),
                    type_name: kind.type_name().to_string(),
                    properties: params.properties.clone(),
                };
                match factory.create(&ctx).await {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        warn!("Engine refused {} in {}: {}", kind, pipeline, e);
                        return Err(MediaError::ResourceExhausted(e.to_string()));
                    }
                }
            }
            None => None,
        };

        let object = Arc::new(MediaObject::new(NewObject {
            id,
            kind,
            parent,
            pipeline,
            routed: routed_obj.as_ref().map(|r| r.id),
            retention: params.retention.unwrap_or(self.config.default_retention),
            events: resolved.events,
            factory: resolved.factory,
            handle,
            name: params.name,
        }));

        if let Err(e) = self.attach(&object, parent_obj.as_ref(), routed_obj.as_ref()).await {
            self.release_engine(&object).await;
            return Err(e);
        }

        self.created_total.fetch_add(1, Ordering::Relaxed);
        debug!("Created {} {} (parent {:?})", object.kind, id, parent);
        Ok(id)
    }

    /// Link a new object into its parent and the index, rechecking that the
    /// parent (and routed element) survived the engine call
    async fn attach(
        &self,
        object: &Arc<MediaObject>,
        parent: Option<&Arc<MediaObject>>,
        routed: Option<&Arc<MediaObject>>,
    ) -> Result<()> {
        let Some(parent) = parent else {
            self.objects.insert(object.id, object.clone());
            return Ok(());
        };

        let mut parent_state = parent.lock().await;
        if !parent_state.is_live() {
            return Err(MediaError::InvalidParent(format!(
                "parent {} was destroyed during creation",
                parent.id
            )));
        }

        if let Some(routed) = routed {
            let mut routed_state = routed.lock().await;
            if !routed_state.is_live() {
                return Err(MediaError::InvalidParent(format!(
                    "routed element {} was destroyed during creation",
                    routed.id
                )));
            }
            routed_state.routed_by.push(object.id);
        }

        parent_state.children.push(object.id);
        self.objects.insert(object.id, object.clone());
        self.dispatcher.publish(
            parent.id,
            &EventType::Created,
            json!({ "objectId": object.id, "type": object.kind.type_name() }),
        );
        Ok(())
    }

    fn reserve(&self) -> Result<()> {
        let max = self.config.max_objects;
        self.reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .map(|_| ())
            .map_err(|_| MediaError::ResourceExhausted(format!("object limit of {} reached", max)))
    }

    async fn release_engine(&self, object: &MediaObject) {
        let handle = object.lock().await.handle.take();
        if let (Some(handle), Some(factory)) = (handle, &object.factory) {
            if let Err(e) = factory.release(handle).await {
                error!("Engine teardown of {} {} failed: {}", object.kind, object.id, e);
            }
        }
    }

    /// Look up an object. Objects being destroyed stay visible until their
    /// teardown completes.
    pub fn lookup(&self, id: ObjectId) -> Result<Arc<MediaObject>> {
        self.objects
            .get(&id)
            .map(|o| o.value().clone())
            .ok_or_else(|| MediaError::NotFound(format!("object {}", id)))
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Run `f` under the object's lock if it is live
    pub(crate) async fn with_live<R>(
        &self,
        id: ObjectId,
        f: impl FnOnce(&MediaObject, &mut ObjectState) -> Result<R>,
    ) -> Result<R> {
        let object = self.lookup(id)?;
        let mut state = object.lock().await;
        if !state.is_live() {
            return Err(MediaError::NotFound(format!("object {} is being destroyed", id)));
        }
        f(&*object, &mut *state)
    }

    /// Reset the object's inactivity timer
    pub async fn touch(&self, id: ObjectId) -> Result<()> {
        self.with_live(id, |_, state| {
            state.touch();
            Ok(())
        })
        .await
    }

    pub async fn describe(&self, id: ObjectId) -> Result<ObjectInfo> {
        let object = self.lookup(id)?;
        let state = object.lock().await;
        Ok(object.info(&state))
    }

    /// Children in creation order
    pub async fn children(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        let object = self.lookup(id)?;
        let children = object.lock().await.children.clone();
        Ok(children)
    }

    /// Pipelines, oldest first
    pub fn pipelines(&self) -> Vec<ObjectId> {
        let mut roots: Vec<(chrono::DateTime<chrono::Utc>, ObjectId)> = self
            .objects
            .iter()
            .filter(|o| o.kind == ObjectKind::Pipeline)
            .map(|o| (o.created_at, o.id))
            .collect();
        roots.sort();
        roots.into_iter().map(|(_, id)| id).collect()
    }

    pub async fn set_name(&self, id: ObjectId, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.with_live(id, move |_, state| {
            state.name = name;
            state.touch();
            Ok(())
        })
        .await
    }

    pub async fn set_tag(&self, id: ObjectId, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        self.with_live(id, move |_, state| {
            state.tags.insert(key, value);
            state.touch();
            Ok(())
        })
        .await
    }

    /// Remove a tag; returns the previous value
    pub async fn remove_tag(&self, id: ObjectId, key: &str) -> Result<Option<String>> {
        self.with_live(id, |_, state| {
            state.touch();
            Ok(state.tags.remove(key))
        })
        .await
    }

    pub async fn tags(&self, id: ObjectId) -> Result<std::collections::BTreeMap<String, String>> {
        let object = self.lookup(id)?;
        let tags = object.lock().await.tags.clone();
        Ok(tags)
    }

    /// Subscribe `destination` to an event of a live object
    pub async fn subscribe(
        &self,
        id: ObjectId,
        event_type: EventType,
        destination: Destination,
    ) -> Result<SubscriptionId> {
        let dispatcher = self.dispatcher.clone();
        self.with_live(id, move |object, state| {
            if !object.emits(&event_type) {
                return Err(MediaError::UnsupportedEvent {
                    type_name: object.kind.type_name().to_string(),
                    event: event_type.to_string(),
                });
            }
            state.touch();
            Ok(dispatcher.subscribe(object.id, event_type, destination))
        })
        .await
    }

    /// Publish an event of a live object. Events of objects being destroyed
    /// are dropped. Returns the number of notifications queued.
    pub async fn publish(&self, id: ObjectId, event_type: EventType, payload: serde_json::Value) -> Result<usize> {
        let object = self.lookup(id)?;
        let state = object.lock().await;
        if !state.is_live() {
            return Ok(0);
        }
        Ok(self.dispatcher.publish(id, &event_type, payload))
    }

    /// Destroy an object and everything it owns.
    ///
    /// A second destroy racing the first waits for the teardown and returns
    /// [`DestroyOutcome::AlreadyReleased`], as does destroying an id that was
    /// released within the tombstone period.
    pub async fn destroy(&self, id: ObjectId) -> Result<DestroyOutcome> {
        let Some(object) = self.objects.get(&id).map(|o| o.value().clone()) else {
            if self.tombstones.contains_key(&id) {
                return Ok(DestroyOutcome::AlreadyReleased);
            }
            return Err(MediaError::NotFound(format!("object {}", id)));
        };

        match self.claim(&object, |_, _| true).await {
            Claim::Claimed(node) => {
                let count = self.cascade(node).await;
                Ok(DestroyOutcome::Destroyed { count })
            }
            Claim::Busy | Claim::Released => {
                object.wait_released().await;
                Ok(DestroyOutcome::AlreadyReleased)
            }
            Claim::Rejected => Err(MediaError::InvalidState(format!("object {} could not be claimed", id))),
        }
    }

    /// Destroy the object if `predicate` holds, evaluated under the object's
    /// lock together with the claim
    pub(crate) async fn destroy_if(
        &self,
        id: ObjectId,
        predicate: impl FnOnce(&MediaObject, &ObjectState) -> bool,
    ) -> CollectOutcome {
        let Some(object) = self.objects.get(&id).map(|o| o.value().clone()) else {
            return CollectOutcome::Gone;
        };

        match self.claim(&object, predicate).await {
            Claim::Claimed(node) => CollectOutcome::Collected(self.cascade(node).await),
            Claim::Rejected => CollectOutcome::Retained,
            Claim::Busy | Claim::Released => CollectOutcome::Gone,
        }
    }

    async fn claim(
        &self,
        object: &Arc<MediaObject>,
        predicate: impl FnOnce(&MediaObject, &ObjectState) -> bool,
    ) -> Claim {
        let mut state = object.lock().await;
        let lifecycle = state.lifecycle;
        match lifecycle {
            Lifecycle::Releasing => Claim::Busy,
            Lifecycle::Released => Claim::Released,
            Lifecycle::Live => {
                if !predicate(&**object, &*state) {
                    return Claim::Rejected;
                }
                state.lifecycle = Lifecycle::Releasing;
                let dependents = state.routed_by.iter().chain(state.children.iter()).copied().collect();
                Claim::Claimed(ClaimedNode {
                    object: object.clone(),
                    dependents,
                })
            }
        }
    }

    /// Claim the rest of the subtree, then finalize dependents-first.
    /// Returns the number of objects this call released.
    async fn cascade(&self, root: ClaimedNode) -> usize {
        let root_id = root.object.id;
        let mut claimed: HashMap<ObjectId, ClaimedNode> = HashMap::new();
        let mut foreign: HashMap<ObjectId, Arc<MediaObject>> = HashMap::new();
        let mut pending = vec![root_id];
        claimed.insert(root_id, root);

        while let Some(id) = pending.pop() {
            let dependents = claimed.get(&id).map(|n| n.dependents.clone()).unwrap_or_default();
            for dep in dependents {
                if claimed.contains_key(&dep) || foreign.contains_key(&dep) {
                    continue;
                }
                let Some(object) = self.objects.get(&dep).map(|o| o.value().clone()) else {
                    continue;
                };
                match self.claim(&object, |_, _| true).await {
                    Claim::Claimed(node) => {
                        claimed.insert(dep, node);
                        pending.push(dep);
                    }
                    Claim::Busy => {
                        foreign.insert(dep, object);
                    }
                    Claim::Released | Claim::Rejected => {}
                }
            }
        }

        let order = finalize_order(root_id, &claimed);
        let count = order.len();
        for id in order {
            let Some(node) = claimed.remove(&id) else {
                continue;
            };
            for dep in &node.dependents {
                if let Some(other) = foreign.get(dep) {
                    other.wait_released().await;
                }
            }
            self.finalize(node.object).await;
        }
        count
    }

    async fn finalize(&self, object: Arc<MediaObject>) {
        let id = object.id;

        self.dispatcher.publish_final(
            id,
            json!({ "objectId": id, "type": object.kind.type_name(), "parent": object.parent }),
        );
        if matches!(object.kind, ObjectKind::Endpoint(_)) {
            self.connections.release_object(id);
        }
        self.release_engine(&object).await;

        {
            let mut state = object.lock().await;
            state.lifecycle = Lifecycle::Released;
            state.children.clear();
            state.routed_by.clear();
        }

        // Tombstone first: a racing destroy must find the id in one of the maps
        self.tombstones.insert(id, Instant::now());
        self.objects.remove(&id);

        if let Some(parent) = object.parent.and_then(|p| self.objects.get(&p).map(|o| o.value().clone())) {
            parent.lock().await.children.retain(|c| *c != id);
        }
        if let Some(routed) = object.routed.and_then(|r| self.objects.get(&r).map(|o| o.value().clone())) {
            routed.lock().await.routed_by.retain(|p| *p != id);
        }

        self.reserved.fetch_sub(1, Ordering::SeqCst);
        self.destroyed_total.fetch_add(1, Ordering::Relaxed);
        object.mark_released();
        debug!("Destroyed {} {}", object.kind, id);
    }

    /// Forget tombstones older than the configured period
    pub fn prune_tombstones(&self) -> usize {
        let ttl = self.config.tombstone_ttl;
        let now = Instant::now();
        let before = self.tombstones.len();
        self.tombstones.retain(|_, at| now.saturating_duration_since(*at) < ttl);
        before.saturating_sub(self.tombstones.len())
    }

    /// Whether the id was released within the tombstone period
    pub fn is_tombstoned(&self, id: ObjectId) -> bool {
        self.tombstones.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            created_total: self.created_total.load(Ordering::Relaxed),
            destroyed_total: self.destroyed_total.load(Ordering::Relaxed),
            tombstones: self.tombstones.len(),
            ..GraphStats::default()
        };
        for object in self.objects.iter() {
            match object.kind.category() {
                ObjectCategory::Pipeline => stats.pipelines += 1,
                ObjectCategory::Endpoint => stats.endpoints += 1,
                ObjectCategory::Filter => stats.filters += 1,
                ObjectCategory::Mixer => stats.mixers += 1,
                ObjectCategory::MixerPort => stats.mixer_ports += 1,
            }
        }
        stats
    }
}

/// Post-order over claimed nodes: every node comes after all of its
/// claimed dependents. A port reachable from both its mixer and its routed
/// element is emitted once, before either.
fn finalize_order(root: ObjectId, claimed: &HashMap<ObjectId, ClaimedNode>) -> Vec<ObjectId> {
    fn visit(
        id: ObjectId,
        claimed: &HashMap<ObjectId, ClaimedNode>,
        visited: &mut HashSet<ObjectId>,
        out: &mut Vec<ObjectId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        let Some(node) = claimed.get(&id) else {
            return;
        };
        for dep in &node.dependents {
            if claimed.contains_key(dep) {
                visit(*dep, claimed, visited, out);
            }
        }
        out.push(id);
    }

    let mut visited = HashSet::new();
    let mut out = Vec::with_capacity(claimed.len());
    visit(root, claimed, &mut visited, &mut out);
    out
}
