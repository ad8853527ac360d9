//! Garbage collector for idle media objects
//!
//! An object is collectable when it has been idle longer than its retention
//! period, owns no children, is routed by no mixer port, and has neither an
//! open connection nor a subscription. Sweeps visit children before their
//! parents, so a subtree whose leaves are collected can be collected in the
//! same sweep while a parent with a surviving child is kept.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use rmedia_infra_common::{TaskManager, TaskPriority};

use crate::error::Result;
use crate::events::EventDispatcher;
use crate::graph::{CollectOutcome, MediaGraph};
use crate::session::ConnectionManager;
use crate::types::ObjectId;

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Objects examined
    pub scanned: usize,
    /// Objects destroyed by this sweep, oldest subtree first
    pub collected: Vec<ObjectId>,
    /// Objects kept alive
    pub retained: usize,
    /// Expired tombstones forgotten
    pub tombstones_pruned: usize,
}

/// Periodic sweeper over the media graph
pub struct GarbageCollector {
    graph: Arc<MediaGraph>,
    connections: Arc<ConnectionManager>,
    dispatcher: Arc<EventDispatcher>,
    interval: Duration,
}

impl GarbageCollector {
    pub fn new(
        graph: Arc<MediaGraph>,
        connections: Arc<ConnectionManager>,
        dispatcher: Arc<EventDispatcher>,
        interval: Duration,
    ) -> Self {
        Self {
            graph,
            connections,
            dispatcher,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep now
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for pipeline in self.graph.pipelines() {
            for id in self.post_order(pipeline).await {
                report.scanned += 1;
                let now = Instant::now();
                let connections = &self.connections;
                let dispatcher = &self.dispatcher;

                let outcome = self
                    .graph
                    .destroy_if(id, |object, state| {
                        state.idle_for(now) > object.retention
                            && state.children.is_empty()
                            && state.routed_by.is_empty()
                            && !connections.has_active(object.id)
                            && !dispatcher.has_subscriptions(object.id)
                    })
                    .await;

                match outcome {
                    CollectOutcome::Collected(_) => report.collected.push(id),
                    CollectOutcome::Retained => report.retained += 1,
                    CollectOutcome::Gone => {}
                }
            }
        }

        report.tombstones_pruned = self.graph.prune_tombstones();
        if !report.collected.is_empty() {
            info!(
                "GC collected {} of {} objects ({} retained)",
                report.collected.len(),
                report.scanned,
                report.retained
            );
        } else {
            debug!("GC sweep scanned {} objects, nothing collected", report.scanned);
        }
        report
    }

    /// Snapshot of a subtree, children before parents
    async fn post_order(&self, root: ObjectId) -> Vec<ObjectId> {
        let mut stack = vec![(root, false)];
        let mut out = Vec::new();

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                out.push(id);
                continue;
            }
            stack.push((id, true));
            if let Ok(children) = self.graph.children(id).await {
                for child in children.into_iter().rev() {
                    stack.push((child, false));
                }
            }
        }
        out
    }

    /// Sweep on a fixed tick as a tracked task
    pub async fn spawn(self: Arc<Self>, tasks: &TaskManager) -> Result<usize> {
        let interval = self.interval;
        let gc = self;
        let id = tasks
            .spawn_tracked("media-gc", TaskPriority::Low, async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    gc.sweep().await;
                }
            })
            .await?;
        debug!("Garbage collector running every {:?}", interval);
        Ok(id)
    }
}
