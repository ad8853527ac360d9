//! Media engine factory boundary

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

use crate::error::EngineError;
use crate::types::ObjectId;

/// Opaque handle to an element instance inside the external media engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineHandle {
    /// Engine-assigned identifier
    pub id: String,
    /// Element type the handle was created for
    pub type_name: String,
}

/// What a factory is told when asked for a new element
#[derive(Debug, Clone)]
pub struct CreateContext {
    pub object_id: ObjectId,
    pub pipeline: ObjectId,
    pub parent: ObjectId,
    pub type_name: String,
    pub properties: serde_json::Value,
}

/// Creates and tears down element instances in the media engine.
///
/// `release` is called exactly once for every handle `create` returned.
#[async_trait]
pub trait ElementFactory: Send + Sync {
    async fn create(&self, ctx: &CreateContext) -> Result<EngineHandle, EngineError>;

    async fn release(&self, handle: EngineHandle) -> Result<(), EngineError>;
}

/// Engine that allocates nothing. Lets the control plane run without a media
/// engine and lets tests count allocations.
#[derive(Debug, Default)]
pub struct NoopEngine {
    next_id: AtomicU64,
    live: AtomicUsize,
    released: AtomicUsize,
    failing: AtomicBool,
}

impl NoopEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `create` calls fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Handles created and not yet released
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Total handles released
    pub fn released_handles(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ElementFactory for NoopEngine {
    async fn create(&self, ctx: &CreateContext) -> Result<EngineHandle, EngineError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError(format!("no capacity for {}", ctx.type_name)));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        debug!("Noop engine created {} #{} for {}", ctx.type_name, id, ctx.object_id);

        Ok(EngineHandle {
            id: format!("noop-{}", id),
            type_name: ctx.type_name.clone(),
        })
    }

    async fn release(&self, handle: EngineHandle) -> Result<(), EngineError> {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
        debug!("Noop engine released {}", handle.id);
        Ok(())
    }
}
