//! Element type registry
//!
//! The registry maps element type names to their category, the custom
//! signals they emit and the factory that allocates them in the media
//! engine. It is created once per process, shared by `Arc` and shut down
//! explicitly; after shutdown no new elements can be created.

pub mod builtin;
pub mod factory;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{MediaError, Result};
use crate::types::{EventType, ObjectKind, MIXER_PORT_TYPE, PIPELINE_TYPE};

pub use factory::{CreateContext, ElementFactory, EngineHandle, NoopEngine};

/// Category of a registered element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementCategory {
    Endpoint,
    Filter,
    Mixer,
}

/// Registration entry for one element type
#[derive(Clone)]
pub struct ElementDescriptor {
    pub type_name: String,
    pub category: ElementCategory,
    /// Signals emitted in addition to the category's built-in events
    pub custom_events: Vec<String>,
    pub factory: Arc<dyn ElementFactory>,
}

impl ElementDescriptor {
    pub fn new(type_name: impl Into<String>, category: ElementCategory, factory: Arc<dyn ElementFactory>) -> Self {
        Self {
            type_name: type_name.into(),
            category,
            custom_events: Vec::new(),
            factory,
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.custom_events.push(event.into());
        self
    }

    /// Object kind for instances of this type
    pub fn kind(&self) -> ObjectKind {
        match self.category {
            ElementCategory::Endpoint => ObjectKind::Endpoint(self.type_name.clone()),
            ElementCategory::Filter => ObjectKind::Filter(self.type_name.clone()),
            ElementCategory::Mixer => ObjectKind::Mixer(self.type_name.clone()),
        }
    }

    /// Built-in plus custom events emitted by instances of this type
    pub fn events(&self) -> Vec<EventType> {
        let mut events = self.kind().builtin_events().to_vec();
        events.extend(self.custom_events.iter().map(|e| EventType::Custom(e.clone())));
        events
    }
}

impl fmt::Debug for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementDescriptor")
            .field("type_name", &self.type_name)
            .field("category", &self.category)
            .field("custom_events", &self.custom_events)
            .finish()
    }
}

/// What the graph needs to build an object of a given type
#[derive(Debug, Clone)]
pub struct ResolvedKind {
    pub kind: ObjectKind,
    pub events: Vec<EventType>,
    pub factory: Option<Arc<dyn ElementFactory>>,
}

impl fmt::Debug for dyn ElementFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ElementFactory")
    }
}

/// Process-scoped registry of element types
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    descriptors: DashMap<String, ElementDescriptor>,
    shut_down: AtomicBool,
}

impl ModuleRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in catalog backed by `factory`
    pub fn with_builtins(factory: Arc<dyn ElementFactory>) -> Result<Self> {
        let registry = Self::new();
        for descriptor in builtin::catalog(factory) {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Register an element type. Names are unique and may not shadow the
    /// pipeline or port types.
    pub fn register(&self, descriptor: ElementDescriptor) -> Result<()> {
        self.ensure_running()?;

        let name = descriptor.type_name.clone();
        if name == PIPELINE_TYPE || name == MIXER_PORT_TYPE {
            return Err(MediaError::InvalidParameter(format!("{} is a reserved type name", name)));
        }
        if self.descriptors.contains_key(&name) {
            return Err(MediaError::InvalidParameter(format!("{} is already registered", name)));
        }

        debug!("Registered element type {} ({:?})", name, descriptor.category);
        self.descriptors.insert(name, descriptor);
        Ok(())
    }

    /// Look up a registered element type
    pub fn descriptor(&self, type_name: &str) -> Result<ElementDescriptor> {
        self.descriptors
            .get(type_name)
            .map(|d| d.value().clone())
            .ok_or_else(|| MediaError::UnsupportedKind(type_name.to_string()))
    }

    /// Resolve a type name, including the pipeline and port types, for creation
    pub fn resolve(&self, type_name: &str) -> Result<ResolvedKind> {
        self.ensure_running()?;

        match type_name {
            PIPELINE_TYPE => Ok(ResolvedKind {
                kind: ObjectKind::Pipeline,
                events: ObjectKind::Pipeline.builtin_events().to_vec(),
                factory: None,
            }),
            MIXER_PORT_TYPE => Ok(ResolvedKind {
                kind: ObjectKind::MixerPort,
                events: ObjectKind::MixerPort.builtin_events().to_vec(),
                factory: None,
            }),
            name => {
                let descriptor = self.descriptor(name)?;
                Ok(ResolvedKind {
                    kind: descriptor.kind(),
                    events: descriptor.events(),
                    factory: Some(descriptor.factory),
                })
            }
        }
    }

    /// Registered element type names, sorted
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.descriptors.iter().map(|d| d.key().clone()).collect();
        names.sort();
        names
    }

    /// Factory used to release a handle of `type_name`
    pub fn factory(&self, type_name: &str) -> Option<Arc<dyn ElementFactory>> {
        self.descriptors.get(type_name).map(|d| d.factory.clone())
    }

    /// Stop accepting registrations and creations
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            info!("Module registry shut down with {} element types", self.descriptors.len());
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(MediaError::InvalidState("module registry is shut down".to_string()));
        }
        Ok(())
    }
}
