//! Built-in element catalog

use std::sync::Arc;

use super::{ElementCategory, ElementDescriptor, ElementFactory};

/// Element types available without loading extra modules, all backed by
/// `factory`
pub fn catalog(factory: Arc<dyn ElementFactory>) -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::new("WebRtcEndpoint", ElementCategory::Endpoint, factory.clone())
            .with_event("IceCandidateFound")
            .with_event("IceGatheringDone"),
        ElementDescriptor::new("RtpEndpoint", ElementCategory::Endpoint, factory.clone()),
        ElementDescriptor::new("PlayerEndpoint", ElementCategory::Endpoint, factory.clone()),
        ElementDescriptor::new("RecorderEndpoint", ElementCategory::Endpoint, factory.clone())
            .with_event("Recording")
            .with_event("Stopped"),
        ElementDescriptor::new("GStreamerFilter", ElementCategory::Filter, factory.clone()),
        ElementDescriptor::new("ZBarFilter", ElementCategory::Filter, factory.clone()).with_event("CodeFound"),
        ElementDescriptor::new("Composite", ElementCategory::Mixer, factory.clone()),
        ElementDescriptor::new("Dispatcher", ElementCategory::Mixer, factory),
    ]
}
