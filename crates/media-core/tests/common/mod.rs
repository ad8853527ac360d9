//! Shared helpers for the media-core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use rmedia_infra_common::ServerConfig;
use rmedia_media_core::prelude::*;
use rmedia_media_core::EventNotification;

/// Sink that remembers every delivered notification in order
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<(Destination, EventNotification)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn all(&self) -> Vec<(Destination, EventNotification)> {
        self.delivered.lock().clone()
    }

    pub fn of_type(&self, event_type: &EventType) -> Vec<EventNotification> {
        self.delivered
            .lock()
            .iter()
            .filter(|(_, n)| &n.event_type == event_type)
            .map(|(_, n)| n.clone())
            .collect()
    }

    /// Poll until at least `count` notifications arrived or a second passed
    pub async fn wait_for(&self, count: usize) -> Vec<(Destination, EventNotification)> {
        for _ in 0..200 {
            if self.delivered.lock().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.all()
    }

    /// Give the delivery workers a moment to flush anything unexpected
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn deliver(
        &self,
        destination: &Destination,
        notification: &EventNotification,
    ) -> std::result::Result<(), DeliveryError> {
        self.delivered.lock().push((destination.clone(), notification.clone()));
        Ok(())
    }
}

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.dispatch.workers = 2;
    config
}

/// Server on a noop engine the caller can inspect and make fail
pub fn server_with_engine(config: ServerConfig) -> (MediaServer, Arc<NoopEngine>, Arc<RecordingSink>) {
    let engine = Arc::new(NoopEngine::new());
    let registry = Arc::new(ModuleRegistry::with_builtins(engine.clone()).unwrap());
    let sink = RecordingSink::new();
    let server = MediaServer::new(config, registry, sink.clone());
    (server, engine, sink)
}

pub fn retained(ms: u64) -> CreateParams {
    CreateParams::default().with_retention(Duration::from_millis(ms))
}
